//! Transfer audit trail.
//!
//! Every attempted register transfer is handed to the bus's [`Logger`] as a
//! [`Transfer`]. The default logger writes it through the `log` crate;
//! [`TransferLog`] and [`channel_logger`] keep owned copies for callers that
//! want to inspect the history themselves.

use crossbeam_channel::{unbounded, Receiver};
use nix::errno::Errno;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Callback invoked after every transfer attempt, with the bus lock held.
///
/// It must not call back into the same bus.
pub type Logger = Arc<dyn Fn(&Transfer<'_>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Recv,
    Send,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Recv => "recv",
            Direction::Send => "send",
        }
    }
}

/// Value moved by a transfer. Words are kept in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Byte(u8),
    Word(u16),
    Block(&'a [u8]),
}

impl Value<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Value::Byte(b) => vec![b],
            Value::Word(w) => w.to_le_bytes().to_vec(),
            Value::Block(data) => data.to_vec(),
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(b) => write!(f, "{b:#04x}"),
            Value::Word(w) => write!(f, "{w:#06x}"),
            Value::Block(data) => {
                f.write_str("[")?;
                for (i, b) in data.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// One transfer attempt as seen by the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer<'a> {
    pub direction: Direction,
    pub addr: u8,
    pub reg: u8,
    pub value: Value<'a>,
    pub error: Option<Errno>,
}

impl fmt::Display for Transfer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "i2c {:>4}: [{:#04x}:{:#04x}] {} (err: ",
            self.direction.as_str(),
            self.addr,
            self.reg,
            self.value
        )?;
        match self.error {
            Some(errno) => write!(f, "{errno})"),
            None => f.write_str("none)"),
        }
    }
}

/// Writes the transfer through `log`; failed transfers are logged at warn.
pub fn log_transfer(transfer: &Transfer<'_>) {
    if transfer.error.is_some() {
        log::warn!(target: "i2cbus", "{transfer}");
    } else {
        log::debug!(target: "i2cbus", "{transfer}");
    }
}

pub fn default_logger() -> Logger {
    Arc::new(log_transfer)
}

/// Logger that drops every record.
pub fn null_logger() -> Logger {
    Arc::new(|_: &Transfer<'_>| {})
}

/// Owned copy of a [`Transfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub direction: Direction,
    pub addr: u8,
    pub reg: u8,
    pub data: Vec<u8>,
    pub error: Option<Errno>,
}

impl LogEntry {
    pub fn from_transfer(transfer: &Transfer<'_>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            timestamp,
            direction: transfer.direction,
            addr: transfer.addr,
            reg: transfer.reg,
            data: transfer.value.to_bytes(),
            error: transfer.error,
        }
    }
}

/// Bounded history of transfers, oldest dropped first.
pub struct TransferLog {
    entries: Vec<LogEntry>,
    max_entries: usize,
    show_recv: bool,
    show_send: bool,
}

impl TransferLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
            show_recv: true,
            show_send: true,
        }
    }

    /// Logger that appends to a shared log.
    pub fn logger(log: &Arc<Mutex<TransferLog>>) -> Logger {
        let log = Arc::clone(log);
        Arc::new(move |transfer: &Transfer<'_>| log.lock().push(LogEntry::from_transfer(transfer)))
    }

    /// Only affects [`to_text`](Self::to_text); nothing is discarded.
    pub fn set_filter(&mut self, show_recv: bool, show_send: bool) {
        self.show_recv = show_recv;
        self.show_send = show_send;
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);

        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_text(&self, show_timestamp: bool) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            let shown = match entry.direction {
                Direction::Recv => self.show_recv,
                Direction::Send => self.show_send,
            };
            if !shown {
                continue;
            }

            if show_timestamp {
                let millis = entry.timestamp % 1000;
                let secs = entry.timestamp / 1000;
                let hours = (secs / 3600) % 24;
                let minutes = (secs / 60) % 60;
                let seconds = secs % 60;
                result.push_str(&format!("[{hours:02}:{minutes:02}:{seconds:02}.{millis:03}] "));
            }

            let transfer = Transfer {
                direction: entry.direction,
                addr: entry.addr,
                reg: entry.reg,
                value: Value::Block(&entry.data),
                error: entry.error,
            };
            result.push_str(&transfer.to_string());
            result.push('\n');
        }
        result
    }
}

/// Logger that forwards owned entries to a channel.
///
/// Entries are dropped silently once the receiver is gone.
pub fn channel_logger() -> (Logger, Receiver<LogEntry>) {
    let (tx, rx) = unbounded::<LogEntry>();
    let logger: Logger = Arc::new(move |transfer: &Transfer<'_>| {
        let _ = tx.send(LogEntry::from_transfer(transfer));
    });
    (logger, rx)
}
