use i2cbus::fake::{FakeDevice, FakeOp};
use i2cbus::{channel_logger, Bus, BusConfig, Direction, Errno, Error, RegisterBus, Transfer};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn fake_bus() -> (Bus<FakeDevice>, FakeDevice) {
    let dev = FakeDevice::new();
    (Bus::new(dev.clone(), BusConfig::default()), dev)
}

#[test]
fn write_then_read_byte_selects_once() {
    let (bus, dev) = fake_bus();
    let (logger, entries) = channel_logger();
    bus.set_logger(logger);

    bus.write_byte(0x50, 0x10, 0x42).unwrap();
    assert_eq!(bus.read_byte(0x50, 0x10).unwrap(), 0x42);

    assert_eq!(dev.select_count(), 1);
    assert_eq!(
        dev.trace(),
        vec![
            FakeOp::Select(0x50),
            FakeOp::WriteByte {
                addr: 0x50,
                reg: 0x10,
                value: 0x42
            },
            FakeOp::ReadByte {
                addr: 0x50,
                reg: 0x10
            },
        ]
    );

    let entries: Vec<_> = entries.try_iter().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].direction, Direction::Send);
    assert_eq!(entries[1].direction, Direction::Recv);
    assert!(entries.iter().all(|e| e.data == [0x42] && e.error.is_none()));
}

#[test]
fn concurrent_callers_never_overlap() {
    let (bus, dev) = fake_bus();
    dev.set_latency(Duration::from_micros(200));
    let bus = Arc::new(bus);

    let handles: Vec<_> = (0..8u8)
        .map(|n| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                let addr = 0x40 + n;
                for i in 0..20u8 {
                    bus.write_byte(addr, i, n ^ i).unwrap();
                    assert_eq!(bus.read_byte(addr, i).unwrap(), n ^ i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(dev.overlaps(), 0);

    // Every transfer goes to the slave selected last.
    let mut selected = None;
    for op in dev.trace() {
        match op {
            FakeOp::Select(addr) => selected = Some(addr),
            FakeOp::WriteByte { addr, .. } | FakeOp::ReadByte { addr, .. } => {
                assert_eq!(Some(addr), selected)
            }
            other => panic!("unexpected op {other:?}"),
        }
    }
}

#[test]
fn nak_from_missing_slave_is_surfaced() {
    let (bus, dev) = fake_bus();
    dev.set_absent(0x77);

    let err = bus.read_word(0x77, 0x00).unwrap_err();
    assert!(matches!(
        err,
        Error::Transfer {
            addr: 0x77,
            reg: 0x00,
            source: Errno::ENXIO
        }
    ));
    assert_eq!(bus.current_address(), Some(0x77));
}

#[test]
fn logger_can_be_swapped_while_shared() {
    let (bus, _) = fake_bus();
    let bus = Arc::new(bus);
    let count = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&count);
    bus.set_logger(Arc::new(move |_: &Transfer<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let worker = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || {
            for reg in 0..10 {
                bus.write_byte(0x22, reg, reg).unwrap();
            }
        })
    };
    worker.join().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 10);

    bus.set_logger(i2cbus::logger::null_logger());
    bus.read_byte(0x22, 0x00).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 10);
}

#[test]
fn nothing_is_logged_after_close() {
    let (bus, dev) = fake_bus();
    let (logger, entries) = channel_logger();
    bus.set_logger(logger);

    bus.write_block(0x30, 0x00, &[1, 2, 3]).unwrap();
    let shared: Arc<dyn RegisterBus> = Arc::new(bus);
    shared.close().unwrap();
    assert!(dev.is_closed());

    assert!(matches!(shared.read_byte(0x30, 0x00), Err(Error::Closed)));
    let mut buf = [0u8; 3];
    assert!(matches!(
        shared.read_block(0x30, 0x00, &mut buf),
        Err(Error::Closed)
    ));
    assert_eq!(entries.try_iter().count(), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn open_missing_bus_reports_path() {
    let config = BusConfig {
        device_prefix: "/nonexistent/i2c".to_string(),
        ..Default::default()
    };
    match Bus::<i2cbus::LinuxI2cDevice>::open_with(3, config) {
        Err(Error::Open { path, source }) => {
            assert_eq!(path, std::path::PathBuf::from("/nonexistent/i2c-3"));
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("opened a missing node"),
    }
}

proptest! {
    #[test]
    fn block_write_reads_back(
        addr in 0u8..0x80,
        reg in any::<u8>(),
        data in prop::collection::vec(any::<u8>(), 1..=32),
    ) {
        let (bus, _) = fake_bus();
        prop_assert_eq!(bus.write_block(addr, reg, &data).unwrap(), data.len());

        let mut buf = vec![0u8; data.len()];
        prop_assert_eq!(bus.read_block(addr, reg, &mut buf).unwrap(), data.len());
        prop_assert_eq!(buf, data);
    }

    #[test]
    fn word_is_returned_high_byte_first(lo in any::<u8>(), hi in any::<u8>()) {
        let (bus, dev) = fake_bus();
        dev.set_register(0x48, 0x05, lo);
        dev.set_register(0x48, 0x06, hi);
        prop_assert_eq!(bus.read_word(0x48, 0x05).unwrap(), u16::from_be_bytes([lo, hi]));
    }
}
