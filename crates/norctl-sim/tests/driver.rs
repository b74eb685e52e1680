//! End-to-end driver behaviour against the simulated controller

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use norctl_core::chip::ProtectType;
use norctl_core::coord::{peer_service, CoreLink, EraseToken, Mailbox, PeerFlag, SharedToken};
use norctl_core::crypt::{DeviceKeys, UnitCipher};
use norctl_core::ctrl::{BusWidth, LineMode};
use norctl_core::engine::Flash;
use norctl_core::partition::{PartitionTable, Partitions};
use norctl_core::Error;
use norctl_sim::{EraseCounts, SimConfig, SimController};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn probed_flash() -> Flash<SimController> {
    let mut flash = Flash::new(SimController::new_default());
    flash.init().unwrap();
    flash
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[test]
fn init_ordering() {
    init_logs();
    let mut flash = Flash::new(SimController::new_default());

    assert_eq!(flash.get_flash_id(), Err(Error::NotInitialized));
    assert_eq!(flash.capacity(), Err(Error::NotInitialized));
    assert!(!flash.is_initialized());

    flash.init().unwrap();
    assert!(flash.is_initialized());
    assert_eq!(flash.get_flash_id(), Ok(0xC8_4016));
    assert_eq!(flash.capacity(), Ok(4 * 1024 * 1024));
    assert_eq!(flash.descriptor().unwrap().name, "GD25Q32C");

    assert_eq!(flash.init(), Err(Error::AlreadyInitialized));
}

#[test]
fn unknown_chip_falls_back_to_generic() {
    init_logs();
    let mut flash = Flash::new(SimController::new(SimConfig {
        id: 0x1F_0000,
        size: 1024 * 1024,
        busy_polls: 1,
    }));
    flash.init().unwrap();
    assert_eq!(flash.descriptor().unwrap().name, "generic-nor");
    assert_eq!(flash.get_flash_id(), Ok(0x1F_0000));
}

#[test]
fn protection_writes_are_idempotent() {
    init_logs();
    let mut flash = probed_flash();
    // Fresh status bits already encode "unprotected"
    assert_eq!(flash.controller().status_writes(), 0);

    flash.set_protect_type(ProtectType::All).unwrap();
    assert_eq!(flash.controller().status_writes(), 1);

    flash.set_protect_type(ProtectType::All).unwrap();
    assert_eq!(flash.controller().status_writes(), 1);

    flash.set_protect_type(ProtectType::None).unwrap();
    assert_eq!(flash.controller().status_writes(), 2);
    flash.set_protect_type(ProtectType::None).unwrap();
    assert_eq!(flash.controller().status_writes(), 2);
}

#[test]
fn protection_blocks_programming() {
    init_logs();
    let mut flash = probed_flash();

    flash.set_protect_type(ProtectType::All).unwrap();
    flash.write_bytes(0x2_0000, &[0x00; 16]).unwrap();
    let mut buf = [0u8; 16];
    flash.read_bytes(0x2_0000, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 16]);

    flash.set_protect_type(ProtectType::None).unwrap();
    flash.write_bytes(0x2_0000, &[0x00; 16]).unwrap();
    flash.read_bytes(0x2_0000, &mut buf).unwrap();
    assert_eq!(buf, [0x00; 16]);
}

#[test]
fn out_of_range_rejected_before_hardware() {
    init_logs();
    let mut flash = probed_flash();
    let cap = flash.capacity().unwrap();

    assert_eq!(flash.write_bytes(cap - 2, &[0u8; 4]), Err(Error::AddressOutOfRange));
    assert_eq!(flash.erase(cap), Err(Error::AddressOutOfRange));
    let mut buf = [0u8; 4];
    assert_eq!(flash.read_bytes(cap - 2, &mut buf), Err(Error::AddressOutOfRange));

    assert_eq!(flash.controller().burst_writes(), 0);
    assert_eq!(flash.controller().erases(), EraseCounts::default());
}

#[test]
fn administrative_regions_rejected() {
    init_logs();
    let mut flash = probed_flash();

    assert_eq!(flash.write_bytes(0x0000, &[0u8; 4]), Err(Error::AddressForbidden));
    assert_eq!(flash.erase(0x0000), Err(Error::AddressForbidden));
    // Partition table sector
    assert_eq!(flash.erase(0x1_1000), Err(Error::AddressForbidden));
    // Security metadata sector
    assert_eq!(flash.write_bytes(0x1_2FFF, &[0u8; 2]), Err(Error::AddressForbidden));
    assert_eq!(flash.controller().burst_writes(), 0);

    // Reads of administrative regions are fine
    let mut buf = [0u8; 16];
    flash.read_bytes(0x0000, &mut buf).unwrap();
}

#[test]
fn write_read_roundtrip() {
    init_logs();
    let mut flash = probed_flash();

    let lengths = [1usize, 256, 4096, 32768];
    let mut region = 0x10_0000u32;
    for (case, &len) in lengths.iter().enumerate() {
        for misalign in [0u32, 0x13] {
            let addr = region + misalign;
            let data = pattern(len, case as u8);
            flash.write_bytes(addr, &data).unwrap();

            let mut back = vec![0u8; len];
            flash.read_bytes(addr, &mut back).unwrap();
            assert_eq!(back, data, "len {} at 0x{:X}", len, addr);

            region += 0x2_0000;
        }
    }
}

#[test]
fn partial_write_preserves_neighbours() {
    init_logs();
    let mut flash = probed_flash();

    flash.write_bytes(0x2_0000, &[0xAA; 64]).unwrap();
    flash.write_bytes(0x2_0010, &[0x00; 5]).unwrap();

    let mut buf = [0u8; 64];
    flash.read_bytes(0x2_0000, &mut buf).unwrap();
    assert!(buf[..0x10].iter().all(|&b| b == 0xAA));
    assert!(buf[0x10..0x15].iter().all(|&b| b == 0x00));
    assert!(buf[0x15..].iter().all(|&b| b == 0xAA));
}

#[test]
fn erase_clears_exactly_one_sector() {
    init_logs();
    let mut sim = SimController::new_default();
    sim.data_mut()[0x2_0000..0x2_2000].fill(0xAA);
    let mut flash = Flash::new(sim);
    flash.init().unwrap();

    flash.erase(0x2_0800).unwrap();

    let mut buf = vec![0u8; 0x2000];
    flash.read_bytes(0x2_0000, &mut buf).unwrap();
    assert!(buf[..0x1000].iter().all(|&b| b == 0xFF));
    assert!(buf[0x1000..].iter().all(|&b| b == 0xAA));
    assert_eq!(
        flash.controller().erases(),
        EraseCounts { sector_4k: 1, block_32k: 0, block_64k: 0 }
    );
}

#[test]
fn line_mode_restored_after_operations() {
    init_logs();
    let mut flash = probed_flash();

    flash.set_line_mode(LineMode::Four).unwrap();
    assert_eq!(flash.get_line_mode(), LineMode::Four);
    assert_eq!(flash.controller().bus_width(), BusWidth::Quad);
    assert_eq!(flash.controller().mode_pattern(), 0xA5);
    // Quad entry set the QE bit (one status write cycle)
    assert_eq!(flash.controller().status() >> 9 & 1, 1);
    let qe_writes = flash.controller().status_writes();

    // Erase and program force two-wire internally but restore quad
    flash.erase(0x2_0000).unwrap();
    assert_eq!(flash.controller().bus_width(), BusWidth::Quad);
    flash.write_bytes(0x2_0000, &[0x5A; 8]).unwrap();
    assert_eq!(flash.controller().bus_width(), BusWidth::Quad);

    // Re-entering quad does not rewrite the already-set QE bit
    flash.set_line_mode(LineMode::Four).unwrap();
    assert_eq!(flash.controller().status_writes(), qe_writes);
}

static WAIT_HITS: AtomicU32 = AtomicU32::new(0);
static AUX_1: AtomicU32 = AtomicU32::new(0);
static AUX_2: AtomicU32 = AtomicU32::new(0);
static AUX_3: AtomicU32 = AtomicU32::new(0);
static AUX_4: AtomicU32 = AtomicU32::new(0);

fn feed_watchdog() {
    WAIT_HITS.fetch_add(1, Ordering::Relaxed);
}
fn aux_1() {
    AUX_1.fetch_add(1, Ordering::Relaxed);
}
fn aux_2() {
    AUX_2.fetch_add(1, Ordering::Relaxed);
}
fn aux_3() {
    AUX_3.fetch_add(1, Ordering::Relaxed);
}
fn aux_4() {
    AUX_4.fetch_add(1, Ordering::Relaxed);
}

#[test]
fn wait_callbacks_run_during_busy_poll() {
    init_logs();
    let mut flash = probed_flash();

    flash.register_wait_callback(feed_watchdog).unwrap();
    WAIT_HITS.store(0, Ordering::Relaxed);
    flash.erase(0x2_0000).unwrap();
    assert!(WAIT_HITS.load(Ordering::Relaxed) > 0);

    assert!(flash.unregister_wait_callback(feed_watchdog));
    assert!(!flash.unregister_wait_callback(feed_watchdog));

    WAIT_HITS.store(0, Ordering::Relaxed);
    flash.erase(0x2_0000).unwrap();
    assert_eq!(WAIT_HITS.load(Ordering::Relaxed), 0);
}

#[test]
fn wait_callback_pool_is_bounded() {
    init_logs();
    let mut flash = probed_flash();

    flash.register_wait_callback(aux_1).unwrap();
    flash.register_wait_callback(aux_2).unwrap();
    flash.register_wait_callback(aux_3).unwrap();
    flash.register_wait_callback(aux_4).unwrap();
    assert_eq!(
        flash.register_wait_callback(feed_watchdog),
        Err(Error::WaitCallbackPoolFull)
    );
    // Re-registering an existing callback is not an error
    flash.register_wait_callback(aux_1).unwrap();

    assert!(flash.unregister_wait_callback(aux_2));
    flash.register_wait_callback(feed_watchdog).unwrap();
}

struct SleepMailbox;

impl Mailbox for SleepMailbox {
    fn notify_peer(&mut self) {}

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }
}

#[test]
fn cross_core_erase_handshake() {
    init_logs();
    let token: &'static SharedToken = Box::leak(Box::new(SharedToken::new()));
    let busy: &'static PeerFlag = Box::leak(Box::new(PeerFlag::new()));
    let stop: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
    let saw_pending: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));

    let peer = thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            if token.load() == EraseToken::Pending {
                saw_pending.store(true, Ordering::SeqCst);
            }
            peer_service(token, busy);
            thread::sleep(Duration::from_micros(20));
        }
    });

    let link = CoreLink::new(token, SleepMailbox);
    let mut flash = Flash::with_peer(SimController::new_default(), link);
    flash.init().unwrap();

    flash.erase(0x2_0000).unwrap();

    assert!(saw_pending.load(Ordering::SeqCst));
    assert_eq!(token.load(), EraseToken::Idle);
    assert!(!busy.is_busy());

    let mut buf = [0u8; 4];
    flash.read_bytes(0x2_0000, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 4]);

    stop.store(true, Ordering::SeqCst);
    peer.join().unwrap();
}

fn device_cipher() -> UnitCipher {
    UnitCipher::new(&DeviceKeys {
        cipher: *b"unit-test-key-01",
        tweak: *b"unit-test-twk-01",
    })
}

#[test]
fn partition_info_matches_builtin_layout() {
    init_logs();
    let parts = Partitions::new(PartitionTable::builtin());
    assert_eq!(parts.get_info("sys_net"), Ok((0x1_3000, 0x2000)));
    assert_eq!(parts.get_info("sys_cfg"), Ok((0x1_5000, 0x8000)));
    assert_eq!(parts.get_info("missing"), Err(Error::PartitionNotFound));
}

#[test]
fn partition_read_write_roundtrip() {
    init_logs();
    let mut flash = probed_flash();
    let parts = Partitions::new(PartitionTable::builtin());

    let data = pattern(300, 9);
    parts.write(&mut flash, "user", 0x100, &data).unwrap();

    let mut back = vec![0u8; 300];
    parts.read(&mut flash, "user", 0x100, &mut back).unwrap();
    assert_eq!(back, data);

    // The data landed at the partition's absolute offset
    let (start, _) = parts.get_info("user").unwrap();
    let mut raw = vec![0u8; 300];
    flash.read_bytes(start + 0x100, &mut raw).unwrap();
    assert_eq!(raw, data);
}

#[test]
fn partition_bounds_enforced() {
    init_logs();
    let mut flash = probed_flash();
    let parts = Partitions::new(PartitionTable::builtin());

    // sys_net is 0x2000 long
    assert_eq!(
        parts.write(&mut flash, "sys_net", 0x1FF0, &[0u8; 0x20]),
        Err(Error::AddressOutOfRange)
    );
    let mut buf = [0u8; 0x20];
    assert_eq!(
        parts.read(&mut flash, "sys_net", 0x1FF0, &mut buf),
        Err(Error::AddressOutOfRange)
    );
    assert_eq!(
        parts.erase(&mut flash, "sys_net", 0x1000, 0x2000),
        Err(Error::AddressOutOfRange)
    );

    // Administrative partitions stay off limits at this layer too
    assert_eq!(
        parts.write(&mut flash, "bootloader", 0, &[0u8; 4]),
        Err(Error::AddressForbidden)
    );
    assert_eq!(
        parts.erase(&mut flash, "ptable", 0, 0x1000),
        Err(Error::AddressForbidden)
    );
}

#[test]
fn encrypted_partition_roundtrip() {
    init_logs();
    let mut flash = probed_flash();
    let parts = Partitions::with_cipher(PartitionTable::builtin(), device_cipher());

    // 100 bytes: three full units plus a padded trailing unit
    let data = pattern(100, 3);
    parts.write(&mut flash, "sys_cfg", 0, &data).unwrap();

    let mut back = vec![0u8; 100];
    parts.read(&mut flash, "sys_cfg", 0, &mut back).unwrap();
    assert_eq!(back, data);

    // The at-rest bytes are not the plaintext
    let (start, _) = parts.get_info("sys_cfg").unwrap();
    let mut raw = vec![0u8; 100];
    flash.read_bytes(start, &mut raw).unwrap();
    assert_ne!(raw, data);

    // A view without the cipher sees ciphertext
    let blind = Partitions::new(PartitionTable::builtin());
    let mut cipher_view = vec![0u8; 100];
    blind.read(&mut flash, "sys_cfg", 0, &mut cipher_view).unwrap();
    assert_eq!(cipher_view, raw);
}

#[test]
fn encrypted_partition_requires_unit_alignment() {
    init_logs();
    let mut flash = probed_flash();
    let parts = Partitions::with_cipher(PartitionTable::builtin(), device_cipher());

    assert_eq!(
        parts.write(&mut flash, "sys_cfg", 0x10, &[0u8; 8]),
        Err(Error::AddressOutOfRange)
    );
    let mut buf = [0u8; 8];
    assert_eq!(
        parts.read(&mut flash, "sys_cfg", 0x10, &mut buf),
        Err(Error::AddressOutOfRange)
    );

    // Padding the trailing unit must still fit the partition
    assert_eq!(
        parts.write(&mut flash, "sys_cfg", 0x7FE0, &[0u8; 33]),
        Err(Error::AddressOutOfRange)
    );
}

#[test]
fn partition_erase_picks_largest_granularity() {
    init_logs();
    let mut sim = SimController::new_default();
    // app: 0x1_D000 .. 0xA_D000
    sim.data_mut()[0x1_D000..0xA_D000].fill(0x11);
    let mut flash = Flash::new(sim);
    flash.init().unwrap();
    let parts = Partitions::new(PartitionTable::builtin());

    parts.erase(&mut flash, "app", 0, 0x9_0000).unwrap();

    // 3 sectors up to the 64K boundary, 8 full blocks, one 32K block,
    // 5 trailing sectors
    assert_eq!(
        flash.controller().erases(),
        EraseCounts { sector_4k: 8, block_32k: 1, block_64k: 8 }
    );
    assert!(flash.controller().data()[0x1_D000..0xA_D000].iter().all(|&b| b == 0xFF));

    // Misaligned ranges are rejected up front
    assert_eq!(
        parts.erase(&mut flash, "app", 0x100, 0x1000),
        Err(Error::AddressOutOfRange)
    );
}
