//! End-to-end walks through the allocator's visible behavior
//!
//! Every test builds a private manager over a temporary swap directory with a
//! budget of exactly one pack, so each pool has a single slot and eviction
//! kicks in on the second allocation of a class.

use swapmem::{ManagerConfig, MemoryError, MemoryManager};

const ONE_PACK: usize = 8176; // 16 + 32 + ... + 4096

fn one_slot_manager() -> (tempfile::TempDir, MemoryManager) {
    let dir = tempfile::tempdir().unwrap();
    let config = ManagerConfig::default().with_swap_dir(dir.path());
    let manager = MemoryManager::with_config(ONE_PACK, config).unwrap();
    (dir, manager)
}

fn class_stats(manager: &MemoryManager, block_size: usize) -> swapmem::PoolStatSnapshot {
    manager
        .statistics()
        .pools
        .into_iter()
        .find(|p| p.block_size == block_size)
        .unwrap()
}

#[test]
fn direct_alloc_write_read_free() {
    let (_dir, manager) = one_slot_manager();

    let mut block = manager.get(10).unwrap();
    assert_eq!(block.capacity(), 16);
    assert_eq!(block.size(), 10);
    assert!(!block.is_locked());

    let payload: Vec<u8> = (0..10).collect();
    block
        .access(|data| data.copy_from_slice(&payload))
        .unwrap();

    block.lock().unwrap();
    assert_eq!(block.data(), payload.as_slice());
    block.unlock();

    block.free().unwrap();

    let stats = class_stats(&manager, 16);
    assert_eq!(stats.used, 0);
    assert_eq!(stats.swapped, 0);
    assert_eq!(stats.locked, 0);
}

#[test]
fn forced_eviction_preserves_both_tenants() {
    let (_dir, manager) = one_slot_manager();

    let mut a = manager.get(16).unwrap();
    a.access(|data| data.fill(0xAA)).unwrap();

    let mut b = manager.get(16).unwrap();
    b.access(|data| data.fill(0xBB)).unwrap();

    // One slot, two live blocks: exactly one of them is on disk.
    assert_eq!(class_stats(&manager, 16).swapped, 1);

    a.lock().unwrap();
    assert!(a.data().iter().all(|&byte| byte == 0xAA));
    a.unlock();
    assert_eq!(class_stats(&manager, 16).swapped, 1);

    b.lock().unwrap();
    assert!(b.data().iter().all(|&byte| byte == 0xBB));
    b.unlock();

    a.free().unwrap();
    b.free().unwrap();
    assert_eq!(class_stats(&manager, 16).swapped, 0);
    assert_eq!(class_stats(&manager, 16).used, 0);
}

#[test]
fn two_level_eviction_round_robin() {
    let (_dir, manager) = one_slot_manager();

    let mut blocks: Vec<_> = [0x0A, 0x0B, 0x0C]
        .into_iter()
        .map(|fill| {
            let mut block = manager.get(16).unwrap();
            block.access(|data| data.fill(fill)).unwrap();
            (block, fill)
        })
        .collect();

    // Two of three tenants live on disk across two levels.
    assert_eq!(class_stats(&manager, 16).swapped, 2);
    assert_eq!(class_stats(&manager, 16).swap_levels, 2);

    // Cycling a, b, c, a, b, c always reads each block's own bytes.
    for _ in 0..2 {
        for (block, fill) in &mut blocks {
            let expected = *fill;
            block
                .access(|data| assert!(data.iter().all(|&byte| byte == expected)))
                .unwrap();
        }
    }

    for (block, _) in blocks {
        block.free().unwrap();
    }
}

#[test]
fn free_of_swapped_block_leaves_neighbors_untouched() {
    let (_dir, manager) = one_slot_manager();

    let mut a = manager.get(16).unwrap();
    a.access(|data| data.fill(0x0A)).unwrap();
    let mut b = manager.get(16).unwrap();
    b.access(|data| data.fill(0x0B)).unwrap();
    let mut c = manager.get(16).unwrap();
    c.access(|data| data.fill(0x0C)).unwrap();

    // c is the RAM occupant; a and b sit on disk.
    let before = class_stats(&manager, 16);
    assert_eq!(before.swapped, 2);

    a.free().unwrap();
    let after = class_stats(&manager, 16);
    assert_eq!(after.swapped, before.swapped - 1);
    assert_eq!(after.used, before.used);

    b.access(|data| assert!(data.iter().all(|&byte| byte == 0x0B)))
        .unwrap();

    b.free().unwrap();
    c.free().unwrap();
}

#[test]
fn free_of_ram_occupant_promotes_the_tail() {
    let (_dir, manager) = one_slot_manager();

    let mut a = manager.get(16).unwrap();
    a.access(|data| data.fill(0x0A)).unwrap();
    let mut b = manager.get(16).unwrap();
    b.access(|data| data.fill(0x0B)).unwrap();
    let mut c = manager.get(16).unwrap();
    c.access(|data| data.fill(0x0C)).unwrap();

    // Freeing the RAM occupant keeps the slot used and promotes a tenant.
    let before = class_stats(&manager, 16);
    c.free().unwrap();
    let after = class_stats(&manager, 16);
    assert_eq!(after.used, before.used);
    assert_eq!(after.swapped, before.swapped - 1);

    b.access(|data| assert!(data.iter().all(|&byte| byte == 0x0B)))
        .unwrap();
    a.access(|data| assert!(data.iter().all(|&byte| byte == 0x0A)))
        .unwrap();

    a.free().unwrap();
    b.free().unwrap();
}

#[test]
fn id_exhaustion_fails_the_fifth_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let config = ManagerConfig::default()
        .with_swap_dir(dir.path())
        .with_max_swap_level(4);
    let manager = MemoryManager::with_config(ONE_PACK, config).unwrap();

    // Ids: 1 for the first tenant, then 4, 3, 2 — the fifth has none left.
    let blocks: Vec<_> = (0..4).map(|_| manager.get(16).unwrap()).collect();
    let err = manager.get(16).unwrap_err();
    assert!(matches!(
        err,
        MemoryError::SlotExhausted {
            block_size: 16,
            slot: 0
        }
    ));

    // The failed acquire must not have corrupted the live tenants.
    for block in blocks {
        block.free().unwrap();
    }
    assert_eq!(class_stats(&manager, 16).used, 0);
}

#[test]
fn idempotent_lock_and_unlock() {
    let (_dir, manager) = one_slot_manager();

    let mut block = manager.get(64).unwrap();
    assert!(!block.is_locked());

    block.unlock(); // no-op
    assert!(!block.is_locked());

    block.lock().unwrap();
    block.lock().unwrap(); // no-op
    assert!(block.is_locked());

    block.data_mut().fill(7);
    assert_eq!(block.data()[0], 7);

    block.unlock();
    block.unlock(); // no-op
    assert!(!block.is_locked());

    assert_eq!(class_stats(&manager, 64).locked, 0);
    block.free().unwrap();
}

#[test]
fn access_keeps_an_existing_lock() {
    let (_dir, manager) = one_slot_manager();

    let mut block = manager.get(32).unwrap();
    block.lock().unwrap();
    block.access(|data| data.fill(1)).unwrap();
    assert!(block.is_locked(), "access must not steal the caller's lock");
    block.unlock();

    block.access(|data| assert_eq!(data[0], 1)).unwrap();
    assert!(!block.is_locked());
    block.free().unwrap();
}

#[test]
fn dropping_a_live_block_frees_it() {
    let (_dir, manager) = one_slot_manager();

    {
        let mut block = manager.get(128).unwrap();
        block.access(|data| data.fill(9)).unwrap();
        // No explicit free: the drop releases the slot (with a warning).
    }

    let stats = class_stats(&manager, 128);
    assert_eq!(stats.used, 0);
    assert_eq!(stats.locked, 0);
}

#[test]
fn freeing_a_locked_block_unlocks_first() {
    let (_dir, manager) = one_slot_manager();

    let mut block = manager.get(256).unwrap();
    block.lock().unwrap();
    block.free().unwrap();

    let stats = class_stats(&manager, 256);
    assert_eq!(stats.used, 0);
    assert_eq!(stats.locked, 0);
}

#[test]
fn swap_files_have_the_exact_level_size() {
    let (dir, manager) = one_slot_manager();

    // Force pool 16 to grow a second disk level.
    let blocks: Vec<_> = (0..3).map(|_| manager.get(16).unwrap()).collect();
    assert_eq!(class_stats(&manager, 16).swap_levels, 2);

    for level in 1..=2 {
        let path = dir.path().join(format!("swap_1x16_L{level}.bin"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16, "{path:?}");
    }

    for block in blocks {
        block.free().unwrap();
    }

    // Level files disappear with the manager, not with the blocks.
    assert!(dir.path().join("swap_1x16_L1.bin").exists());
    drop(manager);
    assert!(!dir.path().join("swap_1x16_L1.bin").exists());
    assert!(!dir.path().join("swap_1x16_L2.bin").exists());
}
