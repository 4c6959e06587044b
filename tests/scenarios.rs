//! End-to-end scenarios over a small region: `block_size = 256`,
//! `block_count = 4`, `spare_count = 1`, `program_granularity = 1`.

use logkvs::{KvStore, MemoryBackend, StoreConfig};
use std::ops::ControlFlow;

fn small_config() -> StoreConfig {
    StoreConfig {
        block_size: 256,
        block_count: 4,
        spare_count: 1,
        program_granularity: 1,
        cookie: Vec::new(),
    }
}

fn mounted_store() -> KvStore<MemoryBackend> {
    let backend = MemoryBackend::new(256 * 4);
    let mut store = KvStore::new(backend, small_config()).unwrap();
    store.mount().unwrap();
    store
}

#[test]
fn empty_mount_has_no_keys() {
    let mut store = mounted_store();
    let mut buf = [0u8; 4];
    assert!(store.read(b"k", &mut buf).is_err());
}

#[test]
fn round_trip_overwrite() {
    let mut store = mounted_store();

    store.write(b"/cnt", &0u32.to_le_bytes()).unwrap();
    let mut buf = [0u8; 4];
    store.read(b"/cnt", &mut buf).unwrap();
    assert_eq!(buf, [0, 0, 0, 0]);

    store.write(b"/cnt", &7u32.to_le_bytes()).unwrap();
    store.read(b"/cnt", &mut buf).unwrap();
    assert_eq!(buf, [7, 0, 0, 0]);
}

#[test]
fn walk_sees_history_walk_unique_sees_only_latest() {
    let mut store = mounted_store();
    store.write(b"/a", &[1]).unwrap();
    store.write(b"/a", &[2]).unwrap();
    store.write(b"/b", &[3]).unwrap();

    let mut all = Vec::new();
    store
        .walk(b"/", |k, v| {
            all.push((k.to_vec(), v.to_vec()));
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(all.len(), 3);

    let mut unique = Vec::new();
    store
        .walk_unique(b"/", |k, v| {
            unique.push((k.to_vec(), v.to_vec()));
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(unique.len(), 2);
    let by_key: std::collections::HashMap<_, _> = unique.into_iter().collect();
    assert_eq!(by_key[&b"/a".to_vec()], vec![2]);
    assert_eq!(by_key[&b"/b".to_vec()], vec![3]);
}

#[test]
fn writing_past_live_capacity_triggers_gc_and_keeps_latest_value() {
    let mut store = mounted_store();
    let live_capacity = (4 - 1) * 256u32;

    let mut n: u32 = 0;
    let mut bytes_written = 0u32;
    while bytes_written < 2 * live_capacity as u32 {
        store.write(b"/cnt", &n.to_le_bytes()).unwrap();
        bytes_written += 11; // 4 hdr + 4 key + 4 val + 4 crc, program_granularity 1
        n += 1;
    }

    assert!(store.cursor().wrap_counter >= 1);

    let mut buf = [0u8; 4];
    store.read(b"/cnt", &mut buf).unwrap();
    assert_eq!(u32::from_le_bytes(buf), n - 1);
}

#[test]
fn tombstone_survives_gc() {
    let mut store = mounted_store();
    store.write(b"/bas", &[0]).unwrap();
    store.write(b"/cnt", &[0]).unwrap();
    store.delete(b"/bas").unwrap();

    let live_capacity = (4 - 1) * 256u32;
    let mut n: u32 = 1;
    let mut bytes_written = 0u32;
    while bytes_written < 2 * live_capacity {
        store.write(b"/cnt", &[n as u8]).unwrap();
        bytes_written += 11;
        n += 1;
    }

    let mut buf = [0u8; 1];
    assert!(store.read(b"/bas", &mut buf).is_err());
    store.read(b"/cnt", &mut buf).unwrap();
    assert_eq!(buf, [(n - 1) as u8]);
}

#[test]
fn delete_on_absent_key_is_accepted() {
    let mut store = mounted_store();
    store.delete(b"/never-written").unwrap();
    let mut buf = [0u8; 1];
    assert!(store.read(b"/never-written", &mut buf).is_err());
}

#[test]
fn idempotent_write_does_not_move_the_cursor() {
    let mut store = mounted_store();
    store.write(b"/k", b"same").unwrap();
    let pos_before = store.cursor().pos;
    store.write(b"/k", b"same").unwrap();
    assert_eq!(store.cursor().pos, pos_before);
}

#[test]
fn read_rejects_buffer_longer_than_the_stored_value() {
    let mut store = mounted_store();
    store.write(b"/k", b"ab").unwrap();
    let mut buf = [0u8; 8];
    assert!(store.read(b"/k", &mut buf).is_err());
}

#[test]
fn interrupted_gc_recovers_on_remount() {
    let mut store = mounted_store();
    let live_capacity = (4 - 1) * 256u32;
    let mut n: u32 = 0;
    let mut bytes_written = 0u32;
    while bytes_written < 2 * live_capacity {
        store.write(b"/cnt", &n.to_le_bytes()).unwrap();
        bytes_written += 11;
        n += 1;
    }

    let geo = store.geometry();
    let cursor = store.cursor();
    let write_block_base = geo.block_base(cursor.pos);
    let after_block_base = geo.block_advance(write_block_base, 1);
    let oldest_live_base = geo.block_advance(cursor.bend, geo.spare_count);

    // Simulate a GC pass that copied the oldest live block forward into the
    // next spare block, then crashed before the old copies were reclaimed.
    let copy_len = (geo.block_size - geo.program_granularity) as usize;
    let source_start = oldest_live_base as usize;
    let dest_start = after_block_base as usize;
    let source_bytes = store.backend().bytes()[source_start..source_start + copy_len].to_vec();
    store.backend_mut().bytes_mut()[dest_start..dest_start + copy_len]
        .copy_from_slice(&source_bytes);

    store.unmount().unwrap();
    store.mount().unwrap();

    let mut buf = [0u8; 4];
    store.read(b"/cnt", &mut buf).unwrap();
    assert_eq!(u32::from_le_bytes(buf), n - 1);
}

#[test]
fn unmount_then_remount_preserves_data() {
    let mut store = mounted_store();
    store.write(b"/persist", b"value").unwrap();
    store.unmount().unwrap();
    store.mount().unwrap();

    let mut buf = [0u8; 5];
    store.read(b"/persist", &mut buf).unwrap();
    assert_eq!(&buf, b"value");
}
