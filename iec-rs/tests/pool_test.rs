//! Integration tests for iec-rs.
//!
//! These run the pool against a scratch directory on the host and against
//! seeded random operation sequences.
//!
//! Run with: cargo test --test pool_test

use std::fs;
use std::io;

use iec_rs::{
    BufferPool, ChannelState, DirEntry, EntryFilter, FileChannel, FileType, HostFs, MemDir,
    PoolError, ReadOutcome, SlotId, StatusCode,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// Create a medium holding a few files and a subdirectory.
fn medium() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("LOADER"), (0..=255u8).cycle().take(600).collect::<Vec<u8>>())
        .unwrap();
    fs::write(dir.path().join("README.SEQ"), b"HELLO FROM THE MEDIUM").unwrap();
    fs::write(dir.path().join("EMPTY"), b"").unwrap();
    fs::create_dir(dir.path().join("SAVES")).unwrap();
    dir
}

/// Read a channel until the end of its data.
fn drain(pool: &mut BufferPool, id: SlotId) -> Vec<u8> {
    let mut out = Vec::new();
    while let ReadOutcome::Byte { value, .. } = pool.read_byte(id).unwrap() {
        out.push(value);
    }
    out
}

fn mem_listing(count: usize) -> ChannelState {
    let entries = (0..count).map(|i| DirEntry::new(format!("FILE{}", i), FileType::Prg, 254));
    iec_rs::DirChannel::new(MemDir::new(entries), EntryFilter::all()).into()
}

#[test]
fn test_copy_through_pool() {
    let tmp = medium();
    let host = HostFs::new(tmp.path());
    let mut pool = BufferPool::builder().slots(2).slot_capacity(64).build().unwrap();

    let src = host.open_read(pool.shared_mut(), b"LOAD*").unwrap();
    let src = pool.allocate(2, src.into()).unwrap();
    let dst = pool.allocate(3, host.create("COPY").unwrap().into()).unwrap();

    let mut sent = 0;
    loop {
        match pool.read_byte(src).unwrap() {
            ReadOutcome::Byte { value, last } => {
                pool.write_byte(dst, value).unwrap();
                sent += 1;
                assert_eq!(last, sent == 600);
            }
            ReadOutcome::EndOfData => break,
        }
    }

    pool.close(src).unwrap();
    pool.close(dst).unwrap();
    assert_eq!(pool.active_count(), 0);

    let original = fs::read(tmp.path().join("LOADER")).unwrap();
    let copy = fs::read(tmp.path().join("COPY")).unwrap();
    assert_eq!(copy, original);

    let stats = pool.stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.releases, 2);
    assert_eq!(stats.cleanup_failures, 0);
}

#[test]
fn test_host_listing() {
    let tmp = medium();
    let host = HostFs::new(tmp.path());
    let mut pool = BufferPool::builder().slots(1).build().unwrap();

    let id = pool.allocate(0, host.list(EntryFilter::all()).unwrap().into()).unwrap();
    let listing = drain(&mut pool, id);
    pool.close(id).unwrap();

    let lines: Vec<&[u8]> = listing.chunks(32).collect();
    assert_eq!(lines.len(), 4);
    assert!(lines.iter().all(|l| l.len() == 32 && l[31] == 0));

    // Sorted by name: EMPTY, LOADER, README.SEQ, SAVES
    assert_eq!(&lines[1][2..4], &[3, 0]);
    assert!(lines[1].windows(8).any(|w| w == b"\"LOADER\""));
    assert!(lines[2].windows(3).any(|w| w == b"SEQ"));
    assert!(lines[3].windows(3).any(|w| w == b"DIR"));
}

#[test]
fn test_listing_filtered_by_type() {
    let tmp = medium();
    let host = HostFs::new(tmp.path());
    let mut pool = BufferPool::builder().slots(1).build().unwrap();

    let filter = EntryFilter::all().with_type(FileType::Seq);
    let id = pool.allocate(0, host.list(filter).unwrap().into()).unwrap();

    let mut lines = 0;
    loop {
        match pool.read_byte(id).unwrap() {
            ReadOutcome::Byte { last, .. } => {
                if last {
                    lines += 1;
                }
            }
            ReadOutcome::EndOfData => break,
        }
    }
    assert_eq!(lines, 1);
}

#[test]
fn test_empty_file_ends_immediately() {
    let tmp = medium();
    let host = HostFs::new(tmp.path());
    let mut pool = BufferPool::builder().slots(1).build().unwrap();

    let file = host.open_read(pool.shared_mut(), b"EMPTY").unwrap();
    let id = pool.allocate(2, file.into()).unwrap();
    assert_eq!(pool.read_byte(id).unwrap(), ReadOutcome::EndOfData);
    assert_eq!(pool.read_byte(id).unwrap(), ReadOutcome::EndOfData);
}

#[test]
fn test_missing_file_reported_on_status_channel() {
    let tmp = medium();
    let host = HostFs::new(tmp.path());
    let mut pool = BufferPool::builder().slots(1).build().unwrap();

    let err: PoolError = host.open_read(pool.shared_mut(), b"NOPE").unwrap_err().into();
    pool.report(&err);
    assert_eq!(pool.status(), StatusCode::FileNotFound);

    let status = pool.find(15).unwrap();
    let mut buf = [0u8; 40];
    let len = pool.read(status, &mut buf).unwrap();
    assert_eq!(&buf[..len], b"62,FILE NOT FOUND,00,00\r");
}

#[test]
fn test_create_existing_file() {
    let tmp = medium();
    let host = HostFs::new(tmp.path());

    let err: PoolError = host.create("LOADER").unwrap_err().into();
    assert_eq!(err.status_code(), StatusCode::FileExists);
}

#[test]
fn test_append_through_pool() {
    let tmp = medium();
    let host = HostFs::new(tmp.path());
    let mut pool = BufferPool::builder().slots(1).slot_capacity(32).build().unwrap();

    let id = pool.allocate(4, host.append("README.SEQ").unwrap().into()).unwrap();
    pool.write_all(id, b" AND MORE").unwrap();
    pool.close(id).unwrap();

    let text = fs::read(tmp.path().join("README.SEQ")).unwrap();
    assert_eq!(text, b"HELLO FROM THE MEDIUM AND MORE");
}

#[test]
fn test_single_match_traversal() {
    let tmp = medium();
    let host = HostFs::new(tmp.path());
    let mut pool = BufferPool::builder().slots(2).build().unwrap();

    // A listing in progress does not disturb name resolution.
    let listing = pool.allocate(0, host.list(EntryFilter::all()).unwrap().into()).unwrap();
    assert!(matches!(pool.read_byte(listing).unwrap(), ReadOutcome::Byte { .. }));

    let file = host.open_read(pool.shared_mut(), b"R*").unwrap();
    assert_eq!(file.size(), 21);
    assert!(!pool.shared().is_matching());

    assert_eq!(drain(&mut pool, listing).len(), 32 * 4 - 1);
}

#[test]
fn test_random_operations_keep_invariants() {
    const SLOTS: usize = 4;
    let mut rng = StdRng::seed_from_u64(0x1541);
    let mut pool = BufferPool::builder().slots(SLOTS).slot_capacity(32).build().unwrap();
    let mut open: Vec<(u8, SlotId)> = Vec::new();

    for _ in 0..2000 {
        match rng.gen_range(0..4) {
            0 => {
                let channel = rng.gen_range(0..15u8);
                let state = if rng.gen_bool(0.5) {
                    mem_listing(rng.gen_range(0..4))
                } else {
                    FileChannel::reader(io::Cursor::new(vec![channel; 40])).unwrap().into()
                };

                match pool.allocate(channel, state) {
                    Ok(id) => open.push((channel, id)),
                    Err(PoolError::NotAvailable) => assert_eq!(open.len(), SLOTS),
                    Err(PoolError::ChannelInUse(c)) => {
                        assert!(open.iter().any(|&(ch, _)| ch == c))
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            1 if !open.is_empty() => {
                let (channel, id) = open.swap_remove(rng.gen_range(0..open.len()));
                if rng.gen_bool(0.5) {
                    pool.release(id).unwrap();
                } else {
                    pool.close(id).unwrap();
                }
                assert!(matches!(pool.find(channel), Err(PoolError::NotFound(_))));
                assert!(matches!(pool.release(id), Err(PoolError::StaleSlot)));
            }
            2 if !open.is_empty() => {
                let (_, id) = open[rng.gen_range(0..open.len())];
                for _ in 0..rng.gen_range(1..50) {
                    if pool.read_byte(id).unwrap() == ReadOutcome::EndOfData {
                        break;
                    }
                }
                let slot = pool.slot(id).unwrap();
                assert!(slot.cursor() <= slot.filled());
                assert!(slot.filled() <= slot.capacity());
            }
            _ => {
                let channel = rng.gen_range(0..16u8);
                match open.iter().find(|&&(ch, _)| ch == channel) {
                    Some(&(_, id)) => assert_eq!(pool.find(channel).unwrap(), id),
                    None if channel == 15 => assert!(pool.find(channel).is_ok()),
                    None => assert!(pool.find(channel).is_err()),
                }
            }
        }

        assert_eq!(pool.active_count(), open.len());
        assert_eq!(pool.slots().filter(|s| s.is_in_use()).count(), open.len());
    }

    pool.release_all(true).unwrap();
    assert_eq!(pool.active_count(), 0);
}
