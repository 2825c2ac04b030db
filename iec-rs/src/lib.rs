//! Channel buffer pool for an IEC serial bus drive emulator.
//!
//! A host on the IEC bus opens up to sixteen logical channels on the drive.
//! This crate multiplexes those channels over a small, fixed set of buffer
//! slots and streams bytes between the bus and the backing medium.
//!
//! # Features
//!
//! - **Fixed memory**: All slot storage is allocated once, when the pool is built
//! - **Uniform streaming**: Directory, file and status channels share one
//!   refill/cleanup contract
//! - **Checked handles**: Slot handles go stale on release instead of
//!   reaching the next user of the slot
//!
//! # Quick Start
//!
//! ```
//! use iec_rs::{BufferPool, EntryFilter, HostFs, ReadOutcome};
//!
//! let dir = tempfile::tempdir()?;
//! std::fs::write(dir.path().join("GAME"), [0x01, 0x08, 0x60])?;
//!
//! let mut pool = BufferPool::builder().slots(4).build()?;
//! let host = HostFs::new(dir.path());
//!
//! // List the medium on channel 0
//! let listing = pool.allocate(0, host.list(EntryFilter::all())?.into())?;
//! let mut line = Vec::new();
//! while let ReadOutcome::Byte { value, .. } = pool.read_byte(listing)? {
//!     line.push(value);
//! }
//! assert_eq!(line.len(), 32);
//! pool.close(listing)?;
//!
//! // Load the file on channel 2
//! let file = host.open_read(pool.shared_mut(), b"G*")?;
//! let id = pool.allocate(2, file.into())?;
//! let mut data = [0u8; 8];
//! assert_eq!(pool.read(id, &mut data)?, 3);
//! pool.close(id)?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration
//!
//! Use the builder pattern for custom configuration:
//!
//! ```
//! use iec_rs::BufferPool;
//!
//! let pool = BufferPool::builder()
//!     .slots(8)
//!     .slot_capacity(512)
//!     .version_message("MY DRIVE V2")
//!     .build()?;
//! assert_eq!(pool.slot_count(), 8);
//! # Ok::<_, iec_rs::PoolError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

// Public modules
pub mod channel;
pub mod config;
pub mod dirent;
mod error;
pub mod fs;
mod pool;
mod shared;
mod slot;

// Internal implementation (not public)
mod internal;

// Re-export main types
pub use config::{PoolBuilder, PoolConfig};
pub use error::{PoolError, Result};
pub use pool::{BufferPool, PoolStats, ReadOutcome, SlotId};
pub use shared::SharedState;
pub use slot::{BufferSlot, SlotBuf, SlotFlags};

// Re-export channel types
pub use channel::{
    Backing, ChannelKind, ChannelState, CleanupStage, DirChannel, DirSource, FileChannel,
    FileHandle, FileMode, Refill, StatusChannel, StatusCode,
};
pub use dirent::{DirEntry, EntryFilter, EntryScratch, FileType};
pub use fs::{HostDir, HostFs, MemDir};
