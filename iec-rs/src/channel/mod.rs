//! Channel-kind state and the refill/cleanup contract.
//!
//! Every slot in use carries exactly one [`ChannelState`]. The variant is
//! chosen when the slot is allocated and stays fixed until release. The pool
//! drives all variants through the same [`Backing`] signature; operations
//! that only make sense for one kind are reached by matching on the variant.

use std::fmt;

use crate::error::Result;
use crate::shared::SharedState;
use crate::slot::SlotBuf;

pub mod dir;
pub mod file;
pub mod status;

pub use dir::{DirChannel, DirSource};
pub use file::{FileChannel, FileHandle, FileMode};
pub use status::{StatusChannel, StatusCode};

/// Outcome of a successful refill.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Refill {
    /// This many bytes were placed at the start of the slot.
    Ready(usize),
    /// The source has no more data. Not an error.
    EndOfData,
}

/// Why cleanup is being invoked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CleanupStage {
    /// The slot filled up; persist it and keep the channel open.
    Continue,
    /// The channel is closing; persist the remainder and finalize.
    Final,
}

/// Storage adapter bound to a slot.
pub trait Backing {
    /// Repopulate the slot from index 0.
    ///
    /// Set the end marker on `buf` when the produced region is the last one.
    fn refill(&mut self, buf: &mut SlotBuf<'_>, shared: &mut SharedState) -> Result<Refill>;

    /// Persist `buf.pending()` and, on [`CleanupStage::Final`], release or
    /// finalize the backing resource.
    fn cleanup(
        &mut self,
        buf: &mut SlotBuf<'_>,
        shared: &mut SharedState,
        stage: CleanupStage,
    ) -> Result<()>;
}

/// Discriminant of [`ChannelState`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ChannelKind {
    /// Directory listing.
    Directory,
    /// File access.
    File,
    /// Status (error) channel.
    Status,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Directory => write!(f, "directory"),
            ChannelKind::File => write!(f, "file"),
            ChannelKind::Status => write!(f, "status"),
        }
    }
}

/// Per-slot state, one variant per channel kind.
#[derive(Debug)]
pub enum ChannelState {
    /// Directory enumeration.
    Directory(DirChannel),
    /// File access.
    File(FileChannel),
    /// Synthetic status messages.
    Status(StatusChannel),
}

impl ChannelState {
    /// Kind of this state.
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelState::Directory(_) => ChannelKind::Directory,
            ChannelState::File(_) => ChannelKind::File,
            ChannelState::Status(_) => ChannelKind::Status,
        }
    }

    /// Whether a slot with this state is open for reading.
    pub fn readable(&self) -> bool {
        match self {
            ChannelState::Directory(_) | ChannelState::Status(_) => true,
            ChannelState::File(f) => f.mode() == FileMode::Read,
        }
    }

    /// Whether a slot with this state is open for writing.
    pub fn writable(&self) -> bool {
        match self {
            ChannelState::Directory(_) | ChannelState::Status(_) => false,
            ChannelState::File(f) => f.mode() != FileMode::Read,
        }
    }

    /// File state, if this is a file channel.
    pub fn as_file_mut(&mut self) -> Option<&mut FileChannel> {
        match self {
            ChannelState::File(f) => Some(f),
            _ => None,
        }
    }

    /// Directory state, if this is a directory channel.
    pub fn as_directory(&self) -> Option<&DirChannel> {
        match self {
            ChannelState::Directory(d) => Some(d),
            _ => None,
        }
    }

    /// Status state, if this is the status channel.
    pub fn as_status(&self) -> Option<&StatusChannel> {
        match self {
            ChannelState::Status(s) => Some(s),
            _ => None,
        }
    }
}

impl From<DirChannel> for ChannelState {
    fn from(dir: DirChannel) -> Self {
        ChannelState::Directory(dir)
    }
}

impl From<FileChannel> for ChannelState {
    fn from(file: FileChannel) -> Self {
        ChannelState::File(file)
    }
}

impl From<StatusChannel> for ChannelState {
    fn from(status: StatusChannel) -> Self {
        ChannelState::Status(status)
    }
}

impl Backing for ChannelState {
    fn refill(&mut self, buf: &mut SlotBuf<'_>, shared: &mut SharedState) -> Result<Refill> {
        match self {
            ChannelState::Directory(d) => d.refill(buf, shared),
            ChannelState::File(f) => f.refill(buf, shared),
            ChannelState::Status(s) => s.refill(buf, shared),
        }
    }

    fn cleanup(
        &mut self,
        buf: &mut SlotBuf<'_>,
        shared: &mut SharedState,
        stage: CleanupStage,
    ) -> Result<()> {
        match self {
            ChannelState::Directory(d) => d.cleanup(buf, shared, stage),
            ChannelState::File(f) => f.cleanup(buf, shared, stage),
            ChannelState::Status(s) => s.cleanup(buf, shared, stage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirent::{DirEntry, EntryFilter};
    use std::io::{self, Cursor};

    #[test]
    fn test_modes() {
        let reader = FileChannel::reader(Cursor::new(vec![1, 2, 3])).unwrap();
        let state = ChannelState::from(reader);
        assert_eq!(state.kind(), ChannelKind::File);
        assert!(state.readable());
        assert!(!state.writable());

        let writer = FileChannel::writer(Cursor::new(Vec::<u8>::new()));
        let state = ChannelState::from(writer);
        assert!(!state.readable());
        assert!(state.writable());

        let entries: Vec<io::Result<DirEntry>> = Vec::new();
        let dir = DirChannel::new(entries.into_iter(), EntryFilter::all());
        let state = ChannelState::from(dir);
        assert_eq!(state.kind(), ChannelKind::Directory);
        assert!(state.readable());
        assert!(state.as_directory().is_some());
    }

    #[test]
    fn test_variant_access() {
        let mut state = ChannelState::Status(StatusChannel::new("V1"));
        assert!(state.as_file_mut().is_none());
        assert!(state.as_directory().is_none());
        assert_eq!(state.as_status().unwrap().code(), StatusCode::DosVersion);
        assert_eq!(ChannelKind::Status.to_string(), "status");
    }
}
