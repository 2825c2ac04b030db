//! Error types for the buffer pool.
//!
//! All error types implement `std::error::Error` so they compose with the
//! usual error handling crates.

use std::error::Error;
use std::fmt;
use std::io;

use crate::channel::ChannelKind;
use crate::channel::status::StatusCode;

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Main error type for pool and channel operations.
#[derive(Debug)]
pub enum PoolError {
    /// Every slot is in use; the new channel has to be rejected.
    NotAvailable,
    /// No open slot serves this channel.
    NotFound(u8),
    /// Another open slot already serves this channel.
    ChannelInUse(u8),
    /// Channel number outside 0..=15.
    InvalidChannel(u8),
    /// The slot handle refers to an allocation that has since been released.
    StaleSlot,
    /// The status channel cannot be released.
    Permanent(u8),
    /// The channel was not opened for reading.
    NotReadable(u8),
    /// The channel was not opened for writing.
    NotWritable(u8),
    /// An operation was applied to the wrong kind of channel.
    WrongKind {
        /// The kind the operation needs.
        expected: ChannelKind,
        /// The kind the slot actually holds.
        found: ChannelKind,
    },
    /// An adapter reported more bytes than the slot can hold.
    BadRefill {
        /// Length reported by the adapter.
        len: usize,
        /// Capacity of the slot.
        capacity: usize,
    },
    /// Backing store fault.
    Io(io::Error),
    /// One or more cleanups failed during bulk teardown.
    CleanupFailed {
        /// Channels whose cleanup failed, in slot order.
        channels: Vec<u8>,
        /// The first failure.
        source: Box<PoolError>,
    },
    /// Rejected pool configuration.
    InvalidConfig(String),
}

impl PoolError {
    /// Drive status code reported on the status channel for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PoolError::NotAvailable => StatusCode::NoChannel,
            PoolError::NotFound(_) => StatusCode::FileNotFound,
            PoolError::ChannelInUse(_) => StatusCode::NoChannel,
            PoolError::NotWritable(_) => StatusCode::WriteProtectOn,
            PoolError::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => StatusCode::FileNotFound,
                io::ErrorKind::AlreadyExists => StatusCode::FileExists,
                io::ErrorKind::PermissionDenied => StatusCode::WriteProtectOn,
                io::ErrorKind::WriteZero => StatusCode::DiskFull,
                _ => StatusCode::ReadError,
            },
            PoolError::CleanupFailed { .. } => StatusCode::WriteError,
            PoolError::InvalidChannel(_)
            | PoolError::StaleSlot
            | PoolError::Permanent(_)
            | PoolError::NotReadable(_)
            | PoolError::WrongKind { .. }
            | PoolError::BadRefill { .. }
            | PoolError::InvalidConfig(_) => StatusCode::SyntaxError,
        }
    }

    /// Returns true for faults coming from the backing store.
    pub fn is_io(&self) -> bool {
        matches!(self, PoolError::Io(_) | PoolError::CleanupFailed { .. })
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NotAvailable => write!(f, "no free buffer slot"),
            PoolError::NotFound(ch) => write!(f, "channel {} is not open", ch),
            PoolError::ChannelInUse(ch) => write!(f, "channel {} is already open", ch),
            PoolError::InvalidChannel(ch) => write!(f, "invalid channel number: {}", ch),
            PoolError::StaleSlot => write!(f, "stale slot handle"),
            PoolError::Permanent(ch) => write!(f, "channel {} cannot be released", ch),
            PoolError::NotReadable(ch) => write!(f, "channel {} is not open for reading", ch),
            PoolError::NotWritable(ch) => write!(f, "channel {} is not open for writing", ch),
            PoolError::WrongKind { expected, found } => {
                write!(f, "expected a {} channel, found a {} channel", expected, found)
            }
            PoolError::BadRefill { len, capacity } => {
                write!(f, "refill of {} bytes exceeds slot capacity of {} bytes", len, capacity)
            }
            PoolError::Io(e) => write!(f, "i/o error: {}", e),
            PoolError::CleanupFailed { channels, source } => {
                write!(f, "cleanup failed on channels {:?}: {}", channels, source)
            }
            PoolError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl Error for PoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PoolError::Io(e) => Some(e),
            PoolError::CleanupFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for PoolError {
    fn from(err: io::Error) -> Self {
        PoolError::Io(err)
    }
}
