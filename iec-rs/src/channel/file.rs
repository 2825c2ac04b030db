//! File access channels.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::trace;

use super::{Backing, CleanupStage, Refill};
use crate::error::Result;
use crate::shared::SharedState;
use crate::slot::SlotBuf;

/// A file handle from the filesystem driver.
///
/// Anything that reads, writes and seeks qualifies, including
/// `std::fs::File` and `io::Cursor<Vec<u8>>`.
pub trait FileHandle: Read + Write + Seek {}

impl<T: Read + Write + Seek> FileHandle for T {}

/// Direction a file channel was opened in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileMode {
    /// Sequential reads from the start.
    Read,
    /// Sequential writes from the start.
    Write,
    /// Sequential writes after the existing contents.
    Append,
}

/// File access state. Owns its handle for the lifetime of the allocation.
///
/// A read error after part of a chunk arrived is held back: the partial chunk
/// is delivered and the error is returned by the next refill.
pub struct FileChannel {
    handle: Box<dyn FileHandle>,
    mode: FileMode,
    position: u64,
    size: u64,
    pending_err: Option<io::Error>,
}

impl FileChannel {
    /// Open a channel reading `handle` from the start.
    pub fn reader(handle: impl FileHandle + 'static) -> io::Result<Self> {
        let mut handle: Box<dyn FileHandle> = Box::new(handle);
        let size = handle.seek(SeekFrom::End(0))?;
        handle.seek(SeekFrom::Start(0))?;

        Ok(Self {
            handle,
            mode: FileMode::Read,
            position: 0,
            size,
            pending_err: None,
        })
    }

    /// Open a channel writing `handle` from the start.
    pub fn writer(handle: impl FileHandle + 'static) -> Self {
        Self {
            handle: Box::new(handle),
            mode: FileMode::Write,
            position: 0,
            size: 0,
            pending_err: None,
        }
    }

    /// Open a channel writing after the end of `handle`.
    pub fn appender(handle: impl FileHandle + 'static) -> io::Result<Self> {
        let mut handle: Box<dyn FileHandle> = Box::new(handle);
        let size = handle.seek(SeekFrom::End(0))?;

        Ok(Self {
            handle,
            mode: FileMode::Append,
            position: size,
            size,
            pending_err: None,
        })
    }

    /// Direction of the channel.
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Position of the handle. Bytes still buffered in the slot are not counted.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Known size of the file.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Move the handle to an absolute position.
    pub fn seek(&mut self, position: u64) -> io::Result<()> {
        self.pending_err = None;
        self.position = self.handle.seek(SeekFrom::Start(position))?;
        Ok(())
    }
}

impl Backing for FileChannel {
    fn refill(&mut self, buf: &mut SlotBuf<'_>, _shared: &mut SharedState) -> Result<Refill> {
        if self.mode != FileMode::Read {
            return Ok(Refill::EndOfData);
        }

        if let Some(err) = self.pending_err.take() {
            return Err(err.into());
        }

        let space = buf.space_mut();
        let mut len = 0;
        while len < space.len() {
            match self.handle.read(&mut space[len..]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if len == 0 => return Err(e.into()),
                Err(e) => {
                    trace!(bytes = len, error = %e, "short read before error");
                    self.pending_err = Some(e);
                    break;
                }
            }
        }

        self.position += len as u64;
        if len == 0 {
            return Ok(Refill::EndOfData);
        }

        let capacity = buf.capacity();
        let last = len < capacity || self.position >= self.size;
        buf.set_end_marker(self.pending_err.is_none() && last);
        Ok(Refill::Ready(len))
    }

    fn cleanup(
        &mut self,
        buf: &mut SlotBuf<'_>,
        _shared: &mut SharedState,
        stage: CleanupStage,
    ) -> Result<()> {
        if self.mode == FileMode::Read {
            return Ok(());
        }

        let pending = buf.pending();
        if !pending.is_empty() {
            self.handle.write_all(pending)?;
            self.position += pending.len() as u64;
            self.size = self.size.max(self.position);
            trace!(bytes = pending.len(), position = self.position, "wrote file chunk");
        }

        if stage == CleanupStage::Final {
            self.handle.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for FileChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileChannel")
            .field("mode", &self.mode)
            .field("position", &self.position)
            .field("size", &self.size)
            .field("pending_err", &self.pending_err)
            .finish()
    }
}
