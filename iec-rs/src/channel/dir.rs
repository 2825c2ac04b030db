//! Directory listing channels.

use std::fmt;
use std::io;

use tracing::trace;

use super::{Backing, CleanupStage, Refill};
use crate::dirent::{DirEntry, EntryFilter, LINE_SIZE};
use crate::error::{PoolError, Result};
use crate::shared::SharedState;
use crate::slot::SlotBuf;

/// A directory traversal handle from the filesystem driver.
///
/// Any iterator over `io::Result<DirEntry>` qualifies.
pub trait DirSource: Iterator<Item = io::Result<DirEntry>> {}

impl<T: Iterator<Item = io::Result<DirEntry>>> DirSource for T {}

/// Advance `source` to the next entry accepted by `filter`.
pub(crate) fn next_accepted(
    source: &mut dyn DirSource,
    filter: &EntryFilter,
) -> io::Result<Option<DirEntry>> {
    for entry in source {
        let entry = entry?;
        if filter.accepts(&entry) {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Directory enumeration state.
///
/// Each refill produces one listing line. The channel reads one matching
/// entry ahead so the refill carrying the last entry can set the end marker.
/// A traversal error hit while reading ahead is held back and returned by the
/// following refill, so the line already rendered is still delivered.
pub struct DirChannel {
    source: Box<dyn DirSource>,
    filter: EntryFilter,
    lookahead: Option<DirEntry>,
    pending_err: Option<io::Error>,
    primed: bool,
    emitted: usize,
}

impl DirChannel {
    /// Start a listing over `source`.
    pub fn new(source: impl DirSource + 'static, filter: EntryFilter) -> Self {
        Self {
            source: Box::new(source),
            filter,
            lookahead: None,
            pending_err: None,
            primed: false,
            emitted: 0,
        }
    }

    /// Filter applied to the traversal.
    pub fn filter(&self) -> &EntryFilter {
        &self.filter
    }

    /// Number of entries emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Backing for DirChannel {
    fn refill(&mut self, buf: &mut SlotBuf<'_>, shared: &mut SharedState) -> Result<Refill> {
        if buf.capacity() < LINE_SIZE {
            return Err(PoolError::BadRefill {
                len: LINE_SIZE,
                capacity: buf.capacity(),
            });
        }

        if let Some(err) = self.pending_err.take() {
            self.primed = false;
            return Err(err.into());
        }

        let entry = if self.primed {
            self.lookahead.take()
        } else {
            self.primed = true;
            next_accepted(&mut *self.source, &self.filter)?
        };
        let Some(entry) = entry else {
            return Ok(Refill::EndOfData);
        };

        let scratch = shared.entry_mut();
        scratch.load(&entry);
        let len = scratch.render_line(buf.space_mut());
        self.emitted += 1;

        match next_accepted(&mut *self.source, &self.filter) {
            Ok(next) => {
                self.lookahead = next;
                buf.set_end_marker(self.lookahead.is_none());
            }
            Err(err) => {
                self.pending_err = Some(err);
                buf.set_end_marker(false);
            }
        }

        trace!(entry = self.emitted, last = buf.end_marker(), "listed entry");
        Ok(Refill::Ready(len))
    }

    fn cleanup(
        &mut self,
        _buf: &mut SlotBuf<'_>,
        _shared: &mut SharedState,
        _stage: CleanupStage,
    ) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for DirChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirChannel")
            .field("filter", &self.filter)
            .field("pending_err", &self.pending_err)
            .field("primed", &self.primed)
            .field("emitted", &self.emitted)
            .finish()
    }
}
