//! The buffer pool.
//!
//! This module provides [`BufferPool`], which multiplexes a fixed number of
//! slots across the channels a host opens, and streams bytes through them.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use iec_rs::{BufferPool, FileChannel, ReadOutcome};
//!
//! let mut pool = BufferPool::builder().slots(2).slot_capacity(32).build()?;
//!
//! let file = FileChannel::reader(Cursor::new(b"HELLO".to_vec()))?;
//! let id = pool.allocate(2, file.into())?;
//!
//! let mut data = Vec::new();
//! while let ReadOutcome::Byte { value, .. } = pool.read_byte(id)? {
//!     data.push(value);
//! }
//! assert_eq!(data, b"HELLO");
//!
//! pool.close(id)?;
//! assert_eq!(pool.active_count(), 0);
//! # Ok::<_, iec_rs::PoolError>(())
//! ```

use tracing::{debug, info, trace, warn};

use crate::channel::{
    Backing, ChannelKind, ChannelState, CleanupStage, Refill, StatusChannel, StatusCode,
};
use crate::config::{PoolBuilder, PoolConfig, MAX_CHANNEL};
use crate::error::{PoolError, Result};
use crate::internal::Arena;
use crate::shared::SharedState;
use crate::slot::{BufferSlot, SlotBuf, SlotFlags};

/// Handle to an allocated slot.
///
/// Only valid until the slot is released; afterwards every operation taking
/// it fails with [`PoolError::StaleSlot`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SlotId {
    index: usize,
    generation: u32,
}

impl SlotId {
    /// Position of the slot in the pool.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Result of reading one byte from a channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadOutcome {
    /// A byte of channel data.
    Byte {
        /// The byte.
        value: u8,
        /// Must be sent with the end-of-data indication.
        last: bool,
    },
    /// The channel has no more data.
    EndOfData,
}

/// Pool counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolStats {
    /// Allocatable slots.
    pub slots: usize,
    /// Slots currently in use.
    pub active: usize,
    /// Successful allocations.
    pub allocations: u64,
    /// Releases, hard or soft.
    pub releases: u64,
    /// Refill invocations.
    pub refills: u64,
    /// Cleanup invocations.
    pub cleanups: u64,
    /// Cleanup invocations that failed.
    pub cleanup_failures: u64,
}

/// Fixed set of buffer slots shared by all channels.
///
/// Besides the allocatable slots the pool owns one permanent status slot. It
/// is found by [`find`](Self::find) like any other slot but is never handed
/// out by [`allocate`](Self::allocate) and not counted as active.
///
/// # Thread Safety
///
/// The pool is `!Send`: channel state may hold shared pattern storage and
/// handles of a single-threaded filesystem driver.
#[derive(Debug)]
pub struct BufferPool {
    config: PoolConfig,
    arena: Arena,
    slots: Vec<BufferSlot>,
    active: usize,
    shared: SharedState,
    stats: PoolStats,
}

impl BufferPool {
    /// Create a pool from a configuration.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let mut sizes = vec![config.slot_capacity; config.slots];
        sizes.push(config.status_capacity);
        let (arena, regions) = Arena::with_regions(&sizes);
        let slots = regions.into_iter().map(BufferSlot::new).collect();

        let mut pool = Self {
            config,
            arena,
            slots,
            active: 0,
            shared: SharedState::new(),
            stats: PoolStats::default(),
        };
        pool.init();
        Ok(pool)
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Reset the pool to its power-on state.
    ///
    /// Every slot is freed without cleanup, storage is zeroed, shared state
    /// (match traversal, mounted image) is dropped and the status channel
    /// shows the version message.
    pub fn init(&mut self) {
        for slot in &mut self.slots {
            slot.vacate();
        }
        self.arena.reset();
        self.shared.reset();
        self.active = 0;
        self.stats = PoolStats {
            slots: self.config.slots,
            ..PoolStats::default()
        };

        let status = StatusChannel::new(self.config.version_message.as_str());
        self.slots[self.config.slots].occupy(self.config.status_channel, status.into());
        self.set_status(StatusCode::DosVersion, 0, 0);

        info!(
            slots = self.config.slots,
            capacity = self.config.slot_capacity,
            arena = self.arena.capacity(),
            "buffer pool initialized"
        );
    }

    /// Configuration of this pool.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of allocatable slots.
    pub fn slot_count(&self) -> usize {
        self.config.slots
    }

    /// Number of allocatable slots currently in use.
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.active,
            ..self.stats
        }
    }

    /// The allocatable slots, in pool order.
    pub fn slots(&self) -> impl Iterator<Item = &BufferSlot> {
        self.slots[..self.config.slots].iter()
    }

    /// Shared state lent to the adapters.
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Mutable shared state.
    pub fn shared_mut(&mut self) -> &mut SharedState {
        &mut self.shared
    }

    /// Claim the first free slot for `channel`.
    ///
    /// The slot starts empty; the first read triggers a refill. If no slot is
    /// free the request fails with [`PoolError::NotAvailable`] and `state` is
    /// dropped.
    pub fn allocate(&mut self, channel: u8, state: ChannelState) -> Result<SlotId> {
        if channel > MAX_CHANNEL {
            return Err(PoolError::InvalidChannel(channel));
        }
        if self.find(channel).is_ok() {
            return Err(PoolError::ChannelInUse(channel));
        }

        let index = self
            .slots()
            .position(|s| !s.is_in_use())
            .ok_or(PoolError::NotAvailable)?;

        let kind = state.kind();
        let slot = &mut self.slots[index];
        slot.occupy(channel, state);
        self.arena.clear(slot.region);
        let id = SlotId {
            index,
            generation: slot.generation,
        };

        self.active += 1;
        self.stats.allocations += 1;
        debug!(channel, slot = index, %kind, active = self.active, "allocated buffer");

        Ok(id)
    }

    /// Free a slot without cleanup.
    ///
    /// Unflushed data is lost. The channel state is dropped, which closes any
    /// handle it owned.
    pub fn release(&mut self, id: SlotId) -> Result<()> {
        let index = self.resolve(id)?;
        self.check_releasable(index)?;
        self.teardown(index);
        Ok(())
    }

    /// Run the final cleanup on a slot, then free it.
    ///
    /// The slot is freed even if cleanup fails; the cleanup error is returned.
    pub fn close(&mut self, id: SlotId) -> Result<()> {
        let index = self.resolve(id)?;
        self.check_releasable(index)?;
        let result = self.cleanup(index, CleanupStage::Final);
        self.teardown(index);
        result
    }

    /// Free every allocatable slot, optionally running cleanup first.
    ///
    /// Cleanup failures do not stop the teardown: the pool is empty
    /// afterwards in every case. Failures are reported together as
    /// [`PoolError::CleanupFailed`].
    pub fn release_all(&mut self, with_cleanup: bool) -> Result<()> {
        let mut failed = Vec::new();
        let mut first = None;

        for index in 0..self.config.slots {
            if !self.slots[index].is_in_use() {
                continue;
            }

            if with_cleanup {
                if let Err(err) = self.cleanup(index, CleanupStage::Final) {
                    let channel = self.slots[index].channel;
                    warn!(channel, error = %err, "cleanup failed during teardown");
                    failed.push(channel);
                    first.get_or_insert(err);
                }
            }
            self.teardown(index);
        }

        debug_assert_eq!(self.active, 0);
        match first {
            None => Ok(()),
            Some(source) => Err(PoolError::CleanupFailed {
                channels: failed,
                source: Box::new(source),
            }),
        }
    }

    /// Find the slot serving `channel`, including the status slot.
    pub fn find(&self, channel: u8) -> Result<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_in_use() && s.channel == channel)
            .map(|(index, s)| SlotId {
                index,
                generation: s.generation,
            })
            .ok_or(PoolError::NotFound(channel))
    }

    /// Handle of the status slot.
    pub fn status_id(&self) -> SlotId {
        let index = self.config.slots;
        SlotId {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Look at a slot.
    pub fn slot(&self, id: SlotId) -> Result<&BufferSlot> {
        let index = self.resolve(id)?;
        Ok(&self.slots[index])
    }

    /// Channel state of a slot, for kind-specific operations.
    pub fn channel_mut(&mut self, id: SlotId) -> Result<&mut ChannelState> {
        let index = self.resolve(id)?;
        self.slots[index].state.as_mut().ok_or(PoolError::StaleSlot)
    }

    /// Read the next byte of a channel, refilling the slot when it runs dry.
    pub fn read_byte(&mut self, id: SlotId) -> Result<ReadOutcome> {
        let index = self.resolve(id)?;
        let slot = &self.slots[index];
        if !slot.flags.contains(SlotFlags::READ) {
            return Err(PoolError::NotReadable(slot.channel));
        }

        if slot.cursor >= slot.filled && self.refill(index)? == Refill::EndOfData {
            return Ok(ReadOutcome::EndOfData);
        }

        let slot = &mut self.slots[index];
        let value = self.arena.get(slot.region)[slot.cursor];
        slot.cursor += 1;
        Ok(ReadOutcome::Byte {
            value,
            last: slot.send_end_marker() && slot.cursor == slot.filled,
        })
    }

    /// Read up to `out.len()` bytes. Returns the count read, 0 at end of data.
    ///
    /// Stops after a byte flagged `last`.
    pub fn read(&mut self, id: SlotId, out: &mut [u8]) -> Result<usize> {
        let mut len = 0;
        while len < out.len() {
            match self.read_byte(id)? {
                ReadOutcome::Byte { value, last } => {
                    out[len] = value;
                    len += 1;
                    if last {
                        break;
                    }
                }
                ReadOutcome::EndOfData => break,
            }
        }
        Ok(len)
    }

    /// Append a byte to a channel, flushing the slot once it is full.
    ///
    /// `Ok` means the byte is held by the slot. A failed flush after storing
    /// the byte is logged and retried by the next write, which then fails
    /// without accepting its byte. An `Err` never leaves the byte in the slot.
    pub fn write_byte(&mut self, id: SlotId, value: u8) -> Result<()> {
        let index = self.resolve(id)?;
        let slot = &self.slots[index];
        if !slot.flags.contains(SlotFlags::WRITE) {
            return Err(PoolError::NotWritable(slot.channel));
        }

        // A previous flush failed and left the slot full.
        if slot.cursor == slot.capacity() {
            self.cleanup(index, CleanupStage::Continue)?;
        }

        let slot = &mut self.slots[index];
        self.arena.get_mut(slot.region)[slot.cursor] = value;
        slot.cursor += 1;
        slot.filled = slot.cursor;
        slot.flags.insert(SlotFlags::DIRTY);

        if slot.cursor == slot.capacity() {
            let channel = slot.channel;
            if let Err(err) = self.cleanup(index, CleanupStage::Continue) {
                warn!(channel, error = %err, "flush failed, retrying on next write");
            }
        }
        Ok(())
    }

    /// Append all of `data` to a channel.
    pub fn write_all(&mut self, id: SlotId, data: &[u8]) -> Result<()> {
        for &b in data {
            self.write_byte(id, b)?;
        }
        Ok(())
    }

    /// Move a file channel to an absolute position.
    ///
    /// Pending writes are flushed first; buffered read data is discarded.
    pub fn seek(&mut self, id: SlotId, position: u64) -> Result<()> {
        let index = self.resolve(id)?;
        let slot = &self.slots[index];
        match slot.kind() {
            Some(ChannelKind::File) => {}
            Some(found) => {
                return Err(PoolError::WrongKind {
                    expected: ChannelKind::File,
                    found,
                })
            }
            None => return Err(PoolError::StaleSlot),
        }

        if slot.is_dirty() {
            self.cleanup(index, CleanupStage::Continue)?;
        }

        let slot = &mut self.slots[index];
        if let Some(file) = slot.state.as_mut().and_then(ChannelState::as_file_mut) {
            file.seek(position)?;
        }
        slot.discard();
        trace!(channel = slot.channel, position, "seek");
        Ok(())
    }

    /// Replace the message on the status channel.
    ///
    /// The message is rendered into the status slot right away, replacing
    /// whatever was left unread.
    pub fn set_status(&mut self, code: StatusCode, track: u8, sector: u8) {
        let slot = &mut self.slots[self.config.slots];
        if let Some(ChannelState::Status(status)) = slot.state.as_mut() {
            status.set(code, track, sector);
            let len = status.render(self.arena.get_mut(slot.region));
            slot.filled = len;
            slot.cursor = 0;
            slot.flags.insert(SlotFlags::SEND_EOI);
            debug!(%code, track, sector, "status changed");
        }
    }

    /// Report an error on the status channel.
    pub fn report(&mut self, err: &PoolError) {
        self.set_status(err.status_code(), 0, 0);
    }

    /// Code currently shown on the status channel.
    pub fn status(&self) -> StatusCode {
        self.slots[self.config.slots]
            .state
            .as_ref()
            .and_then(ChannelState::as_status)
            .map_or(StatusCode::Ok, StatusChannel::code)
    }

    fn resolve(&self, id: SlotId) -> Result<usize> {
        match self.slots.get(id.index) {
            Some(slot) if slot.is_in_use() && slot.generation == id.generation => Ok(id.index),
            _ => Err(PoolError::StaleSlot),
        }
    }

    fn check_releasable(&self, index: usize) -> Result<()> {
        if index == self.config.slots {
            return Err(PoolError::Permanent(self.slots[index].channel));
        }
        Ok(())
    }

    fn teardown(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        let channel = slot.channel;
        if slot.is_dirty() {
            debug!(channel, bytes = slot.filled, "discarding unflushed data");
        }
        slot.vacate();

        self.active -= 1;
        self.stats.releases += 1;
        debug!(channel, slot = index, active = self.active, "released buffer");
    }

    fn refill(&mut self, index: usize) -> Result<Refill> {
        let slot = &mut self.slots[index];
        slot.discard();
        let capacity = slot.capacity();
        let Some(state) = slot.state.as_mut() else {
            return Ok(Refill::EndOfData);
        };

        let mut buf = SlotBuf::new(self.arena.get_mut(slot.region), 0);
        self.stats.refills += 1;
        let outcome = state.refill(&mut buf, &mut self.shared)?;
        let last = buf.end_marker();

        match outcome {
            Refill::Ready(len) if len > capacity => Err(PoolError::BadRefill { len, capacity }),
            Refill::Ready(0) | Refill::EndOfData => {
                trace!(channel = slot.channel, "end of data");
                Ok(Refill::EndOfData)
            }
            Refill::Ready(len) => {
                slot.filled = len;
                slot.cursor = 0;
                slot.flags.set(SlotFlags::SEND_EOI, last);
                trace!(channel = slot.channel, len, last, "refilled buffer");
                Ok(Refill::Ready(len))
            }
        }
    }

    fn cleanup(&mut self, index: usize, stage: CleanupStage) -> Result<()> {
        let slot = &mut self.slots[index];
        let Some(state) = slot.state.as_mut() else {
            return Ok(());
        };

        let pending = if slot.flags.contains(SlotFlags::WRITE) {
            slot.filled
        } else {
            0
        };
        let mut buf = SlotBuf::new(self.arena.get_mut(slot.region), pending);
        self.stats.cleanups += 1;
        trace!(channel = slot.channel, pending, ?stage, "cleanup");

        match state.cleanup(&mut buf, &mut self.shared, stage) {
            Ok(()) => {
                slot.discard();
                Ok(())
            }
            Err(err) => {
                self.stats.cleanup_failures += 1;
                Err(err)
            }
        }
    }
}
