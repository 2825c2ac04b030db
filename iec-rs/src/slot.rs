//! Buffer slots.
//!
//! A slot is one physical buffer of the pool, assigned to at most one
//! channel at a time. Its storage lives in the pool arena; the slot keeps the
//! cursor bookkeeping and the channel-kind state.

use bitflags::bitflags;

use crate::channel::{ChannelKind, ChannelState};
use crate::internal::Region;

bitflags! {
    /// State flags of a slot.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct SlotFlags: u8 {
        /// Slot is assigned to a channel.
        const IN_USE = 1 << 0;
        /// Written bytes have not been flushed yet.
        const DIRTY = 1 << 1;
        /// Channel was opened for reading.
        const READ = 1 << 2;
        /// Channel was opened for writing.
        const WRITE = 1 << 3;
        /// Last byte of the buffered region ends the channel's data.
        const SEND_EOI = 1 << 4;
    }
}

/// One multiplexable buffer of the pool.
#[derive(Debug)]
pub struct BufferSlot {
    pub(crate) region: Region,
    pub(crate) filled: usize,
    pub(crate) cursor: usize,
    pub(crate) channel: u8,
    pub(crate) flags: SlotFlags,
    pub(crate) generation: u32,
    pub(crate) state: Option<ChannelState>,
}

impl BufferSlot {
    pub(crate) fn new(region: Region) -> Self {
        Self {
            region,
            filled: 0,
            cursor: 0,
            channel: 0,
            flags: SlotFlags::empty(),
            generation: 0,
            state: None,
        }
    }

    /// Capacity of the slot's storage.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Number of valid bytes in storage.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Index of the next byte to be read or written.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes left before the next refill.
    pub fn remaining(&self) -> usize {
        self.filled - self.cursor
    }

    /// Channel served by this slot. Only meaningful while in use.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Current flags.
    pub fn flags(&self) -> SlotFlags {
        self.flags
    }

    /// Check if the slot is assigned to a channel.
    pub fn is_in_use(&self) -> bool {
        self.flags.contains(SlotFlags::IN_USE)
    }

    /// Check if unflushed writes exist.
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(SlotFlags::DIRTY)
    }

    /// Check if the last buffered byte must be sent with end-of-data.
    pub fn send_end_marker(&self) -> bool {
        self.flags.contains(SlotFlags::SEND_EOI)
    }

    /// Kind of channel state held, if in use.
    pub fn kind(&self) -> Option<ChannelKind> {
        self.state.as_ref().map(ChannelState::kind)
    }

    /// Channel-kind state, if in use.
    pub fn state(&self) -> Option<&ChannelState> {
        self.state.as_ref()
    }

    /// Assign the slot to a channel. Flags and counters start from zero.
    pub(crate) fn occupy(&mut self, channel: u8, state: ChannelState) {
        let mut flags = SlotFlags::IN_USE;
        if state.readable() {
            flags |= SlotFlags::READ;
        }
        if state.writable() {
            flags |= SlotFlags::WRITE;
        }

        self.filled = 0;
        self.cursor = 0;
        self.channel = channel;
        self.flags = flags;
        self.state = Some(state);
    }

    /// Return the slot to the free state, dropping the channel state.
    ///
    /// Dropping the state closes whatever handle it owned.
    pub(crate) fn vacate(&mut self) -> Option<ChannelState> {
        self.filled = 0;
        self.cursor = 0;
        self.channel = 0;
        self.flags = SlotFlags::empty();
        self.generation = self.generation.wrapping_add(1);
        self.state.take()
    }

    /// Drop buffered data without touching the channel state.
    pub(crate) fn discard(&mut self) {
        self.filled = 0;
        self.cursor = 0;
        self.flags.remove(SlotFlags::DIRTY | SlotFlags::SEND_EOI);
    }
}

/// View of a slot's storage handed to channel adapters.
///
/// On refill, adapters write into [`space_mut`](Self::space_mut) from index 0
/// and report how many bytes they produced. On cleanup, [`pending`](Self::pending)
/// holds the bytes waiting to be persisted.
#[derive(Debug)]
pub struct SlotBuf<'a> {
    data: &'a mut [u8],
    len: usize,
    end_marker: bool,
}

impl<'a> SlotBuf<'a> {
    pub(crate) fn new(data: &'a mut [u8], len: usize) -> Self {
        Self {
            data,
            len,
            end_marker: false,
        }
    }

    /// Capacity of the underlying storage.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The full storage, for adapters filling it.
    pub fn space_mut(&mut self) -> &mut [u8] {
        self.data
    }

    /// Bytes waiting to be flushed.
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Mark the region being produced as the channel's final chunk.
    pub fn set_end_marker(&mut self, last: bool) {
        self.end_marker = last;
    }

    /// Whether the adapter marked this region as the final chunk.
    pub fn end_marker(&self) -> bool {
        self.end_marker
    }
}
