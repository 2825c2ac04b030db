//! Pool configuration.
//!
//! Slot count and capacity are memory budget decisions of the target, so
//! they are configured per pool rather than fixed at compile time.
//!
//! ```
//! use iec_rs::BufferPool;
//!
//! let pool = BufferPool::builder()
//!     .slots(2)
//!     .slot_capacity(64)
//!     .status_channel(15)
//!     .build()
//!     .unwrap();
//! assert_eq!(pool.slot_count(), 2);
//! ```

use crate::dirent::LINE_SIZE;
use crate::error::{PoolError, Result};
use crate::pool::BufferPool;

/// Highest channel number.
pub const MAX_CHANNEL: u8 = 15;

/// Smallest status slot that holds every message.
pub const MIN_STATUS_CAPACITY: usize = 32;

/// Longest accepted version message.
pub const MAX_VERSION_LENGTH: usize = 20;

/// Pool configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolConfig {
    /// Number of allocatable slots.
    pub slots: usize,
    /// Storage capacity of each allocatable slot.
    pub slot_capacity: usize,
    /// Channel reserved for the status slot.
    pub status_channel: u8,
    /// Storage capacity of the status slot.
    pub status_capacity: usize,
    /// Text of the power-on status message.
    pub version_message: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            slots: 4,
            slot_capacity: 256,
            status_channel: MAX_CHANNEL,
            status_capacity: 36,
            version_message: concat!("IEC-RS V", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl PoolConfig {
    /// Check the configuration for values the pool cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            return Err(PoolError::InvalidConfig("at least one slot is required".into()));
        }
        if self.slot_capacity < LINE_SIZE {
            return Err(PoolError::InvalidConfig(format!(
                "slot capacity {} is below the minimum of {} bytes",
                self.slot_capacity, LINE_SIZE
            )));
        }
        if self.status_channel > MAX_CHANNEL {
            return Err(PoolError::InvalidConfig(format!(
                "status channel {} is out of range",
                self.status_channel
            )));
        }
        if self.status_capacity < MIN_STATUS_CAPACITY {
            return Err(PoolError::InvalidConfig(format!(
                "status capacity {} is below the minimum of {} bytes",
                self.status_capacity, MIN_STATUS_CAPACITY
            )));
        }
        if self.version_message.len() > MAX_VERSION_LENGTH {
            return Err(PoolError::InvalidConfig(format!(
                "version message exceeds {} bytes",
                MAX_VERSION_LENGTH
            )));
        }
        Ok(())
    }
}

/// Builder for [`BufferPool`].
#[derive(Clone, Debug, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of allocatable slots.
    pub fn slots(mut self, slots: usize) -> Self {
        self.config.slots = slots;
        self
    }

    /// Set the storage capacity of each slot.
    pub fn slot_capacity(mut self, capacity: usize) -> Self {
        self.config.slot_capacity = capacity;
        self
    }

    /// Set the channel reserved for status messages.
    pub fn status_channel(mut self, channel: u8) -> Self {
        self.config.status_channel = channel;
        self
    }

    /// Set the storage capacity of the status slot.
    pub fn status_capacity(mut self, capacity: usize) -> Self {
        self.config.status_capacity = capacity;
        self
    }

    /// Set the power-on version message.
    pub fn version_message(mut self, message: impl Into<String>) -> Self {
        self.config.version_message = message.into();
        self
    }

    /// Get the configuration built so far.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Validate the configuration and create the pool.
    pub fn build(self) -> Result<BufferPool> {
        BufferPool::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.status_channel, 15);
        assert!(config.version_message.starts_with("IEC-RS V"));
    }

    #[test]
    fn test_builder() {
        let builder = PoolBuilder::new()
            .slots(8)
            .slot_capacity(128)
            .status_channel(14)
            .status_capacity(40)
            .version_message("TEST V1");

        let config = builder.config();
        assert_eq!(config.slots, 8);
        assert_eq!(config.slot_capacity, 128);
        assert_eq!(config.status_channel, 14);
        assert_eq!(config.status_capacity, 40);
        assert_eq!(config.version_message, "TEST V1");
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            PoolBuilder::new().slots(0),
            PoolBuilder::new().slot_capacity(16),
            PoolBuilder::new().status_channel(16),
            PoolBuilder::new().status_capacity(8),
            PoolBuilder::new().version_message("THIS VERSION TEXT IS FAR TOO LONG"),
        ];

        for builder in cases {
            assert!(matches!(builder.build(), Err(PoolError::InvalidConfig(_))));
        }
    }
}
