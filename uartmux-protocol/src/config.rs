//! Framing configuration supplied when a port is opened.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::framing::FrameError;

/// Longest supported synchronization pattern
pub const MAX_SYNC_LEN: usize = 4;

/// Largest message body the receiver can hold
pub const MAX_MESSAGE_LEN: usize = 256;

/// Byte-stream convention recognised on the receive path
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameConfig {
    /// Pattern that must be seen once before the first header (may be empty)
    pub sync: Vec<u8, MAX_SYNC_LEN>,
    /// Byte that opens a message body
    pub header: u8,
    /// Byte that strips protocol meaning from the byte after it
    pub escape: u8,
    /// Byte that closes a message body
    pub terminator: Option<u8>,
    /// Body length at which a message is complete
    pub trigger_level: Option<u16>,
    /// Body capacity; longer bodies overflow
    pub capacity: u16,
}

impl FrameConfig {
    /// Create a config with no sync pattern, no terminator and full capacity
    ///
    /// At least one of [`with_terminator`](Self::with_terminator) or
    /// [`with_trigger_level`](Self::with_trigger_level) is required before
    /// the config validates.
    pub fn new(header: u8, escape: u8) -> Self {
        Self {
            sync: Vec::new(),
            header,
            escape,
            terminator: None,
            trigger_level: None,
            capacity: MAX_MESSAGE_LEN as u16,
        }
    }

    /// Set the synchronization pattern
    pub fn with_sync(mut self, pattern: &[u8]) -> Result<Self, FrameError> {
        self.sync.clear();
        self.sync
            .extend_from_slice(pattern)
            .map_err(|_| FrameError::InvalidConfig)?;
        Ok(self)
    }

    /// End messages on `terminator`
    pub fn with_terminator(mut self, terminator: u8) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// End messages once the body holds `level` bytes
    pub fn with_trigger_level(mut self, level: u16) -> Self {
        self.trigger_level = Some(level);
        self
    }

    /// Limit the body size
    pub fn with_capacity(mut self, capacity: u16) -> Self {
        self.capacity = capacity;
        self
    }

    /// Check that the convention is usable
    pub fn validate(&self) -> Result<(), FrameError> {
        let capacity = self.capacity as usize;
        if capacity == 0 || capacity > MAX_MESSAGE_LEN {
            return Err(FrameError::InvalidConfig);
        }

        // Without either end condition every body would overflow
        if self.terminator.is_none() && self.trigger_level.is_none() {
            return Err(FrameError::InvalidConfig);
        }

        if let Some(level) = self.trigger_level {
            if level == 0 || level > self.capacity {
                return Err(FrameError::InvalidConfig);
            }
        }

        if self.terminator == Some(self.escape) {
            return Err(FrameError::InvalidConfig);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_config_is_valid() {
        let config = FrameConfig::new(0x02, 0x1B).with_terminator(0x03);
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.capacity as usize, MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_needs_an_end_condition() {
        let config = FrameConfig::new(0x02, 0x1B);
        assert_eq!(config.validate(), Err(FrameError::InvalidConfig));
    }

    #[test]
    fn test_trigger_level_bounds() {
        let base = FrameConfig::new(0x02, 0x1B).with_capacity(16);
        assert!(base.clone().with_trigger_level(16).validate().is_ok());
        assert_eq!(
            base.clone().with_trigger_level(17).validate(),
            Err(FrameError::InvalidConfig)
        );
        assert_eq!(
            base.with_trigger_level(0).validate(),
            Err(FrameError::InvalidConfig)
        );
    }

    #[test]
    fn test_capacity_bounds() {
        let config = FrameConfig::new(0x02, 0x1B).with_terminator(0x03);
        assert!(config.clone().with_capacity(0).validate().is_err());
        assert!(config
            .with_capacity(MAX_MESSAGE_LEN as u16 + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_terminator_must_differ_from_escape() {
        let config = FrameConfig::new(0x02, 0x1B).with_terminator(0x1B);
        assert_eq!(config.validate(), Err(FrameError::InvalidConfig));
    }

    #[test]
    fn test_sync_pattern_length() {
        let config = FrameConfig::new(0x02, 0x1B);
        assert!(config.clone().with_sync(&[0xAA, 0x55]).is_ok());
        assert_eq!(
            config.with_sync(&[0; MAX_SYNC_LEN + 1]).err(),
            Some(FrameError::InvalidConfig)
        );
    }
}
