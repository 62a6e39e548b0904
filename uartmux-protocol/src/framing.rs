//! Receive framing state machine.
//!
//! Transitions:
//! - `BaudDetect -> WaitSync` once the port's baud rate is established
//!   (straight to `SeekHeader` when no sync pattern is configured)
//! - `WaitSync -> SeekHeader` on the sync pattern
//! - `SeekHeader -> ReceiveBody` on the header byte
//! - `ReceiveBody -> ReceiveEscaped` on the escape byte
//! - `ReceiveEscaped -> ReceiveBody` after one verbatim byte
//! - `ReceiveBody -> SeekHeader` on the terminator or at the trigger level
//! - any state `-> SeekHeader` with [`BufferState::Overflow`] when the body
//!   outgrows its capacity

use heapless::Vec;

use crate::config::{FrameConfig, MAX_MESSAGE_LEN};

/// A complete message body
pub type Message = Vec<u8, MAX_MESSAGE_LEN>;

/// Errors reported by the framing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// A body outgrew the buffer; cleared only by `clear_overflow`
    Overflow,
    /// The framing configuration is unusable
    InvalidConfig,
}

/// Receiver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Baud rate not yet established; bytes are ignored
    BaudDetect,
    /// Matching the sync pattern
    WaitSync,
    /// Waiting for a header byte
    SeekHeader,
    /// Accumulating a body
    ReceiveBody,
    /// Previous byte was the escape byte
    ReceiveEscaped,
}

/// Message buffer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferState {
    Empty,
    UnderWrite,
    Overflow,
}

/// Framing state machine for one port
#[derive(Debug, Clone)]
pub struct FramingStateMachine {
    config: FrameConfig,
    state: RxState,
    body: Message,
    sync_matched: usize,
    buffer_state: BufferState,
}

impl FramingStateMachine {
    /// Create a receiver waiting for the baud rate to be established
    pub fn new(config: FrameConfig) -> Result<Self, FrameError> {
        config.validate()?;
        Ok(Self {
            config,
            state: RxState::BaudDetect,
            body: Vec::new(),
            sync_matched: 0,
            buffer_state: BufferState::Empty,
        })
    }

    /// Return to `BaudDetect`, dropping any partial body and overflow
    pub fn reset(&mut self) {
        self.state = RxState::BaudDetect;
        self.body.clear();
        self.sync_matched = 0;
        self.buffer_state = BufferState::Empty;
    }

    /// Leave `BaudDetect` once the line runs at a known rate
    pub fn baud_established(&mut self) {
        if self.state == RxState::BaudDetect {
            self.state = if self.config.sync.is_empty() {
                RxState::SeekHeader
            } else {
                RxState::WaitSync
            };
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn buffer_state(&self) -> BufferState {
        self.buffer_state
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Bytes accumulated in the message in progress
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub fn trigger_level(&self) -> Option<u16> {
        self.config.trigger_level
    }

    pub fn is_overflowed(&self) -> bool {
        self.buffer_state == BufferState::Overflow
    }

    /// Acknowledge an overflow so new messages are accepted again
    pub fn clear_overflow(&mut self) {
        if self.buffer_state == BufferState::Overflow {
            self.buffer_state = BufferState::Empty;
        }
    }

    /// Feed one received byte
    ///
    /// Returns `Ok(Some(message))` when the byte completes a message,
    /// `Ok(None)` when more bytes are needed and `Err(Overflow)` when the
    /// body outgrew its buffer or an earlier overflow is still pending.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Message>, FrameError> {
        if self.buffer_state == BufferState::Overflow {
            return Err(FrameError::Overflow);
        }

        match self.state {
            RxState::BaudDetect => Ok(None),
            RxState::WaitSync => {
                self.match_sync(byte);
                Ok(None)
            }
            RxState::SeekHeader => {
                if byte == self.config.header {
                    self.body.clear();
                    self.buffer_state = BufferState::UnderWrite;
                    self.state = RxState::ReceiveBody;
                }
                // Anything else between messages is line noise
                Ok(None)
            }
            RxState::ReceiveBody => {
                if byte == self.config.escape {
                    self.state = RxState::ReceiveEscaped;
                    Ok(None)
                } else if Some(byte) == self.config.terminator {
                    Ok(Some(self.complete()))
                } else {
                    self.append(byte)
                }
            }
            RxState::ReceiveEscaped => {
                self.state = RxState::ReceiveBody;
                self.append(byte)
            }
        }
    }

    fn match_sync(&mut self, byte: u8) {
        let pattern = &self.config.sync;
        let mut matched = self.sync_matched;
        loop {
            if byte == pattern[matched] {
                matched += 1;
                break;
            }
            if matched == 0 {
                break;
            }
            // The last `matched` bytes seen equal `pattern[..matched]`: fall
            // back to the longest prefix that is also a suffix of them
            matched = (1..matched)
                .rev()
                .find(|&k| pattern[matched - k..matched] == pattern[..k])
                .unwrap_or(0);
        }

        if matched == pattern.len() {
            self.sync_matched = 0;
            self.state = RxState::SeekHeader;
        } else {
            self.sync_matched = matched;
        }
    }

    fn append(&mut self, byte: u8) -> Result<Option<Message>, FrameError> {
        if self.body.len() >= self.config.capacity as usize || self.body.push(byte).is_err() {
            self.body.clear();
            self.state = RxState::SeekHeader;
            self.buffer_state = BufferState::Overflow;
            return Err(FrameError::Overflow);
        }

        if self.config.trigger_level == Some(self.body.len() as u16) {
            return Ok(Some(self.complete()));
        }

        Ok(None)
    }

    fn complete(&mut self) -> Message {
        self.state = RxState::SeekHeader;
        self.buffer_state = BufferState::Empty;
        core::mem::take(&mut self.body)
    }
}
