//! Receive-side message framing
//!
//! Recognises message boundaries inside a raw UART byte stream so callers
//! never parse framing by hand. The convention is configured per port:
//!
//! ```text
//! ┌──────────┬────────┬──────────────────────────┬────────────┐
//! │ SYNC     │ HEADER │ BODY (ESC escapes 1 byte) │ TERMINATOR │
//! │ 0-4 B    │ 1B     │ 0..capacity B             │ 1B or none │
//! └──────────┴────────┴──────────────────────────┴────────────┘
//! ```
//!
//! A body ends at the terminator byte or once it reaches the trigger
//! level, whichever is configured (or first). After a message the receiver
//! looks for the next header; the sync pattern is only needed once after
//! the baud rate has been established.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod framing;

pub use config::{FrameConfig, MAX_MESSAGE_LEN, MAX_SYNC_LEN};
pub use framing::{BufferState, FrameError, FramingStateMachine, Message, RxState};
