//! Board-agnostic UART multiplexing
//!
//! This crate contains everything between the per-port hardware primitives
//! (`uartmux-hal`) and the runtime binding layer that hands UART objects to
//! application code:
//!
//! - Interrupt-safe single-producer/single-consumer ring buffers
//! - Baud divisor calculation from table-driven clock domains
//! - Per-port devices with TX/RX buffering and software flow control
//! - Optional receive framing (`uartmux-protocol`)
//! - A fixed device registry handing out generation-checked handles
//!
//! # Contexts
//!
//! Each port has one interrupt context (calling
//! [`UartDevice::on_interrupt`]) and one foreground context (the binding
//! layer, calling the async `read`/`write` operations). RX words flow
//! ISR -> ring -> task; TX words flow task -> ring -> ISR.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod baud;
pub mod board;
pub mod config;
pub mod device;
pub mod error;
pub mod registry;
pub mod ring;

#[cfg(not(feature = "nine-bit"))]
pub mod port;

pub use board::{ClockSource, ClockTree, PortDescriptor};
pub use config::UartConfig;
pub use device::{DeviceInfo, DeviceStats, Handle, UartDevice, RX_BUFFER_SIZE, TX_BUFFER_SIZE};
pub use error::{ConfigError, ErrorKind, IoError};
pub use registry::{DeviceId, DeviceRegistry};
pub use ring::RingBuffer;

#[cfg(not(feature = "nine-bit"))]
pub use port::Port;

pub use uartmux_hal::{DataBits, FlowControl, LineFormat, Parity, SerialPort, StopBits, Word};
pub use uartmux_protocol::{FrameConfig, Message};
