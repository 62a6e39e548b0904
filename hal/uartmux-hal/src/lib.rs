//! uartmux Hardware Abstraction Layer
//!
//! This crate defines the per-port primitives that a chip-specific HAL
//! implements for every physical UART. The multiplexing core only ever talks
//! to hardware through these traits, so the same buffering and framing code
//! runs on any chip (or on the host, see `uartmux-hal-host`).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Binding layer (scripting runtime, app) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  uartmux-core (registry, devices)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  uartmux-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  chip HAL     │       │ uartmux-hal-  │
//! │  (registers)  │       │     host      │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`uart::SerialPort`] - One physical UART peripheral

#![no_std]
#![deny(unsafe_code)]

pub mod uart;

// Re-export key items at crate root for convenience
pub use uart::{DataBits, FlowControl, LineFormat, Parity, SerialPort, StopBits, Word};
