//! Host-side serial ports for uartmux
//!
//! [`HostPort`] implements [`SerialPort`] over in-memory queues so the
//! multiplexing core can be exercised without hardware. Test code plays the
//! role of the wire: it injects received words, inspects what was
//! transmitted and can stall the transmitter to model a blocked line.
//!
//! # Example
//!
//! ```
//! use uartmux_hal::{LineFormat, SerialPort};
//! use uartmux_hal_host::HostPort;
//!
//! static PORT: HostPort = HostPort::new();
//!
//! PORT.begin(20_000, LineFormat::SERIAL_8N1);
//! PORT.inject_rx(&[0x68, 0x69]);
//! assert_eq!(PORT.getchar(), Some(0x68));
//!
//! PORT.putchar(0x21);
//! assert_eq!(PORT.take_tx(), [0x21]);
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::vec::Vec;

use uartmux_hal::{LineFormat, SerialPort, Word};

/// Default number of free transmit FIFO slots reported while the line runs
pub const DEFAULT_TX_FIFO_DEPTH: usize = 8;

#[derive(Debug)]
struct Inner {
    setup: Option<(u32, LineFormat)>,
    interrupts: bool,
    rx: VecDeque<Word>,
    tx: Vec<Word>,
    tx_fifo_depth: usize,
    stalled: bool,
    begin_count: u32,
}

/// In-memory UART
///
/// Transmitted words are appended to a log as soon as they are written;
/// while the line is stalled the port reports a full transmit FIFO.
#[derive(Debug)]
pub struct HostPort {
    inner: Mutex<Inner>,
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPort {
    /// Create an idle port
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                setup: None,
                interrupts: false,
                rx: VecDeque::new(),
                tx: Vec::new(),
                tx_fifo_depth: DEFAULT_TX_FIFO_DEPTH,
                stalled: false,
                begin_count: 0,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // A panicking test must not take every other test's port down with it
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue words as if they had arrived on the RX line
    pub fn inject_rx(&self, words: &[Word]) {
        self.inner().rx.extend(words.iter().copied());
    }

    /// Take everything transmitted so far
    pub fn take_tx(&self) -> Vec<Word> {
        core::mem::take(&mut self.inner().tx)
    }

    /// Block or release the transmitter
    pub fn set_stalled(&self, stalled: bool) {
        self.inner().stalled = stalled;
    }

    /// Change the number of free transmit FIFO slots
    pub fn set_tx_fifo_depth(&self, depth: usize) {
        self.inner().tx_fifo_depth = depth;
    }

    /// Divisor from the last `begin`, if the port is running
    pub fn divisor(&self) -> Option<u32> {
        self.inner().setup.map(|(divisor, _)| divisor)
    }

    /// Line format from the last `begin`, if the port is running
    pub fn format(&self) -> Option<LineFormat> {
        self.inner().setup.map(|(_, format)| format)
    }

    /// Check if the port has been started and not ended
    pub fn is_running(&self) -> bool {
        self.inner().setup.is_some()
    }

    /// Check if interrupts are armed
    pub fn interrupts_enabled(&self) -> bool {
        self.inner().interrupts
    }

    /// Number of times `begin` was called
    pub fn begin_count(&self) -> u32 {
        self.inner().begin_count
    }

    /// Return the port to its power-on state
    pub fn reset(&self) {
        let mut inner = self.inner();
        inner.setup = None;
        inner.interrupts = false;
        inner.rx.clear();
        inner.tx.clear();
        inner.tx_fifo_depth = DEFAULT_TX_FIFO_DEPTH;
        inner.stalled = false;
        inner.begin_count = 0;
    }
}

impl SerialPort for HostPort {
    fn begin(&self, divisor: u32, format: LineFormat) {
        let mut inner = self.inner();
        inner.setup = Some((divisor, format));
        inner.begin_count += 1;
    }

    fn end(&self) {
        let mut inner = self.inner();
        inner.setup = None;
        inner.interrupts = false;
    }

    fn enable_interrupts(&self) {
        self.inner().interrupts = true;
    }

    fn disable_interrupts(&self) {
        self.inner().interrupts = false;
    }

    fn putchar(&self, word: Word) {
        self.inner().tx.push(word);
    }

    fn available(&self) -> usize {
        self.inner().rx.len()
    }

    fn getchar(&self) -> Option<Word> {
        self.inner().rx.pop_front()
    }

    fn write_buffer_free(&self) -> usize {
        let inner = self.inner();
        if inner.stalled || inner.setup.is_none() {
            0
        } else {
            inner.tx_fifo_depth
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rx_injection_is_fifo() {
        let port = HostPort::new();
        port.inject_rx(&[1, 2, 3]);
        assert_eq!(port.available(), 3);
        assert_eq!(port.getchar(), Some(1));
        assert_eq!(port.getchar(), Some(2));
        assert_eq!(port.getchar(), Some(3));
        assert_eq!(port.getchar(), None);
    }

    #[test]
    fn test_write_respects_fifo_space() {
        let port = HostPort::new();
        assert_eq!(port.write(&[1, 2]), 0, "not started yet");

        port.begin(100, LineFormat::SERIAL_8N1);
        port.set_tx_fifo_depth(4);
        assert_eq!(port.write(&[1, 2, 3]), 3);
        assert_eq!(port.take_tx(), vec![1, 2, 3]);

        port.set_stalled(true);
        assert_eq!(port.write_buffer_free(), 0);
        assert_eq!(port.write(&[4]), 0);
    }

    #[test]
    fn test_begin_end_tracks_setup() {
        let port = HostPort::new();
        port.begin(2000, LineFormat::from_bits(0x06));
        port.enable_interrupts();
        assert_eq!(port.divisor(), Some(2000));
        assert_eq!(port.format(), Some(LineFormat::from_bits(0x06)));
        assert!(port.interrupts_enabled());

        port.end();
        assert!(!port.is_running());
        assert!(!port.interrupts_enabled());
        assert_eq!(port.begin_count(), 1);
    }

    #[test]
    fn test_reset_restores_power_on_state() {
        let port = HostPort::new();
        port.begin(100, LineFormat::SERIAL_8N1);
        port.enable_interrupts();
        port.set_tx_fifo_depth(1);
        port.putchar(7);
        port.inject_rx(&[1, 2]);
        port.set_stalled(true);

        port.reset();
        assert!(!port.is_running());
        assert!(!port.interrupts_enabled());
        assert_eq!(port.available(), 0);
        assert!(port.take_tx().is_empty());
        assert_eq!(port.begin_count(), 0);

        // Unstalled, with the default FIFO depth
        port.begin(100, LineFormat::SERIAL_8N1);
        assert_eq!(port.write_buffer_free(), DEFAULT_TX_FIFO_DEPTH);
    }
}
