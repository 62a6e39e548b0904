//! Per-port UART device
//!
//! A [`UartDevice`] sits between one physical port ([`SerialPort`]) and the
//! binding layer. It owns the TX and RX rings, the active configuration and
//! the receive framer.
//!
//! # Lifecycle
//!
//! ```text
//! unconfigured --configure--> configured --enable--> enabled
//!      ^                          ^                    |
//!      |                          +------disable-------+
//!      +-------------------deinit----------------------+
//! ```
//!
//! Every successful `configure`, every `disable` of an enabled device and
//! every `deinit` starts a new generation; handles from an earlier
//! generation, or used while the device is not enabled, fail with
//! [`ErrorKind::DeviceNotConfigured`].
//!
//! # Contexts
//!
//! [`on_interrupt`](UartDevice::on_interrupt) runs in the port's interrupt
//! handler: it is the RX producer and the TX consumer. Everything else runs
//! in the foreground. The foreground also drains TX into the hardware FIFO
//! ("kick") but only inside a critical section, so the interrupt handler
//! never observes a second TX consumer.

use core::cell::RefCell;
use core::sync::atomic::Ordering;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_deadline, Duration, Instant};
use portable_atomic::{AtomicBool, AtomicU32};

use uartmux_hal::{FlowControl, SerialPort, Word};
use uartmux_protocol::{FramingStateMachine, Message};

use crate::baud;
use crate::board::{ClockTree, PortDescriptor};
use crate::config::UartConfig;
use crate::error::{ConfigError, ErrorKind, IoError};
use crate::registry::DeviceId;
use crate::ring::RingBuffer;

/// TX ring size in words (usable capacity is one less)
pub const TX_BUFFER_SIZE: usize = 64;

/// RX ring size in words (usable capacity is one less)
pub const RX_BUFFER_SIZE: usize = 64;

const XON: Word = 0x11;
const XOFF: Word = 0x13;
const CR: Word = b'\r' as Word;
const LF: Word = b'\n' as Word;

/// Send XOFF once free RX space drops to this many words
const RX_THROTTLE_FREE: usize = 8;

/// Send XON again once the foreground has freed this many words
const RX_RESUME_FREE: usize = RX_BUFFER_SIZE / 2;

/// Non-owning reference to an open device
///
/// Valid from `open` until the device is disabled, closed or reconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handle {
    id: DeviceId,
    generation: u32,
}

impl Handle {
    pub fn id(&self) -> DeviceId {
        self.id
    }
}

/// Counters for conditions that lose or complete data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceStats {
    /// Words received while the RX ring was full
    pub rx_dropped: u32,
    /// Words accepted by `write` but discarded by `deinit` before they were sent
    pub tx_dropped: u32,
    /// Complete framed messages delivered
    pub messages_received: u32,
    /// Framed messages lost to overflow
    pub overflows: u32,
}

/// Snapshot of an open device
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub config: UartConfig,
    /// Divisor programmed into the baud generator
    pub divisor: u32,
    /// Baud rate the divisor actually produces
    pub actual_baud: u32,
}

struct Active {
    config: UartConfig,
    divisor: u32,
    actual_baud: u32,
}

struct DeviceState {
    active: Option<Active>,
    framer: Option<FramingStateMachine>,
}

/// One multiplexed UART
pub struct UartDevice {
    id: DeviceId,
    port: &'static dyn SerialPort,
    descriptor: PortDescriptor,

    tx: RingBuffer<TX_BUFFER_SIZE>,
    rx: RingBuffer<RX_BUFFER_SIZE>,

    state: Mutex<CriticalSectionRawMutex, RefCell<DeviceState>>,
    enabled: AtomicBool,
    generation: AtomicU32,

    // Read by the interrupt handler; written only while disabled
    rx_mask: AtomicU32,
    xon_xoff: AtomicBool,

    /// Peer sent XOFF
    tx_paused: AtomicBool,
    /// We sent XOFF
    rx_throttled: AtomicBool,

    rx_ready: Signal<CriticalSectionRawMutex, ()>,
    tx_ready: Signal<CriticalSectionRawMutex, ()>,

    rx_dropped: AtomicU32,
    tx_dropped: AtomicU32,
    messages_received: AtomicU32,
    overflows: AtomicU32,
}

impl UartDevice {
    /// Create an unconfigured device bound to `port`
    pub const fn new(id: DeviceId, port: &'static dyn SerialPort, descriptor: PortDescriptor) -> Self {
        Self {
            id,
            port,
            descriptor,
            tx: RingBuffer::new(),
            rx: RingBuffer::new(),
            state: Mutex::new(RefCell::new(DeviceState {
                active: None,
                framer: None,
            })),
            enabled: AtomicBool::new(false),
            generation: AtomicU32::new(0),
            rx_mask: AtomicU32::new(0xff),
            xon_xoff: AtomicBool::new(false),
            tx_paused: AtomicBool::new(false),
            rx_throttled: AtomicBool::new(false),
            rx_ready: Signal::new(),
            tx_ready: Signal::new(),
            rx_dropped: AtomicU32::new(0),
            tx_dropped: AtomicU32::new(0),
            messages_received: AtomicU32::new(0),
            overflows: AtomicU32::new(0),
        }
    }

    pub const fn id(&self) -> DeviceId {
        self.id
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_configured(&self) -> bool {
        self.state.lock(|state| state.borrow().active.is_some())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Validate `config`, program the port and reset all buffers
    ///
    /// Fails with [`ErrorKind::DeviceBusy`] while the device is enabled.
    /// Leaves the device configured but disabled; handles from earlier
    /// configurations become stale.
    pub fn configure(&self, config: &UartConfig, clocks: &ClockTree) -> Result<(), ConfigError> {
        if self.is_enabled() {
            return Err(ErrorKind::DeviceBusy.into());
        }

        config.validate(&self.descriptor)?;
        let divisor = baud::divisor_for(&self.descriptor, clocks, config.baudrate)?;
        let mut framer = config
            .framing
            .clone()
            .map(FramingStateMachine::new)
            .transpose()?;

        // Interrupts are disarmed, so both ring sides are quiescent
        self.tx.clear();
        self.rx.clear();
        self.rx_mask.store(u32::from(config.word_mask()), Ordering::Relaxed);
        self.xon_xoff
            .store(config.flow_control == FlowControl::XonXoff, Ordering::Relaxed);
        self.tx_paused.store(false, Ordering::Relaxed);
        self.rx_throttled.store(false, Ordering::Relaxed);
        self.reset_stats();
        self.rx_ready.reset();
        self.tx_ready.reset();

        self.port.begin(divisor, config.line_format());
        if let Some(framer) = framer.as_mut() {
            framer.baud_established();
        }

        let actual_baud = baud::actual_baud(clocks.frequency(self.descriptor.clock), divisor);
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.active = Some(Active {
                config: config.clone(),
                divisor,
                actual_baud,
            });
            state.framer = framer;
        });
        self.generation.fetch_add(1, Ordering::AcqRel);

        info!(
            "{}: configured {} baud (divisor {}, actual {})",
            self.id, config.baudrate, divisor, actual_baud
        );
        Ok(())
    }

    /// Arm the interrupt source and return a handle for this generation
    ///
    /// Enabling an enabled device returns the current handle.
    pub fn enable(&self) -> Result<Handle, ErrorKind> {
        if !self.is_configured() {
            return Err(ErrorKind::DeviceNotConfigured);
        }
        if !self.enabled.swap(true, Ordering::AcqRel) {
            self.port.enable_interrupts();
            debug!("{}: enabled", self.id);
        }
        Ok(self.current_handle())
    }

    /// Disarm the interrupt source
    ///
    /// Idempotent. Outstanding handles become stale. Wakes pending reads and
    /// writes, which then fail with [`ErrorKind::DeviceNotConfigured`].
    pub fn disable(&self) {
        self.port.disable_interrupts();
        if self.enabled.swap(false, Ordering::AcqRel) {
            // Handles from before the disable stay stale after re-enabling
            self.generation.fetch_add(1, Ordering::AcqRel);
            debug!("{}: disabled", self.id);
        }
        self.rx_ready.signal(());
        self.tx_ready.signal(());
    }

    /// Disable, stop the port and forget the configuration
    ///
    /// Buffered words are discarded; unsent TX words are counted as dropped.
    pub fn deinit(&self) {
        self.disable();
        self.port.end();

        let unsent = self.tx.available() as u32;
        if unsent > 0 {
            self.tx_dropped.fetch_add(unsent, Ordering::Relaxed);
            warn!("{}: {} unsent words discarded", self.id, unsent);
        }
        self.tx.clear();
        self.rx.clear();

        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.active = None;
            state.framer = None;
        });
        self.generation.fetch_add(1, Ordering::AcqRel);
        info!("{}: deinit", self.id);
    }

    fn current_handle(&self) -> Handle {
        Handle {
            id: self.id,
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// Check that `handle` refers to the current, enabled generation
    pub fn check(&self, handle: Handle) -> Result<(), ErrorKind> {
        if handle.id != self.id
            || handle.generation != self.generation.load(Ordering::Acquire)
            || !self.is_enabled()
        {
            return Err(ErrorKind::DeviceNotConfigured);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Interrupt context
    // ------------------------------------------------------------------------

    /// Service the port: move received words into RX, refill the TX FIFO
    ///
    /// Call from the port's interrupt handler.
    pub fn on_interrupt(&self) {
        if !self.is_enabled() {
            return;
        }
        while let Some(word) = self.port.getchar() {
            self.receive(word);
        }
        self.pump_tx();
    }

    fn receive(&self, word: Word) {
        let word = word & self.rx_mask.load(Ordering::Relaxed) as Word;
        let xon_xoff = self.xon_xoff.load(Ordering::Relaxed);

        if xon_xoff {
            match word {
                XOFF => {
                    self.tx_paused.store(true, Ordering::Release);
                    return;
                }
                XON => {
                    self.tx_paused.store(false, Ordering::Release);
                    return;
                }
                _ => {}
            }
        }

        if !self.rx.push(word) {
            self.rx_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("{}: rx overrun, word dropped", self.id);
        } else if xon_xoff
            && self.rx.free() <= RX_THROTTLE_FREE
            && !self.rx_throttled.load(Ordering::Relaxed)
            && self.port.write_buffer_free() > 0
        {
            self.port.putchar(XOFF);
            self.rx_throttled.store(true, Ordering::Relaxed);
        }

        self.rx_ready.signal(());
    }

    fn pump_tx(&self) {
        // XON is out of band, so it goes ahead of a paused transmitter
        self.send_xon_if_due();
        if self.tx_paused.load(Ordering::Acquire) {
            return;
        }
        let mut moved = false;
        while self.port.write_buffer_free() > 0 {
            match self.tx.pop() {
                Some(word) => {
                    self.port.putchar(word);
                    moved = true;
                }
                None => break,
            }
        }
        if moved {
            self.tx_ready.signal(());
        }
    }

    /// Start transmission from the foreground
    fn kick_tx(&self) {
        critical_section::with(|_| self.pump_tx());
    }

    /// Send XON once the foreground has made room again
    ///
    /// A full hardware FIFO leaves the throttle in place; the next TX pump
    /// retries.
    fn send_xon_if_due(&self) {
        if !self.rx_throttled.load(Ordering::Relaxed) || self.rx.free() < RX_RESUME_FREE {
            return;
        }
        if self.port.write_buffer_free() > 0 {
            self.port.putchar(XON);
            self.rx_throttled.store(false, Ordering::Relaxed);
        }
    }

    fn release_rx(&self) {
        if self.rx_throttled.load(Ordering::Relaxed) {
            critical_section::with(|_| self.send_xon_if_due());
        }
    }

    // ------------------------------------------------------------------------
    // Foreground: transmit
    // ------------------------------------------------------------------------

    fn enqueue(&self, words: &[Word]) -> usize {
        words.iter().take_while(|&&word| self.tx.push(word)).count()
    }

    /// Enqueue as much of `words` as fits before `deadline`
    ///
    /// `None` means no waiting at all. Returns the number of words enqueued.
    async fn write_until(
        &self,
        handle: Handle,
        words: &[Word],
        deadline: Option<Instant>,
    ) -> Result<usize, IoError> {
        let mut written = self.enqueue(words);
        self.kick_tx();

        let Some(deadline) = deadline else {
            return Ok(written);
        };

        while written < words.len() {
            self.tx_ready.reset();
            written += self.enqueue(&words[written..]);
            self.kick_tx();
            if written == words.len() {
                break;
            }
            if with_deadline(deadline, self.tx_ready.wait()).await.is_err() {
                trace!("{}: write timed out after {} words", self.id, written);
                break;
            }
            self.check(handle)?;
        }
        Ok(written)
    }

    /// Queue `words` for transmission
    ///
    /// Waits for TX space until everything is queued or `timeout` elapses.
    /// Returns the number of words queued; [`IoError::Timeout`] if none
    /// could be. Words are never dropped silently.
    pub async fn write(
        &self,
        handle: Handle,
        words: &[Word],
        timeout: Duration,
    ) -> Result<usize, IoError> {
        self.check(handle)?;
        let written = self.write_until(handle, words, deadline(timeout)).await?;
        if written == 0 && !words.is_empty() {
            return Err(IoError::Timeout);
        }
        Ok(written)
    }

    /// Like [`write`](Self::write), translating `\n` into `\r\n`
    ///
    /// Returns the number of input words consumed.
    pub async fn write_cooked(
        &self,
        handle: Handle,
        words: &[Word],
        timeout: Duration,
    ) -> Result<usize, IoError> {
        self.check(handle)?;
        let deadline = deadline(timeout);
        let mut consumed = 0;

        for line in words.split_inclusive(|&word| word == LF) {
            let (body, newline) = match line.split_last() {
                Some((&LF, body)) => (body, true),
                _ => (line, false),
            };

            let n = self.write_until(handle, body, deadline).await?;
            consumed += n;
            if n < body.len() {
                break;
            }
            if newline {
                if self.write_until(handle, &[CR, LF], deadline).await? < 2 {
                    break;
                }
                consumed += 1;
            }
        }

        if consumed == 0 && !words.is_empty() {
            return Err(IoError::Timeout);
        }
        Ok(consumed)
    }

    /// Wait until everything queued has left the TX ring, then drain the
    /// hardware FIFO
    pub async fn flush(&self, handle: Handle, timeout: Duration) -> Result<(), IoError> {
        self.check(handle)?;
        self.kick_tx();
        let deadline = deadline(timeout);
        loop {
            self.tx_ready.reset();
            if self.tx.is_empty() {
                break;
            }
            let Some(deadline) = deadline else {
                return Err(IoError::Timeout);
            };
            if with_deadline(deadline, self.tx_ready.wait()).await.is_err() {
                return Err(IoError::Timeout);
            }
            self.check(handle)?;
            self.kick_tx();
        }
        self.port.flush();
        Ok(())
    }

    /// Free TX ring slots
    pub fn write_buffer_free(&self, handle: Handle) -> Result<usize, IoError> {
        self.check(handle)?;
        Ok(self.tx.free())
    }

    // ------------------------------------------------------------------------
    // Foreground: receive
    // ------------------------------------------------------------------------

    fn drain(&self, buf: &mut [Word]) -> usize {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.rx.pop() {
                Some(word) => {
                    *slot = word;
                    count += 1;
                }
                None => break,
            }
        }
        if count > 0 {
            self.release_rx();
        }
        count
    }

    /// Read received words into `buf`
    ///
    /// Waits up to `timeout` for the first word, then takes whatever else is
    /// already buffered without waiting further. Returns `Ok(0)` if nothing
    /// arrived in time; a zero timeout never waits.
    pub async fn read(
        &self,
        handle: Handle,
        buf: &mut [Word],
        timeout: Duration,
    ) -> Result<usize, IoError> {
        self.check(handle)?;
        if buf.is_empty() {
            return Ok(0);
        }

        if let Some(deadline) = deadline(timeout) {
            loop {
                self.rx_ready.reset();
                if !self.rx.is_empty() {
                    break;
                }
                if with_deadline(deadline, self.rx_ready.wait()).await.is_err() {
                    break;
                }
                self.check(handle)?;
            }
        }

        Ok(self.drain(buf))
    }

    /// Check for received words
    ///
    /// `false` for stale handles.
    pub fn any(&self, handle: Handle) -> bool {
        self.check(handle).is_ok() && !self.rx.is_empty()
    }

    /// Number of buffered RX words
    pub fn available(&self, handle: Handle) -> Result<usize, IoError> {
        self.check(handle)?;
        Ok(self.rx.available())
    }

    /// Next RX word, left in the buffer
    pub fn peek(&self, handle: Handle) -> Result<Option<Word>, IoError> {
        self.check(handle)?;
        Ok(self.rx.peek())
    }

    /// Discard buffered RX words
    pub fn clear_rx(&self, handle: Handle) -> Result<(), IoError> {
        self.check(handle)?;
        critical_section::with(|_| self.rx.clear());
        self.release_rx();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Foreground: framed receive
    // ------------------------------------------------------------------------

    /// Feed buffered RX words through the framer until a message completes
    fn next_message(&self) -> Result<Option<Message>, IoError> {
        let result = self.state.lock(|state| -> Result<Option<Message>, IoError> {
            let mut state = state.borrow_mut();
            let framer = state.framer.as_mut().ok_or(ErrorKind::FramingDisabled)?;
            if framer.is_overflowed() {
                return Err(IoError::Overflow);
            }

            while let Some(word) = self.rx.pop() {
                match framer.feed(word as u8) {
                    Ok(Some(message)) => {
                        self.messages_received.fetch_add(1, Ordering::Relaxed);
                        return Ok(Some(message));
                    }
                    Ok(None) => {}
                    Err(_) => {
                        self.overflows.fetch_add(1, Ordering::Relaxed);
                        warn!("{}: framed message overflow", self.id);
                        return Err(IoError::Overflow);
                    }
                }
            }
            Ok(None)
        });
        self.release_rx();
        result
    }

    /// Receive the next complete framed message
    ///
    /// Fails with [`IoError::Timeout`] if no message completes in time and
    /// with [`IoError::Overflow`] until an overflow has been acknowledged
    /// with [`clear_overflow`](Self::clear_overflow).
    pub async fn read_message(&self, handle: Handle, timeout: Duration) -> Result<Message, IoError> {
        self.check(handle)?;
        let deadline = deadline(timeout);
        loop {
            self.rx_ready.reset();
            if let Some(message) = self.next_message()? {
                return Ok(message);
            }
            let Some(deadline) = deadline else {
                return Err(IoError::Timeout);
            };
            if with_deadline(deadline, self.rx_ready.wait()).await.is_err() {
                return Err(IoError::Timeout);
            }
            self.check(handle)?;
        }
    }

    /// Acknowledge a framing overflow
    pub fn clear_overflow(&self, handle: Handle) -> Result<(), IoError> {
        self.check(handle)?;
        self.state.lock(|state| -> Result<(), IoError> {
            let mut state = state.borrow_mut();
            let framer = state.framer.as_mut().ok_or(ErrorKind::FramingDisabled)?;
            framer.clear_overflow();
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            tx_dropped: self.tx_dropped.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
        }
    }

    fn reset_stats(&self) {
        self.rx_dropped.store(0, Ordering::Relaxed);
        self.tx_dropped.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.overflows.store(0, Ordering::Relaxed);
    }

    /// Active configuration and divisor
    pub fn info(&self, handle: Handle) -> Result<DeviceInfo, IoError> {
        self.check(handle)?;
        self.state.lock(|state| -> Result<DeviceInfo, IoError> {
            let state = state.borrow();
            let active = state.active.as_ref().ok_or(ErrorKind::DeviceNotConfigured)?;
            Ok(DeviceInfo {
                id: self.id,
                config: active.config.clone(),
                divisor: active.divisor,
                actual_baud: active.actual_baud,
            })
        })
    }
}

impl core::fmt::Debug for UartDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UartDevice")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("enabled", &self.is_enabled())
            .field("tx", &self.tx)
            .field("rx", &self.rx)
            .finish()
    }
}

/// Absolute deadline for `timeout`; `None` for a zero timeout
fn deadline(timeout: Duration) -> Option<Instant> {
    if timeout.as_ticks() == 0 {
        return None;
    }
    Some(Instant::now().checked_add(timeout).unwrap_or(Instant::MAX))
}
