//! UART serial port abstractions
//!
//! Provides the per-port hardware primitives and the line-format types that
//! describe how a port is programmed.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One character as it moves through the buffers
///
/// 8-bit by default. With the `nine-bit` feature every port carries 16-bit
/// words so that 9-bit frames keep their top bit.
#[cfg(not(feature = "nine-bit"))]
pub type Word = u8;

/// One character as it moves through the buffers
#[cfg(feature = "nine-bit")]
pub type Word = u16;

/// Hardware primitives for one physical UART
///
/// Implementations wrap the peripheral registers (data register, FIFO
/// levels, baud divisor, interrupt enables). Every method takes `&self`:
/// the same instance is used from the interrupt handler and from task
/// context, so implementations must rely on register semantics or their own
/// interior mutability.
pub trait SerialPort: Sync {
    /// Program the baud divisor and line format, and enable the transmitter
    /// and receiver
    ///
    /// `divisor` is in 1/32 bit-clock units (see `uartmux-core::baud`).
    fn begin(&self, divisor: u32, format: LineFormat);

    /// Disable the transmitter and receiver
    fn end(&self);

    /// Arm the RX/TX interrupt sources
    fn enable_interrupts(&self);

    /// Disarm the RX/TX interrupt sources
    ///
    /// Must be harmless when already disarmed.
    fn disable_interrupts(&self);

    /// Push one word into the transmit FIFO
    ///
    /// Only called when [`write_buffer_free`](Self::write_buffer_free)
    /// reported room.
    fn putchar(&self, word: Word);

    /// Push as many words as the transmit FIFO accepts
    ///
    /// Returns the number of words taken.
    fn write(&self, words: &[Word]) -> usize {
        let mut written = 0;
        for &word in words {
            if self.write_buffer_free() == 0 {
                break;
            }
            self.putchar(word);
            written += 1;
        }
        written
    }

    /// Number of words waiting in the receive FIFO
    fn available(&self) -> usize;

    /// Take one word from the receive FIFO
    fn getchar(&self) -> Option<Word>;

    /// Free slots in the transmit FIFO
    fn write_buffer_free(&self) -> usize;

    /// Wait until the transmit FIFO and shift register are empty
    fn flush(&self);
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataBits {
    Seven,
    Eight,
    Nine,
}

impl DataBits {
    /// Parse a bit count (7, 8 or 9)
    pub fn from_count(bits: u8) -> Option<Self> {
        match bits {
            7 => Some(DataBits::Seven),
            8 => Some(DataBits::Eight),
            9 => Some(DataBits::Nine),
            _ => None,
        }
    }

    /// Bit count
    pub fn count(self) -> u8 {
        match self {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
            DataBits::Nine => 9,
        }
    }

    /// Mask applied to received words
    pub fn mask(self) -> u16 {
        match self {
            DataBits::Seven => 0x7f,
            DataBits::Eight => 0xff,
            DataBits::Nine => 0x1ff,
        }
    }
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopBits {
    One,
    /// Only on ports whose hardware supports it
    OnePointFive,
    Two,
}

impl StopBits {
    /// Parse a whole stop-bit count (1 or 2)
    pub fn from_count(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(StopBits::One),
            2 => Some(StopBits::Two),
            _ => None,
        }
    }
}

/// Flow control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FlowControl {
    None,
    /// RTS/CTS handled by the peripheral
    Hardware,
    /// XON/XOFF handled in software by the device layer
    XonXoff,
}

impl FlowControl {
    /// Parse the numeric mode (0 none, 1 hardware, 2 XON/XOFF)
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FlowControl::None),
            1 => Some(FlowControl::Hardware),
            2 => Some(FlowControl::XonXoff),
            _ => None,
        }
    }
}

/// Line format word handed to [`SerialPort::begin`]
///
/// Low byte layout:
/// - bit0: parity, 0=even, 1=odd
/// - bit1: parity, 0=disable, 1=enable
/// - bit2: 9-bit frame
/// - bit3: 10-bit frame
/// - bit4: RX inverted
/// - bit5: TX inverted
/// - bit6: two stop bits (frames that are not 8 bits long)
/// - bit7: data goes into the 9th bit
///
/// High byte: bit8 one-and-a-half stop bits, bit9 RTS/CTS flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineFormat(u16);

impl LineFormat {
    pub const PARITY_ODD: u16 = 1 << 0;
    pub const PARITY_ENABLE: u16 = 1 << 1;
    pub const MODE_9BIT: u16 = 1 << 2;
    pub const MODE_10BIT: u16 = 1 << 3;
    pub const RX_INVERT: u16 = 1 << 4;
    pub const TX_INVERT: u16 = 1 << 5;
    pub const TWO_STOP: u16 = 1 << 6;
    pub const DATA_NINTH_BIT: u16 = 1 << 7;
    pub const HALF_STOP: u16 = 1 << 8;
    pub const RTS_CTS: u16 = 1 << 9;

    /// 8 data bits, no parity, one stop bit
    pub const SERIAL_8N1: LineFormat = LineFormat(0x00);

    /// Build the format word for a frame layout
    pub fn new(
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
        flow_control: FlowControl,
    ) -> Self {
        let mut bits = 0;

        match parity {
            Parity::None => {}
            Parity::Even => bits |= Self::PARITY_ENABLE,
            Parity::Odd => bits |= Self::PARITY_ENABLE | Self::PARITY_ODD,
        }

        let frame = data_bits.count() + u8::from(parity != Parity::None);
        if frame >= 9 {
            bits |= Self::MODE_9BIT;
        }
        if frame >= 10 {
            bits |= Self::MODE_10BIT;
        }
        if data_bits == DataBits::Nine {
            bits |= Self::DATA_NINTH_BIT;
        }

        match stop_bits {
            StopBits::One => {}
            StopBits::OnePointFive => bits |= Self::HALF_STOP,
            // 8-bit frames send the second stop bit as a ninth bit held high
            StopBits::Two if frame == 8 => bits |= Self::MODE_9BIT,
            StopBits::Two => bits |= Self::TWO_STOP,
        }

        if flow_control == FlowControl::Hardware {
            bits |= Self::RTS_CTS;
        }

        LineFormat(bits)
    }

    /// Set the RX/TX line inversion bits
    pub fn with_inversion(self, rx: bool, tx: bool) -> Self {
        let mut bits = self.0 & !(Self::RX_INVERT | Self::TX_INVERT);
        if rx {
            bits |= Self::RX_INVERT;
        }
        if tx {
            bits |= Self::TX_INVERT;
        }
        LineFormat(bits)
    }

    /// Raw format word
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Wrap a raw format word
    pub fn from_bits(bits: u16) -> Self {
        LineFormat(bits)
    }

    /// Check whether all bits of `flag` are set
    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }
}
