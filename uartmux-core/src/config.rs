//! Device configuration
//!
//! A [`UartConfig`] is what the binding layer hands to `open`. It can be
//! built from typed values or from the raw integers a scripting call
//! carries ([`UartConfig::from_raw`]).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use uartmux_hal::{DataBits, FlowControl, LineFormat, Parity, StopBits, Word};
use uartmux_protocol::FrameConfig;

use crate::board::PortDescriptor;
use crate::error::ConfigError;

/// Line settings and optional receive framing for one device
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UartConfig {
    pub baudrate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Invert the RX line (idle low)
    #[cfg_attr(feature = "serde", serde(default))]
    pub invert_rx: bool,
    /// Invert the TX line (idle low)
    #[cfg_attr(feature = "serde", serde(default))]
    pub invert_tx: bool,
    /// Receive framing; `None` delivers the raw byte stream only
    #[cfg_attr(feature = "serde", serde(default))]
    pub framing: Option<FrameConfig>,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::new(115_200)
    }
}

impl UartConfig {
    /// 8N1 at `baudrate`, no flow control
    pub const fn new(baudrate: u32) -> Self {
        Self {
            baudrate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            invert_rx: false,
            invert_tx: false,
            framing: None,
        }
    }

    /// Build from binding-layer integers
    ///
    /// `parity` is `None` for no parity, `Some(0)` for even and `Some(1)`
    /// for odd. `flow_control` is 0 (none), 1 (RTS/CTS) or 2 (XON/XOFF).
    pub fn from_raw(
        baudrate: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: Option<u8>,
        flow_control: u8,
    ) -> Result<Self, ConfigError> {
        let data_bits = DataBits::from_count(data_bits).ok_or(ConfigError::InvalidParameters)?;
        let stop_bits = StopBits::from_count(stop_bits).ok_or(ConfigError::InvalidParameters)?;
        let parity = match parity {
            None => Parity::None,
            Some(0) => Parity::Even,
            Some(1) => Parity::Odd,
            Some(_) => return Err(ConfigError::InvalidParameters),
        };
        let flow_control =
            FlowControl::from_code(flow_control).ok_or(ConfigError::InvalidParameters)?;

        Ok(Self {
            data_bits,
            parity,
            stop_bits,
            flow_control,
            ..Self::new(baudrate)
        })
    }

    pub const fn with_format(mut self, data_bits: DataBits, parity: Parity, stop_bits: StopBits) -> Self {
        self.data_bits = data_bits;
        self.parity = parity;
        self.stop_bits = stop_bits;
        self
    }

    pub const fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    pub const fn with_inversion(mut self, rx: bool, tx: bool) -> Self {
        self.invert_rx = rx;
        self.invert_tx = tx;
        self
    }

    pub fn with_framing(mut self, framing: FrameConfig) -> Self {
        self.framing = Some(framing);
        self
    }

    /// Check the settings against what `port` and this build support
    ///
    /// The baud rate is checked separately when the divisor is computed.
    pub fn validate(&self, port: &PortDescriptor) -> Result<(), ConfigError> {
        if self.stop_bits == StopBits::OnePointFive && !port.half_stop_bits {
            return Err(ConfigError::InvalidParameters);
        }

        // 9-bit words need 16-bit buffers, which is a build-wide choice
        if self.data_bits == DataBits::Nine && !cfg!(feature = "nine-bit") {
            return Err(ConfigError::InvalidParameters);
        }

        if let Some(framing) = &self.framing {
            if self.data_bits == DataBits::Nine {
                return Err(ConfigError::InvalidParameters);
            }
            framing.validate()?;
        }

        Ok(())
    }

    /// Format word for [`SerialPort::begin`](uartmux_hal::SerialPort::begin)
    pub fn line_format(&self) -> LineFormat {
        LineFormat::new(self.data_bits, self.parity, self.stop_bits, self.flow_control)
            .with_inversion(self.invert_rx, self.invert_tx)
    }

    /// Mask applied to received words
    pub fn word_mask(&self) -> Word {
        self.data_bits.mask() as Word
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{k20, ClockSource};

    #[test]
    fn test_default_is_115200_8n1() {
        let config = UartConfig::default();
        assert_eq!(config.baudrate, 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.flow_control, FlowControl::None);
        assert_eq!(config.line_format(), LineFormat::SERIAL_8N1);
    }

    #[test]
    fn test_from_raw() {
        let config = UartConfig::from_raw(9600, 7, 1, Some(0), 2).unwrap();
        assert_eq!(config.data_bits, DataBits::Seven);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.flow_control, FlowControl::XonXoff);
        assert_eq!(config.line_format().bits(), 0x02);

        let odd = UartConfig::from_raw(9600, 8, 1, Some(1), 0).unwrap();
        assert_eq!(odd.parity, Parity::Odd);
    }

    #[test]
    fn test_from_raw_rejects_bad_values() {
        assert_eq!(
            UartConfig::from_raw(9600, 10, 1, None, 0),
            Err(ConfigError::InvalidParameters)
        );
        assert_eq!(
            UartConfig::from_raw(9600, 8, 3, None, 0),
            Err(ConfigError::InvalidParameters)
        );
        assert_eq!(
            UartConfig::from_raw(9600, 8, 1, Some(2), 0),
            Err(ConfigError::InvalidParameters)
        );
        assert_eq!(
            UartConfig::from_raw(9600, 8, 1, None, 3),
            Err(ConfigError::InvalidParameters)
        );
    }

    #[test]
    fn test_half_stop_bits_need_port_support() {
        let config =
            UartConfig::new(9600).with_format(DataBits::Eight, Parity::None, StopBits::OnePointFive);
        assert_eq!(
            config.validate(&k20::PORTS[0]),
            Err(ConfigError::InvalidParameters)
        );
        let port = PortDescriptor::new(ClockSource::Bus).with_half_stop_bits();
        assert_eq!(config.validate(&port), Ok(()));
    }

    #[cfg(not(feature = "nine-bit"))]
    #[test]
    fn test_nine_bits_need_wide_buffers() {
        let config = UartConfig::new(9600).with_format(DataBits::Nine, Parity::None, StopBits::One);
        assert_eq!(
            config.validate(&k20::PORTS[0]),
            Err(ConfigError::InvalidParameters)
        );
    }

    #[cfg(feature = "nine-bit")]
    #[test]
    fn test_nine_bits_with_wide_buffers() {
        let config = UartConfig::new(9600).with_format(DataBits::Nine, Parity::None, StopBits::One);
        assert_eq!(config.validate(&k20::PORTS[0]), Ok(()));
        assert_eq!(config.word_mask(), 0x1FF);
        assert_eq!(config.line_format().bits(), 0x84);

        // Framing is byte-oriented
        let framed = config.with_framing(FrameConfig::new(0x02, 0x1B).with_terminator(0x03));
        assert_eq!(
            framed.validate(&k20::PORTS[0]),
            Err(ConfigError::InvalidParameters)
        );
    }

    #[test]
    fn test_invalid_framing_rejected() {
        // No terminator and no trigger level
        let config = UartConfig::new(9600).with_framing(FrameConfig::new(0x02, 0x1B));
        assert_eq!(
            config.validate(&k20::PORTS[0]),
            Err(ConfigError::InvalidParameters)
        );

        let ok = UartConfig::new(9600).with_framing(FrameConfig::new(0x02, 0x1B).with_terminator(0x03));
        assert_eq!(ok.validate(&k20::PORTS[0]), Ok(()));
    }

    #[test]
    fn test_inversion_reaches_format() {
        let config = UartConfig::new(9600)
            .with_inversion(true, true)
            .with_flow_control(FlowControl::Hardware);
        let format = config.line_format();
        assert!(format.contains(LineFormat::RX_INVERT | LineFormat::TX_INVERT));
        assert!(format.contains(LineFormat::RTS_CTS));
    }

    #[test]
    fn test_word_mask() {
        let seven = UartConfig::new(9600).with_format(DataBits::Seven, Parity::Even, StopBits::One);
        assert_eq!(seven.word_mask(), 0x7f);
        assert_eq!(UartConfig::new(9600).word_mask(), 0xff);
    }
}
