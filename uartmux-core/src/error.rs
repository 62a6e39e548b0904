//! Error types
//!
//! Configuration problems surface from `open`/`configure`, transfer problems
//! from `read`/`write`. Device-usage errors ([`ErrorKind`]) can appear in
//! both. Nothing here is retried internally; retry policy is the caller's.

use uartmux_protocol::FrameError;

/// Device usage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// No device with this ID (including the `NONE` sentinel)
    NotFound,
    /// Device is enabled; disable or close it before reconfiguring
    DeviceBusy,
    /// Device was never opened, was closed, or the handle is stale
    DeviceNotConfigured,
    /// Operation needs receive framing, which the device was opened without
    FramingDisabled,
}

/// Errors from opening or configuring a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A parameter is outside the accepted set
    InvalidParameters,
    /// The baud divisor rounds to zero or does not fit the divisor register
    UnsupportedBaud,
    /// The device cannot be configured right now
    Device(ErrorKind),
}

impl From<ErrorKind> for ConfigError {
    fn from(e: ErrorKind) -> Self {
        ConfigError::Device(e)
    }
}

impl From<FrameError> for ConfigError {
    fn from(_: FrameError) -> Self {
        ConfigError::InvalidParameters
    }
}

/// Errors from transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError {
    /// Nothing could be transferred before the timeout (not fatal)
    Timeout,
    /// Framed data was lost; acknowledge with `clear_overflow`
    Overflow,
    /// The device cannot be used through this handle
    Device(ErrorKind),
}

impl From<ErrorKind> for IoError {
    fn from(e: ErrorKind) -> Self {
        IoError::Device(e)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            IoError::Timeout => embedded_io::ErrorKind::TimedOut,
            IoError::Overflow => embedded_io::ErrorKind::InvalidData,
            IoError::Device(ErrorKind::NotFound) => embedded_io::ErrorKind::NotFound,
            IoError::Device(ErrorKind::DeviceNotConfigured) => embedded_io::ErrorKind::NotConnected,
            IoError::Device(ErrorKind::FramingDisabled) => embedded_io::ErrorKind::Unsupported,
            IoError::Device(ErrorKind::DeviceBusy) => embedded_io::ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::Error as _;

    #[test]
    fn test_conversions() {
        assert_eq!(
            ConfigError::from(ErrorKind::DeviceBusy),
            ConfigError::Device(ErrorKind::DeviceBusy)
        );
        assert_eq!(
            ConfigError::from(FrameError::InvalidConfig),
            ConfigError::InvalidParameters
        );
        assert_eq!(
            IoError::from(ErrorKind::DeviceNotConfigured),
            IoError::Device(ErrorKind::DeviceNotConfigured)
        );
    }

    #[test]
    fn test_timeout_and_unconfigured_are_distinct() {
        let timeout = IoError::Timeout;
        let unconfigured = IoError::Device(ErrorKind::DeviceNotConfigured);
        assert_ne!(timeout, unconfigured);
        assert_eq!(timeout.kind(), embedded_io::ErrorKind::TimedOut);
        assert_eq!(unconfigured.kind(), embedded_io::ErrorKind::NotConnected);
    }
}
