//! Baud divisor calculation
//!
//! The baud generator divides its clock by `16 * (SBR + BRFA/32)`. Folding
//! the fractional part in, the register pair holds one value in 1/32 units:
//!
//! ```text
//! divisor = round(clock_hz * 2 / baud)
//! ```

use crate::board::{ClockTree, PortDescriptor};
use crate::error::ConfigError;

/// Divisor for `baud` from a clock of `clock_hz`
///
/// Fails with [`ConfigError::UnsupportedBaud`] when `baud` is zero or the
/// result rounds to zero or does not fit in 32 bits.
pub fn divisor(clock_hz: u32, baud: u32) -> Result<u32, ConfigError> {
    if baud == 0 {
        return Err(ConfigError::UnsupportedBaud);
    }
    let clock = u64::from(clock_hz);
    let baud = u64::from(baud);
    let divisor = (clock * 2 + baud / 2) / baud;
    match u32::try_from(divisor) {
        Ok(0) | Err(_) => Err(ConfigError::UnsupportedBaud),
        Ok(divisor) => Ok(divisor),
    }
}

/// Divisor for `baud` on a specific port
///
/// Selects the port's clock domain from `clocks` and checks the result
/// against the port's divisor register.
pub fn divisor_for(
    port: &PortDescriptor,
    clocks: &ClockTree,
    baud: u32,
) -> Result<u32, ConfigError> {
    let divisor = divisor(clocks.frequency(port.clock), baud)?;
    if divisor < port.min_divisor || divisor > port.max_divisor() {
        return Err(ConfigError::UnsupportedBaud);
    }
    Ok(divisor)
}

/// Baud rate a divisor actually produces
///
/// Saturates at `u32::MAX` for divisors too small to be programmed.
pub fn actual_baud(clock_hz: u32, divisor: u32) -> u32 {
    if divisor == 0 {
        return 0;
    }
    let divisor = u64::from(divisor);
    let baud = (u64::from(clock_hz) * 2 + divisor / 2) / divisor;
    u32::try_from(baud).unwrap_or(u32::MAX)
}
