//! Clock domains and per-port hardware descriptions
//!
//! Which clock feeds a port, how wide its divisor register is and which
//! optional line features it has are board facts. They live in tables here
//! and are looked up once per device instead of being re-derived at every
//! call site.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Clock domain feeding a UART's baud generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClockSource {
    /// CPU core clock
    Core,
    /// Peripheral bus clock
    Bus,
}

/// Frequencies of the clock domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClockTree {
    pub core_hz: u32,
    pub bus_hz: u32,
}

impl ClockTree {
    pub const fn new(core_hz: u32, bus_hz: u32) -> Self {
        Self { core_hz, bus_hz }
    }

    /// Frequency of `source` in Hz
    pub const fn frequency(&self, source: ClockSource) -> u32 {
        match source {
            ClockSource::Core => self.core_hz,
            ClockSource::Bus => self.bus_hz,
        }
    }
}

/// Static description of one physical UART
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortDescriptor {
    /// Clock domain driving the baud generator
    pub clock: ClockSource,
    /// Width of the divisor register in bits (integer and fractional parts)
    pub divisor_bits: u8,
    /// Smallest divisor the baud generator accepts
    pub min_divisor: u32,
    /// Whether the port can send 1.5 stop bits
    pub half_stop_bits: bool,
}

impl PortDescriptor {
    /// 13-bit integer divisor with a 5-bit fractional adjust
    pub const fn new(clock: ClockSource) -> Self {
        Self {
            clock,
            divisor_bits: 18,
            min_divisor: 32,
            half_stop_bits: false,
        }
    }

    pub const fn with_half_stop_bits(mut self) -> Self {
        self.half_stop_bits = true;
        self
    }

    /// Largest value the divisor register holds
    pub const fn max_divisor(&self) -> u32 {
        if self.divisor_bits >= 32 {
            u32::MAX
        } else {
            (1 << self.divisor_bits) - 1
        }
    }
}

/// Kinetis K20 boards with three UARTs
///
/// UART0 and UART1 run from the core clock, UART2 from the bus clock.
pub mod k20 {
    use super::{ClockSource, ClockTree, PortDescriptor};

    /// 96 MHz core, 48 MHz bus
    pub const CLOCKS: ClockTree = ClockTree::new(96_000_000, 48_000_000);

    pub const PORTS: [PortDescriptor; 3] = [
        PortDescriptor::new(ClockSource::Core),
        PortDescriptor::new(ClockSource::Core),
        PortDescriptor::new(ClockSource::Bus),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_lookup() {
        assert_eq!(k20::CLOCKS.frequency(ClockSource::Core), 96_000_000);
        assert_eq!(k20::CLOCKS.frequency(ClockSource::Bus), 48_000_000);
    }

    #[test]
    fn test_k20_table() {
        assert_eq!(k20::PORTS[0].clock, ClockSource::Core);
        assert_eq!(k20::PORTS[1].clock, ClockSource::Core);
        assert_eq!(k20::PORTS[2].clock, ClockSource::Bus);
        assert!(k20::PORTS.iter().all(|p| !p.half_stop_bits));
    }

    #[test]
    fn test_max_divisor() {
        assert_eq!(PortDescriptor::new(ClockSource::Core).max_divisor(), 0x3_FFFF);
        let wide = PortDescriptor {
            divisor_bits: 32,
            ..PortDescriptor::new(ClockSource::Bus)
        };
        assert_eq!(wide.max_divisor(), u32::MAX);
    }
}
