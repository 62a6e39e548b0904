//! Device registry
//!
//! A fixed table of [`UartDevice`]s indexed by small integer IDs. The table
//! is built once (usually as a `static`) with each entry bound to its port,
//! so dispatch is one index away and no per-call switch on the ID exists.
//!
//! ```ignore
//! static UART0: Uart0 = Uart0::new();
//! static UART1: Uart1 = Uart1::new();
//!
//! static UARTS: DeviceRegistry<2> = DeviceRegistry::new(
//!     k20::CLOCKS,
//!     [
//!         UartDevice::new(DeviceId::new(0), &UART0, k20::PORTS[0]),
//!         UartDevice::new(DeviceId::new(1), &UART1, k20::PORTS[1]),
//!     ],
//! );
//!
//! #[interrupt]
//! fn UART1_STATUS() {
//!     UARTS.on_interrupt(DeviceId::new(1));
//! }
//! ```

use embassy_time::Duration;

use uartmux_hal::Word;
use uartmux_protocol::Message;

use crate::board::ClockTree;
use crate::config::UartConfig;
use crate::device::{DeviceInfo, DeviceStats, Handle, UartDevice};
use crate::error::{ConfigError, ErrorKind, IoError};

#[cfg(not(feature = "nine-bit"))]
use crate::port::Port;

/// Device identifier used by the binding layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId(pub i16);

impl DeviceId {
    /// Sentinel that never resolves to a device
    pub const NONE: DeviceId = DeviceId(-1);

    pub const fn new(id: i16) -> Self {
        DeviceId(id)
    }

    /// Table index, if the ID can name one
    pub const fn index(self) -> Option<usize> {
        if self.0 < 0 {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

/// Fixed table of devices
pub struct DeviceRegistry<const N: usize> {
    clocks: ClockTree,
    devices: [UartDevice; N],
}

impl<const N: usize> DeviceRegistry<N> {
    /// Build the table
    ///
    /// Panics (at compile time for a `static`) unless entry `i` has ID `i`.
    pub const fn new(clocks: ClockTree, devices: [UartDevice; N]) -> Self {
        let mut i = 0;
        while i < N {
            assert!(
                devices[i].id().0 as usize == i,
                "device IDs must match table positions"
            );
            i += 1;
        }
        Self { clocks, devices }
    }

    pub fn clocks(&self) -> &ClockTree {
        &self.clocks
    }

    /// Number of devices
    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &UartDevice> {
        self.devices.iter()
    }

    /// Look up a device by ID
    pub fn resolve(&self, id: DeviceId) -> Result<&UartDevice, ErrorKind> {
        id.index()
            .and_then(|index| self.devices.get(index))
            .ok_or(ErrorKind::NotFound)
    }

    /// Look up the device behind a handle, checking the handle is current
    pub fn device(&self, handle: Handle) -> Result<&UartDevice, ErrorKind> {
        let device = self
            .resolve(handle.id())
            .map_err(|_| ErrorKind::DeviceNotConfigured)?;
        device.check(handle)?;
        Ok(device)
    }

    /// Configure and enable a device
    ///
    /// Fails with [`ErrorKind::DeviceBusy`] if the device is already open.
    pub fn open(&self, id: DeviceId, config: &UartConfig) -> Result<Handle, ConfigError> {
        let device = self.resolve(id)?;
        device.configure(config, &self.clocks)?;
        Ok(device.enable()?)
    }

    /// Apply a new configuration to an open device
    ///
    /// The old handle becomes stale; use the returned one.
    pub fn reinit(&self, handle: Handle, config: &UartConfig) -> Result<Handle, ConfigError> {
        let device = self.device(handle)?;
        device.disable();
        if let Err(e) = device.configure(config, &self.clocks) {
            warn!("{}: reinit rejected, device closed", handle.id());
            device.deinit();
            return Err(e);
        }
        Ok(device.enable()?)
    }

    /// Close the device behind `handle`
    pub fn close(&self, handle: Handle) -> Result<(), ErrorKind> {
        self.device(handle)?.deinit();
        Ok(())
    }

    /// Forward a port interrupt to its device
    ///
    /// Unknown IDs are ignored.
    pub fn on_interrupt(&self, id: DeviceId) {
        if let Ok(device) = self.resolve(id) {
            device.on_interrupt();
        }
    }

    pub async fn write(&self, handle: Handle, words: &[Word], timeout: Duration) -> Result<usize, IoError> {
        self.device(handle)?.write(handle, words, timeout).await
    }

    pub async fn write_cooked(
        &self,
        handle: Handle,
        words: &[Word],
        timeout: Duration,
    ) -> Result<usize, IoError> {
        self.device(handle)?.write_cooked(handle, words, timeout).await
    }

    pub async fn read(&self, handle: Handle, buf: &mut [Word], timeout: Duration) -> Result<usize, IoError> {
        self.device(handle)?.read(handle, buf, timeout).await
    }

    pub async fn read_message(&self, handle: Handle, timeout: Duration) -> Result<Message, IoError> {
        self.device(handle)?.read_message(handle, timeout).await
    }

    pub async fn flush(&self, handle: Handle, timeout: Duration) -> Result<(), IoError> {
        self.device(handle)?.flush(handle, timeout).await
    }

    /// Check for received words; `false` for stale handles
    pub fn any(&self, handle: Handle) -> bool {
        self.device(handle).is_ok_and(|device| device.any(handle))
    }

    pub fn clear_overflow(&self, handle: Handle) -> Result<(), IoError> {
        self.device(handle)?.clear_overflow(handle)
    }

    pub fn info(&self, handle: Handle) -> Result<DeviceInfo, IoError> {
        self.device(handle)?.info(handle)
    }

    /// Counters for a device, open or not
    pub fn stats(&self, id: DeviceId) -> Result<DeviceStats, ErrorKind> {
        Ok(self.resolve(id)?.stats())
    }

    /// `embedded-io` view of an open device
    #[cfg(not(feature = "nine-bit"))]
    pub fn port(&self, handle: Handle, timeout: Duration) -> Result<Port<'_>, ErrorKind> {
        Ok(Port::new(self.device(handle)?, handle, timeout))
    }
}

impl<const N: usize> core::fmt::Debug for DeviceRegistry<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("clocks", &self.clocks)
            .field("devices", &self.devices)
            .finish()
    }
}
