//! `embedded-io` adapter
//!
//! Lets code written against `embedded_io_async::{Read, Write}` (protocol
//! stacks, line readers) talk to an open device. Each call waits at most
//! the port's timeout.

use embassy_time::Duration;
use embedded_io::{ErrorType, ReadReady};
use embedded_io_async::{Read, Write};

use crate::device::{Handle, UartDevice};
use crate::error::IoError;

/// Open device with a fixed per-call timeout
#[derive(Debug, Clone, Copy)]
pub struct Port<'d> {
    device: &'d UartDevice,
    handle: Handle,
    timeout: Duration,
}

impl<'d> Port<'d> {
    pub fn new(device: &'d UartDevice, handle: Handle, timeout: Duration) -> Self {
        Self {
            device,
            handle,
            timeout,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

impl ErrorType for Port<'_> {
    type Error = IoError;
}

impl Read for Port<'_> {
    /// Unlike [`UartDevice::read`], running out of time with nothing
    /// received is an error: `Ok(0)` would mean end of stream here.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.device.read(self.handle, buf, self.timeout).await? {
            0 => Err(IoError::Timeout),
            n => Ok(n),
        }
    }
}

impl ReadReady for Port<'_> {
    fn read_ready(&mut self) -> Result<bool, IoError> {
        Ok(self.device.available(self.handle)? > 0)
    }
}

impl Write for Port<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.device.write(self.handle, buf, self.timeout).await
    }

    async fn flush(&mut self) -> Result<(), IoError> {
        self.device.flush(self.handle, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::k20;
    use crate::config::UartConfig;
    use crate::registry::DeviceId;
    use futures::executor::block_on;
    use std::boxed::Box;
    use uartmux_hal_host::HostPort;

    #[test]
    fn test_read_write_through_traits() {
        let host: &'static HostPort = Box::leak(Box::new(HostPort::new()));
        let device = UartDevice::new(DeviceId::new(0), host, k20::PORTS[0]);
        device.configure(&UartConfig::new(9600), &k20::CLOCKS).unwrap();
        let handle = device.enable().unwrap();
        let mut port = Port::new(&device, handle, Duration::from_ticks(0));

        block_on(async {
            assert_eq!(port.write(b"ping").await, Ok(4));
            assert_eq!(port.flush().await, Ok(()));
        });
        assert_eq!(host.take_tx(), b"ping");

        assert_eq!(port.read_ready(), Ok(false));
        let mut buf = [0u8; 8];
        assert_eq!(block_on(port.read(&mut buf)), Err(IoError::Timeout));

        host.inject_rx(b"pong");
        device.on_interrupt();
        assert_eq!(port.read_ready(), Ok(true));
        assert_eq!(block_on(port.read(&mut buf)), Ok(4));
        assert_eq!(&buf[..4], b"pong");
    }
}
