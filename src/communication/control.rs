//! ## Control
//!
//! Class requests sent on the default control endpoint. These do not take
//! the session lock and may run while a bulk exchange is in flight.
//!

use std::time::Duration;

use crate::constants::{control_requests, usbtmc_status};
use crate::error::Error;
use crate::transport::UsbTransport;
use crate::types::Capabilities;

/// ### Get Capabilities
///
/// Ask the interface which optional USBTMC features it supports.
///
pub fn get_capabilities<T: UsbTransport>(
    transport: &T,
    timeout: Duration,
) -> Result<Capabilities, Error> {
    let mut buffer = [0x00; control_requests::CAPABILITIES_LEN];

    let len = transport.control_in(
        control_requests::GET_CAPABILITIES,
        0x0000,
        &mut buffer,
        timeout,
    )?;

    Capabilities::from_bytes(&buffer[..len])
}

/// ### Indicator Pulse
///
/// Ask the device to blink its activity indicator.
///
pub fn indicator_pulse<T: UsbTransport>(transport: &T, timeout: Duration) -> Result<(), Error> {
    let mut buffer = [0x00; 1];

    let len = transport.control_in(
        control_requests::INDICATOR_PULSE,
        0x0000,
        &mut buffer,
        timeout,
    )?;

    match buffer[..len] {
        [usbtmc_status::STATUS_SUCCESS] => Ok(()),
        [status] => Err(Error::Status(status)),
        _ => Err(Error::Status(usbtmc_status::STATUS_FAILED)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;

    /// Answers every control request with a fixed response
    struct Canned(&'static [u8]);

    impl UsbTransport for Canned {
        fn open_endpoints(&self) -> Result<(), TransferError> {
            Ok(())
        }

        fn close_endpoints(&self) {}

        fn max_packet_size_out(&self) -> usize {
            64
        }

        fn bulk_out(&self, _data: &[u8], _timeout: Duration) -> Result<usize, TransferError> {
            Err(TransferError::Stall)
        }

        fn bulk_in(&self, _buffer: &mut [u8], _timeout: Duration) -> Result<usize, TransferError> {
            Err(TransferError::Stall)
        }

        fn control_in(
            &self,
            _request: u8,
            _value: u16,
            buffer: &mut [u8],
            _timeout: Duration,
        ) -> Result<usize, TransferError> {
            let len = self.0.len().min(buffer.len());
            buffer[..len].copy_from_slice(&self.0[..len]);
            Ok(len)
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(10);

    #[test]
    fn pulse_checks_the_status_byte() {
        assert!(indicator_pulse(&Canned(&[usbtmc_status::STATUS_SUCCESS]), TIMEOUT).is_ok());
        assert!(matches!(
            indicator_pulse(&Canned(&[usbtmc_status::STATUS_FAILED]), TIMEOUT),
            Err(Error::Status(0x80))
        ));
        assert!(matches!(
            indicator_pulse(&Canned(&[]), TIMEOUT),
            Err(Error::Status(_))
        ));
    }

    #[test]
    fn capabilities_are_decoded() {
        let caps = get_capabilities(&Canned(&[0x01, 0x00, 0x10, 0x01, 0b101, 0x01]), TIMEOUT)
            .unwrap();
        assert_eq!(caps.bcd_version, 0x0110);
        assert!(caps.accepts_indicator_pulse_request);
        assert!(caps.is_listen_only);
        assert!(caps.supports_bulk_in_term_char);
    }
}
