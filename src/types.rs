//! ## Types
//!
//! The different types used across the crate
//!

use rusb::{Direction, TransferType};

use crate::constants::usbtmc_status;
use crate::error::Error;

/// ### bTag
///
/// The bTag element used to identify a bulk request.
///
/// Each call to `next` yields a fresh tag. Tags run from 1 to 255 and wrap
/// back to 1; 0 is never produced.
///
#[derive(Debug, Clone, Default)]
pub struct Tag {
    last: u8,
}

impl Tag {
    /// ### New
    ///
    /// Return a fresh tag counter. The first tag it hands out is 1.
    ///
    pub fn new() -> Tag {
        Tag { last: 0 }
    }

    /// ### Next
    ///
    /// Advance the counter and return the new tag.
    ///
    pub fn next(&mut self) -> u8 {
        self.last = (self.last % 255) + 1;
        self.last
    }

    /// The tag most recently handed out, 0 if none was.
    pub fn last(&self) -> u8 {
        self.last
    }
}

/// ### Session State
///
/// Lifecycle of one attached-instrument connection.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    /// The interface was unloaded
    Stopped,
    /// The interface is recognized, endpoints closed
    Active,
    /// Endpoints open, bulk exchanges allowed
    Ready,
}

/// ### Device Mode
///
/// A collection of the configuration, interface and interface number. Also if the interface has a kernel driver attached.
///
#[derive(Debug, Clone, Default)]
pub struct DeviceMode {
    /// The USB configuration number
    pub config_number: u8,
    /// The interface number specific to the configuration
    pub interface_number: u8,
    /// The setting number specific to the interface
    pub setting_number: u8,
    /// If the device has a kernel driver. Important for returning control to the OS (on Linux).
    pub has_kernel_driver: bool,
}

/// USB identifiers of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Bus location of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddr {
    pub bus: u8,
    pub device: u8,
}

/// A USBTMC device found on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub address: DeviceAddr,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:03}:{:03} {:04x}:{:04x}",
            self.address.bus, self.address.device, self.id.vendor_id, self.id.product_id
        )
    }
}

/// ### Endpoint
///
/// Properties of an endpoint.
///
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Address of the endpoint on the interface
    pub address: u8,
    /// The maximal size a packet can have on this endpoint
    pub max_packet_size: u16,
    /// The transfer type of the endpoint (for USBTMC, Bulk or Interrupt)
    pub transfer_type: TransferType,
    /// The direction of the endpoint (for USBTMC, In or Out)
    pub direction: Direction,
}

/// ### USBTMC Endpoints
///
/// Endpoints specific to the USBTMC spec.
///
#[derive(Clone, Debug)]
pub struct UsbtmcEndpoints {
    /// The mandatory BULK OUT endpoint
    pub bulk_out_ep: Endpoint,
    /// The mandatory BULK IN endpoint
    pub bulk_in_ep: Endpoint,
    /// The optional INTERRUPT IN endpoint
    pub interrupt_ep: Option<Endpoint>,
}

/// ### Capabilities
///
/// The collected capabilities of a USBTMC device.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub bcd_version: u16,
    /// Can accept a control command for pulse
    pub accepts_indicator_pulse_request: bool,
    /// Only sends data to the controller
    pub is_talk_only: bool,
    /// Only accepts data from the controller
    pub is_listen_only: bool,
    /// When returning data, it has a terminator character in the data
    pub supports_bulk_in_term_char: bool,
}

impl Capabilities {
    /// ### From Bytes
    ///
    /// Decode a GET_CAPABILITIES response. Fails if the response is too short
    /// to hold the capability bytes or carries a non-success status.
    ///
    pub fn from_bytes(buffer: &[u8]) -> Result<Capabilities, Error> {
        let &[status, _, bcd_lo, bcd_hi, interface_capabilities, device_capabilities, ..] = buffer
        else {
            return Err(Error::Status(usbtmc_status::STATUS_FAILED));
        };

        if status != usbtmc_status::STATUS_SUCCESS {
            return Err(Error::Status(status));
        }

        Ok(Capabilities {
            bcd_version: u16::from_le_bytes([bcd_lo, bcd_hi]),
            accepts_indicator_pulse_request: interface_capabilities & 0b0000_0100 != 0,
            is_talk_only: interface_capabilities & 0b0000_0010 != 0,
            is_listen_only: interface_capabilities & 0b0000_0001 != 0,
            supports_bulk_in_term_char: device_capabilities & 0b0000_0001 != 0,
        })
    }
}
