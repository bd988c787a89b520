//! ## Constants
//!
//! Various constants used throughout the project.
//!

pub mod usb {
    /// The class code for usbtmc
    pub const USBTMC_CLASS_CODE: u8 = 0xFE;
    /// The subclass code for usbtmc
    pub const USBTMC_SUBCLASS_CODE: u8 = 0x03;
    /// The protocol code for a plain USBTMC interface
    pub const USBTMC_PROTOCOL_CODE: u8 = 0x00;
    /// The protocol code for the USB488 spec of usbtmc
    pub const USB488_PROTOCOL_CODE: u8 = 0x01;
}

pub mod misc {
    use std::time::Duration;

    /// The default timeout duration of a single bulk transfer
    pub const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_millis(1000);
    /// The size in bytes of a USBTMC header in a bulk transfer
    pub const USBTMC_HEADER_SIZE: usize = 12;
    /// Size of the scratch buffers of a session
    pub const DEFAULT_BUFFER_SIZE: usize = 1 << 8;
    /// Bulk payloads are padded to this alignment
    pub const TRANSFER_ALIGNMENT: usize = 4;
}

pub mod usbtmc_status {
    /// Success
    pub const STATUS_SUCCESS: u8 = 0x01;
    /// Failure for unspecified or undefined reason
    pub const STATUS_FAILED: u8 = 0x80;
}

pub mod control_requests {
    pub const GET_CAPABILITIES: u8 = 7;
    pub const INDICATOR_PULSE: u8 = 64;

    /// Length of the GET_CAPABILITIES response
    pub const CAPABILITIES_LEN: usize = 0x18;
}

pub mod bulk_msg_id {
    pub const DEVICE_DEPENDENT_MSG_OUT: u8 = 1;
    pub const REQUEST_DEVICE_DEPENDENT_MSG_IN: u8 = 2;
    pub const DEVICE_DEPENDENT_MSG_IN: u8 = 2;
}

pub mod attributes {
    /// bmTransferAttributes bit marking the last transfer of a message
    pub const END_OF_MESSAGE: u8 = 0b0000_0001;
}
