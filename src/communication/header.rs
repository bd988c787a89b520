//! Header
//!
//! The 12 byte header that precedes every bulk message.
//!
//! ```text
//! [0] bMsgID  [1] bTag  [2] bTagInverse  [3] reserved
//! [4..8) TransferSize (little endian)
//! [8] bmTransferAttributes (bit 0 = EOM)  [9..12) reserved
//! ```
//!

use crate::constants::{attributes, bulk_msg_id, misc};

pub const HEADER_SIZE: usize = misc::USBTMC_HEADER_SIZE;

/// ### Message Header
///
/// Decoded form of a bulk header. The same layout serves DEV_DEP_MSG_OUT,
/// REQUEST_DEV_DEP_MSG_IN and DEV_DEP_MSG_IN.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    pub msg_id: u8,
    pub tag: u8,
    pub tag_inverse: u8,
    pub transfer_size: u32,
    pub attributes: u8,
}

impl MsgHeader {
    fn new(msg_id: u8, tag: u8, transfer_size: u32, attributes: u8) -> MsgHeader {
        MsgHeader {
            msg_id,
            tag,
            tag_inverse: !tag,
            transfer_size,
            attributes,
        }
    }

    /// Header of a host to device data message.
    pub fn dev_dep_msg_out(tag: u8, transfer_size: u32, end_of_message: bool) -> MsgHeader {
        let attributes = if end_of_message {
            attributes::END_OF_MESSAGE
        } else {
            0
        };
        MsgHeader::new(
            bulk_msg_id::DEVICE_DEPENDENT_MSG_OUT,
            tag,
            transfer_size,
            attributes,
        )
    }

    /// Header asking the device for at most `transfer_size` bytes.
    pub fn request_dev_dep_msg_in(tag: u8, transfer_size: u32) -> MsgHeader {
        MsgHeader::new(
            bulk_msg_id::REQUEST_DEVICE_DEPENDENT_MSG_IN,
            tag,
            transfer_size,
            0,
        )
    }

    /// Header of a device to host data message.
    pub fn dev_dep_msg_in(tag: u8, transfer_size: u32, end_of_message: bool) -> MsgHeader {
        MsgHeader {
            msg_id: bulk_msg_id::DEVICE_DEPENDENT_MSG_IN,
            ..MsgHeader::dev_dep_msg_out(tag, transfer_size, end_of_message)
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut header = [0x00; HEADER_SIZE];

        header[0] = self.msg_id;
        header[1] = self.tag;
        header[2] = self.tag_inverse;
        header[4..8].copy_from_slice(&self.transfer_size.to_le_bytes());
        header[8] = self.attributes;

        header
    }

    /// Decode the header at the start of `buffer`, `None` if it is shorter
    /// than a header.
    pub fn decode(buffer: &[u8]) -> Option<MsgHeader> {
        let header = buffer.get(..HEADER_SIZE)?;

        Some(MsgHeader {
            msg_id: header[0],
            tag: header[1],
            tag_inverse: header[2],
            transfer_size: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
            attributes: header[8],
        })
    }

    pub fn end_of_message(&self) -> bool {
        self.attributes & attributes::END_OF_MESSAGE != 0
    }

    /// bTagInverse is the one's complement of bTag
    pub fn tag_is_consistent(&self) -> bool {
        self.tag_inverse == !self.tag
    }
}

/// Length of `payload_len` bytes rounded up to the bulk alignment.
pub fn padded_len(payload_len: usize) -> usize {
    payload_len.div_ceil(misc::TRANSFER_ALIGNMENT) * misc::TRANSFER_ALIGNMENT
}

/// ### Frame Message
///
/// Write a DEV_DEP_MSG_OUT header and `payload` into `buffer`, zero padding
/// the payload to the bulk alignment. Returns the number of bytes to
/// transfer, or `None` if `buffer` is too small.
///
pub fn frame_message(buffer: &mut [u8], tag: u8, payload: &[u8]) -> Option<usize> {
    let len = HEADER_SIZE + padded_len(payload.len());
    let frame = buffer.get_mut(..len)?;
    let size = u32::try_from(payload.len()).ok()?;

    frame[..HEADER_SIZE].copy_from_slice(&MsgHeader::dev_dep_msg_out(tag, size, true).encode());
    frame[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
    frame[HEADER_SIZE + payload.len()..].fill(0x00);

    Some(len)
}
