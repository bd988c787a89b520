//! Bulk
//!
//! Low level functions to read and write messages on the bulk endpoints.
//!
//! Both functions expect the caller to hold the session lock: they borrow
//! the session's `Exchange` mutably for the whole operation.
//!

use std::time::Duration;

use crate::communication::header::{self, MsgHeader, HEADER_SIZE};
use crate::config::{SessionConfig, TagPolicy};
use crate::constants::bulk_msg_id;
use crate::error::{Error, FramingError, TransferError};
use crate::transport::UsbTransport;
use crate::types::{SessionState, Tag};

/// ### Exchange
///
/// The mutable part of a session, guarded by the session lock.
///
#[derive(Debug)]
pub struct Exchange {
    pub state: SessionState,
    pub tag: Tag,
    out_buf: Vec<u8>,
    in_buf: Vec<u8>,
}

impl Exchange {
    pub fn new(buffer_size: usize) -> Exchange {
        Exchange {
            state: SessionState::Active,
            tag: Tag::new(),
            out_buf: vec![0x00; buffer_size],
            in_buf: vec![0x00; buffer_size],
        }
    }
}

fn send<T: UsbTransport>(transport: &T, data: &[u8], timeout: Duration) -> Result<(), Error> {
    let sent = transport.bulk_out(data, timeout)?;
    if sent != data.len() {
        return Err(Error::Transport(TransferError::Other(format!(
            "bulk out sent {sent} of {} bytes",
            data.len()
        ))));
    }
    Ok(())
}

/// ### Write
///
/// Send `data` as one DEV_DEP_MSG_OUT message with EOM set. The header and
/// the padded payload must fit in a single packet of the BULK OUT endpoint.
///
pub fn write<T: UsbTransport>(
    transport: &T,
    exchange: &mut Exchange,
    data: &[u8],
    timeout: Duration,
) -> Result<usize, Error> {
    let max = transport.max_packet_size_out();
    if data.len() + HEADER_SIZE > max {
        return Err(Error::TooLarge {
            len: data.len(),
            max,
        });
    }
    if exchange.state != SessionState::Ready {
        return Err(Error::NotReady);
    }
    if HEADER_SIZE + header::padded_len(data.len()) > exchange.out_buf.len() {
        return Err(Error::TooLarge {
            len: data.len(),
            max: exchange.out_buf.len(),
        });
    }

    let tag = exchange.tag.next();
    let len = header::frame_message(&mut exchange.out_buf, tag, data).ok_or(Error::TooLarge {
        len: data.len(),
        max,
    })?;

    tracing::trace!(tag, size = data.len(), "DEV_DEP_MSG_OUT");
    send(transport, &exchange.out_buf[..len], timeout)?;

    Ok(data.len())
}

/// Check a DEV_DEP_MSG_IN header against the request that solicited it.
fn validate_in_header(
    header: &MsgHeader,
    request_tag: u8,
    requested: usize,
    remaining: usize,
    received: usize,
    tag_policy: TagPolicy,
) -> Result<usize, FramingError> {
    if header.msg_id != bulk_msg_id::DEVICE_DEPENDENT_MSG_IN {
        return Err(FramingError::UnexpectedMsgId {
            found: header.msg_id,
            expected: bulk_msg_id::DEVICE_DEPENDENT_MSG_IN,
        });
    }

    let tag_matches = match tag_policy {
        TagPolicy::ComplementOnly => true,
        TagPolicy::MatchRequest => header.tag == request_tag,
    };
    if !header.tag_is_consistent() || !tag_matches {
        return Err(FramingError::TagMismatch {
            tag: header.tag,
            inverse: header.tag_inverse,
            expected: request_tag,
        });
    }

    let size = usize::try_from(header.transfer_size).unwrap_or(usize::MAX);
    if size > requested {
        return Err(FramingError::SizeExceedsRequest { size, requested });
    }
    if size > remaining {
        return Err(FramingError::SizeExceedsBuffer { size, remaining });
    }
    if received < HEADER_SIZE + size {
        return Err(FramingError::ShortTransfer {
            received,
            expected: HEADER_SIZE + size,
        });
    }

    Ok(size)
}

/// ### Read
///
/// Read one message from the BULK IN endpoint into `output`.
///
/// Each chunk is solicited with its own REQUEST_DEV_DEP_MSG_IN. Reading
/// stops at EOM or when `output` is full. Any bad header aborts the whole
/// read; nothing already copied is reported.
///
/// If `output` has room, the byte after the returned length is zeroed.
///
pub fn read<T: UsbTransport>(
    transport: &T,
    exchange: &mut Exchange,
    config: &SessionConfig,
    output: &mut [u8],
    timeout: Duration,
) -> Result<usize, Error> {
    if exchange.state != SessionState::Ready {
        return Err(Error::NotReady);
    }

    let chunk_size = config.read_chunk_size();
    let mut bytes_received = 0;
    let mut end_of_message = false;

    while !end_of_message && bytes_received < output.len() {
        let remaining = output.len() - bytes_received;
        let requested = remaining.min(chunk_size);

        // REQUEST
        let tag = exchange.tag.next();
        let request = MsgHeader::request_dev_dep_msg_in(tag, requested as u32).encode();
        exchange.out_buf[..HEADER_SIZE].copy_from_slice(&request);
        tracing::trace!(tag, requested, "REQUEST_DEV_DEP_MSG_IN");
        send(transport, &exchange.out_buf[..HEADER_SIZE], timeout)?;

        // RESPONSE
        let expected_len = (HEADER_SIZE + header::padded_len(requested)).min(exchange.in_buf.len());
        let received = transport.bulk_in(&mut exchange.in_buf[..expected_len], timeout)?;

        let response = MsgHeader::decode(&exchange.in_buf[..received]).ok_or(
            FramingError::ShortTransfer {
                received,
                expected: HEADER_SIZE,
            },
        )?;
        let size = validate_in_header(
            &response,
            tag,
            requested,
            remaining,
            received,
            config.tag_policy,
        )?;

        output[bytes_received..bytes_received + size]
            .copy_from_slice(&exchange.in_buf[HEADER_SIZE..HEADER_SIZE + size]);
        bytes_received += size;
        if let Some(terminator) = output.get_mut(bytes_received) {
            *terminator = 0;
        }

        end_of_message = response.end_of_message();
        tracing::trace!(
            tag = response.tag,
            size,
            end_of_message,
            "DEV_DEP_MSG_IN"
        );
    }

    Ok(bytes_received)
}
