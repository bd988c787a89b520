#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use scope_tmc::communication::header::{padded_len, MsgHeader, HEADER_SIZE};
use scope_tmc::{TransferError, UsbTransport};

pub const TIMEOUT: Duration = Duration::from_millis(50);

/// What the fake device hands back on the next BULK IN transfer
pub enum Reply {
    /// A DEV_DEP_MSG_IN answering the last request, tag included
    Message { payload: Vec<u8>, end_of_message: bool },
    /// Bytes put on the wire as they are
    Raw(Vec<u8>),
    Fail(TransferError),
}

#[derive(Default)]
struct Script {
    open: bool,
    echo: bool,
    sent: Vec<Vec<u8>>,
    replies: VecDeque<Reply>,
    out_failures: VecDeque<TransferError>,
    last_request_tag: u8,
    bulk_in_calls: usize,
    opened: usize,
    closed: usize,
}

/// Fake USBTMC interface replaying queued replies and recording every
/// BULK OUT transfer.
pub struct ScriptedTransport {
    max_packet_size: usize,
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new(max_packet_size: usize) -> ScriptedTransport {
        ScriptedTransport {
            max_packet_size,
            script: Mutex::new(Script::default()),
        }
    }

    /// Answer every DEV_DEP_MSG_OUT with its own payload
    pub fn echo(max_packet_size: usize) -> ScriptedTransport {
        let transport = ScriptedTransport::new(max_packet_size);
        transport.script.lock().echo = true;
        transport
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.script.lock().replies.push_back(reply);
        self
    }

    pub fn message(&self, payload: &[u8], end_of_message: bool) -> &Self {
        self.reply(Reply::Message {
            payload: payload.to_vec(),
            end_of_message,
        })
    }

    pub fn fail_next_bulk_out(&self, err: TransferError) {
        self.script.lock().out_failures.push_back(err);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.script.lock().sent.clone()
    }

    pub fn sent_headers(&self) -> Vec<MsgHeader> {
        self.sent()
            .iter()
            .map(|frame| MsgHeader::decode(frame).expect("frame shorter than a header"))
            .collect()
    }

    pub fn bulk_in_calls(&self) -> usize {
        self.script.lock().bulk_in_calls
    }

    pub fn open_close_counts(&self) -> (usize, usize) {
        let script = self.script.lock();
        (script.opened, script.closed)
    }
}

/// A DEV_DEP_MSG_IN transfer: header, payload and zero padding.
pub fn in_frame(tag: u8, payload: &[u8], end_of_message: bool) -> Vec<u8> {
    let mut frame = MsgHeader::dev_dep_msg_in(tag, payload.len() as u32, end_of_message)
        .encode()
        .to_vec();
    frame.extend_from_slice(payload);
    frame.resize(HEADER_SIZE + padded_len(payload.len()), 0x00);
    frame
}

impl UsbTransport for ScriptedTransport {
    fn open_endpoints(&self) -> Result<(), TransferError> {
        let mut script = self.script.lock();
        script.open = true;
        script.opened += 1;
        Ok(())
    }

    fn close_endpoints(&self) {
        let mut script = self.script.lock();
        script.open = false;
        script.closed += 1;
    }

    fn max_packet_size_out(&self) -> usize {
        self.max_packet_size
    }

    fn bulk_out(&self, data: &[u8], _timeout: Duration) -> Result<usize, TransferError> {
        let mut script = self.script.lock();
        if !script.open {
            return Err(TransferError::Disconnected);
        }
        if let Some(err) = script.out_failures.pop_front() {
            return Err(err);
        }
        script.sent.push(data.to_vec());

        if let Some(header) = MsgHeader::decode(data) {
            match header.msg_id {
                1 if script.echo => {
                    let size = header.transfer_size as usize;
                    let payload = data[HEADER_SIZE..HEADER_SIZE + size].to_vec();
                    script.replies.push_back(Reply::Message {
                        payload,
                        end_of_message: true,
                    });
                }
                2 => script.last_request_tag = header.tag,
                _ => {}
            }
        }
        Ok(data.len())
    }

    fn bulk_in(&self, buffer: &mut [u8], _timeout: Duration) -> Result<usize, TransferError> {
        let mut script = self.script.lock();
        if !script.open {
            return Err(TransferError::Disconnected);
        }
        script.bulk_in_calls += 1;

        let frame = match script.replies.pop_front() {
            None => return Err(TransferError::Timeout),
            Some(Reply::Fail(err)) => return Err(err),
            Some(Reply::Raw(frame)) => frame,
            Some(Reply::Message {
                payload,
                end_of_message,
            }) => in_frame(script.last_request_tag, &payload, end_of_message),
        };

        let len = frame.len().min(buffer.len());
        buffer[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }

    fn control_in(
        &self,
        _request: u8,
        _value: u16,
        _buffer: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransferError> {
        Err(TransferError::Stall)
    }
}
