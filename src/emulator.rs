//! ## Emulator
//!
//! An in-memory USBTMC oscilloscope. It speaks the bulk protocol from the
//! device side and understands enough SCPI to be driven by the `scope`
//! profiles: the Tektronix `ACQuire` subsystem, the Keysight `RUN`, `STOP`
//! and `SINGle` commands, `RSTate?` and `*IDN?`.
//!

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use crate::communication::header::{padded_len, MsgHeader, HEADER_SIZE};
use crate::constants::{bulk_msg_id, control_requests, usbtmc_status};
use crate::error::TransferError;
use crate::scope::ScopeState;
use crate::transport::UsbTransport;

pub const DEFAULT_IDENTITY: &str = "PAUL ROUKEMA,TMCEMU,0,01-02";
pub const DEFAULT_MAX_PACKET_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopAfter {
    RunStop,
    Sequence,
}

#[derive(Debug)]
struct Device {
    identity: String,
    open: bool,
    stop_after: StopAfter,
    running: bool,
    output: VecDeque<u8>,
    pending_request: Option<(u8, usize)>,
    commands: Vec<String>,
    bulk_out_count: usize,
    bulk_in_count: usize,
    pulses: usize,
}

/// ### Emulator
///
/// A scope behind a `UsbTransport`. Queries queue their answer, which is
/// handed out in pieces as the host requests DEV_DEP_MSG_IN transfers.
/// A request with no answer queued times out.
///
#[derive(Debug)]
pub struct Emulator {
    max_packet_size: usize,
    device: Mutex<Device>,
}

impl Default for Emulator {
    fn default() -> Self {
        Emulator::new()
    }
}

/// SCPI mnemonic match: the short form (the upper case part of `pattern`)
/// or the whole long form, ignoring case.
fn mnemonic_matches(pattern: &str, word: &str) -> bool {
    let short: String = pattern.chars().filter(char::is_ascii_uppercase).collect();
    word.eq_ignore_ascii_case(&short) || word.eq_ignore_ascii_case(pattern)
}

fn header_matches(pattern: &[&str], header: &[String]) -> bool {
    pattern.len() == header.len()
        && pattern
            .iter()
            .zip(header)
            .all(|(pattern, word)| mnemonic_matches(pattern, word))
}

impl Emulator {
    pub fn new() -> Emulator {
        Emulator {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            device: Mutex::new(Device {
                identity: DEFAULT_IDENTITY.to_string(),
                open: false,
                stop_after: StopAfter::RunStop,
                running: false,
                output: VecDeque::new(),
                pending_request: None,
                commands: Vec::new(),
                bulk_out_count: 0,
                bulk_in_count: 0,
                pulses: 0,
            }),
        }
    }

    /// Answer `*IDN?` with `identity`
    pub fn with_identity(self, identity: &str) -> Emulator {
        self.device.lock().identity = identity.to_string();
        self
    }

    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Emulator {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn acquisition(&self) -> ScopeState {
        let device = self.device.lock();
        match (device.running, device.stop_after) {
            (false, _) => ScopeState::Stopped,
            (true, StopAfter::RunStop) => ScopeState::Running,
            (true, StopAfter::Sequence) => ScopeState::Single,
        }
    }

    pub fn set_acquisition(&self, state: ScopeState) {
        let mut device = self.device.lock();
        match state {
            ScopeState::Stopped => device.running = false,
            ScopeState::Running => {
                device.stop_after = StopAfter::RunStop;
                device.running = true;
            }
            ScopeState::Single => {
                device.stop_after = StopAfter::Sequence;
                device.running = true;
            }
        }
    }

    /// Every message received so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.device.lock().commands.clone()
    }

    pub fn bulk_out_count(&self) -> usize {
        self.device.lock().bulk_out_count
    }

    pub fn bulk_in_count(&self) -> usize {
        self.device.lock().bulk_in_count
    }

    pub fn pulses(&self) -> usize {
        self.device.lock().pulses
    }
}

impl Device {
    /// Execute one program message, queueing the answers of any queries
    fn execute(&mut self, message: &str) {
        self.commands.push(message.to_string());

        let mut answers = Vec::new();
        let mut path: Vec<String> = Vec::new();

        for unit in message.split(';').map(str::trim).filter(|u| !u.is_empty()) {
            let (header, argument) = match unit.split_once(char::is_whitespace) {
                Some((header, argument)) => (header, argument.trim()),
                None => (unit, ""),
            };

            // A header without a leading colon is relative to the previous
            // header's subsystem; common commands are always absolute.
            let mut words: Vec<String> = if header.starts_with(':') || header.starts_with('*') {
                Vec::new()
            } else {
                path.clone()
            };
            words.extend(
                header
                    .trim_start_matches(':')
                    .split(':')
                    .map(str::to_string),
            );
            if !header.starts_with('*') {
                path = words[..words.len() - 1].to_vec();
            }

            if let Some(answer) = self.execute_unit(&words, argument) {
                answers.push(answer);
            }
        }

        if !answers.is_empty() {
            self.output.extend(answers.join(";").bytes());
            self.output.push_back(b'\n');
        }
    }

    fn execute_unit(&mut self, words: &[String], argument: &str) -> Option<String> {
        let query = words
            .last()
            .map_or(false, |word| word.ends_with('?'));
        let words: Vec<String> = words
            .iter()
            .map(|word| word.trim_end_matches('?').to_string())
            .collect();

        let is = |pattern: &[&str]| header_matches(pattern, &words);

        if query {
            if is(&["*IDN"]) {
                return Some(self.identity.clone());
            }
            if is(&["RSTate"]) {
                let state = match (self.running, self.stop_after) {
                    (false, _) => "STOP",
                    (true, StopAfter::RunStop) => "RUN",
                    (true, StopAfter::Sequence) => "SING",
                };
                return Some(state.to_string());
            }
            if is(&["ACQuire", "STOPAfter"]) {
                let mode = match self.stop_after {
                    StopAfter::RunStop => "RUNSTOP",
                    StopAfter::Sequence => "SEQUENCE",
                };
                return Some(mode.to_string());
            }
            if is(&["ACQuire", "STATE"]) {
                return Some(if self.running { "1" } else { "0" }.to_string());
            }
            tracing::debug!(?words, "emulator: unknown query");
            return None;
        }

        if is(&["RUN"]) {
            self.stop_after = StopAfter::RunStop;
            self.running = true;
        } else if is(&["SINGle"]) {
            self.stop_after = StopAfter::Sequence;
            self.running = true;
        } else if is(&["STOP"]) {
            self.running = false;
        } else if is(&["ACQuire", "STATE"]) {
            if mnemonic_matches("RUN", argument) || argument == "1" || mnemonic_matches("ON", argument)
            {
                self.running = true;
            } else if mnemonic_matches("STOP", argument)
                || argument == "0"
                || mnemonic_matches("OFF", argument)
            {
                self.running = false;
            }
        } else if is(&["ACQuire", "STOPAfter"]) {
            if mnemonic_matches("RUNSTop", argument) {
                self.stop_after = StopAfter::RunStop;
            } else if mnemonic_matches("SEQuence", argument) {
                self.stop_after = StopAfter::Sequence;
            }
        } else {
            tracing::debug!(?words, "emulator: unknown command");
        }
        None
    }
}

impl UsbTransport for Emulator {
    fn open_endpoints(&self) -> Result<(), TransferError> {
        self.device.lock().open = true;
        Ok(())
    }

    fn close_endpoints(&self) {
        let mut device = self.device.lock();
        device.open = false;
        device.pending_request = None;
    }

    fn max_packet_size_out(&self) -> usize {
        self.max_packet_size
    }

    fn bulk_out(&self, data: &[u8], _timeout: Duration) -> Result<usize, TransferError> {
        let mut device = self.device.lock();
        if !device.open {
            return Err(TransferError::Disconnected);
        }
        device.bulk_out_count += 1;

        if data.len() > self.max_packet_size {
            return Err(TransferError::Stall);
        }
        let header = MsgHeader::decode(data).ok_or(TransferError::Stall)?;
        if !header.tag_is_consistent() {
            return Err(TransferError::Stall);
        }
        let size = header.transfer_size as usize;

        match header.msg_id {
            bulk_msg_id::DEVICE_DEPENDENT_MSG_OUT => {
                if data.len() != HEADER_SIZE + padded_len(size) || !header.end_of_message() {
                    return Err(TransferError::Stall);
                }
                let payload = String::from_utf8_lossy(&data[HEADER_SIZE..HEADER_SIZE + size]);
                device.execute(&payload);
            }
            bulk_msg_id::REQUEST_DEVICE_DEPENDENT_MSG_IN => {
                if data.len() != HEADER_SIZE {
                    return Err(TransferError::Stall);
                }
                device.pending_request = Some((header.tag, size));
            }
            _ => return Err(TransferError::Stall),
        }

        Ok(data.len())
    }

    fn bulk_in(&self, buffer: &mut [u8], _timeout: Duration) -> Result<usize, TransferError> {
        let mut device = self.device.lock();
        if !device.open {
            return Err(TransferError::Disconnected);
        }
        device.bulk_in_count += 1;

        let (tag, requested) = device.pending_request.take().ok_or(TransferError::Timeout)?;
        if device.output.is_empty() {
            return Err(TransferError::Timeout);
        }

        let room = buffer.len().saturating_sub(HEADER_SIZE);
        let size = requested.min(room).min(device.output.len());
        let end_of_message = size == device.output.len();

        let header = MsgHeader::dev_dep_msg_in(tag, size as u32, end_of_message);
        buffer[..HEADER_SIZE].copy_from_slice(&header.encode());
        for (slot, byte) in buffer[HEADER_SIZE..HEADER_SIZE + size]
            .iter_mut()
            .zip(device.output.drain(..size))
        {
            *slot = byte;
        }

        let len = (HEADER_SIZE + padded_len(size)).min(buffer.len());
        buffer[HEADER_SIZE + size..len].fill(0x00);
        Ok(len)
    }

    fn control_in(
        &self,
        request: u8,
        _value: u16,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransferError> {
        match request {
            control_requests::GET_CAPABILITIES => {
                let response: [u8; 6] = [
                    usbtmc_status::STATUS_SUCCESS,
                    0x00,
                    0x00,
                    0x01,
                    0b0000_0100,
                    0x00,
                ];
                let len = response.len().min(buffer.len());
                buffer[..len].copy_from_slice(&response[..len]);
                Ok(len)
            }
            control_requests::INDICATOR_PULSE => {
                self.device.lock().pulses += 1;
                let Some(status) = buffer.first_mut() else {
                    return Ok(0);
                };
                *status = usbtmc_status::STATUS_SUCCESS;
                Ok(1)
            }
            _ => Err(TransferError::Stall),
        }
    }
}
