//! ## Session
//!
//! One attached instrument. A session owns the transport, the tag counter
//! and the scratch buffers, and lets exactly one request/response exchange
//! run at a time.
//!

use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use crate::communication::bulk::{self, Exchange};
use crate::communication::control;
use crate::config::SessionConfig;
use crate::constants::misc;
use crate::error::Error;
use crate::transport::{RusbTransport, UsbTransport};
use crate::types::{Capabilities, SessionState};
use crate::DeviceFilter;

/// ### Session
///
/// Connection to a USBTMC instrument.
///
/// `write`, `read` and `ask` return the number of bytes transferred and 0
/// on any failure, the reason being logged. The `try_` forms return the
/// error instead.
///
#[derive(Debug)]
pub struct Session<T: UsbTransport> {
    transport: T,
    config: SessionConfig,
    exchange: Mutex<Exchange>,
}

impl Session<RusbTransport> {
    /// ### Connect
    ///
    /// Open the first USBTMC device accepted by `filter`. The session comes
    /// back Active; call `start` before exchanging messages.
    ///
    pub fn connect(filter: impl DeviceFilter, config: SessionConfig) -> Result<Self> {
        Ok(Session::new(RusbTransport::connect(filter)?, config))
    }
}

impl<T: UsbTransport> Session<T> {
    /// Create an Active session on a recognized interface.
    pub fn new(transport: T, mut config: SessionConfig) -> Session<T> {
        config.buffer_size = config
            .buffer_size
            .max(misc::USBTMC_HEADER_SIZE + misc::TRANSFER_ALIGNMENT);
        let exchange = Mutex::new(Exchange::new(config.buffer_size));

        Session {
            transport,
            config,
            exchange,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        self.exchange.lock().state
    }

    /// The tag most recently put on the wire, 0 before the first transfer
    pub fn last_tag(&self) -> u8 {
        self.exchange.lock().tag.last()
    }

    /// ### Start
    ///
    /// Open the endpoints. Active becomes Ready; a Ready session is left alone.
    ///
    pub fn start(&self) -> Result<(), Error> {
        let mut exchange = self.exchange.lock();
        match exchange.state {
            SessionState::Ready => Ok(()),
            SessionState::Active => {
                self.transport.open_endpoints()?;
                exchange.state = SessionState::Ready;
                tracing::info!("TMC session ready");
                Ok(())
            }
            _ => Err(Error::NotReady),
        }
    }

    fn stop_locked(&self, exchange: &mut Exchange) {
        if exchange.state != SessionState::Ready {
            return;
        }
        self.transport.close_endpoints();
        exchange.state = SessionState::Active;
    }

    /// ### Stop
    ///
    /// Close the endpoints. Ready goes back to Active.
    ///
    pub fn stop(&self) {
        let mut exchange = self.exchange.lock();
        self.stop_locked(&mut exchange);
        tracing::info!("TMC session stopped");
    }

    /// ### Unload
    ///
    /// The interface went away. Closes the endpoints if open; no further
    /// exchange is possible.
    ///
    pub fn unload(&self) {
        let mut exchange = self.exchange.lock();
        self.stop_locked(&mut exchange);
        exchange.state = SessionState::Stopped;
        tracing::info!("TMC session unloaded");
    }

    /// Send `data` as one message. See `write`.
    pub fn try_write(&self, data: &[u8], timeout: Duration) -> Result<usize, Error> {
        let mut exchange = self.exchange.lock();
        bulk::write(&self.transport, &mut exchange, data, timeout)
    }

    /// Read one message into `output`. See `read`.
    pub fn try_read(&self, output: &mut [u8], timeout: Duration) -> Result<usize, Error> {
        let mut exchange = self.exchange.lock();
        bulk::read(&self.transport, &mut exchange, &self.config, output, timeout)
    }

    /// ### Try Ask
    ///
    /// Write `query` and read the answer without releasing the lock in
    /// between. The read is not attempted if the write fails.
    ///
    pub fn try_ask(&self, query: &[u8], answer: &mut [u8], timeout: Duration) -> Result<usize, Error> {
        let mut exchange = self.exchange.lock();
        bulk::write(&self.transport, &mut exchange, query, timeout)?;
        bulk::read(&self.transport, &mut exchange, &self.config, answer, timeout)
    }

    /// ### Write
    ///
    /// Send `data` as a single DEV_DEP_MSG_OUT message. `data` plus the
    /// 12 byte header must fit in one BULK OUT packet.
    ///
    /// Returns `data.len()`, or 0 on failure.
    ///
    pub fn write(&self, data: &[u8], timeout: Duration) -> usize {
        self.try_write(data, timeout).unwrap_or_else(|err| {
            tracing::warn!(%err, "TMC write failed");
            0
        })
    }

    /// ### Read
    ///
    /// Read a message into `output` until EOM or until `output` is full.
    /// `timeout` bounds each transfer, not the whole read.
    ///
    /// Returns the number of bytes read, or 0 on failure.
    ///
    pub fn read(&self, output: &mut [u8], timeout: Duration) -> usize {
        self.try_read(output, timeout).unwrap_or_else(|err| {
            tracing::warn!(%err, "TMC read failed");
            0
        })
    }

    /// ### Ask
    ///
    /// `write` followed by `read` as one exchange.
    ///
    /// Returns the number of answer bytes, or 0 on failure.
    ///
    pub fn ask(&self, query: &[u8], answer: &mut [u8], timeout: Duration) -> usize {
        self.try_ask(query, answer, timeout).unwrap_or_else(|err| {
            tracing::warn!(%err, "TMC ask failed");
            0
        })
    }

    pub fn indicator_pulse(&self) -> Result<(), Error> {
        control::indicator_pulse(&self.transport, self.config.default_timeout)
    }

    pub fn get_capabilities(&self) -> Result<Capabilities, Error> {
        control::get_capabilities(&self.transport, self.config.default_timeout)
    }
}

impl<T: UsbTransport> Drop for Session<T> {
    fn drop(&mut self) {
        let exchange = self.exchange.get_mut();
        if exchange.state == SessionState::Ready {
            self.transport.close_endpoints();
            exchange.state = SessionState::Active;
        }
    }
}
