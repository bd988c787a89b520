//! # Scope TMC
//!
//! USBTMC transport and oscilloscope control for a footswitch bridge.
//!
//! The crate has three layers:
//!
//! - a bulk message engine (`Session`) that frames DEV_DEP_MSG_OUT messages,
//!   reads DEV_DEP_MSG_IN replies chunk by chunk and serializes exchanges;
//! - a tokenizer for the comma/semicolon separated replies of instruments;
//! - a `scope` layer that identifies the instrument and maps run, stop and
//!   single onto the command dialect of its vendor.
//!
//! Only single packet OUT messages are supported, there is no abort/clear
//! recovery and the interrupt endpoint is not read.
//!
//! ## Example
//!
//! ```no_run
//! use scope_tmc::{scope, ScopeState, Session, SessionConfig};
//!
//! const DEVICE_VID: u16 = 0x0699;
//! const DEVICE_PID: u16 = 0x0410;
//!
//! fn main() -> anyhow::Result<()> {
//!     // connect to the device and open its endpoints
//!     let session = Session::connect((DEVICE_VID, DEVICE_PID), SessionConfig::default())?;
//!     session.start()?;
//!
//!     // find out which command dialect it speaks
//!     let profile = scope::detect(&session).ok_or_else(|| anyhow::anyhow!("unknown scope"))?;
//!
//!     // toggle between running and stopped
//!     let next = match scope::get_state(&session, profile)? {
//!         ScopeState::Stopped => ScopeState::Running,
//!         _ => ScopeState::Stopped,
//!     };
//!     scope::set_state(&session, profile, next)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Without hardware, `emulator::Emulator` stands in for the transport.
//!

mod constants;
mod error;
mod init;
mod types;
pub mod communication {
    pub(crate) mod bulk;
    pub(crate) mod control;
    pub mod header;
}
pub mod config;
pub mod emulator;
pub mod scope;
pub mod session;
pub mod tokenizer;
pub mod transport;

use rusb::DeviceDescriptor;

pub use config::{SessionConfig, TagPolicy};
pub use constants::misc::{DEFAULT_BUFFER_SIZE, DEFAULT_TIMEOUT_DURATION};
pub use error::{Error, FramingError, ScopeError, TransferError};
pub use scope::{Identity, InstrumentProfile, ScopeState};
pub use session::Session;
pub use transport::{RusbTransport, UsbTransport};
pub use types::{Capabilities, DeviceAddr, DeviceId, DeviceInfo, SessionState};

/// Device filter
pub trait DeviceFilter {
    fn apply_filter<T: rusb::UsbContext>(
        &self,
        device: &rusb::Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool;
}

/// ### TMC devices
///
/// Get a list of the USB devices with a USBTMC interface.
///
pub fn devices() -> anyhow::Result<Vec<DeviceInfo>> {
    let mut context = rusb::Context::new()?;

    init::list_devices(&mut context)
}
