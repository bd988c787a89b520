//! ## Transport
//!
//! The USB primitives a `Session` is built on. The session never talks to
//! libusb directly; it is handed something implementing `UsbTransport`.
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use parking_lot::RwLock;
use rusb::{Context, DeviceHandle, Direction};

use crate::error::TransferError;
use crate::types::{DeviceMode, UsbtmcEndpoints};
use crate::{init, DeviceFilter};

/// ### USB Transport
///
/// Bulk and control transfer primitives of one USBTMC interface.
///
/// All methods take `&self`: control requests may be issued while a bulk
/// exchange is in flight on another thread.
///
pub trait UsbTransport {
    /// Open the bulk endpoints of the interface
    fn open_endpoints(&self) -> Result<(), TransferError>;

    /// Close the endpoints opened by `open_endpoints`
    fn close_endpoints(&self);

    /// wMaxPacketSize of the BULK OUT endpoint
    fn max_packet_size_out(&self) -> usize;

    /// Send `data` on the BULK OUT endpoint, returning the bytes sent
    fn bulk_out(&self, data: &[u8], timeout: Duration) -> Result<usize, TransferError>;

    /// Receive one transfer from the BULK IN endpoint into `buffer`
    fn bulk_in(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, TransferError>;

    /// Class IN request addressed to the interface, returning the bytes received
    fn control_in(
        &self,
        request: u8,
        value: u16,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransferError>;
}

/// ### Rusb Transport
///
/// `UsbTransport` over a libusb device handle.
///
#[derive(Debug)]
pub struct RusbTransport {
    handle: RwLock<DeviceHandle<Context>>,
    mode: DeviceMode,
    endpoints: UsbtmcEndpoints,
    claimed: AtomicBool,
}

impl RusbTransport {
    /// ### Connect
    ///
    /// Open the first USBTMC device accepted by `filter` and select its
    /// configuration. The interface is claimed later by `open_endpoints`.
    ///
    pub fn connect(filter: impl DeviceFilter) -> Result<RusbTransport> {
        // setup context
        let mut context = Context::new()?;
        // attempt to open the device
        let (device, mut handle) = init::open_device(&mut context, filter)?;

        // get the mode
        let mut mode = init::get_usbtmc_mode(&device)?;
        // detach kernel driver if it is used
        init::detach_kernel_driver(&mut mode, &mut handle)?;

        let endpoints = init::get_endpoints(&mode, &device)?;

        handle.set_active_configuration(mode.config_number)?;

        tracing::info!(
            interface = mode.interface_number,
            bulk_out = endpoints.bulk_out_ep.address,
            bulk_in = endpoints.bulk_in_ep.address,
            "USBTMC interface found"
        );

        Ok(RusbTransport {
            handle: RwLock::new(handle),
            mode,
            endpoints,
            claimed: AtomicBool::new(false),
        })
    }

    pub fn endpoints(&self) -> &UsbtmcEndpoints {
        &self.endpoints
    }

    fn release(&self) {
        if !self.claimed.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self
            .handle
            .write()
            .release_interface(self.mode.interface_number)
        {
            tracing::warn!(%err, "failed to release device usb interface");
        }
    }
}

impl UsbTransport for RusbTransport {
    fn open_endpoints(&self) -> Result<(), TransferError> {
        let mut handle = self.handle.write();

        handle.claim_interface(self.mode.interface_number)?;
        self.claimed.store(true, Ordering::Release);
        handle.set_alternate_setting(self.mode.interface_number, self.mode.setting_number)?;
        handle.clear_halt(self.endpoints.bulk_out_ep.address)?;
        handle.clear_halt(self.endpoints.bulk_in_ep.address)?;

        Ok(())
    }

    fn close_endpoints(&self) {
        self.release();
    }

    fn max_packet_size_out(&self) -> usize {
        usize::from(self.endpoints.bulk_out_ep.max_packet_size)
    }

    fn bulk_out(&self, data: &[u8], timeout: Duration) -> Result<usize, TransferError> {
        Ok(self
            .handle
            .read()
            .write_bulk(self.endpoints.bulk_out_ep.address, data, timeout)?)
    }

    fn bulk_in(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, TransferError> {
        Ok(self
            .handle
            .read()
            .read_bulk(self.endpoints.bulk_in_ep.address, buffer, timeout)?)
    }

    fn control_in(
        &self,
        request: u8,
        value: u16,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransferError> {
        let bm_request_type = rusb::request_type(
            Direction::In,
            rusb::RequestType::Class,
            rusb::Recipient::Interface,
        );
        let w_index = u16::from(self.mode.interface_number);

        Ok(self.handle.read().read_control(
            bm_request_type,
            request,
            value,
            w_index,
            buffer,
            timeout,
        )?)
    }
}

impl Drop for RusbTransport {
    fn drop(&mut self) {
        self.release();
        // Reattach the kernel driver if it was disconnected
        if self.mode.has_kernel_driver {
            if let Err(err) = self
                .handle
                .get_mut()
                .attach_kernel_driver(self.mode.interface_number)
            {
                tracing::warn!(%err, "failed to attach kernel driver to usb device");
            }
        }
    }
}
