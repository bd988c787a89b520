//! ## Initialization
//!
//! Finding a USBTMC interface on the bus and the endpoints it exposes.
//!

use crate::{
    constants::usb::*,
    error::Error,
    types::{DeviceAddr, DeviceId, DeviceInfo, DeviceMode, Endpoint, UsbtmcEndpoints},
    DeviceFilter,
};

use anyhow::Result;
use rusb::{
    ConfigDescriptor, Context, Device, DeviceDescriptor, DeviceHandle, Direction,
    InterfaceDescriptor, TransferType, UsbContext,
};

/// Get first found TMC device
impl DeviceFilter for () {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        true
    }
}

/// Get TMC device by USB device address
impl DeviceFilter for DeviceAddr {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        self.bus == device.bus_number() && self.device == device.address()
    }
}

/// Get TMC device by USB identifiers
impl DeviceFilter for DeviceId {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.vendor_id == device_desc.vendor_id() && self.product_id == device_desc.product_id()
    }
}

/// Get TMC device by USB identifiers (idVendor, idProduct)
impl DeviceFilter for (u16, u16) {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.0 == device_desc.vendor_id() && self.1 == device_desc.product_id()
    }
}

/// Get TMC device by info (both USB identifiers and address)
impl DeviceFilter for DeviceInfo {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.id.apply_filter(device, device_desc) && self.address.apply_filter(device, device_desc)
    }
}

/// Allow apply filter by reference
impl<T: DeviceFilter> DeviceFilter for &T {
    fn apply_filter<X: UsbContext>(
        &self,
        device: &Device<X>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        (**self).apply_filter(device, device_desc)
    }
}

/// Plain USBTMC and USB488 interfaces are both driven the same way
fn is_tmc_interface(interface_desc: &InterfaceDescriptor) -> bool {
    interface_desc.class_code() == USBTMC_CLASS_CODE
        && interface_desc.sub_class_code() == USBTMC_SUBCLASS_CODE
        && (interface_desc.protocol_code() == USBTMC_PROTOCOL_CODE
            || interface_desc.protocol_code() == USB488_PROTOCOL_CODE)
}

fn is_tmc_device<T: UsbContext>(device: &Device<T>, device_desc: &DeviceDescriptor) -> bool {
    (0..device_desc.num_configurations()).any(|config_no| {
        device.config_descriptor(config_no).is_ok_and(|config_desc| {
            config_desc
                .interfaces()
                .any(|interface| interface.descriptors().any(|d| is_tmc_interface(&d)))
        })
    })
}

/// ### List Devices
///
/// List all TMC devices using a libusb context.
///
pub fn list_devices<T: UsbContext>(context: &mut T) -> Result<Vec<DeviceInfo>> {
    Ok(context
        .devices()?
        .iter()
        .filter_map(|device| {
            let device_desc = device.device_descriptor().ok()?;
            is_tmc_device(&device, &device_desc).then(|| DeviceInfo {
                id: DeviceId {
                    vendor_id: device_desc.vendor_id(),
                    product_id: device_desc.product_id(),
                },
                address: DeviceAddr {
                    bus: device.bus_number(),
                    device: device.address(),
                },
            })
        })
        .collect())
}

/// ### Open Device
///
/// Open the first TMC device accepted by `filter`.
///
pub fn open_device<T: UsbContext>(
    context: &mut T,
    filter: impl DeviceFilter,
) -> Result<(Device<T>, DeviceHandle<T>)> {
    for device in context.devices()?.iter() {
        let Ok(device_desc) = device.device_descriptor() else {
            continue;
        };
        if !is_tmc_device(&device, &device_desc) || !filter.apply_filter(&device, &device_desc) {
            continue;
        }
        match device.open() {
            Ok(handle) => return Ok((device, handle)),
            Err(err) => tracing::debug!(
                bus = device.bus_number(),
                address = device.address(),
                %err,
                "skipping device that cannot be opened"
            ),
        }
    }

    Err(Error::DeviceNotFound.into())
}

/// ### Get USBTMC Mode
///
/// Get the first configuration, interface and interface setting that is compatible with USBTMC.
///
pub fn get_usbtmc_mode(device: &Device<Context>) -> Result<DeviceMode> {
    let device_desc = device.device_descriptor()?;

    for n in 0..device_desc.num_configurations() {
        let config_desc = device.config_descriptor(n)?;
        for interface in config_desc.interfaces() {
            if let Some(interface_desc) = interface.descriptors().find(is_tmc_interface) {
                return Ok(DeviceMode {
                    config_number: config_desc.number(),
                    interface_number: interface_desc.interface_number(),
                    setting_number: interface_desc.setting_number(),
                    has_kernel_driver: false,
                });
            }
        }
    }

    Err(Error::DeviceIncompatible.into())
}

/// ### Detach Kernel Driver
///
/// If the interface uses a kernel driver, detach it for the duration of the program.
///
pub fn detach_kernel_driver(
    mode: &mut DeviceMode,
    handle: &mut DeviceHandle<Context>,
) -> Result<()> {
    mode.has_kernel_driver = match handle.kernel_driver_active(mode.interface_number) {
        Ok(true) => {
            handle.detach_kernel_driver(mode.interface_number)?;
            true
        }
        _ => false,
    };

    Ok(())
}

fn find_config(device: &Device<Context>, config_number: u8) -> Result<ConfigDescriptor> {
    let device_desc = device.device_descriptor()?;
    for n in 0..device_desc.num_configurations() {
        let config_desc = device.config_descriptor(n)?;
        if config_desc.number() == config_number {
            return Ok(config_desc);
        }
    }
    Err(Error::DeviceIncompatible.into())
}

/// ### Get Endpoints
///
/// Locate the bulk and interrupt endpoints of the selected interface setting.
///
pub fn get_endpoints(mode: &DeviceMode, device: &Device<Context>) -> Result<UsbtmcEndpoints> {
    let config_desc = find_config(device, mode.config_number)?;

    let interface = config_desc
        .interfaces()
        .find(|inter| inter.number() == mode.interface_number)
        .ok_or(Error::InterfaceNotFound)?;
    let interface_desc = interface
        .descriptors()
        .find(|d| d.setting_number() == mode.setting_number)
        .ok_or(Error::InterfaceSettingNotFound)?;

    let endpoints: Vec<Endpoint> = interface_desc
        .endpoint_descriptors()
        .map(|endpoint| Endpoint {
            address: endpoint.address(),
            max_packet_size: endpoint.max_packet_size(),
            transfer_type: endpoint.transfer_type(),
            direction: endpoint.direction(),
        })
        .collect();

    let find = |transfer_type: TransferType, direction: Direction| {
        endpoints
            .iter()
            .find(|ep| ep.transfer_type == transfer_type && ep.direction == direction)
            .cloned()
    };

    for ep in &endpoints {
        tracing::debug!(
            address = ep.address,
            transfer_type = ?ep.transfer_type,
            max_packet_size = ep.max_packet_size,
            "endpoint found"
        );
    }

    Ok(UsbtmcEndpoints {
        bulk_out_ep: find(TransferType::Bulk, Direction::Out).ok_or(Error::BulkOutEndpointNotFound)?,
        bulk_in_ep: find(TransferType::Bulk, Direction::In).ok_or(Error::BulkInEndpointNotFound)?,
        interrupt_ep: find(TransferType::Interrupt, Direction::In),
    })
}
