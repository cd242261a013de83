use crate::channel::{ControlChannel, DeviceContext};
use crate::drivers::mini_pac::MiniPac;
use crate::drivers::usb_button::UsbButton;
use crate::drivers::{interface_for, BoardDriver, UltimarcDriver};
use crate::error::{ConnectError, Result, UltimarcError};
use log::{debug, info, warn};
use rusb::{Device, DeviceDescriptor, DeviceHandle, GlobalContext};
use std::fmt::Formatter;
use std::time::Duration;
use strum::IntoEnumIterator;
use ultimarc_types::DeviceClass;

pub const VID_ULTIMARC: u16 = 0xd209;
pub const PID_USB_BUTTON: u16 = 0x1200;
pub const PID_MINI_PAC: u16 = 0x0440;

// The low bits of the product id carry the board id (set by jumper / firmware), not the model.
const PID_BOARD_MASK: u16 = 0xfff8;

fn product_id_for(class: DeviceClass) -> u16 {
    match class {
        DeviceClass::UsbButton => PID_USB_BUTTON,
        DeviceClass::MiniPac => PID_MINI_PAC,
    }
}

pub fn class_for_product(vendor_id: u16, product_id: u16) -> Option<DeviceClass> {
    if vendor_id != VID_ULTIMARC {
        return None;
    }
    DeviceClass::iter().find(|class| product_id_for(*class) == product_id & PID_BOARD_MASK)
}

/// An attached board, as found on the bus. Nothing is opened until `open` is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UltimarcDevice {
    pub(crate) bus_number: u8,
    pub(crate) address: u8,
    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
    pub(crate) class: DeviceClass,
}

impl UltimarcDevice {
    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }
    pub fn address(&self) -> u8 {
        self.address
    }
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
    pub fn product_id(&self) -> u16 {
        self.product_id
    }
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn dev_key(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }

    /// Opens the board for a sequence of operations. The handle is closed, and the interface
    /// released, when the returned session is dropped.
    pub fn open(&self, timeout: Duration) -> Result<DeviceSession, ConnectError> {
        DeviceSession::open(self.clone(), timeout)
    }
}

impl std::fmt::Display for UltimarcDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({},{})",
            self.dev_key(),
            self.bus_number,
            self.address
        )
    }
}

pub fn find_devices() -> Vec<UltimarcDevice> {
    let mut found_devices: Vec<UltimarcDevice> = Vec::new();

    if let Ok(devices) = rusb::devices() {
        for device in devices.iter() {
            if let Ok(descriptor) = device.device_descriptor() {
                let vendor_id = descriptor.vendor_id();
                let product_id = descriptor.product_id();

                if let Some(class) = class_for_product(vendor_id, product_id) {
                    found_devices.push(UltimarcDevice {
                        bus_number: device.bus_number(),
                        address: device.address(),
                        vendor_id,
                        product_id,
                        class,
                    });
                }
            }
        }
    }

    found_devices
}

/// Narrows a device list by class, and optionally by bus and address.
pub fn filter(
    devices: &[UltimarcDevice],
    class: Option<DeviceClass>,
    bus: Option<u8>,
    address: Option<u8>,
) -> Vec<UltimarcDevice> {
    devices
        .iter()
        .filter(|d| class.is_none_or(|c| d.class == c))
        .filter(|d| bus.is_none_or(|b| d.bus_number == b))
        .filter(|d| address.is_none_or(|a| d.address == a))
        .cloned()
        .collect()
}

pub struct UsbData {
    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
    pub(crate) device_version: (u8, u8, u8),
    pub(crate) device_manufacturer: Option<String>,
    pub(crate) product_name: Option<String>,
    pub(crate) serial_number: Option<String>,
}

impl UsbData {
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
    pub fn product_id(&self) -> u16 {
        self.product_id
    }
    pub fn device_version(&self) -> (u8, u8, u8) {
        self.device_version
    }
    pub fn device_manufacturer(&self) -> Option<String> {
        self.device_manufacturer.clone()
    }
    pub fn product_name(&self) -> Option<String> {
        self.product_name.clone()
    }
    pub fn serial_number(&self) -> Option<String> {
        self.serial_number.clone()
    }
}

/// An opened board. Owns the libusb handle exclusively, so one session is one sequence of
/// operations from one thread.
pub struct DeviceSession {
    handle: DeviceHandle<GlobalContext>,
    descriptor: DeviceDescriptor,
    device: UltimarcDevice,
    context: DeviceContext,
    interface: u8,
    interface_claimed: bool,
}

impl DeviceSession {
    fn find_device(
        device: &UltimarcDevice,
    ) -> Result<(Device<GlobalContext>, DeviceDescriptor), ConnectError> {
        for usb_device in rusb::devices()?.iter() {
            if usb_device.bus_number() == device.bus_number
                && usb_device.address() == device.address
            {
                let descriptor = usb_device.device_descriptor()?;
                return Ok((usb_device, descriptor));
            }
        }
        Err(ConnectError::DeviceNotFound)
    }

    fn open(device: UltimarcDevice, timeout: Duration) -> Result<Self, ConnectError> {
        let (usb_device, descriptor) = Self::find_device(&device)?;
        if class_for_product(descriptor.vendor_id(), descriptor.product_id()) != Some(device.class)
        {
            return Err(ConnectError::UnsupportedDevice {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
            });
        }

        let mut handle = usb_device.open()?;
        info!("Connected to {} device at {}", device.class, device);

        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", e);
        }

        let interface = interface_for(device.class);
        let interface_claimed = handle.claim_interface(interface).is_ok();
        if !interface_claimed {
            warn!("Unable to claim interface {} on {}", interface, device);
        }

        let context = DeviceContext::new(device.to_string()).with_timeout(timeout);
        Ok(Self {
            handle,
            descriptor,
            device,
            context,
            interface,
            interface_claimed,
        })
    }

    pub fn device(&self) -> &UltimarcDevice {
        &self.device
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    pub fn channel(&self) -> ControlChannel<'_, DeviceHandle<GlobalContext>> {
        ControlChannel::new(&self.handle, &self.context)
    }

    pub fn driver(&self) -> BoardDriver<'_, DeviceHandle<GlobalContext>> {
        BoardDriver::for_class(self.device.class, self.channel())
    }

    pub fn usb_button(&self) -> Result<UsbButton<'_, DeviceHandle<GlobalContext>>> {
        self.ensure_class(DeviceClass::UsbButton)?;
        Ok(UsbButton::open(self.channel()))
    }

    pub fn mini_pac(&self) -> Result<MiniPac<'_, DeviceHandle<GlobalContext>>> {
        self.ensure_class(DeviceClass::MiniPac)?;
        Ok(MiniPac::open(self.channel()))
    }

    fn ensure_class(&self, class: DeviceClass) -> Result<()> {
        if self.device.class != class {
            return Err(UltimarcError::DeviceClassMismatch {
                expected: class.to_string(),
                found: self.device.class.to_string(),
            });
        }
        Ok(())
    }

    fn read_string(&self, name: &str, result: rusb::Result<String>) -> Option<String> {
        string_or_none(&self.device, name, result)
    }

    pub fn get_descriptor(&self) -> UsbData {
        let version = self.descriptor.device_version();

        let device_manufacturer = self.read_string(
            "manufacturer",
            self.handle
                .read_manufacturer_string_ascii(&self.descriptor),
        );
        let product_name = self.read_string(
            "product",
            self.handle.read_product_string_ascii(&self.descriptor),
        );
        let serial_number = self.read_string(
            "serial number",
            self.handle.read_serial_number_string_ascii(&self.descriptor),
        );

        UsbData {
            vendor_id: self.descriptor.vendor_id(),
            product_id: self.descriptor.product_id(),
            device_version: (version.0, version.1, version.2),
            device_manufacturer,
            product_name,
            serial_number,
        }
    }

    /// Reads the ASCII string descriptor at `index`.
    pub fn get_descriptor_string(&self, index: u8) -> Option<String> {
        self.read_string("descriptor", self.handle.read_string_descriptor_ascii(index))
    }
}

fn string_or_none(
    device: &UltimarcDevice,
    name: &str,
    result: rusb::Result<String>,
) -> Option<String> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Failed to get {} string from {}: {}", name, device, e);
            None
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.interface_claimed {
            if let Err(e) = self.handle.release_interface(self.interface) {
                debug!("Failed to release interface on {}: {}", self.device, e);
            }
        }
        debug!("Closed device {}", self.device);
    }
}
