use crate::channel::{ControlChannel, ControlTransport};
use crate::error::Result;
use std::path::Path;
use ultimarc_types::{DeviceClass, ResourceType};

pub mod mini_pac;
pub mod usb_button;

use mini_pac::MiniPac;
use usb_button::UsbButton;

/// What every board driver provides, regardless of what the board itself can do.
pub trait UltimarcDriver<'a, T: ControlTransport + ?Sized>: Sized {
    const CLASS: DeviceClass;

    /// Resource types this board will accept in a config file.
    const RESOURCE_TYPES: &'static [ResourceType];

    fn open(channel: ControlChannel<'a, T>) -> Self;

    fn class_id(&self) -> &'static str {
        Self::CLASS.class_id()
    }

    fn class_description(&self) -> &'static str {
        Self::CLASS.description()
    }

    /// Validates the config file at `path` and writes it to the board.
    fn set_config(&self, path: &Path) -> Result<()>;
}

/// A driver for whichever class an opened device turned out to be.
pub enum BoardDriver<'a, T: ControlTransport + ?Sized> {
    UsbButton(UsbButton<'a, T>),
    MiniPac(MiniPac<'a, T>),
}

impl<'a, T: ControlTransport + ?Sized> BoardDriver<'a, T> {
    pub fn for_class(class: DeviceClass, channel: ControlChannel<'a, T>) -> Self {
        match class {
            DeviceClass::UsbButton => BoardDriver::UsbButton(UsbButton::open(channel)),
            DeviceClass::MiniPac => BoardDriver::MiniPac(MiniPac::open(channel)),
        }
    }

    pub fn class(&self) -> DeviceClass {
        match self {
            BoardDriver::UsbButton(_) => DeviceClass::UsbButton,
            BoardDriver::MiniPac(_) => DeviceClass::MiniPac,
        }
    }

    pub fn set_config(&self, path: &Path) -> Result<()> {
        match self {
            BoardDriver::UsbButton(driver) => driver.set_config(path),
            BoardDriver::MiniPac(driver) => driver.set_config(path),
        }
    }
}

pub fn interface_for(class: DeviceClass) -> u8 {
    match class {
        DeviceClass::UsbButton => usb_button::USBB_INTERFACE,
        DeviceClass::MiniPac => mini_pac::MINIPAC_INTERFACE,
    }
}
