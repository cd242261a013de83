use crate::channel::{
    report_value, ControlChannel, ControlTransport, SetupPacket, REPORT_TYPE_OUT,
};
use crate::config::{validate_base, validate_resource, ButtonColorConfig, Schema};
use crate::drivers::UltimarcDriver;
use crate::error::{Result, UltimarcError};
use crate::layout::{ColorPayload, COLOR_PAYLOAD_SIZE};
use log::{debug, error, info};
use rusb::Direction;
use std::path::Path;
use ultimarc_types::{DeviceClass, ResourceType, Rgb};

pub const USBB_GET_COLOR: u8 = 0x01;
pub const USBB_SET_COLOR: u8 = 0x09;
pub const USBB_REPORT_ID: u8 = 0x00;
pub const USBB_INDEX: u16 = 0x0000;
pub const USBB_INTERFACE: u8 = 0;

/// The button NAKs reads for a while after being opened, so colour reads are attempted this many
/// times (back to back) before giving up.
pub const COLOR_READ_ATTEMPTS: usize = 20;

pub struct UsbButton<'a, T: ControlTransport + ?Sized> {
    channel: ControlChannel<'a, T>,
}

impl<'a, T: ControlTransport + ?Sized> UltimarcDriver<'a, T> for UsbButton<'a, T> {
    const CLASS: DeviceClass = DeviceClass::UsbButton;
    const RESOURCE_TYPES: &'static [ResourceType] = &[ResourceType::UsbButtonColor];

    fn open(channel: ControlChannel<'a, T>) -> Self {
        Self { channel }
    }

    fn set_config(&self, path: &Path) -> Result<()> {
        let config = validate_base(path, Self::RESOURCE_TYPES)?;
        config.ensure_device_class(Self::CLASS)?;

        match config.resource_type() {
            ResourceType::UsbButtonColor => {
                validate_resource(&config, Schema::UsbButtonColor)?;
                let colour: ButtonColorConfig = config.extract()?;
                self.set_rgb(colour.color_rgb)
            }
        }
    }
}

impl<T: ControlTransport + ?Sized> UsbButton<'_, T> {
    /// Sets the button colour, each channel must be within 0 - 255.
    pub fn set_color(&self, red: i64, green: i64, blue: i64) -> Result<()> {
        let channel = |name: &str, value: i64| {
            u8::try_from(value).map_err(|_| {
                UltimarcError::InvalidArgument(format!(
                    "Color argument value is invalid ({}: {})",
                    name, value
                ))
            })
        };
        let colour = Rgb::new(
            channel("red", red)?,
            channel("green", green)?,
            channel("blue", blue)?,
        );
        self.set_rgb(colour)
    }

    pub fn set_rgb(&self, colour: Rgb) -> Result<()> {
        let payload = ColorPayload(colour).to_bytes();
        self.channel.write_report(
            USBB_SET_COLOR,
            REPORT_TYPE_OUT,
            USBB_REPORT_ID,
            USBB_INDEX,
            &payload,
        )?;
        info!(
            "{}: Set button colour to {}",
            self.channel.context().dev_key(),
            colour
        );
        Ok(())
    }

    /// Reads the current colour, returning `None` if the button never answered. Only a lost
    /// handle is treated as an error.
    pub fn get_color(&self) -> Result<Option<Rgb>> {
        let setup = SetupPacket::class_interface(
            Direction::In,
            USBB_GET_COLOR,
            report_value(REPORT_TYPE_OUT, USBB_REPORT_ID),
            USBB_INDEX,
        );

        for attempt in 1..=COLOR_READ_ATTEMPTS {
            match self.channel.read(&setup, COLOR_PAYLOAD_SIZE) {
                Ok(response) => match ColorPayload::from_bytes(&response) {
                    Ok(payload) => {
                        debug!("Colour read succeeded on attempt {}", attempt);
                        return Ok(Some(payload.0));
                    }
                    Err(e) => error!("Malformed color data from usb button: {}", e),
                },
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(_) => error!(
                    "Failed to read color data from usb button (Attempt {} of {}).",
                    attempt, COLOR_READ_ATTEMPTS
                ),
            }
        }
        Ok(None)
    }
}
