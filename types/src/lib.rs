#[cfg(feature = "clap")]
use clap::ValueEnum;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The families of Ultimarc boards this project knows how to talk to. The string form is the
/// `class_id` used both for filtering devices and for the `deviceClass` field of config files.
#[derive(
    Copy, Clone, Debug, Display, EnumIter, EnumString, IntoStaticStr, PartialEq, Eq, Hash,
)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DeviceClass {
    #[strum(serialize = "usb-button")]
    #[cfg_attr(feature = "serde", serde(rename = "usb-button"))]
    #[cfg_attr(feature = "clap", value(name = "usb-button"))]
    UsbButton,

    #[strum(serialize = "mini-pac")]
    #[cfg_attr(feature = "serde", serde(rename = "mini-pac"))]
    #[cfg_attr(feature = "clap", value(name = "mini-pac"))]
    MiniPac,
}

impl DeviceClass {
    pub fn class_id(&self) -> &'static str {
        self.into()
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeviceClass::UsbButton => "USB Button",
            DeviceClass::MiniPac => "Mini-PAC",
        }
    }
}

/// Tag declared by a config document (`resourceType`) selecting the schema and the driver logic
/// which applies to it.
#[derive(Copy, Clone, Debug, Display, EnumString, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResourceType {
    #[strum(serialize = "usb-button-color")]
    #[cfg_attr(feature = "serde", serde(rename = "usb-button-color"))]
    UsbButtonColor,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RGB({},{},{})", self.red, self.green, self.blue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn class_ids_match_config_strings() {
        assert_eq!(DeviceClass::UsbButton.class_id(), "usb-button");
        assert_eq!(DeviceClass::MiniPac.to_string(), "mini-pac");
        assert_eq!(
            <DeviceClass as FromStr>::from_str("usb-button").ok(),
            Some(DeviceClass::UsbButton)
        );
        assert!(<DeviceClass as FromStr>::from_str("usb-buton").is_err());
    }

    #[test]
    fn resource_type_round_trips_through_its_tag() {
        let parsed = ResourceType::from_str("usb-button-color").ok();
        assert_eq!(parsed, Some(ResourceType::UsbButtonColor));
        assert_eq!(ResourceType::UsbButtonColor.to_string(), "usb-button-color");
    }

    #[test]
    fn rgb_display() {
        assert_eq!(Rgb::new(10, 20, 30).to_string(), "RGB(10,20,30)");
    }
}
