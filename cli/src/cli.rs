use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use ultimarc_types::DeviceClass;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Cli {
    /// Minimum log level to print out
    #[clap(long, value_enum, default_value = "info", global = true)]
    pub log_level: LevelFilter,

    /// Only operate on devices attached to this USB bus
    #[clap(long, global = true)]
    pub bus: Option<u8>,

    /// Only operate on the device at this USB address
    #[clap(long, global = true)]
    pub address: Option<u8>,

    /// Timeout applied to each USB control transfer
    #[clap(long, default_value = "2000", global = true)]
    pub timeout_ms: u64,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List attached Ultimarc devices
    List {
        /// Only list devices of this class
        #[clap(long, value_enum)]
        class: Option<DeviceClass>,
    },

    /// Manage usb-button devices
    UsbButton(UsbButtonArgs),

    /// Manage mini-pac devices
    MiniPac(MiniPacArgs),
}

#[derive(Args, Debug)]
#[clap(group(ArgGroup::new("action").required(true).multiple(false)))]
pub struct UsbButtonArgs {
    /// Set usb button color with RGB value
    #[clap(long, group = "action", value_name = "R,G,B", value_parser = parse_rgb)]
    pub set_color: Option<(i64, i64, i64)>,

    /// Randomly set usb button color
    #[clap(long, group = "action")]
    pub set_random_color: bool,

    /// Output current usb button color RGB value
    #[clap(long, group = "action")]
    pub get_color: bool,

    /// Set button config from config file
    #[clap(long, group = "action", value_name = "PATH")]
    pub set_config: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[clap(group(ArgGroup::new("action").required(true).multiple(false)))]
pub struct MiniPacArgs {
    /// Output the current board configuration
    #[clap(long, group = "action")]
    pub get_config: bool,

    /// Write a raw 256 byte configuration record to the board
    #[clap(long, group = "action", value_name = "PATH")]
    pub set_config_raw: Option<PathBuf>,
}

fn parse_rgb(value: &str) -> Result<(i64, i64, i64), String> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 3 {
        return Err(String::from("Expected three comma separated values"));
    }

    let mut channels = [0; 3];
    for (channel, part) in channels.iter_mut().zip(parts) {
        let part = part.trim();
        if part.is_empty() || part.len() > 3 || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid RGB value '{}'", part));
        }
        *channel = part.parse().map_err(|e| format!("{}", e))?;
    }
    Ok((channels[0], channels[1], channels[2]))
}

#[repr(usize)]
#[derive(ValueEnum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LevelFilter {
    /// A level lower than all log levels.
    Off,
    /// Corresponds to the `Error` log level.
    Error,
    /// Corresponds to the `Warn` log level.
    Warn,
    /// Corresponds to the `Info` log level.
    Info,
    /// Corresponds to the `Debug` log level.
    Debug,
    /// Corresponds to the `Trace` log level.
    Trace,
}

impl From<LevelFilter> for log::LevelFilter {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_strings_parse() {
        assert_eq!(parse_rgb("10,20,30"), Ok((10, 20, 30)));
        assert_eq!(parse_rgb("300,0,0"), Ok((300, 0, 0)));
        assert!(parse_rgb("10,20").is_err());
        assert!(parse_rgb("10,-2,30").is_err());
        assert!(parse_rgb("1000,0,0").is_err());
    }

    #[test]
    fn button_actions_are_mutually_exclusive() {
        let parsed = Cli::try_parse_from(["ultimarc", "usb-button", "--get-color"]);
        assert!(parsed.is_ok());

        let parsed = Cli::try_parse_from([
            "ultimarc",
            "usb-button",
            "--get-color",
            "--set-color",
            "1,2,3",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["ultimarc", "usb-button"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_filters_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["ultimarc", "mini-pac", "--get-config", "--bus", "3"])
            .unwrap();
        assert_eq!(cli.bus, Some(3));
        assert_eq!(cli.address, None);
        assert_eq!(cli.timeout_ms, 2000);

        let cli = Cli::try_parse_from(["ultimarc", "list", "--class", "usb-button"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::List {
                class: Some(DeviceClass::UsbButton)
            }
        ));
    }
}
