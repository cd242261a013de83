use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use rand::Rng;
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};
use std::fs;
use std::process::ExitCode;
use std::time::Duration;
use ultimarc_types::{DeviceClass, Rgb};
use ultimarc_usb::layout::ConfigurationRecord;
use ultimarc_usb::{filter, find_devices, DeviceSession, UltimarcDevice};

use crate::cli::{Cli, Command, MiniPacArgs, UsbButtonArgs};

mod cli;

fn main() -> Result<ExitCode> {
    let args: Cli = Cli::parse();

    CombinedLogger::init(vec![TermLogger::new(
        args.log_level.into(),
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .context("Could not configure the logger")?;

    let class = match &args.command {
        Command::List { class } => *class,
        Command::UsbButton(_) => Some(DeviceClass::UsbButton),
        Command::MiniPac(_) => Some(DeviceClass::MiniPac),
    };

    let devices = filter(&find_devices(), class, args.bus, args.address);
    if devices.is_empty() {
        match class {
            Some(class) => error!("No {} devices found, aborting", class.description()),
            None => warn!("No Ultimarc devices found"),
        }
        return Ok(ExitCode::FAILURE);
    }

    let timeout = Duration::from_millis(args.timeout_ms);

    // One failing board shouldn't stop the rest from being processed.
    let mut failed = false;
    for device in &devices {
        let result = device
            .open(timeout)
            .with_context(|| format!("Unable to open {}", device))
            .and_then(|session| match &args.command {
                Command::List { .. } => list(&session),
                Command::UsbButton(action) => usb_button(&session, action),
                Command::MiniPac(action) => mini_pac(&session, action),
            });

        if let Err(e) = result {
            error!("{}: {:#}", device, e);
            failed = true;
        }
    }

    Ok(match failed {
        true => ExitCode::FAILURE,
        false => ExitCode::SUCCESS,
    })
}

fn list(session: &DeviceSession) -> Result<()> {
    let device: &UltimarcDevice = session.device();
    let descriptor = session.get_descriptor();
    let version = descriptor.device_version();

    info!(
        "{} [{}] {} v{}.{}.{} {}",
        device,
        device.class().description(),
        descriptor.product_name().unwrap_or_default(),
        version.0,
        version.1,
        version.2,
        descriptor.serial_number().unwrap_or_default(),
    );
    Ok(())
}

fn usb_button(session: &DeviceSession, action: &UsbButtonArgs) -> Result<()> {
    let button = session.usb_button()?;
    let device = session.device();

    if let Some((red, green, blue)) = action.set_color {
        button.set_color(red, green, blue)?;
    } else if action.set_random_color {
        let mut rng = rand::thread_rng();
        let colour = Rgb::new(rng.gen(), rng.gen(), rng.gen());
        button.set_rgb(colour)?;
        info!("{}: randomly set button color to {}.", device, colour);
    } else if action.get_color {
        match button.get_color()? {
            Some(colour) => info!("{}: Color: {}.", device, colour),
            None => anyhow::bail!("Failed to read color data from usb button"),
        }
    } else if let Some(path) = &action.set_config {
        let path = fs::canonicalize(path)
            .with_context(|| format!("Unable to find configuration file {:?}", path))?;
        session.driver().set_config(&path)?;
        info!("{}: configuration successfully applied to device.", device);
    }
    Ok(())
}

fn mini_pac(session: &DeviceSession, action: &MiniPacArgs) -> Result<()> {
    let board = session.mini_pac()?;
    let device = session.device();

    if action.get_config {
        let record = board.get_configuration()?;
        let flags = record.configuration;
        info!(
            "{}: header {:#04x}, led packet {:#04x}, quadrature {:#04x}",
            device, record.header, record.led_packet, record.quadrature
        );
        info!(
            "{}: high current output: {}, accelerometer: {}, paclink: {}, debounce: {}, expand interface: {}",
            device,
            flags.high_current_output,
            flags.accelerometer,
            flags.paclink,
            flags.debounce,
            flags.expand_interface
        );
        info!("{}: codes: {:02x?}", device, record.codes.as_bytes());
        info!("{}: shifted codes: {:02x?}", device, record.shifted_codes.as_bytes());
    } else if let Some(path) = &action.set_config_raw {
        let bytes =
            fs::read(path).with_context(|| format!("Unable to read configuration {:?}", path))?;
        let record = ConfigurationRecord::decode(&bytes)?;
        board.set_configuration(&record)?;
        info!("{}: configuration successfully applied to device.", device);
    }
    Ok(())
}
