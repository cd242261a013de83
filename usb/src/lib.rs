pub use rusb;
pub use ultimarc_types as types;

pub mod channel;
pub mod config;
pub mod device;
pub mod drivers;
pub mod error;
pub mod layout;

pub use device::{filter, find_devices, DeviceSession, UltimarcDevice};
pub use error::{ConnectError, Result, UltimarcError};
