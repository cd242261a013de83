use std::path::PathBuf;

pub type Result<T, E = UltimarcError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("No Ultimarc device was found")]
    DeviceNotFound,

    #[error("USB error: {0}")]
    UsbError(#[from] rusb::Error),

    #[error("Device {vendor_id:04x}:{product_id:04x} is not a supported Ultimarc board")]
    UnsupportedDevice { vendor_id: u16, product_id: u16 },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Expected a buffer of {expected} bytes, received {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Table '{field}' holds at most {max} bytes, received {actual}")]
    TableOverflow {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("Field '{field}' must be at most {max}, received {value}")]
    FieldOverflow {
        field: &'static str,
        max: u8,
        value: u8,
    },
}

/// A failed control transfer, resolved to the libusb error name and code.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{name} ({code}): {source}")]
pub struct TransferError {
    pub name: &'static str,
    pub code: i32,
    #[source]
    pub source: rusb::Error,
}

impl From<rusb::Error> for TransferError {
    fn from(source: rusb::Error) -> Self {
        let (name, code) = usb_error_name(&source);
        Self { name, code, source }
    }
}

impl TransferError {
    /// Failures which mean the handle itself is unusable, rather than the device simply not
    /// being ready for this request.
    pub fn is_fatal(&self) -> bool {
        matches!(self.source, rusb::Error::NoDevice | rusb::Error::NoMem)
    }
}

pub fn usb_error_name(error: &rusb::Error) -> (&'static str, i32) {
    match error {
        rusb::Error::Io => ("LIBUSB_ERROR_IO", -1),
        rusb::Error::InvalidParam => ("LIBUSB_ERROR_INVALID_PARAM", -2),
        rusb::Error::Access => ("LIBUSB_ERROR_ACCESS", -3),
        rusb::Error::NoDevice => ("LIBUSB_ERROR_NO_DEVICE", -4),
        rusb::Error::NotFound => ("LIBUSB_ERROR_NOT_FOUND", -5),
        rusb::Error::Busy => ("LIBUSB_ERROR_BUSY", -6),
        rusb::Error::Timeout => ("LIBUSB_ERROR_TIMEOUT", -7),
        rusb::Error::Overflow => ("LIBUSB_ERROR_OVERFLOW", -8),
        rusb::Error::Pipe => ("LIBUSB_ERROR_PIPE", -9),
        rusb::Error::Interrupted => ("LIBUSB_ERROR_INTERRUPTED", -10),
        rusb::Error::NoMem => ("LIBUSB_ERROR_NO_MEM", -11),
        rusb::Error::NotSupported => ("LIBUSB_ERROR_NOT_SUPPORTED", -12),
        _ => ("LIBUSB_ERROR_OTHER", -99),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum UltimarcError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(#[from] LayoutError),

    #[error("Unable to read configuration file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Unable to compile schema '{schema}': {message}")]
    SchemaCompilation { schema: String, message: String },

    #[error("Configuration file did not validate against the {schema} schema: {message}")]
    SchemaViolation { schema: String, message: String },

    #[error("Resource type '{found}' does not match accepted types ({})", .accepted.join(","))]
    UnsupportedResourceType {
        found: String,
        accepted: Vec<String>,
    },

    #[error("Configuration device class is '{found}', expected '{expected}'")]
    DeviceClassMismatch { expected: String, found: String },

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Write aborted after {sent} of {total} chunks: {source}")]
    PartialWriteFailure {
        sent: usize,
        total: usize,
        #[source]
        source: TransferError,
    },

    #[error("Malformed response from device: {0}")]
    MalformedResponse(String),
}
