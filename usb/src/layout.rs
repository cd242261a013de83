use crate::error::LayoutError;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use ultimarc_types::Rgb;

// Byte layouts of the structures exchanged with Ultimarc boards. The firmware expects the C
// layout of its own structs, so every offset here is fixed and every field is always present on
// the wire, even when a board doesn't use it.

pub const RECORD_SIZE: usize = 256;
pub const TABLE_SIZE: usize = 49;
pub const AXIS_COUNT: usize = 8;
pub const MACRO_SIZE: usize = 85;

const HEADER: usize = 0;
const LED_PACKET: usize = 1;
const QUADRATURE: usize = 2;
// Byte 3 is alignment padding before the configuration word.
const CONFIGURATION: usize = 4;
const CODES: usize = 8;
const SHIFTED_CODES: usize = CODES + TABLE_SIZE;
const CALIBRATION: usize = SHIFTED_CODES + TABLE_SIZE;
const AXIS_OFFSETS: usize = CALIBRATION + TABLE_SIZE;
const AXIS_SCALES: usize = AXIS_OFFSETS + AXIS_COUNT;
const MACROS: usize = AXIS_SCALES + AXIS_COUNT;

// Bit offsets inside the configuration byte.
const BIT_HIGH_CURRENT: u8 = 0;
const BIT_ACCELEROMETER: u8 = 1;
const BIT_PACLINK: u8 = 2;
const BIT_DEBOUNCE: u8 = 3;
const BIT_EXPAND_INTERFACE: u8 = 5;
const BIT_BLANKS: u8 = 6;

const TWO_BIT_MAX: u8 = 0b11;

/// The packed configuration flags byte.
///
/// | bit | field               |
/// |-----|---------------------|
/// | 0   | high_current_output |
/// | 1   | accelerometer       |
/// | 2   | paclink             |
/// | 3-4 | debounce            |
/// | 5   | expand_interface    |
/// | 6-7 | blanks (reserved)   |
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigurationBits {
    pub high_current_output: bool,
    pub accelerometer: bool,
    pub paclink: bool,
    pub debounce: u8,
    pub expand_interface: bool,
    pub blanks: u8,
}

impl ConfigurationBits {
    pub fn from_byte(value: u8) -> Self {
        Self {
            high_current_output: value & (1 << BIT_HIGH_CURRENT) != 0,
            accelerometer: value & (1 << BIT_ACCELEROMETER) != 0,
            paclink: value & (1 << BIT_PACLINK) != 0,
            debounce: (value >> BIT_DEBOUNCE) & TWO_BIT_MAX,
            expand_interface: value & (1 << BIT_EXPAND_INTERFACE) != 0,
            blanks: (value >> BIT_BLANKS) & TWO_BIT_MAX,
        }
    }

    pub fn to_byte(&self) -> Result<u8, LayoutError> {
        if self.debounce > TWO_BIT_MAX {
            return Err(LayoutError::FieldOverflow {
                field: "debounce",
                max: TWO_BIT_MAX,
                value: self.debounce,
            });
        }
        if self.blanks > TWO_BIT_MAX {
            return Err(LayoutError::FieldOverflow {
                field: "blanks",
                max: TWO_BIT_MAX,
                value: self.blanks,
            });
        }

        Ok(u8::from(self.high_current_output) << BIT_HIGH_CURRENT
            | u8::from(self.accelerometer) << BIT_ACCELEROMETER
            | u8::from(self.paclink) << BIT_PACLINK
            | self.debounce << BIT_DEBOUNCE
            | u8::from(self.expand_interface) << BIT_EXPAND_INTERFACE
            | self.blanks << BIT_BLANKS)
    }
}

/// One of the fixed 49 byte tables (key codes, shifted key codes, axis calibration).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodeTable([u8; TABLE_SIZE]);

impl Default for CodeTable {
    fn default() -> Self {
        Self([0; TABLE_SIZE])
    }
}

impl CodeTable {
    /// Builds a table from logical data, zero padding anything shorter than the table.
    pub fn from_slice(field: &'static str, data: &[u8]) -> Result<Self, LayoutError> {
        if data.len() > TABLE_SIZE {
            return Err(LayoutError::TableOverflow {
                field,
                max: TABLE_SIZE,
                actual: data.len(),
            });
        }
        let mut table = [0; TABLE_SIZE];
        table[..data.len()].copy_from_slice(data);
        Ok(Self(table))
    }

    pub fn as_bytes(&self) -> &[u8; TABLE_SIZE] {
        &self.0
    }

    fn read(buffer: &[u8], offset: usize) -> Self {
        let mut table = [0; TABLE_SIZE];
        table.copy_from_slice(&buffer[offset..offset + TABLE_SIZE]);
        Self(table)
    }
}

/// The full configuration state held by most Ultimarc boards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigurationRecord {
    pub header: u8,
    pub led_packet: u8,
    pub quadrature: u8,
    pub configuration: ConfigurationBits,
    pub codes: CodeTable,
    pub shifted_codes: CodeTable,
    pub analog_axis_calibration: CodeTable,
    pub axis_offsets: [u8; AXIS_COUNT],
    pub axis_scales: [u8; AXIS_COUNT],
    pub macros: [u8; MACRO_SIZE],
}

impl Default for ConfigurationRecord {
    fn default() -> Self {
        Self {
            header: 0,
            led_packet: 0,
            quadrature: 0,
            configuration: ConfigurationBits::default(),
            codes: CodeTable::default(),
            shifted_codes: CodeTable::default(),
            analog_axis_calibration: CodeTable::default(),
            axis_offsets: [0; AXIS_COUNT],
            axis_scales: [0; AXIS_COUNT],
            macros: [0; MACRO_SIZE],
        }
    }
}

impl ConfigurationRecord {
    pub fn encode(&self) -> Result<[u8; RECORD_SIZE], LayoutError> {
        let mut buffer = [0; RECORD_SIZE];
        buffer[HEADER] = self.header;
        buffer[LED_PACKET] = self.led_packet;
        buffer[QUADRATURE] = self.quadrature;

        // The flags live in the low byte of a little endian 32bit word, the rest stays zero.
        LittleEndian::write_u32(
            &mut buffer[CONFIGURATION..CODES],
            self.configuration.to_byte()? as u32,
        );

        buffer[CODES..SHIFTED_CODES].copy_from_slice(self.codes.as_bytes());
        buffer[SHIFTED_CODES..CALIBRATION].copy_from_slice(self.shifted_codes.as_bytes());
        buffer[CALIBRATION..AXIS_OFFSETS].copy_from_slice(self.analog_axis_calibration.as_bytes());
        buffer[AXIS_OFFSETS..AXIS_SCALES].copy_from_slice(&self.axis_offsets);
        buffer[AXIS_SCALES..MACROS].copy_from_slice(&self.axis_scales);
        buffer[MACROS..].copy_from_slice(&self.macros);

        Ok(buffer)
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, LayoutError> {
        if buffer.len() != RECORD_SIZE {
            return Err(LayoutError::SizeMismatch {
                expected: RECORD_SIZE,
                actual: buffer.len(),
            });
        }

        let word = LittleEndian::read_u32(&buffer[CONFIGURATION..CODES]);
        if word > u8::MAX as u32 {
            debug!("Ignoring upper configuration word bits: {:#010x}", word);
        }

        let mut axis_offsets = [0; AXIS_COUNT];
        axis_offsets.copy_from_slice(&buffer[AXIS_OFFSETS..AXIS_SCALES]);
        let mut axis_scales = [0; AXIS_COUNT];
        axis_scales.copy_from_slice(&buffer[AXIS_SCALES..MACROS]);
        let mut macros = [0; MACRO_SIZE];
        macros.copy_from_slice(&buffer[MACROS..]);

        Ok(Self {
            header: buffer[HEADER],
            led_packet: buffer[LED_PACKET],
            quadrature: buffer[QUADRATURE],
            configuration: ConfigurationBits::from_byte(word as u8),
            codes: CodeTable::read(buffer, CODES),
            shifted_codes: CodeTable::read(buffer, SHIFTED_CODES),
            analog_axis_calibration: CodeTable::read(buffer, CALIBRATION),
            axis_offsets,
            axis_scales,
            macros,
        })
    }
}

pub const COLOR_PAYLOAD_SIZE: usize = 4;
const COLOR_TARGET: u8 = 0x01;

/// The USB Button colour packet: a target selector (always 0x01) followed by red, green, blue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColorPayload(pub Rgb);

impl ColorPayload {
    pub fn to_bytes(&self) -> [u8; COLOR_PAYLOAD_SIZE] {
        [COLOR_TARGET, self.0.red, self.0.green, self.0.blue]
    }

    /// Decodes the leading colour packet from a (possibly over-allocated) read buffer.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self, LayoutError> {
        if buffer.len() < COLOR_PAYLOAD_SIZE {
            return Err(LayoutError::SizeMismatch {
                expected: COLOR_PAYLOAD_SIZE,
                actual: buffer.len(),
            });
        }
        if buffer[0] != COLOR_TARGET {
            debug!("Unexpected colour target byte: {:#04x}", buffer[0]);
        }
        Ok(Self(Rgb::new(buffer[1], buffer[2], buffer[3])))
    }
}
