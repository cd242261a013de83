use crate::channel::{
    report_value, ControlChannel, ControlTransport, SetupPacket, REPORT_TYPE_IN, REPORT_TYPE_OUT,
};
use crate::config::validate_base;
use crate::drivers::UltimarcDriver;
use crate::error::{Result, UltimarcError};
use crate::layout::{ConfigurationRecord, RECORD_SIZE};
use log::{debug, info};
use rusb::Direction;
use std::path::Path;
use ultimarc_types::{DeviceClass, ResourceType};

pub const MINIPAC_SET: u8 = 0x09;
pub const MINIPAC_GET: u8 = 0x01;
pub const MINIPAC_REPORT_ID: u8 = 3;
pub const MINIPAC_INDEX: u16 = 0x02;
pub const MINIPAC_INTERFACE: u8 = 2;

// header, led_packet, quadrature, configuration. Captured from the vendor's own tool.
const CONFIGURATION_QUERY: [u8; 4] = [0x59, 0xdd, 0x0f, 0x00];

pub struct MiniPac<'a, T: ControlTransport + ?Sized> {
    channel: ControlChannel<'a, T>,
}

impl<'a, T: ControlTransport + ?Sized> UltimarcDriver<'a, T> for MiniPac<'a, T> {
    const CLASS: DeviceClass = DeviceClass::MiniPac;
    const RESOURCE_TYPES: &'static [ResourceType] = &[];

    fn open(channel: ControlChannel<'a, T>) -> Self {
        Self { channel }
    }

    fn set_config(&self, path: &Path) -> Result<()> {
        let config = validate_base(path, Self::RESOURCE_TYPES)?;
        config.ensure_device_class(Self::CLASS)?;

        // No Mini-PAC resources exist yet, validate_base will have refused anything else.
        Err(UltimarcError::UnsupportedResourceType {
            found: config.resource_type().to_string(),
            accepted: vec![],
        })
    }
}

impl<T: ControlTransport + ?Sized> MiniPac<'_, T> {
    /// Asks the board for its configuration, then reads the full record back.
    pub fn get_configuration(&self) -> Result<ConfigurationRecord> {
        self.channel.write_report(
            MINIPAC_SET,
            REPORT_TYPE_OUT,
            MINIPAC_REPORT_ID,
            MINIPAC_INDEX,
            &CONFIGURATION_QUERY,
        )?;

        let setup = SetupPacket::class_interface(
            Direction::In,
            MINIPAC_GET,
            report_value(REPORT_TYPE_IN, MINIPAC_REPORT_ID),
            MINIPAC_INDEX,
        );
        let response = self.channel.read(&setup, RECORD_SIZE)?;
        debug!("Configuration response: {} bytes", response.len());

        if response.len() < RECORD_SIZE {
            return Err(UltimarcError::MalformedResponse(format!(
                "Expected {} configuration bytes, received {}",
                RECORD_SIZE,
                response.len()
            )));
        }
        Ok(ConfigurationRecord::decode(&response[..RECORD_SIZE])?)
    }

    /// Writes a full configuration record. A failure part way through leaves the board holding a
    /// mix of old and new values, so the whole record should be written again.
    pub fn set_configuration(&self, record: &ConfigurationRecord) -> Result<()> {
        let encoded = record.encode()?;
        let chunks = self.channel.write_report(
            MINIPAC_SET,
            REPORT_TYPE_OUT,
            MINIPAC_REPORT_ID,
            MINIPAC_INDEX,
            &encoded,
        )?;
        info!(
            "{}: Wrote configuration in {} packets",
            self.channel.context().dev_key(),
            chunks
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::MockTransport;
    use crate::channel::{DeviceContext, CHUNK_SIZE};
    use crate::layout::ConfigurationBits;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn context() -> DeviceContext {
        DeviceContext::new("mini-pac (2,3)")
    }

    fn record() -> ConfigurationRecord {
        ConfigurationRecord {
            header: 0x50,
            led_packet: 0xdd,
            quadrature: 0x0f,
            configuration: ConfigurationBits {
                debounce: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn get_configuration_queries_then_reads() {
        let encoded = record().encode().unwrap();
        let transport = MockTransport::scripted(vec![Ok(vec![]), Ok(encoded.to_vec())]);
        let context = context();
        let board = MiniPac::open(ControlChannel::new(&transport, &context));

        let configuration = board.get_configuration().unwrap();
        assert_eq!(configuration, record());

        let recorded = transport.recorded();
        assert_eq!(recorded.len(), 2);

        let query = &recorded[0];
        assert_eq!(query.request_type, 0x21);
        assert_eq!(query.request, MINIPAC_SET);
        assert_eq!(query.value, 0x0203);
        assert_eq!(query.index, 0x0002);
        assert_eq!(query.data, vec![3, 0x59, 0xdd, 0x0f, 0x00]);

        let read = &recorded[1];
        assert_eq!(read.request_type, 0xA1);
        assert_eq!(read.request, MINIPAC_GET);
        assert_eq!(read.value, 0x0103);
        assert_eq!(read.index, 0x0002);
        assert_eq!(read.length, RECORD_SIZE + 8);
    }

    #[test]
    fn failed_query_skips_the_read() {
        let transport = MockTransport::scripted(vec![Err(rusb::Error::Pipe)]);
        let context = context();
        let board = MiniPac::open(ControlChannel::new(&transport, &context));

        assert!(matches!(
            board.get_configuration(),
            Err(UltimarcError::Transfer(_))
        ));
        assert_eq!(transport.reads(), 0);
    }

    #[test]
    fn short_configuration_response_is_malformed() {
        let transport = MockTransport::scripted(vec![Ok(vec![]), Ok(vec![0; 100])]);
        let context = context();
        let board = MiniPac::open(ControlChannel::new(&transport, &context));

        assert!(matches!(
            board.get_configuration(),
            Err(UltimarcError::MalformedResponse(_))
        ));
    }

    #[test]
    fn set_configuration_writes_every_chunk() {
        let transport = MockTransport::default();
        let context = context();
        let board = MiniPac::open(ControlChannel::new(&transport, &context));

        board.set_configuration(&record()).unwrap();

        let writes = transport.writes();
        assert_eq!(writes.len(), RECORD_SIZE / CHUNK_SIZE);
        assert_eq!(writes[0].data, vec![3, 0x50, 0xdd, 0x0f, 0x00]);
        assert_eq!(writes[1].data, vec![3, 0b0000_1000, 0, 0, 0]);
        assert!(writes.iter().all(|w| w.value == 0x0203 && w.index == 0x02));
    }

    #[test]
    fn invalid_record_is_rejected_before_writing() {
        let transport = MockTransport::default();
        let context = context();
        let board = MiniPac::open(ControlChannel::new(&transport, &context));

        let mut invalid = record();
        invalid.configuration.debounce = 7;
        assert!(matches!(
            board.set_configuration(&invalid),
            Err(UltimarcError::InvalidLayout(_))
        ));
        assert!(transport.recorded().is_empty());
    }

    #[test]
    fn set_config_refuses_button_resources() {
        let mut file = NamedTempFile::new().unwrap();
        let document = json!({
            "resourceType": "usb-button-color",
            "deviceClass": "mini-pac",
            "colorRGB": { "red": 1, "green": 2, "blue": 3 }
        });
        file.write_all(document.to_string().as_bytes()).unwrap();

        let transport = MockTransport::default();
        let context = context();
        let board = MiniPac::open(ControlChannel::new(&transport, &context));

        assert_eq!(board.class_id(), "mini-pac");
        assert!(matches!(
            board.set_config(file.path()),
            Err(UltimarcError::UnsupportedResourceType { .. })
        ));
        assert!(transport.recorded().is_empty());
    }
}
