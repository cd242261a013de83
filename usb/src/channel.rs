use crate::error::{Result, TransferError, UltimarcError};
use log::{debug, error, warn};
use rusb::{DeviceHandle, Direction, Recipient, RequestType, UsbContext};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// HID report type for output reports, OR'd with the report id to form wValue.
pub const REPORT_TYPE_OUT: u16 = 0x0200;
pub const REPORT_TYPE_IN: u16 = 0x0100;

/// Data bytes carried by each chunk of a chunked write.
pub const CHUNK_SIZE: usize = 4;

/// Boards can answer a read with more than the logical structure holds, so every read buffer
/// is over-allocated by this much.
pub const READ_HEADROOM: usize = 8;

/// The raw control transfer primitives, implemented by a libusb device handle. Kept as a trait so
/// the channel (and every driver on top of it) can be driven without hardware attached.
pub trait ControlTransport {
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;
}

impl<T: UsbContext> ControlTransport for DeviceHandle<T> {
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        DeviceHandle::read_control(self, request_type, request, value, index, buf, timeout)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        DeviceHandle::write_control(self, request_type, request, value, index, buf, timeout)
    }
}

/// Per-device settings handed to every operation, there's no global state in this crate.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    dev_key: String,
    timeout: Duration,
}

impl DeviceContext {
    pub fn new(dev_key: impl Into<String>) -> Self {
        Self {
            dev_key: dev_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dev_key(&self) -> &str {
        &self.dev_key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// The fields of a control transfer's setup stage.
#[derive(Debug, Copy, Clone)]
pub struct SetupPacket {
    pub direction: Direction,
    pub request_type: RequestType,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub timeout: Option<Duration>,
}

impl SetupPacket {
    /// A HID class request addressed to an interface, which is all this device family uses.
    pub fn class_interface(direction: Direction, request: u8, value: u16, index: u16) -> Self {
        Self {
            direction,
            request_type: RequestType::Class,
            recipient: Recipient::Interface,
            request,
            value,
            index,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// bmRequestType: bit 7 direction, bits 6-5 type, bits 4-0 recipient.
    pub fn request_type_byte(&self) -> u8 {
        rusb::request_type(self.direction, self.request_type, self.recipient)
    }
}

pub fn report_value(report_type: u16, report_id: u8) -> u16 {
    report_type | report_id as u16
}

pub struct ControlChannel<'a, T: ControlTransport + ?Sized> {
    transport: &'a T,
    context: &'a DeviceContext,
}

impl<'a, T: ControlTransport + ?Sized> ControlChannel<'a, T> {
    pub fn new(transport: &'a T, context: &'a DeviceContext) -> Self {
        Self { transport, context }
    }

    pub fn context(&self) -> &DeviceContext {
        self.context
    }

    fn timeout(&self, setup: &SetupPacket) -> Duration {
        setup.timeout.unwrap_or(self.context.timeout)
    }

    fn report_failure(&self, error: rusb::Error) -> TransferError {
        let error = TransferError::from(error);
        error!(
            "{} ({}): Failed to communicate with device {}.",
            error.name, error.code, self.context.dev_key
        );
        error
    }

    /// Performs a single OUT transfer of `data`.
    pub fn write(&self, setup: &SetupPacket, data: &[u8]) -> Result<usize, TransferError> {
        match self.transport.write_control(
            setup.request_type_byte(),
            setup.request,
            setup.value,
            setup.index,
            data,
            self.timeout(setup),
        ) {
            Ok(written) => {
                debug!(
                    "Write {} bytes to device {}.",
                    data.len(),
                    self.context.dev_key
                );
                Ok(written)
            }
            Err(error) => Err(self.report_failure(error)),
        }
    }

    /// Performs a single IN transfer expecting `length` bytes, the returned buffer is truncated
    /// to what the device actually sent.
    pub fn read(&self, setup: &SetupPacket, length: usize) -> Result<Vec<u8>, TransferError> {
        let mut buf = vec![0; length + READ_HEADROOM];
        match self.transport.read_control(
            setup.request_type_byte(),
            setup.request,
            setup.value,
            setup.index,
            &mut buf,
            self.timeout(setup),
        ) {
            Ok(response_length) => {
                debug!(
                    "Read {} bytes from device {}.",
                    response_length, self.context.dev_key
                );
                buf.truncate(response_length);
                Ok(buf)
            }
            Err(error) => Err(self.report_failure(error)),
        }
    }

    /// Writes `data` as a sequence of HID output reports carrying four bytes each. A non-zero
    /// report id is sent as the first byte of each chunk, a zero id is omitted entirely. The
    /// final chunk is zero padded.
    ///
    /// Chunks already sent are not rolled back if a later one fails, the caller has to issue the
    /// whole write again. Returns the number of chunks sent.
    pub fn write_report(
        &self,
        request: u8,
        report_type: u16,
        report_id: u8,
        index: u16,
        data: &[u8],
    ) -> Result<usize> {
        let setup = SetupPacket::class_interface(
            Direction::Out,
            request,
            report_value(report_type, report_id),
            index,
        );

        let total = data.len().div_ceil(CHUNK_SIZE);
        if total == 0 {
            warn!("Empty write requested for device {}", self.context.dev_key);
            return Ok(0);
        }

        debug!("Writing the following data:");
        for (sent, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            let mut packet = [0; CHUNK_SIZE + 1];
            packet[0] = report_id;
            packet[1..=chunk.len()].copy_from_slice(chunk);
            let packet = match report_id {
                0 => &packet[1..],
                _ => &packet[..],
            };
            debug!("{:02x?}", packet);

            if let Err(source) = self.write(&setup, packet) {
                return Err(match sent {
                    0 => UltimarcError::Transfer(source),
                    _ => UltimarcError::PartialWriteFailure {
                        sent,
                        total,
                        source,
                    },
                });
            }
        }
        Ok(total)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    fn context() -> DeviceContext {
        DeviceContext::new("d209:1200 (1,4)")
    }

    #[test]
    fn request_type_combines_direction_type_and_recipient() {
        let out = SetupPacket::class_interface(Direction::Out, 0x09, 0x0200, 0);
        assert_eq!(out.request_type_byte(), 0x21);

        let read = SetupPacket::class_interface(Direction::In, 0x01, 0x0200, 0);
        assert_eq!(read.request_type_byte(), 0xA1);
    }

    #[test]
    fn report_value_packs_type_and_id() {
        assert_eq!(report_value(REPORT_TYPE_OUT, 3), 0x0203);
        assert_eq!(report_value(REPORT_TYPE_OUT, 0), 0x0200);
    }

    #[test]
    fn reads_reserve_headroom_and_truncate() {
        let transport = MockTransport::scripted(vec![Ok(vec![0x01, 2, 3, 4])]);
        let context = context();
        let channel = ControlChannel::new(&transport, &context);

        let setup = SetupPacket::class_interface(Direction::In, 0x01, 0x0200, 0);
        let response = channel.read(&setup, 4).unwrap();

        assert_eq!(response, vec![0x01, 2, 3, 4]);
        assert_eq!(transport.recorded()[0].length, 4 + READ_HEADROOM);
    }

    #[test]
    fn default_timeout_applies_unless_overridden() {
        let transport = MockTransport::default();
        let context = context().with_timeout(Duration::from_millis(500));
        let channel = ControlChannel::new(&transport, &context);

        let setup = SetupPacket::class_interface(Direction::Out, 0x09, 0x0200, 0);
        channel.write(&setup, &[1]).unwrap();
        channel
            .write(&setup.with_timeout(Duration::from_millis(50)), &[1])
            .unwrap();

        let recorded = transport.recorded();
        assert_eq!(recorded[0].timeout, Duration::from_millis(500));
        assert_eq!(recorded[1].timeout, Duration::from_millis(50));
        assert_eq!(DeviceContext::new("x").timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn read_failures_carry_the_libusb_name() {
        let transport = MockTransport::scripted(vec![Err(rusb::Error::Timeout)]);
        let context = context();
        let channel = ControlChannel::new(&transport, &context);

        let setup = SetupPacket::class_interface(Direction::In, 0x01, 0x0200, 0);
        let error = channel.read(&setup, 4).unwrap_err();
        assert_eq!(error.name, "LIBUSB_ERROR_TIMEOUT");
        assert_eq!(error.code, -7);
    }

    #[test]
    fn chunked_write_splits_into_four_byte_reports() {
        let transport = MockTransport::default();
        let context = context();
        let channel = ControlChannel::new(&transport, &context);

        let data: Vec<u8> = (1..=10).collect();
        let sent = channel.write_report(0x09, REPORT_TYPE_OUT, 3, 0x02, &data).unwrap();
        assert_eq!(sent, 3);

        let writes = transport.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].data, vec![3, 1, 2, 3, 4]);
        assert_eq!(writes[1].data, vec![3, 5, 6, 7, 8]);
        assert_eq!(writes[2].data, vec![3, 9, 10, 0, 0]);

        for write in &writes {
            assert_eq!(write.request_type, 0x21);
            assert_eq!(write.request, 0x09);
            assert_eq!(write.value, 0x0203);
            assert_eq!(write.index, 0x02);
        }
    }

    #[test]
    fn zero_report_id_is_left_off_the_chunk() {
        let transport = MockTransport::default();
        let context = context();
        let channel = ControlChannel::new(&transport, &context);

        channel
            .write_report(0x09, REPORT_TYPE_OUT, 0, 0, &[0x01, 10, 20, 30])
            .unwrap();

        let writes = transport.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].data, vec![0x01, 10, 20, 30]);
        assert_eq!(writes[0].value, 0x0200);
    }

    #[test]
    fn failing_first_chunk_is_a_transfer_error() {
        let transport = MockTransport::scripted(vec![Err(rusb::Error::Pipe)]);
        let context = context();
        let channel = ControlChannel::new(&transport, &context);

        let result = channel.write_report(0x09, REPORT_TYPE_OUT, 3, 2, &[0; 8]);
        assert!(matches!(result, Err(UltimarcError::Transfer(_))));
        assert_eq!(transport.writes().len(), 1);
    }

    #[test]
    fn failing_later_chunk_aborts_the_rest() {
        let transport =
            MockTransport::scripted(vec![Ok(vec![]), Ok(vec![]), Err(rusb::Error::Io)]);
        let context = context();
        let channel = ControlChannel::new(&transport, &context);

        let result = channel.write_report(0x09, REPORT_TYPE_OUT, 3, 2, &[0; 20]);
        match result {
            Err(UltimarcError::PartialWriteFailure { sent, total, source }) => {
                assert_eq!(sent, 2);
                assert_eq!(total, 5);
                assert_eq!(source.source, rusb::Error::Io);
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(transport.writes().len(), 3);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn chunked_writes_share_one_setup(
                data in proptest::collection::vec(any::<u8>(), 1..300),
                report_id in any::<u8>(),
                index in any::<u16>(),
            ) {
                let transport = MockTransport::default();
                let context = context();
                let channel = ControlChannel::new(&transport, &context);

                let sent = channel
                    .write_report(0x09, REPORT_TYPE_OUT, report_id, index, &data)
                    .unwrap();
                let writes = transport.writes();
                prop_assert_eq!(sent, data.len().div_ceil(CHUNK_SIZE));
                prop_assert_eq!(writes.len(), sent);

                let packet_size = match report_id {
                    0 => CHUNK_SIZE,
                    _ => CHUNK_SIZE + 1,
                };
                let mut payload = vec![];
                for write in &writes {
                    prop_assert_eq!(write.request_type, 0x21);
                    prop_assert_eq!(write.request, 0x09);
                    prop_assert_eq!(write.value, report_value(REPORT_TYPE_OUT, report_id));
                    prop_assert_eq!(write.index, index);
                    prop_assert_eq!(write.timeout, DEFAULT_TIMEOUT);
                    prop_assert_eq!(write.data.len(), packet_size);
                    payload.extend_from_slice(&write.data[packet_size - CHUNK_SIZE..]);
                }
                prop_assert_eq!(&payload[..data.len()], &data[..]);
                prop_assert!(payload[data.len()..].iter().all(|b| *b == 0));
            }
        }
    }
}
