//! Paged writer and sequential reader for I2C serial EEPROMs.

mod ack;
mod model;
pub mod page;
#[cfg(test)]
mod sim;

use std::io::{self, Read, Write};

use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::{bus::Device, error::RangeError, Error};

pub use ack::{AckPoller, DEFAULT_POLL_TRIES};
pub use model::{AddressWidth, Model};

/// One read or write over a range of the address space.
///
/// In sentinel mode a null byte marks the end of the content: writes stop
/// at the first null in the source and terminate what they wrote with one,
/// reads stop before the first null on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bon::Builder)]
pub struct TransferRequest {
    pub start_address: usize,
    /// Byte budget. Reads return at most this many bytes, writes consume at
    /// most this many bytes from the source.
    pub max_bytes: usize,
    #[builder(default)]
    pub sentinel: bool,
}

impl TransferRequest {
    /// Refuse ranges that don't fit in `model` before any bus traffic.
    pub fn check(&self, model: &Model) -> Result<(), RangeError> {
        if self.max_bytes == 0 {
            return Err(RangeError::EmptyTransfer);
        }
        if self.start_address >= model.capacity {
            return Err(RangeError::StartOutOfRange {
                start: self.start_address,
                capacity: model.capacity,
            });
        }
        match self.start_address.checked_add(self.max_bytes) {
            Some(end) if end <= model.capacity => Ok(()),
            end => Err(RangeError::ExceedsCapacity {
                end: end.unwrap_or(usize::MAX),
                capacity: model.capacity,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferResult {
    /// Bytes written to the device (terminating null included) or
    /// delivered to the sink.
    pub bytes_transferred: usize,
    /// The byte budget ran out before the source did.
    pub truncated: bool,
    /// Where the terminating null was written or found.
    pub sentinel_address: Option<usize>,
}

/// Factory-programmed EUI-48.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress(pub [u8; 6]);

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

pub struct Eeprom<I> {
    device: Device<I>,
    model: Model,
    poller: AckPoller,
}

impl<I> Eeprom<I> {
    pub fn new(device: Device<I>, model: Model) -> Self {
        Self {
            device,
            model,
            poller: AckPoller::default(),
        }
    }

    pub fn with_poller(self, poller: AckPoller) -> Self {
        Self { poller, ..self }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn release(self) -> I {
        self.device.release()
    }
}

impl<I: I2c> Eeprom<I> {
    /// Write up to `request.max_bytes` bytes from `source`, one page-bounded
    /// chunk at a time. Every chunk is acknowledged before the next one is
    /// sent. On error, chunks already committed stay on the device.
    pub fn write(
        &mut self,
        request: &TransferRequest,
        source: impl Read,
    ) -> Result<TransferResult, Error> {
        request.check(&self.model)?;
        info!(
            "Writing up to {} bytes at address {} ({} mode)",
            request.max_bytes,
            request.start_address,
            if request.sentinel { "string" } else { "binary" }
        );

        let mut bytes = source.bytes();
        let mut address = request.start_address;
        let mut written = 0;
        let mut truncated = false;
        let mut chunk = Vec::with_capacity(self.model.page_size);

        loop {
            let writable = page::bytes_writable(address, self.model.page_size);
            let mut exhausted = false;
            chunk.clear();

            while chunk.len() < writable && written < request.max_bytes {
                match bytes.next().transpose() {
                    Ok(Some(0)) if request.sentinel => {
                        exhausted = true;
                        break;
                    }
                    Ok(Some(byte)) => {
                        chunk.push(byte);
                        written += 1;
                    }
                    Ok(None) => {
                        exhausted = true;
                        break;
                    }
                    Err(source) => {
                        return Err(Error::Source {
                            transferred: written - chunk.len(),
                            source,
                        })
                    }
                }
            }

            if !exhausted && written >= request.max_bytes {
                warn!("Truncating input at {written} bytes");
                truncated = true;
            }

            if !chunk.is_empty() {
                self.commit(address, &chunk)?;
                address += chunk.len();
            }

            if exhausted || truncated {
                break;
            }
        }

        let mut sentinel_address = None;
        if request.sentinel {
            let at = if truncated {
                let at = request.start_address + written - 1;
                warn!("Replacing last byte with null at address {at}");
                at
            } else {
                let at = request.start_address + written;
                written += 1;
                info!("Adding null after last byte at address {at}");
                at
            };
            self.commit(at, &[0])?;
            sentinel_address = Some(at);
        }

        info!("Wrote {written} bytes to EEPROM");
        Ok(TransferResult {
            bytes_transferred: written,
            truncated,
            sentinel_address,
        })
    }

    /// Read `request.max_bytes` bytes from `request.start_address` in one
    /// bus transaction and copy them to `sink`.
    pub fn read(
        &mut self,
        request: &TransferRequest,
        mut sink: impl Write,
    ) -> Result<TransferResult, Error> {
        request.check(&self.model)?;
        info!(
            "Reading {} bytes at address {} ({} mode)",
            request.max_bytes,
            request.start_address,
            if request.sentinel { "string" } else { "binary" }
        );

        let header = self
            .model
            .address_width
            .header(self.device_address(request.start_address)?);
        let mut buf = vec![0u8; request.max_bytes];
        self.device.read_registers(&header, &mut buf)?;
        debug!("{} bytes read", buf.len());

        let (data, sentinel_address) = match request
            .sentinel
            .then(|| buf.iter().position(|&b| b == 0))
            .flatten()
        {
            Some(end) => (&buf[..end], Some(request.start_address + end)),
            None => (&buf[..], None),
        };

        write_counted(&mut sink, data)?;
        sink.flush().map_err(|source| Error::Sink {
            transferred: data.len(),
            source,
        })?;

        Ok(TransferResult {
            bytes_transferred: data.len(),
            truncated: false,
            sentinel_address,
        })
    }

    /// Copy the whole address space to `sink`.
    pub fn dump(&mut self, sink: impl Write) -> Result<TransferResult, Error> {
        let request = TransferRequest::builder()
            .start_address(0)
            .max_bytes(self.model.capacity)
            .build();
        self.read(&request, sink)
    }

    pub fn read_mac(&mut self) -> Result<MacAddress, Error> {
        let Some(at) = self.model.mac_address else {
            return Err(Error::Unsupported("this EEPROM has no factory MAC address"));
        };
        let mut mac = [0u8; 6];
        self.device
            .read_registers(&self.model.address_width.header(at), &mut mac)?;
        Ok(MacAddress(mac))
    }

    fn commit(&mut self, address: usize, data: &[u8]) -> Result<(), Error> {
        debug_assert!(data.len() <= page::bytes_writable(address, self.model.page_size));
        let address = self.device_address(address)?;
        let header = self.model.address_width.header(address);
        self.device.write_registers(&header, data)?;
        self.poller.wait(&mut self.device, address)
    }
}

impl<I> Eeprom<I> {
    /// Memory address as sent in the header. Anything a header can't carry
    /// is out of range rather than silently aliased.
    fn device_address(&self, address: usize) -> Result<u16, Error> {
        u16::try_from(address).map_err(|_| {
            Error::from(RangeError::StartOutOfRange {
                start: address,
                capacity: self.model.capacity,
            })
        })
    }
}

/// `write_all` that remembers how far it got.
fn write_counted(sink: &mut impl Write, data: &[u8]) -> Result<(), Error> {
    let mut written = 0;
    while written < data.len() {
        match sink.write(&data[written..]) {
            Ok(0) => {
                return Err(Error::Sink {
                    transferred: written,
                    source: io::ErrorKind::WriteZero.into(),
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => {
                return Err(Error::Sink {
                    transferred: written,
                    source,
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    use super::sim::SimEeprom;
    use super::*;

    fn small_model() -> Model {
        Model::custom()
            .name("sim128")
            .capacity(128)
            .page_size(32)
            .address_width(AddressWidth::One)
            .call()
            .unwrap()
    }

    fn sim_eeprom(model: Model, busy_cycles: u32) -> Eeprom<SimEeprom> {
        let sim = SimEeprom::new(&model, busy_cycles);
        Eeprom::new(Device::new(sim, model.default_address), model)
    }

    fn request(start_address: usize, max_bytes: usize, sentinel: bool) -> TransferRequest {
        TransferRequest::builder()
            .start_address(start_address)
            .max_bytes(max_bytes)
            .sentinel(sentinel)
            .build()
    }

    /// Deterministic filler without pulling in a RNG.
    fn pattern(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn string_across_a_page_boundary() {
        let mut eeprom = sim_eeprom(small_model(), 2);
        let result = eeprom
            .write(&request(30, 98, true), &b"ABCDE"[..])
            .unwrap();
        assert_eq!(
            result,
            TransferResult {
                bytes_transferred: 6,
                truncated: false,
                sentinel_address: Some(35),
            }
        );

        let mut out = Vec::new();
        let read = eeprom.read(&request(30, 98, true), &mut out).unwrap();
        assert_eq!(out, b"ABCDE");
        assert_eq!(read.sentinel_address, Some(35));

        let sim = eeprom.release();
        assert_eq!(sim.writes, vec![(30, 2), (32, 3), (35, 1)]);
        assert_eq!(&sim.memory[30..36], b"ABCDE\0");
    }

    #[test]
    fn binary_round_trip_on_24aa64() {
        let cases = [(0, 1), (0, 32), (5, 100), (31, 2), (4000, 1000), (8160, 32), (0, 8192)];
        for (seed, &(start, len)) in cases.iter().enumerate() {
            let mut eeprom = sim_eeprom(Model::MC_24AA64, 3);
            let data = pattern(len, seed as u32);

            let written = eeprom
                .write(&request(start, len, false), data.as_slice())
                .unwrap();
            assert_eq!(written.bytes_transferred, len);
            assert_eq!(written.sentinel_address, None);

            let mut out = Vec::new();
            let read = eeprom.read(&request(start, len, false), &mut out).unwrap();
            assert_eq!(read.bytes_transferred, len);
            assert_eq!(out, data, "start {start} len {len}");

            let sim = eeprom.release();
            assert!(sim.no_page_crossings(), "start {start} len {len}");
        }
    }

    #[test]
    fn short_source_in_binary_mode_is_not_truncated() {
        let mut eeprom = sim_eeprom(Model::MC_24AA02E48, 1);
        let result = eeprom.write(&request(6, 20, false), &b"xyz"[..]).unwrap();
        assert_eq!(result.bytes_transferred, 3);
        assert!(!result.truncated);
        let sim = eeprom.release();
        assert_eq!(sim.writes, vec![(6, 2), (8, 1)]);
    }

    #[test]
    fn truncated_string_replaces_last_byte() {
        let mut eeprom = sim_eeprom(small_model(), 1);
        let result = eeprom
            .write(&request(10, 5, true), &b"HELLO WORLD"[..])
            .unwrap();
        assert_eq!(
            result,
            TransferResult {
                bytes_transferred: 5,
                truncated: true,
                sentinel_address: Some(14),
            }
        );

        let mut out = Vec::new();
        let read = eeprom.read(&request(10, 5, true), &mut out).unwrap();
        assert_eq!(out, b"HELL");
        assert_eq!(read.bytes_transferred, 4);

        let sim = eeprom.release();
        assert_eq!(&sim.memory[10..16], b"HELL\0\xff");
    }

    #[test]
    fn string_stops_before_embedded_null() {
        let mut eeprom = sim_eeprom(small_model(), 0);
        let result = eeprom
            .write(&request(0, 64, true), &b"AB\0CD"[..])
            .unwrap();
        assert_eq!(result.bytes_transferred, 3);
        assert_eq!(result.sentinel_address, Some(2));
        let sim = eeprom.release();
        assert_eq!(&sim.memory[0..4], b"AB\0\xff");
    }

    #[test]
    fn empty_string_writes_only_the_null() {
        let mut eeprom = sim_eeprom(small_model(), 0);
        let result = eeprom.write(&request(40, 8, true), io::empty()).unwrap();
        assert_eq!(result.bytes_transferred, 1);
        assert_eq!(result.sentinel_address, Some(40));
        assert_eq!(eeprom.release().writes, vec![(40, 1)]);
    }

    #[test]
    fn timeout_aborts_the_remaining_pages() {
        let model = small_model();
        let mut sim = SimEeprom::new(&model, 0);
        sim.never_ready = true;
        let mut eeprom = Eeprom::new(Device::new(sim, 0x50), model)
            .with_poller(AckPoller::builder().tries(DEFAULT_POLL_TRIES).build());

        let data = pattern(100, 7);
        let err = eeprom
            .write(&request(0, 100, false), data.as_slice())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::WriteTimeout {
                address: 0,
                attempts: DEFAULT_POLL_TRIES
            }
        ));

        let sim = eeprom.release();
        assert_eq!(sim.writes, vec![(0, 32)]);
        assert_eq!(sim.probes, DEFAULT_POLL_TRIES);
    }

    #[test]
    fn one_byte_header_transactions() {
        let expectations = [
            Transaction::write(0x50, vec![6, b'A', b'B']),
            Transaction::write(0x50, vec![]),
            Transaction::write(0x50, b"\x08CDEFGHIJ".to_vec()),
            Transaction::write(0x50, vec![])
                .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
            Transaction::write(0x50, vec![]),
        ];
        let mut eeprom = Eeprom::new(
            Device::new(Mock::new(&expectations), 0x50),
            Model::MC_24AA02E48,
        );
        let result = eeprom
            .write(&request(6, 10, false), &b"ABCDEFGHIJ"[..])
            .unwrap();
        assert_eq!(result.bytes_transferred, 10);
        assert!(result.truncated);
        eeprom.release().done();
    }

    #[test]
    fn two_byte_header_read() {
        let expectations = [
            Transaction::write(0x50, vec![0x1f, 0xfc]),
            Transaction::read(0x50, vec![1, 2, 3, 4]),
        ];
        let mut eeprom = Eeprom::new(
            Device::new(Mock::new(&expectations), 0x50),
            Model::MC_24AA64,
        );
        let mut out = Vec::new();
        eeprom.read(&request(8188, 4, false), &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        eeprom.release().done();
    }

    #[test]
    fn out_of_range_requests_touch_nothing() {
        let mut eeprom = Eeprom::new(Device::new(Mock::new(&[]), 0x50), Model::MC_24AA64);
        let err = eeprom
            .write(&request(8190, 5, false), &b"12345"[..])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Range(RangeError::ExceedsCapacity {
                end: 8195,
                capacity: 8192
            })
        ));
        let err = eeprom.read(&request(8192, 1, false), io::sink()).unwrap_err();
        assert!(matches!(
            err,
            Error::Range(RangeError::StartOutOfRange { .. })
        ));
        let err = eeprom.read(&request(0, 0, false), io::sink()).unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::EmptyTransfer)));
        eeprom.release().done();
    }

    #[test]
    fn oversized_budget_is_a_range_error() {
        let huge = request(5, usize::MAX, false);
        assert_eq!(
            huge.check(&Model::MC_24AA64),
            Err(RangeError::ExceedsCapacity {
                end: usize::MAX,
                capacity: 8192
            })
        );

        let mut eeprom = Eeprom::new(Device::new(Mock::new(&[]), 0x50), Model::MC_24AA64);
        let err = eeprom.read(&huge, io::sink()).unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::ExceedsCapacity { .. })));
        let err = eeprom.write(&huge, &b"abc"[..]).unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::ExceedsCapacity { .. })));
        eeprom.release().done();
    }

    #[test]
    fn addresses_past_the_header_are_refused() {
        // Built by hand, bypassing the geometry checks in `Model::custom`.
        let wide = Model {
            name: "wide",
            capacity: 1 << 17,
            page_size: 128,
            address_width: AddressWidth::Two { bits: 17 },
            default_address: 0x50,
            mac_address: None,
        };
        let mut eeprom = Eeprom::new(Device::new(Mock::new(&[]), 0x50), wide);
        let err = eeprom
            .write(&request(65536, 4, false), &b"WXYZ"[..])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Range(RangeError::StartOutOfRange { start: 65536, .. })
        ));
        let err = eeprom.read(&request(70000, 4, false), io::sink()).unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::StartOutOfRange { .. })));
        eeprom.release().done();
    }

    /// Hands out `data`, then fails.
    struct Unplugged {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for Unplugged {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                return Err(io::Error::new(io::ErrorKind::Other, "unplugged"));
            }
            let n = (&self.data[self.pos..]).read(buf)?;
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn source_failure_keeps_committed_pages() {
        let mut eeprom = sim_eeprom(small_model(), 1);
        let source = Unplugged {
            data: pattern(40, 3),
            pos: 0,
        };
        let err = eeprom.write(&request(0, 64, false), source).unwrap_err();
        assert!(matches!(err, Error::Source { transferred: 32, .. }));

        let sim = eeprom.release();
        assert_eq!(sim.writes, vec![(0, 32)]);
        assert_eq!(&sim.memory[..32], &pattern(40, 3)[..32]);
    }

    #[test]
    fn unacknowledged_read_pointer() {
        let expectations = [Transaction::write(0x50, vec![0x00, 0x00])
            .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))];
        let mut eeprom = Eeprom::new(
            Device::new(Mock::new(&expectations), 0x50),
            Model::MC_24AA64,
        );
        let err = eeprom.dump(io::sink()).unwrap_err();
        assert!(matches!(err, Error::NoAcknowledge { register: 0, .. }));
        eeprom.release().done();
    }

    struct FullAfter(usize);

    impl Write for FullAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.0).min(2);
            self.0 -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_reports_progress() {
        let mut eeprom = sim_eeprom(small_model(), 0);
        eeprom
            .write(&request(0, 8, false), &b"abcdefgh"[..])
            .unwrap();
        let err = eeprom
            .read(&request(0, 8, false), FullAfter(5))
            .unwrap_err();
        assert!(matches!(err, Error::Sink { transferred: 5, .. }));
    }

    #[test]
    fn mac_address() {
        let expectations = [
            Transaction::write(0x50, vec![0xfa]),
            Transaction::read(0x50, vec![0x00, 0x04, 0xa3, 0x12, 0x34, 0x56]),
        ];
        let mut eeprom = Eeprom::new(
            Device::new(Mock::new(&expectations), 0x50),
            Model::MC_24AA02E48,
        );
        let mac = eeprom.read_mac().unwrap();
        assert_eq!(mac.to_string(), "00:04:a3:12:34:56");
        eeprom.release().done();

        let mut plain = Eeprom::new(Device::new(Mock::new(&[]), 0x50), Model::MC_24AA64);
        assert!(matches!(plain.read_mac(), Err(Error::Unsupported(_))));
        plain.release().done();
    }
}
