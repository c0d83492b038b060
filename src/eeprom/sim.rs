//! In-memory EEPROM behind an `I2c` implementation, for engine tests.

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use super::{AddressWidth, Model};

pub struct SimEeprom {
    address: u8,
    pub memory: Vec<u8>,
    page_size: usize,
    header_len: usize,
    pointer: usize,
    /// Probes NACKed after each committed write.
    busy_cycles: u32,
    busy: u32,
    /// Never finishes a write cycle once one has started.
    pub never_ready: bool,
    /// `(start, len)` of every committed data write.
    pub writes: Vec<(usize, usize)>,
    pub probes: u32,
}

impl SimEeprom {
    pub fn new(model: &Model, busy_cycles: u32) -> Self {
        let header_len = match model.address_width {
            AddressWidth::One => 1,
            AddressWidth::Two { .. } => 2,
        };
        Self {
            address: model.default_address,
            memory: vec![0xff; model.capacity],
            page_size: model.page_size,
            header_len,
            pointer: 0,
            busy_cycles,
            busy: 0,
            never_ready: false,
            writes: Vec::new(),
            probes: 0,
        }
    }

    /// True if every committed write stayed inside one page.
    pub fn no_page_crossings(&self) -> bool {
        self.writes
            .iter()
            .all(|&(start, len)| start / self.page_size == (start + len - 1) / self.page_size)
    }

    fn nack() -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        if self.busy > 0 {
            self.busy -= 1;
            if bytes.is_empty() {
                self.probes += 1;
            }
            return Err(Self::nack());
        }
        if bytes.is_empty() {
            self.probes += 1;
            return Ok(());
        }
        let (header, data) = bytes.split_at(self.header_len.min(bytes.len()));
        let start = header
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b))
            % self.memory.len();
        self.pointer = start;
        if data.is_empty() {
            return Ok(());
        }
        // Like the real part, the page-internal counter wraps.
        let page_base = start - start % self.page_size;
        for (i, &byte) in data.iter().enumerate() {
            let offset = (start - page_base + i) % self.page_size;
            self.memory[page_base + offset] = byte;
        }
        self.writes.push((start, data.len()));
        self.busy = if self.never_ready {
            u32::MAX
        } else {
            self.busy_cycles
        };
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        if self.busy > 0 {
            return Err(Self::nack());
        }
        for byte in buf.iter_mut() {
            *byte = self.memory[self.pointer];
            self.pointer = (self.pointer + 1) % self.memory.len();
        }
        Ok(())
    }
}

impl ErrorType for SimEeprom {
    type Error = ErrorKind;
}

impl I2c for SimEeprom {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(Self::nack());
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.write(bytes)?,
                Operation::Read(buf) => self.read(buf)?,
            }
        }
        Ok(())
    }
}
