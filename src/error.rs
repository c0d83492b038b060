use std::path::PathBuf;

use embedded_hal::i2c::ErrorKind;

/// Why a requested address range was refused before touching the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// A transfer must move at least one byte.
    EmptyTransfer,
    StartOutOfRange { start: usize, capacity: usize },
    ExceedsCapacity { end: usize, capacity: usize },
}

#[derive(Debug)]
pub enum Error {
    DeviceOpen {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// An addressing or data write was not acknowledged.
    NoAcknowledge { register: u16, kind: ErrorKind },
    /// A bulk read after a successful addressing write failed.
    Read { register: u16, kind: ErrorKind },
    /// Acknowledgement polling ran out of attempts after a page write.
    WriteTimeout { address: u16, attempts: u32 },
    Range(RangeError),
    Source {
        transferred: usize,
        source: std::io::Error,
    },
    Sink {
        transferred: usize,
        source: std::io::Error,
    },
    InvalidDate(String),
    InvalidData(&'static str),
    Unsupported(&'static str),
}

impl From<RangeError> for Error {
    fn from(value: RangeError) -> Self {
        Self::Range(value)
    }
}

impl std::fmt::Display for RangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeError::EmptyTransfer => write!(f, "number of bytes must be at least 1"),
            RangeError::StartOutOfRange { start, capacity } => write!(
                f,
                "start address {start} out of range (0 to {})",
                capacity.saturating_sub(1)
            ),
            RangeError::ExceedsCapacity { end, capacity } => write!(
                f,
                "start address + number of bytes = {end}, which exceeds the {capacity} byte capacity"
            ),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DeviceOpen { path, source } => {
                write!(f, "error opening I2C device {}: {source}", path.display())
            }
            Error::NoAcknowledge { register, kind } => {
                write!(f, "no ACK writing to address 0x{register:04x}: {kind}")
            }
            Error::Read { register, kind } => {
                write!(f, "I2C read from address 0x{register:04x} failed: {kind}")
            }
            Error::WriteTimeout { address, attempts } => write!(
                f,
                "timeout after {attempts} attempts polling for write acknowledgement at address {address}"
            ),
            Error::Range(range) => write!(f, "{range}"),
            Error::Source {
                transferred,
                source,
            } => write!(
                f,
                "error reading input after {transferred} bytes written: {source}"
            ),
            Error::Sink {
                transferred,
                source,
            } => write!(
                f,
                "error writing output after {transferred} bytes written: {source}"
            ),
            Error::InvalidDate(input) => write!(f, "invalid date format or value {input:?}"),
            Error::InvalidData(what) => write!(f, "invalid register contents: {what}"),
            Error::Unsupported(what) => write!(f, "unsupported operation: {what}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DeviceOpen { source, .. } => Some(source.as_ref()),
            Error::Source { source, .. } | Error::Sink { source, .. } => Some(source),
            _ => None,
        }
    }
}
