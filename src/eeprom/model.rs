use crate::Error;

const TWO_BYTE_BITS: std::ops::RangeInclusive<u8> = 9..=16;

/// Size of the memory address sent ahead of every read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWidth {
    /// Single address byte.
    One,
    /// High byte then low byte, with the high byte masked to `bits` total
    /// address bits. `bits` is 9 to 16.
    Two { bits: u8 },
}

impl AddressWidth {
    /// Number of addressable bytes.
    fn span(self) -> usize {
        match self {
            AddressWidth::One => 1 << 8,
            AddressWidth::Two { bits } => 1 << bits,
        }
    }

    pub(crate) fn header(self, address: u16) -> Vec<u8> {
        match self {
            AddressWidth::One => vec![(address & 0xff) as u8],
            AddressWidth::Two { bits } => {
                let high_mask = ((1u32 << bits.saturating_sub(8)) - 1) as u8;
                vec![(address >> 8) as u8 & high_mask, (address & 0xff) as u8]
            }
        }
    }
}

/// Geometry of one EEPROM part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model {
    pub name: &'static str,
    /// Writable bytes, starting at address 0.
    pub capacity: usize,
    pub page_size: usize,
    pub address_width: AddressWidth,
    pub default_address: u8,
    /// Location of a factory-programmed EUI-48, if the part has one.
    pub mac_address: Option<u16>,
}

impl Model {
    /// Microchip 24AA64 / 24LC64, 64 Kbit.
    pub const MC_24AA64: Model = Model {
        name: "24AA64",
        capacity: 8192,
        page_size: 32,
        address_width: AddressWidth::Two { bits: 13 },
        default_address: 0x50,
        mac_address: None,
    };

    /// Microchip 24AA02E48. The upper half of its 256 bytes is write
    /// protected and holds the EUI-48 in the top six bytes, so only the
    /// lower 128 bytes are exposed as capacity.
    pub const MC_24AA02E48: Model = Model {
        name: "24AA02E48",
        capacity: 128,
        page_size: 8,
        address_width: AddressWidth::One,
        default_address: 0x50,
        mac_address: Some(0xfa),
    };
}

#[bon::bon]
impl Model {
    /// Describe a part that isn't in the table. Geometry is checked here so
    /// buffer sizes can be trusted everywhere else.
    #[builder]
    pub fn custom(
        name: &'static str,
        capacity: usize,
        page_size: usize,
        address_width: AddressWidth,
        #[builder(default = 0x50)] default_address: u8,
        mac_address: Option<u16>,
    ) -> Result<Model, Error> {
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(Error::Unsupported("page size must be a power of two"));
        }
        if capacity == 0 || capacity % page_size != 0 {
            return Err(Error::Unsupported(
                "capacity must be a non-zero multiple of the page size",
            ));
        }
        if let AddressWidth::Two { bits } = address_width {
            if !TWO_BYTE_BITS.contains(&bits) {
                return Err(Error::Unsupported(
                    "a two-byte header carries 9 to 16 address bits",
                ));
            }
        }
        if capacity > address_width.span() {
            return Err(Error::Unsupported(
                "capacity exceeds what the address header can reach",
            ));
        }
        Ok(Model {
            name,
            capacity,
            page_size,
            address_width,
            default_address,
            mac_address,
        })
    }
}
