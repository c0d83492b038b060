/// Decode a packed BCD byte (two decimal digits) into binary.
pub fn bcd_to_bin(bcd: u8) -> u8 {
    10 * (bcd >> 4) + (bcd & 0x0f)
}

/// Pack a binary value in 0..=99 into BCD.
pub fn bin_to_bcd(bin: u8) -> u8 {
    ((bin / 10) << 4) | (bin % 10)
}

/// Unsigned 16-bit big-endian value from a register pair.
pub fn be_u16(msb: u8, lsb: u8) -> u16 {
    u16::from_be_bytes([msb, lsb])
}

/// Unsigned 16-bit little-endian value from a register pair.
pub fn le_u16(lsb: u8, msb: u8) -> u16 {
    u16::from_le_bytes([lsb, msb])
}

/// Signed 16-bit little-endian value from a register pair.
pub fn le_i16(lsb: u8, msb: u8) -> i16 {
    i16::from_le_bytes([lsb, msb])
}
