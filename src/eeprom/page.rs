/// Bytes that can be written starting at `address` before the next page
/// boundary. A write must never carry past it: the device would wrap
/// around to the start of the same page.
///
/// | address | page 32 |
/// |---------|---------|
/// | 0       | 32      |
/// | 30      | 2       |
/// | 31      | 1       |
/// | 32      | 32      |
pub fn bytes_writable(address: usize, page_size: usize) -> usize {
    debug_assert!(page_size > 0);
    page_size - (address % page_size)
}
