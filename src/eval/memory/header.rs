//! Header for all stubs
//!
//! Carries the collector's per-stub state. The meaning of the mark
//! bit flips on each collection (the heap holds the current mark
//! state) so no pass is needed to clear marks.

use bitmaps::Bitmap;

#[derive(Debug, Clone, Copy)]
pub struct HeaderBits(Bitmap<2>);

const MARK_BIT: usize = 0;
const SCANNED_BIT: usize = 1;

impl HeaderBits {
    /// Header bits that read as unmarked and unscanned under
    /// `mark_state`
    pub fn new(mark_state: bool) -> HeaderBits {
        let mut m = HeaderBits(Bitmap::default());
        m.0.set(MARK_BIT, !mark_state);
        m.0.set(SCANNED_BIT, !mark_state);
        m
    }

    fn mark(&mut self, mark_state: bool) {
        self.0.set(MARK_BIT, mark_state);
    }

    fn is_marked(&self, mark_state: bool) -> bool {
        self.0.get(MARK_BIT) == mark_state
    }

    fn set_scanned(&mut self, mark_state: bool) {
        self.0.set(SCANNED_BIT, mark_state);
    }

    fn is_scanned(&self, mark_state: bool) -> bool {
        self.0.get(SCANNED_BIT) == mark_state
    }
}

/// Stub header
///
/// The collector needs:
///  - a mark bit (grey or black)
///  - a scanned bit (black) so checked builds can verify the
///    worklist drained
///  - the byte length accounted to the stub at allocation
#[derive(Debug, Clone, Copy)]
pub struct AllocHeader {
    /// Header bits for collector state
    bits: HeaderBits,
    /// Count of allocated bytes
    alloc_length: u32,
}

impl AllocHeader {
    pub fn new(byte_length: u32, mark_state: bool) -> Self {
        AllocHeader {
            bits: HeaderBits::new(mark_state),
            alloc_length: byte_length,
        }
    }

    pub fn mark(&mut self, mark_state: bool) {
        self.bits.mark(mark_state)
    }

    pub fn is_marked(&self, mark_state: bool) -> bool {
        self.bits.is_marked(mark_state)
    }

    pub fn set_scanned(&mut self, mark_state: bool) {
        self.bits.set_scanned(mark_state)
    }

    pub fn is_scanned(&self, mark_state: bool) -> bool {
        self.bits.is_scanned(mark_state)
    }

    pub fn set_length(&mut self, len: u32) {
        self.alloc_length = len;
    }

    pub fn length(&self) -> u32 {
        self.alloc_length
    }
}

#[cfg(test)]
pub mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    pub fn test_expected_bitmap_size() {
        assert_eq!(size_of::<HeaderBits>(), 1);
    }

    #[test]
    pub fn test_mark_meaning_flips_with_state() {
        let mut header = AllocHeader::new(16, false);
        assert!(!header.is_marked(false));
        header.mark(false);
        assert!(header.is_marked(false));
        // after a collection the state flips and survivors read unmarked
        assert!(!header.is_marked(true));
        assert!(!header.is_scanned(true));
    }
}
