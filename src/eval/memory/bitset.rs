//! Bitsets
//!
//! A bitset is a byte flex plus a negation marker. Bit 0 is the most
//! significant bit of byte 0. A negated bitset contains every index
//! whose physical bit is clear, including all indexes past the end of
//! the bytes, so complement is a flag flip and never touches storage.
//!
//! The canonical text form is `make bitset! #{HEX}` (trailing zero
//! bytes trimmed) or `make bitset! [not bits #{HEX}]` when negated.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::eval::error::ExecutionError;

use super::{
    flavor::Flavor,
    heap::Heap,
    stub::{Flex, StubFlags, StubId},
};

#[derive(Clone, Debug, Default)]
pub struct Bitset {
    bytes: Vec<u8>,
    negated: bool,
}

fn byte_and_mask(index: usize) -> (usize, u8) {
    (index / 8, 0x80 >> (index % 8))
}

impl Bitset {
    /// An empty (positive) set with room for `bits` indexes
    pub fn new(bits: usize) -> Self {
        Bitset {
            bytes: vec![0; (bits + 7) / 8],
            negated: false,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, negated: bool) -> Self {
        Bitset { bytes, negated }
    }

    /// The set of codepoints appearing in `text`
    pub fn charset(text: &str) -> Self {
        let mut set = Bitset::default();
        for c in text.chars() {
            set.set(c as usize, true);
        }
        set
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Length in bits of the underlying buffer
    pub fn len(&self) -> usize {
        self.bytes.len() * 8
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn physical(&self, index: usize) -> bool {
        let (byte, mask) = byte_and_mask(index);
        self.bytes.get(byte).map_or(false, |b| b & mask != 0)
    }

    /// Membership test
    pub fn pick(&self, index: usize) -> bool {
        self.physical(index) != self.negated
    }

    /// Add or remove an index, extending the buffer when needed
    pub fn set(&mut self, index: usize, member: bool) {
        let (byte, mask) = byte_and_mask(index);
        if byte >= self.bytes.len() {
            self.bytes.resize(byte + 1, 0);
        }
        if member != self.negated {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
    }

    pub fn complement(&self) -> Bitset {
        Bitset {
            bytes: self.bytes.clone(),
            negated: !self.negated,
        }
    }

    /// Combine physical bytes over the longer length, treating
    /// missing bytes as zero
    fn zip_with(a: &[u8], b: &[u8], f: impl Fn(u8, u8) -> u8) -> Vec<u8> {
        let len = a.len().max(b.len());
        (0..len)
            .map(|i| f(*a.get(i).unwrap_or(&0), *b.get(i).unwrap_or(&0)))
            .collect()
    }

    pub fn union(&self, other: &Bitset) -> Bitset {
        match (self.negated, other.negated) {
            (false, false) => Bitset::from_bytes(Self::zip_with(&self.bytes, &other.bytes, |x, y| x | y), false),
            // ~(~a & ~b)
            (true, true) => Bitset::from_bytes(Self::zip_with(&self.bytes, &other.bytes, |x, y| x & y), true),
            // a | ~b == ~(~a & b)
            (false, true) => Bitset::from_bytes(Self::zip_with(&self.bytes, &other.bytes, |x, y| !x & y), true),
            (true, false) => other.union(self),
        }
    }

    pub fn intersect(&self, other: &Bitset) -> Bitset {
        match (self.negated, other.negated) {
            (false, false) => {
                let len = self.bytes.len().min(other.bytes.len());
                let bytes = self.bytes[..len]
                    .iter()
                    .zip(&other.bytes[..len])
                    .map(|(x, y)| x & y)
                    .collect();
                Bitset::from_bytes(bytes, false)
            }
            // ~(a | b)
            (true, true) => Bitset::from_bytes(Self::zip_with(&self.bytes, &other.bytes, |x, y| x | y), true),
            // a & ~b
            (false, true) => Bitset::from_bytes(Self::zip_with(&self.bytes, &other.bytes, |x, y| x & !y), false),
            (true, false) => other.intersect(self),
        }
    }

    /// Members of `self` not in `other`
    pub fn difference(&self, other: &Bitset) -> Bitset {
        let mut result = self.intersect(&other.complement());
        let len = self.bytes.len().max(other.bytes.len());
        if result.bytes.len() < len {
            result.bytes.resize(len, 0);
        }
        result
    }

    pub fn xor(&self, other: &Bitset) -> Bitset {
        Bitset::from_bytes(
            Self::zip_with(&self.bytes, &other.bytes, |x, y| x ^ y),
            self.negated != other.negated,
        )
    }

    /// Bytes without trailing zeros
    fn trimmed(&self) -> &[u8] {
        let end = self
            .bytes
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |i| i + 1);
        &self.bytes[..end]
    }

    /// Canonical text form
    pub fn mold(&self) -> String {
        let hex = format!("{:02X}", self.trimmed().iter().format(""));
        if self.negated {
            format!("make bitset! [not bits #{{{}}}]", hex)
        } else {
            format!("make bitset! #{{{}}}", hex)
        }
    }

    /// Parse a canonical form at the start of `text`, returning the
    /// set and the number of bytes consumed
    pub fn parse_prefix(text: &str) -> Result<(Bitset, usize), ExecutionError> {
        let bad = || ExecutionError::BadBitset(text.chars().take(40).collect());

        let rest = text.strip_prefix("make").ok_or_else(bad)?;
        let rest = skip_space(rest);
        let rest = rest.strip_prefix("bitset!").ok_or_else(bad)?;
        let rest = skip_space(rest);

        let (negated, rest) = match rest.strip_prefix('[') {
            Some(inner) => {
                let inner = skip_space(inner);
                let inner = inner.strip_prefix("not").ok_or_else(bad)?;
                let inner = skip_space(inner);
                let inner = inner.strip_prefix("bits").ok_or_else(bad)?;
                (true, skip_space(inner))
            }
            None => (false, rest),
        };

        let rest = rest.strip_prefix("#{").ok_or_else(bad)?;
        let close = rest.find('}').ok_or_else(bad)?;
        let bytes = parse_hex(&rest[..close]).ok_or_else(bad)?;
        let mut rest = &rest[close + 1..];

        if negated {
            rest = skip_space(rest).strip_prefix(']').ok_or_else(bad)?;
        }

        Ok((Bitset::from_bytes(bytes, negated), text.len() - rest.len()))
    }

    /// Store as a managed bitset stub
    pub fn to_stub(&self, heap: &mut Heap) -> Result<StubId, ExecutionError> {
        let id = heap.alloc_flex(Flavor::Bitset, Flex::Bytes(self.bytes.clone()))?;
        heap.stub_mut(id)?
            .set_flag(StubFlags::BITS_NOT, self.negated);
        heap.manage(id)?;
        Ok(id)
    }

    /// Read a bitset stub (or any byte stub viewed as a positive set)
    pub fn from_stub(heap: &Heap, id: StubId) -> Result<Bitset, ExecutionError> {
        let negated = heap.stub(id)?.flags().contains(StubFlags::BITS_NOT);
        Ok(Bitset::from_bytes(heap.bytes(id)?.to_vec(), negated))
    }
}

fn skip_space(s: &str) -> &str {
    s.trim_start()
}

/// Hex digits, whitespace ignored; `None` for odd digit counts or
/// non-hex characters
pub fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()?;
    if digits.len() % 2 != 0 {
        return None;
    }
    Some(digits.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect())
}

/// Equality ignores trailing zero bytes
impl PartialEq for Bitset {
    fn eq(&self, other: &Self) -> bool {
        self.negated == other.negated && self.trimmed() == other.trimmed()
    }
}

impl Eq for Bitset {}

impl fmt::Display for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mold())
    }
}

impl FromStr for Bitset {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (set, used) = Bitset::parse_prefix(s)?;
        if used != s.len() {
            return Err(ExecutionError::BadBitset(s[used..].to_string()));
        }
        Ok(set)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_bit_zero_is_msb() {
        let mut set = Bitset::new(8);
        set.set(0, true);
        assert_eq!(set.bytes(), &[0x80]);
        assert_eq!(set.mold(), "make bitset! #{80}");
    }

    #[test]
    pub fn test_set_extends() {
        let mut set = Bitset::default();
        set.set(20, true);
        assert_eq!(set.len(), 24);
        assert!(set.pick(20));
        assert!(!set.pick(19));
        assert!(!set.pick(1000));
    }

    #[test]
    pub fn test_negated_membership() {
        let set = Bitset::charset("a").complement();
        assert!(!set.pick('a' as usize));
        assert!(set.pick('b' as usize));
        assert!(set.pick(100_000));
    }

    #[test]
    pub fn test_set_on_negated() {
        let mut set = Bitset::new(8).complement();
        set.set(3, false);
        assert!(!set.pick(3));
        assert_eq!(set.bytes(), &[0x10]);
    }

    #[test]
    pub fn test_complement_twice_is_identity() {
        let set = Bitset::charset("xyz");
        assert_eq!(set.complement().complement(), set);
    }

    #[test]
    pub fn test_intersect_of_positive_sets_has_shorter_length() {
        let a = Bitset::from_bytes(vec![0xF0; 7], false);
        let b = Bitset::from_bytes(vec![0x0F; 9], false);
        let c = a.intersect(&b);
        assert_eq!(c.bytes(), &[0u8; 7]);
        assert_eq!(c.mold(), "make bitset! #{}");
    }

    #[test]
    pub fn test_other_results_have_longer_length() {
        let a = Bitset::from_bytes(vec![0xF0; 2], false);
        let b = Bitset::from_bytes(vec![0x0F; 5], true);
        assert_eq!(a.union(&b).bytes().len(), 5);
        assert_eq!(a.intersect(&b).bytes().len(), 5);
        assert_eq!(a.xor(&b).bytes().len(), 5);
        assert_eq!(a.difference(&b).bytes().len(), 5);
    }

    #[test]
    pub fn test_algebra_matches_membership() {
        let a = Bitset::charset("abc");
        let b = Bitset::charset("bcd").complement();
        for i in 0..200 {
            assert_eq!(a.union(&b).pick(i), a.pick(i) || b.pick(i), "union {}", i);
            assert_eq!(a.intersect(&b).pick(i), a.pick(i) && b.pick(i), "intersect {}", i);
            assert_eq!(a.difference(&b).pick(i), a.pick(i) && !b.pick(i), "difference {}", i);
            assert_eq!(a.xor(&b).pick(i), a.pick(i) != b.pick(i), "xor {}", i);
        }
    }

    #[test]
    pub fn test_equality_ignores_trailing_zeros() {
        assert_eq!(
            Bitset::from_bytes(vec![0x80, 0, 0], false),
            Bitset::from_bytes(vec![0x80], false)
        );
        assert_ne!(
            Bitset::from_bytes(vec![0x80], true),
            Bitset::from_bytes(vec![0x80], false)
        );
    }

    #[test]
    pub fn test_parse_canonical_forms() {
        let set: Bitset = "make bitset! #{8000}".parse().unwrap();
        assert_eq!(set, Bitset::from_bytes(vec![0x80], false));

        let set: Bitset = "make bitset! [not bits #{40}]".parse().unwrap();
        assert!(set.is_negated());
        assert_eq!(set.mold(), "make bitset! [not bits #{40}]");

        assert!("make bitset! #{8}".parse::<Bitset>().is_err());
        assert!("make bitset! [bits #{80}]".parse::<Bitset>().is_err());
    }

    #[test]
    pub fn test_text_round_trip() {
        for set in [
            Bitset::charset("hello"),
            Bitset::charset("world").complement(),
            Bitset::default(),
        ] {
            let text = set.mold();
            let back: Bitset = text.parse().unwrap();
            assert_eq!(back, set);
            assert_eq!(back.mold(), text);
        }
    }

    #[test]
    pub fn test_stub_round_trip_keeps_negation() {
        let mut heap = Heap::new();
        let set = Bitset::charset("q").complement();
        let id = set.to_stub(&mut heap).unwrap();
        assert_eq!(Bitset::from_stub(&heap, id).unwrap(), set);
    }
}
