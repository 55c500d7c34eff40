//! Heart: the underlying datatype of a cell, independent of quoting
//!
//! The order of the variants is significant. Each family of hearts
//! occupies a contiguous range so that membership is a single
//! unsigned comparison.

use std::fmt;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Heart {
    Integer = 1,
    Decimal,
    Text,
    Blob,
    Bitset,
    Handle,
    Object,
    Module,
    Error,
    Frame,
    Rune,
    Comma,
    Word,
    Group,
    Block,
    Path,
    Tuple,
}

/// `lo <= h <= hi` as one wrapping subtraction and compare
#[inline(always)]
const fn in_range(h: Heart, lo: Heart, hi: Heart) -> bool {
    (h as u8).wrapping_sub(lo as u8) <= (hi as u8) - (lo as u8)
}

impl Heart {
    pub fn is_inert_scalar(self) -> bool {
        in_range(self, Heart::Integer, Heart::Handle)
    }

    pub fn is_any_context(self) -> bool {
        in_range(self, Heart::Object, Heart::Frame)
    }

    /// Hearts that have an antiform
    pub fn is_antiform_legal(self) -> bool {
        in_range(self, Heart::Error, Heart::Block)
    }

    pub fn is_bindable(self) -> bool {
        in_range(self, Heart::Word, Heart::Tuple)
    }

    pub fn is_any_array(self) -> bool {
        in_range(self, Heart::Group, Heart::Tuple)
    }

    pub fn is_any_series(self) -> bool {
        in_range(self, Heart::Text, Heart::Bitset) || self.is_any_array()
    }

    /// Datatype name as it appears in source
    pub fn name(self) -> &'static str {
        match self {
            Heart::Integer => "integer!",
            Heart::Decimal => "decimal!",
            Heart::Text => "text!",
            Heart::Blob => "blob!",
            Heart::Bitset => "bitset!",
            Heart::Handle => "handle!",
            Heart::Object => "object!",
            Heart::Module => "module!",
            Heart::Error => "error!",
            Heart::Frame => "frame!",
            Heart::Rune => "rune!",
            Heart::Comma => "comma!",
            Heart::Word => "word!",
            Heart::Group => "group!",
            Heart::Block => "block!",
            Heart::Path => "path!",
            Heart::Tuple => "tuple!",
        }
    }
}

impl fmt::Display for Heart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    const ALL: [Heart; 17] = [
        Heart::Integer,
        Heart::Decimal,
        Heart::Text,
        Heart::Blob,
        Heart::Bitset,
        Heart::Handle,
        Heart::Object,
        Heart::Module,
        Heart::Error,
        Heart::Frame,
        Heart::Rune,
        Heart::Comma,
        Heart::Word,
        Heart::Group,
        Heart::Block,
        Heart::Path,
        Heart::Tuple,
    ];

    #[test]
    pub fn test_range_tests_match_explicit_sets() {
        for h in ALL {
            assert_eq!(
                h.is_bindable(),
                matches!(
                    h,
                    Heart::Word | Heart::Group | Heart::Block | Heart::Path | Heart::Tuple
                ),
                "{}",
                h
            );
            assert_eq!(
                h.is_any_context(),
                matches!(
                    h,
                    Heart::Object | Heart::Module | Heart::Error | Heart::Frame
                )
            );
            assert_eq!(
                h.is_antiform_legal(),
                matches!(
                    h,
                    Heart::Error
                        | Heart::Frame
                        | Heart::Rune
                        | Heart::Comma
                        | Heart::Word
                        | Heart::Group
                        | Heart::Block
                )
            );
        }
    }

    #[test]
    pub fn test_scalars_are_not_bindable() {
        assert!(Heart::Integer.is_inert_scalar());
        assert!(!Heart::Integer.is_bindable());
        assert!(!Heart::Object.is_inert_scalar());
    }
}
