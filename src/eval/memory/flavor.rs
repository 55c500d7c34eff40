//! Flavors of stub
//!
//! A stub's flavor fixes the width of its flex elements, which of
//! its aux slots the collector follows, and which antiforms its cells
//! may hold. Variant order is significant: families are contiguous.

use std::mem::size_of;

use bitflags::bitflags;

use super::{cell::Cell, stub::StubId, symbol::SymbolId};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flavor {
    /// Array of code or data
    Source = 0,
    /// One boxed cell (deeply quoted values)
    Singular,
    /// Body of a composed action, link is the parameter keylist
    Details,
    /// Values of a context, link is the keylist
    Varlist,
    /// Binding-chain node holding one variable
    Let,
    /// One module variable threaded on its symbol's hitch chain
    Patch,
    /// Binding-chain node over several contexts
    Overlay,
    /// Keys of a context
    Keylist,
    /// Binding-chain node over one context
    Use,
    /// Sea-of-vars module (no dense storage)
    Sea,
    Blob,
    Text,
    Bitset,
    /// Placeholder standing in for reclaimed stubs
    Inaccessible,
}

/// What the flex of a flavor holds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    Cells,
    Stubs,
    Symbols,
    Bytes,
    Nothing,
}

/// Which antiforms a cell-holding flavor accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AntiformPolicy {
    /// No antiforms at all
    Forbid,
    /// Only stable antiforms (variables)
    StableOnly,
    /// Not applicable (flavor holds no cells)
    NoCells,
}

bitflags! {
    /// Aux slots the collector follows for a flavor
    pub struct AuxSlots: u8 {
        const LINK = 0b0001;
        const MISC = 0b0010;
        const INFO = 0b0100;
        const BONUS = 0b1000;
    }
}

impl Flavor {
    pub fn storage(self) -> Storage {
        if self <= Flavor::Patch {
            Storage::Cells
        } else if self == Flavor::Overlay {
            Storage::Stubs
        } else if self == Flavor::Keylist {
            Storage::Symbols
        } else if (self as u8).wrapping_sub(Flavor::Blob as u8)
            <= Flavor::Bitset as u8 - Flavor::Blob as u8
        {
            Storage::Bytes
        } else {
            Storage::Nothing
        }
    }

    /// Width in bytes of one flex element
    pub fn width(self) -> usize {
        match self.storage() {
            Storage::Cells => size_of::<Cell>(),
            Storage::Stubs => size_of::<StubId>(),
            Storage::Symbols => size_of::<SymbolId>(),
            Storage::Bytes => 1,
            Storage::Nothing => 0,
        }
    }

    pub fn holds_cells(self) -> bool {
        self.storage() == Storage::Cells
    }

    pub fn is_byte_flavor(self) -> bool {
        self.storage() == Storage::Bytes
    }

    /// Whether two flavors may view the same bytes
    pub fn alias_compatible(self, other: Flavor) -> bool {
        self.is_byte_flavor() && other.is_byte_flavor()
    }

    pub fn antiform_policy(self) -> AntiformPolicy {
        match self {
            Flavor::Source | Flavor::Singular | Flavor::Details => AntiformPolicy::Forbid,
            Flavor::Varlist | Flavor::Let | Flavor::Patch => AntiformPolicy::StableOnly,
            _ => AntiformPolicy::NoCells,
        }
    }

    /// Aux slots holding stubs that must be kept alive by this one.
    ///
    /// A patch's link (next patch) and info (owning sea) are
    /// deliberately absent: patches live exactly as long as their
    /// sea.
    pub fn marked_slots(self) -> AuxSlots {
        match self {
            Flavor::Details => AuxSlots::LINK,
            Flavor::Varlist => AuxSlots::LINK | AuxSlots::BONUS,
            Flavor::Let | Flavor::Overlay | Flavor::Sea => AuxSlots::LINK,
            Flavor::Use => AuxSlots::LINK | AuxSlots::MISC,
            _ => AuxSlots::empty(),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_widths() {
        assert_eq!(Flavor::Source.width(), size_of::<Cell>());
        assert_eq!(Flavor::Patch.width(), size_of::<Cell>());
        assert_eq!(Flavor::Overlay.width(), size_of::<StubId>());
        assert_eq!(Flavor::Keylist.width(), size_of::<SymbolId>());
        assert_eq!(Flavor::Text.width(), 1);
        assert_eq!(Flavor::Sea.width(), 0);
        assert_eq!(Flavor::Inaccessible.width(), 0);
    }

    #[test]
    pub fn test_alias_compatibility() {
        assert!(Flavor::Blob.alias_compatible(Flavor::Text));
        assert!(Flavor::Bitset.alias_compatible(Flavor::Blob));
        assert!(!Flavor::Blob.alias_compatible(Flavor::Source));
        assert!(!Flavor::Keylist.alias_compatible(Flavor::Keylist));
    }

    #[test]
    pub fn test_patch_does_not_mark_its_sea() {
        assert!(Flavor::Patch.marked_slots().is_empty());
        assert!(Flavor::Use.marked_slots().contains(AuxSlots::MISC));
    }
}
