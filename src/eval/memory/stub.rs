//! Stubs and their flexes
//!
//! A stub is the header of every heap-resident buffer: flavor,
//! collector bits, flags and four auxiliary slots whose meaning
//! depends on the flavor. The flex is the stub's element storage.

use std::fmt;

use bitflags::bitflags;

use super::{
    cell::Cell,
    flavor::{Flavor, Storage},
    header::AllocHeader,
    symbol::SymbolId,
};

/// Generation-checked handle to a stub in the heap arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StubId {
    index: u32,
    generation: u32,
}

impl StubId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        StubId { index, generation }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stub#{}.{}", self.index, self.generation)
    }
}

bitflags! {
    pub struct StubFlags: u8 {
        /// Owned by the collector
        const MANAGED = 0b0000_0001;
        /// No further mutation
        const FROZEN = 0b0000_0010;
        /// An alias has an uncommitted edit in progress
        const PENDING_EDIT = 0b0000_0100;
        /// Bitset negation marker
        const BITS_NOT = 0b0000_1000;
        /// Placeholder for reclaimed storage
        const INACCESSIBLE = 0b0001_0000;
        /// Bytes are also viewed as text, so edits must stay UTF-8
        const TEXT_VIEW = 0b0010_0000;
    }
}

/// Contents of an auxiliary slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aux {
    None,
    Stub(StubId),
    Symbol(SymbolId),
    Len(usize),
}

impl Aux {
    pub fn stub(self) -> Option<StubId> {
        match self {
            Aux::Stub(id) => Some(id),
            _ => None,
        }
    }

    pub fn symbol(self) -> Option<SymbolId> {
        match self {
            Aux::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn len(self) -> Option<usize> {
        match self {
            Aux::Len(n) => Some(n),
            _ => None,
        }
    }
}

impl Default for Aux {
    fn default() -> Self {
        Aux::None
    }
}

/// Element storage of a stub
#[derive(Clone, Debug, PartialEq)]
pub enum Flex {
    Empty,
    Cells(Vec<Cell>),
    Stubs(Vec<StubId>),
    Symbols(Vec<SymbolId>),
    Bytes(Vec<u8>),
    /// View of another stub's bytes
    Alias(StubId),
}

impl Flex {
    /// Empty storage of the right shape for a flavor
    pub fn for_flavor(flavor: Flavor, capacity: usize) -> Flex {
        match flavor.storage() {
            Storage::Cells => Flex::Cells(Vec::with_capacity(capacity)),
            Storage::Stubs => Flex::Stubs(Vec::with_capacity(capacity)),
            Storage::Symbols => Flex::Symbols(Vec::with_capacity(capacity)),
            Storage::Bytes => Flex::Bytes(Vec::with_capacity(capacity)),
            Storage::Nothing => Flex::Empty,
        }
    }

    /// Width in bytes of one element as actually stored
    pub fn stride(&self) -> usize {
        match self {
            Flex::Empty => 0,
            Flex::Cells(_) => Flavor::Source.width(),
            Flex::Stubs(_) => Flavor::Overlay.width(),
            Flex::Symbols(_) => Flavor::Keylist.width(),
            Flex::Bytes(_) | Flex::Alias(_) => 1,
        }
    }

    /// Element count (zero for aliases, which own nothing)
    pub fn len(&self) -> usize {
        match self {
            Flex::Empty | Flex::Alias(_) => 0,
            Flex::Cells(v) => v.len(),
            Flex::Stubs(v) => v.len(),
            Flex::Symbols(v) => v.len(),
            Flex::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match self {
            Flex::Empty | Flex::Alias(_) => 0,
            Flex::Cells(v) => v.capacity(),
            Flex::Stubs(v) => v.capacity(),
            Flex::Symbols(v) => v.capacity(),
            Flex::Bytes(v) => v.capacity(),
        }
    }

    pub fn reserve(&mut self, extra: usize) {
        match self {
            Flex::Empty | Flex::Alias(_) => {}
            Flex::Cells(v) => v.reserve(extra),
            Flex::Stubs(v) => v.reserve(extra),
            Flex::Symbols(v) => v.reserve(extra),
            Flex::Bytes(v) => v.reserve(extra),
        }
    }

    pub fn shrink_to(&mut self, capacity: usize) {
        match self {
            Flex::Empty | Flex::Alias(_) => {}
            Flex::Cells(v) => v.shrink_to(capacity),
            Flex::Stubs(v) => v.shrink_to(capacity),
            Flex::Symbols(v) => v.shrink_to(capacity),
            Flex::Bytes(v) => v.shrink_to(capacity),
        }
    }
}

/// Heap block header
#[derive(Clone, Debug)]
pub struct Stub {
    flavor: Flavor,
    header: AllocHeader,
    flags: StubFlags,
    link: Aux,
    misc: Aux,
    info: Aux,
    bonus: Aux,
    flex: Flex,
}

impl Stub {
    pub fn new(flavor: Flavor, flex: Flex, mark_state: bool) -> Self {
        let bytes = flex.capacity() * flavor.width();
        Stub {
            flavor,
            header: AllocHeader::new(bytes.min(u32::MAX as usize) as u32, mark_state),
            flags: StubFlags::empty(),
            link: Aux::None,
            misc: Aux::None,
            info: Aux::None,
            bonus: Aux::None,
            flex,
        }
    }

    /// The shared placeholder handed out for reclaimed ids in
    /// release builds
    pub fn inaccessible() -> Self {
        let mut stub = Stub::new(Flavor::Inaccessible, Flex::Empty, false);
        stub.flags = StubFlags::INACCESSIBLE | StubFlags::FROZEN;
        stub
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn header(&self) -> &AllocHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut AllocHeader {
        &mut self.header
    }

    pub fn flags(&self) -> StubFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: StubFlags, value: bool) {
        self.flags.set(flag, value)
    }

    pub fn is_managed(&self) -> bool {
        self.flags.contains(StubFlags::MANAGED)
    }

    pub fn is_frozen(&self) -> bool {
        self.flags.contains(StubFlags::FROZEN)
    }

    pub fn is_inaccessible(&self) -> bool {
        self.flags.contains(StubFlags::INACCESSIBLE)
    }

    pub fn link(&self) -> Aux {
        self.link
    }

    pub fn set_link(&mut self, aux: Aux) {
        self.link = aux
    }

    pub fn misc(&self) -> Aux {
        self.misc
    }

    pub fn set_misc(&mut self, aux: Aux) {
        self.misc = aux
    }

    pub fn info(&self) -> Aux {
        self.info
    }

    pub fn set_info(&mut self, aux: Aux) {
        self.info = aux
    }

    pub fn bonus(&self) -> Aux {
        self.bonus
    }

    pub fn set_bonus(&mut self, aux: Aux) {
        self.bonus = aux
    }

    pub fn flex(&self) -> &Flex {
        &self.flex
    }

    pub fn flex_mut(&mut self) -> &mut Flex {
        &mut self.flex
    }

    /// Cells of a cell-holding stub (empty otherwise)
    pub fn cells(&self) -> &[Cell] {
        match &self.flex {
            Flex::Cells(v) => v,
            _ => &[],
        }
    }

    pub fn stubs(&self) -> &[StubId] {
        match &self.flex {
            Flex::Stubs(v) => v,
            _ => &[],
        }
    }

    pub fn symbols(&self) -> &[SymbolId] {
        match &self.flex {
            Flex::Symbols(v) => v,
            _ => &[],
        }
    }

    /// Whether the flex has the stride the flavor demands
    pub fn width_consistent(&self) -> bool {
        match &self.flex {
            Flex::Empty => self.flavor.width() == 0,
            flex => flex.stride() == self.flavor.width(),
        }
    }

    /// Stubs this one keeps alive, according to its flavor
    pub fn references(&self) -> Vec<StubId> {
        let mut refs = vec![];
        let slots = self.flavor.marked_slots();

        use super::flavor::AuxSlots;
        for (slot, aux) in [
            (AuxSlots::LINK, self.link),
            (AuxSlots::MISC, self.misc),
            (AuxSlots::INFO, self.info),
            (AuxSlots::BONUS, self.bonus),
        ] {
            if slots.contains(slot) {
                if let Aux::Stub(id) = aux {
                    refs.push(id);
                }
            }
        }

        match &self.flex {
            Flex::Cells(cells) => {
                for cell in cells {
                    cell.references(&mut refs);
                }
            }
            Flex::Stubs(stubs) => refs.extend(stubs.iter().copied()),
            Flex::Alias(target) => refs.push(*target),
            Flex::Symbols(_) | Flex::Bytes(_) | Flex::Empty => {}
        }

        refs
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::cell::Cell;

    #[test]
    pub fn test_flex_matches_flavor_width() {
        for flavor in [
            Flavor::Source,
            Flavor::Varlist,
            Flavor::Overlay,
            Flavor::Keylist,
            Flavor::Use,
            Flavor::Sea,
            Flavor::Text,
        ] {
            let stub = Stub::new(flavor, Flex::for_flavor(flavor, 4), false);
            assert!(stub.width_consistent(), "{:?}", flavor);
        }
    }

    #[test]
    pub fn test_mismatched_flex_detected() {
        let stub = Stub::new(Flavor::Source, Flex::Bytes(vec![1, 2]), false);
        assert!(!stub.width_consistent());
    }

    #[test]
    pub fn test_references_follow_flavor() {
        let a = StubId::new(1, 0);
        let b = StubId::new(2, 0);
        let c = StubId::new(3, 0);

        let mut patch = Stub::new(Flavor::Patch, Flex::Cells(vec![Cell::integer(1)]), false);
        patch.set_link(Aux::Stub(a));
        patch.set_info(Aux::Stub(b));
        assert!(patch.references().is_empty());

        let mut use_node = Stub::new(Flavor::Use, Flex::Empty, false);
        use_node.set_link(Aux::Stub(a));
        use_node.set_misc(Aux::Stub(b));
        assert_eq!(use_node.references(), vec![a, b]);

        let overlay = Stub::new(Flavor::Overlay, Flex::Stubs(vec![c, b]), false);
        assert_eq!(overlay.references(), vec![c, b]);
    }

    #[test]
    pub fn test_placeholder_is_inaccessible() {
        let stub = Stub::inaccessible();
        assert!(stub.is_inaccessible());
        assert_eq!(stub.flavor(), Flavor::Inaccessible);
    }
}
