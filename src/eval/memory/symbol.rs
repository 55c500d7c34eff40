//! Symbol interning table.
//!
//! Every distinct spelling is interned once and referenced by a
//! compact `SymbolId`. Spellings that are equal ignoring case share a
//! canon symbol and are linked into a circular synonym ring, so word
//! comparison is canon comparison.
//!
//! The canon entry also heads the symbol's hitch chain: the circular
//! list of module variables ("patches") that exist for the symbol in
//! any sea-of-vars module. The chain is threaded through the patch
//! stubs themselves (see `context`) and closes back on the symbol.
//!
//! Symbols are immortal. The table is owned by the machine and passed
//! explicitly to whatever needs it; execution is single-threaded.

use std::collections::HashMap;
use std::fmt;

use super::stub::StubId;

/// A compact identifier for an interned symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Return the raw index for serialisation or diagnostics.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym#{}", self.0)
    }
}

/// Symbols the core refers to directly. They are interned first, in
/// this order, by `SymbolTable::new` so their ids are fixed.
pub mod sym {
    use super::SymbolId;

    pub const NULL: SymbolId = SymbolId(0);
    pub const OKAY: SymbolId = SymbolId(1);
    pub const ID: SymbolId = SymbolId(2);
    pub const MESSAGE: SymbolId = SymbolId(3);
    pub const ARG1: SymbolId = SymbolId(4);
    pub const ARG2: SymbolId = SymbolId(5);
    pub const NEAR: SymbolId = SymbolId(6);
    pub const LET: SymbolId = SymbolId(7);
    pub const MAKE: SymbolId = SymbolId(8);
    pub const BITSET_X: SymbolId = SymbolId(9);
    pub const NOT: SymbolId = SymbolId(10);
    pub const BITS: SymbolId = SymbolId(11);

    pub(super) const SPELLINGS: &[&str] = &[
        "null", "okay", "id", "message", "arg1", "arg2", "near", "let", "make", "bitset!", "not",
        "bits",
    ];
}

struct SymbolEntry {
    spelling: String,
    /// Canon of the case-insensitive group
    canon: SymbolId,
    /// Next spelling in the circular synonym ring
    synonym: SymbolId,
    /// First patch on the hitch chain (canon entries only)
    hitch: Option<StubId>,
}

/// Table of interned symbols.
pub struct SymbolTable {
    /// Exact spelling to id
    to_id: HashMap<String, SymbolId>,
    /// Case-folded spelling to canon id
    to_canon: HashMap<String, SymbolId>,
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    /// Create a table with the core symbols pre-interned.
    pub fn new() -> Self {
        let mut table = SymbolTable {
            to_id: HashMap::new(),
            to_canon: HashMap::new(),
            entries: Vec::new(),
        };
        for s in sym::SPELLINGS {
            table.intern(s);
        }
        table
    }

    /// Intern a spelling, returning its `SymbolId`.
    ///
    /// A spelling that differs only in case from an existing one gets
    /// its own id, spliced into the existing synonym ring.
    pub fn intern(&mut self, s: &str) -> SymbolId {
        if let Some(&id) = self.to_id.get(s) {
            return id;
        }

        let id = SymbolId(self.entries.len() as u32);
        let folded = s.to_lowercase();

        match self.to_canon.get(&folded) {
            Some(&canon) => {
                let canon_entry = &mut self.entries[canon.0 as usize];
                let next = canon_entry.synonym;
                canon_entry.synonym = id;
                self.entries.push(SymbolEntry {
                    spelling: s.to_string(),
                    canon,
                    synonym: next,
                    hitch: None,
                });
            }
            None => {
                self.to_canon.insert(folded, id);
                self.entries.push(SymbolEntry {
                    spelling: s.to_string(),
                    canon: id,
                    synonym: id,
                    hitch: None,
                });
            }
        }

        self.to_id.insert(s.to_string(), id);
        id
    }

    /// Find an existing spelling without interning it
    pub fn lookup(&self, s: &str) -> Option<SymbolId> {
        self.to_id.get(s).copied()
    }

    /// Resolve a `SymbolId` back to its spelling.
    ///
    /// # Panics
    ///
    /// Panics if the ID is not valid for this table.
    pub fn resolve(&self, id: SymbolId) -> &str {
        &self.entries[id.0 as usize].spelling
    }

    /// Canon of the symbol's case-insensitive group
    pub fn canon(&self, id: SymbolId) -> SymbolId {
        self.entries[id.0 as usize].canon
    }

    /// Whether two symbols are the same word ignoring case
    pub fn same(&self, a: SymbolId, b: SymbolId) -> bool {
        a == b || self.canon(a) == self.canon(b)
    }

    /// All spellings in the symbol's synonym ring, starting with `id`
    pub fn synonyms(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut ring = vec![id];
        let mut next = self.entries[id.0 as usize].synonym;
        while next != id {
            ring.push(next);
            next = self.entries[next.0 as usize].synonym;
        }
        ring
    }

    /// First patch on the hitch chain of the symbol's canon
    pub fn hitch(&self, id: SymbolId) -> Option<StubId> {
        self.entries[self.canon(id).0 as usize].hitch
    }

    /// Replace the head of the canon's hitch chain
    pub fn set_hitch(&mut self, id: SymbolId, head: Option<StubId>) {
        let canon = self.canon(id);
        self.entries[canon.0 as usize].hitch = head;
    }

    /// Canon symbols that currently have patches hitched
    pub fn hitched(&self) -> Vec<SymbolId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, e)| e.hitch.is_some() && e.canon.0 as usize == *i)
            .map(|(i, _)| SymbolId(i as u32))
            .collect()
    }

    /// Return the number of interned spellings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_returns_same_id_for_same_string() {
        let mut table = SymbolTable::new();
        let id1 = table.intern("foo");
        let id2 = table.intern("foo");
        assert_eq!(id1, id2);
    }

    #[test]
    fn core_symbols_have_fixed_ids() {
        let mut table = SymbolTable::new();
        assert_eq!(table.intern("null"), sym::NULL);
        assert_eq!(table.intern("bitset!"), sym::BITSET_X);
        assert_eq!(table.resolve(sym::MESSAGE), "message");
    }

    #[test]
    fn case_variants_share_canon() {
        let mut table = SymbolTable::new();
        let lower = table.intern("foo");
        let upper = table.intern("FOO");
        let mixed = table.intern("Foo");
        assert_ne!(lower, upper);
        assert_eq!(table.canon(upper), lower);
        assert_eq!(table.canon(mixed), lower);
        assert!(table.same(upper, mixed));
        assert_eq!(table.resolve(upper), "FOO");
    }

    #[test]
    fn synonym_ring_is_circular() {
        let mut table = SymbolTable::new();
        let a = table.intern("abc");
        let b = table.intern("ABC");
        let c = table.intern("aBc");
        let ring = table.synonyms(b);
        assert_eq!(ring.len(), 3);
        assert!(ring.contains(&a) && ring.contains(&c));
        assert_eq!(ring[0], b);
    }

    #[test]
    fn different_words_are_not_same() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        assert!(!table.same(a, b));
        assert_eq!(table.lookup("a"), Some(a));
        assert_eq!(table.lookup("zzz"), None);
    }

    #[test]
    fn symbol_id_display() {
        let table = SymbolTable::new();
        assert_eq!(format!("{}", sym::ID), "sym#2");
        assert!(table.len() >= sym::SPELLINGS.len());
    }
}
