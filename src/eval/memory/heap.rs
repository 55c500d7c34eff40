//! The stub heap
//!
//! An arena of generation-checked slots. Each allocation produces an
//! unmanaged stub, owned by its creator and invisible to the
//! collector, until it is handed over with `manage`. Unmanaged stubs
//! are tracked in allocation order so that error unwinding can free
//! exactly those created since a checkpoint.

use std::fmt::{self, Debug};

use pretty_hex::simple_hex;

use crate::eval::error::ExecutionError;

use super::{
    cell::Cell,
    flavor::{AntiformPolicy, Flavor},
    stub::{Flex, Stub, StubFlags, StubId},
    symbol::SymbolId,
};

/// Largest flex (elements times width) a single stub may hold
pub const MAX_FLEX_BYTES: usize = 1 << 30;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Stubs currently allocated
    pub live: usize,
    /// Live stubs owned by the collector
    pub managed: usize,
    /// Live stubs still owned by their creator
    pub unmanaged: usize,
    /// Stubs allocated since the heap was created
    pub allocated: u64,
    /// Stubs freed (explicitly or by sweeping) since creation
    pub freed: u64,
    /// Collections run against this heap
    pub collections: u64,
}

/// Heap-level errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// Requested flex would exceed the maximum size
    CapacityExceeded {
        requested: usize,
        width: usize,
        max: usize,
    },
    /// Stub limit reached
    OutOfStubs { limit: usize },
    /// Id refers to a stub that has been freed
    Reclaimed(StubId),
    /// Explicit free of a stub the collector owns
    AlreadyManaged(StubId),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::CapacityExceeded {
                requested,
                width,
                max,
            } => write!(
                f,
                "capacity exceeded: {} elements of {} bytes is more than {} bytes",
                requested, width, max
            ),
            HeapError::OutOfStubs { limit } => {
                write!(f, "out of memory: heap limit of {} stubs reached", limit)
            }
            HeapError::Reclaimed(id) => write!(f, "access to reclaimed stub {}", id),
            HeapError::AlreadyManaged(id) => {
                write!(f, "stub {} is managed and cannot be freed explicitly", id)
            }
        }
    }
}

impl std::error::Error for HeapError {}

struct Slot {
    generation: u32,
    stub: Option<Stub>,
}

/// Arena of stubs
pub struct Heap {
    slots: Vec<Slot>,
    /// Indexes of empty slots
    free: Vec<u32>,
    /// Maximum number of live stubs
    limit: Option<usize>,
    /// Allocations between collections when there is no limit
    ballast: usize,
    since_collection: usize,
    mark_state: bool,
    /// Protection stack (collector roots)
    guards: Vec<StubId>,
    /// Unmanaged stubs in allocation order
    manuals: Vec<StubId>,
    placeholder: Stub,
    allocated: u64,
    freed: u64,
    collections: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: vec![],
            free: vec![],
            limit: None,
            ballast: 10_000,
            since_collection: 0,
            mark_state: false,
            guards: vec![],
            manuals: vec![],
            placeholder: Stub::inaccessible(),
            allocated: 0,
            freed: 0,
            collections: 0,
        }
    }

    pub fn with_limit(limit: usize) -> Self {
        Heap {
            limit: Some(limit),
            ..Heap::new()
        }
    }

    pub fn set_ballast(&mut self, ballast: usize) {
        self.ballast = ballast.max(1);
    }

    pub fn stats(&self) -> HeapStats {
        let live = self.live();
        HeapStats {
            live,
            managed: live - self.manuals.len(),
            unmanaged: self.manuals.len(),
            allocated: self.allocated,
            freed: self.freed,
            collections: self.collections,
        }
    }

    /// Get the current mark state for this heap
    pub fn mark_state(&self) -> bool {
        self.mark_state
    }

    /// Flip the mark state for this heap (called after each collection)
    pub fn flip_mark_state(&mut self) {
        self.mark_state = !self.mark_state;
        self.collections += 1;
        self.since_collection = 0;
    }

    pub fn policy_requires_collection(&self) -> bool {
        if self.since_collection == 0 {
            return false;
        }
        match self.limit {
            Some(limit) => self.live() * 4 >= limit * 3,
            None => self.since_collection >= self.ballast,
        }
    }

    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Allocate an unmanaged stub of `flavor` with room for
    /// `capacity` elements
    pub fn alloc(&mut self, flavor: Flavor, capacity: usize) -> Result<StubId, HeapError> {
        let width = flavor.width();
        if capacity.saturating_mul(width) > MAX_FLEX_BYTES {
            return Err(HeapError::CapacityExceeded {
                requested: capacity,
                width,
                max: MAX_FLEX_BYTES,
            });
        }
        let stub = Stub::new(flavor, Flex::for_flavor(flavor, capacity), self.mark_state);
        self.install(stub)
    }

    /// Allocate an unmanaged stub holding existing storage
    pub fn alloc_flex(&mut self, flavor: Flavor, flex: Flex) -> Result<StubId, ExecutionError> {
        let width = flavor.width();
        if flex.stride() != width || matches!(flex, Flex::Alias(_)) {
            return Err(ExecutionError::WidthMismatch {
                flavor,
                stride: flex.stride(),
                width,
            });
        }
        if flex.len().saturating_mul(width) > MAX_FLEX_BYTES {
            return Err(HeapError::CapacityExceeded {
                requested: flex.len(),
                width,
                max: MAX_FLEX_BYTES,
            }
            .into());
        }
        if let Flex::Cells(cells) = &flex {
            for cell in cells {
                check_store(flavor, cell)?;
            }
        }
        Ok(self.install(Stub::new(flavor, flex, self.mark_state))?)
    }

    fn install(&mut self, stub: Stub) -> Result<StubId, HeapError> {
        if let Some(limit) = self.limit {
            if self.live() >= limit {
                return Err(HeapError::OutOfStubs { limit });
            }
        }

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.stub = Some(stub);
                StubId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    stub: Some(stub),
                });
                StubId::new(index, 0)
            }
        };

        self.manuals.push(id);
        self.allocated += 1;
        self.since_collection += 1;
        Ok(id)
    }

    fn release(&mut self, id: StubId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            if slot.generation == id.generation() && slot.stub.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index() as u32);
                self.freed += 1;
            }
        }
    }

    /// Hand an unmanaged stub to the collector
    pub fn manage(&mut self, id: StubId) -> Result<(), ExecutionError> {
        if self.stub(id)?.is_managed() {
            return Ok(());
        }

        #[cfg(any(debug_assertions, feature = "gc-audit"))]
        self.audit(id)?;

        if let Some(pos) = self.manuals.iter().rposition(|m| *m == id) {
            self.manuals.remove(pos);
        }
        self.stub_mut(id)?.set_flag(StubFlags::MANAGED, true);
        Ok(())
    }

    /// Free an unmanaged stub
    pub fn free(&mut self, id: StubId) -> Result<(), HeapError> {
        if self.stub(id)?.is_managed() {
            return Err(HeapError::AlreadyManaged(id));
        }
        if let Some(pos) = self.manuals.iter().rposition(|m| *m == id) {
            self.manuals.remove(pos);
        }
        self.release(id);
        Ok(())
    }

    /// Whether the id still refers to an allocated stub
    pub fn is_live(&self, id: StubId) -> bool {
        self.stub(id).is_ok()
    }

    pub fn stub(&self, id: StubId) -> Result<&Stub, HeapError> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.stub.as_ref())
            .ok_or(HeapError::Reclaimed(id))
    }

    pub fn stub_mut(&mut self, id: StubId) -> Result<&mut Stub, HeapError> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.stub.as_mut())
            .ok_or(HeapError::Reclaimed(id))
    }

    /// Unchecked access: a reclaimed id is a crash in debug builds
    /// and reads as the inaccessible placeholder otherwise
    pub fn access(&self, id: StubId) -> &Stub {
        match self.stub(id) {
            Ok(stub) => stub,
            Err(_) => {
                if cfg!(debug_assertions) {
                    panic!("access to reclaimed stub {}", id);
                }
                &self.placeholder
            }
        }
    }

    /// Check the stride and antiform policy of a stub
    pub fn audit(&self, id: StubId) -> Result<(), ExecutionError> {
        let stub = self.stub(id)?;
        if !stub.width_consistent() {
            return Err(ExecutionError::WidthMismatch {
                flavor: stub.flavor(),
                stride: stub.flex().stride(),
                width: stub.flavor().width(),
            });
        }
        for cell in stub.cells() {
            check_store(stub.flavor(), cell)?;
        }
        Ok(())
    }

    /// Reserve room for `extra` more elements
    pub fn grow(&mut self, id: StubId, extra: usize) -> Result<(), ExecutionError> {
        let stub = self.writable(id)?;
        let width = stub.flavor().width();
        let wanted = stub.flex().len().saturating_add(extra);
        if wanted.saturating_mul(width) > MAX_FLEX_BYTES {
            return Err(HeapError::CapacityExceeded {
                requested: wanted,
                width,
                max: MAX_FLEX_BYTES,
            }
            .into());
        }
        stub.flex_mut().reserve(extra);
        let bytes = stub.flex().capacity() * width;
        stub.header_mut().set_length(bytes.min(u32::MAX as usize) as u32);
        Ok(())
    }

    /// Release spare capacity, keeping at least the current length
    pub fn shrink(&mut self, id: StubId, capacity: usize) -> Result<(), ExecutionError> {
        let stub = self.writable(id)?;
        let keep = capacity.max(stub.flex().len());
        stub.flex_mut().shrink_to(keep);
        let bytes = stub.flex().capacity() * stub.flavor().width();
        stub.header_mut().set_length(bytes.min(u32::MAX as usize) as u32);
        Ok(())
    }

    pub fn freeze(&mut self, id: StubId) -> Result<(), HeapError> {
        self.stub_mut(id)?.set_flag(StubFlags::FROZEN, true);
        Ok(())
    }

    pub fn is_frozen(&self, id: StubId) -> Result<bool, HeapError> {
        let stub = self.stub(id)?;
        if stub.is_frozen() {
            return Ok(true);
        }
        match stub.flex() {
            Flex::Alias(base) => Ok(self.stub(*base)?.is_frozen()),
            _ => Ok(false),
        }
    }

    /// The stub whose flex actually holds the bytes of `id`
    fn base(&self, id: StubId) -> Result<StubId, HeapError> {
        match self.stub(id)?.flex() {
            Flex::Alias(base) => Ok(*base),
            _ => Ok(id),
        }
    }

    /// Mutable stub, provided neither it nor its alias base is frozen
    fn writable(&mut self, id: StubId) -> Result<&mut Stub, ExecutionError> {
        if self.is_frozen(id)? {
            return Err(ExecutionError::Frozen);
        }
        Ok(self.stub_mut(id)?)
    }

    /// A new unmanaged stub viewing the bytes of `id` as `flavor`
    pub fn alias(&mut self, id: StubId, flavor: Flavor) -> Result<StubId, ExecutionError> {
        let from = self.stub(id)?.flavor();
        if !from.alias_compatible(flavor) {
            return Err(ExecutionError::IncompatibleAlias { from, to: flavor });
        }

        let base = self.base(id)?;
        let base_stub = self.stub(base)?;
        if base_stub.flags().contains(StubFlags::PENDING_EDIT) {
            return Err(ExecutionError::AliasPending);
        }
        if let (Flavor::Text, Flex::Bytes(bytes)) = (flavor, base_stub.flex()) {
            if std::str::from_utf8(bytes).is_err() {
                return Err(ExecutionError::IncompatibleAlias { from, to: flavor });
            }
        }
        let frozen = base_stub.is_frozen();
        if flavor == Flavor::Text {
            self.stub_mut(base)?.set_flag(StubFlags::TEXT_VIEW, true);
        }

        let alias = self.install(Stub::new(flavor, Flex::Alias(base), self.mark_state))?;
        if frozen {
            self.stub_mut(alias)?.set_flag(StubFlags::FROZEN, true);
        }
        Ok(alias)
    }

    /// Start an edit of the bytes behind `id`; aliasing is refused
    /// until `commit_edit`
    pub fn begin_edit(&mut self, id: StubId) -> Result<(), ExecutionError> {
        let base = self.base(id)?;
        self.writable(base)?
            .set_flag(StubFlags::PENDING_EDIT, true);
        Ok(())
    }

    /// Close an edit. Bytes seen as text must still be UTF-8; if not
    /// the edit stays open
    pub fn commit_edit(&mut self, id: StubId) -> Result<(), ExecutionError> {
        let base = self.base(id)?;
        let stub = self.stub_mut(base)?;
        let textual =
            stub.flavor() == Flavor::Text || stub.flags().contains(StubFlags::TEXT_VIEW);
        if let (true, Flex::Bytes(bytes)) = (textual, stub.flex()) {
            if std::str::from_utf8(bytes).is_err() {
                return Err(ExecutionError::InvalidUtf8);
            }
        }
        stub.set_flag(StubFlags::PENDING_EDIT, false);
        Ok(())
    }

    pub fn cells(&self, id: StubId) -> Result<&[Cell], HeapError> {
        Ok(self.stub(id)?.cells())
    }

    /// Bytes of a byte flavor, following aliases
    pub fn bytes(&self, id: StubId) -> Result<&[u8], HeapError> {
        let base = self.base(id)?;
        match self.stub(base)?.flex() {
            Flex::Bytes(bytes) => Ok(bytes),
            _ => Ok(&[]),
        }
    }

    /// Bytes to change, only between `begin_edit` and `commit_edit`
    pub fn bytes_mut(&mut self, id: StubId) -> Result<&mut Vec<u8>, ExecutionError> {
        if self.is_frozen(id)? {
            return Err(ExecutionError::Frozen);
        }
        let base = self.base(id)?;
        let stub = self.stub_mut(base)?;
        if !stub.flags().contains(StubFlags::PENDING_EDIT) {
            return Err(ExecutionError::EditNotPending);
        }
        let flavor = stub.flavor();
        match stub.flex_mut() {
            Flex::Bytes(bytes) => Ok(bytes),
            _ => Err(ExecutionError::type_mismatch(
                "byte flex",
                format!("{:?}", flavor),
            )),
        }
    }

    /// Append a cell, subject to the flavor's antiform policy
    pub fn push_cell(&mut self, id: StubId, cell: Cell) -> Result<(), ExecutionError> {
        let stub = self.writable(id)?;
        check_store(stub.flavor(), &cell)?;
        match stub.flex_mut() {
            Flex::Cells(cells) => {
                cells.push(cell);
                Ok(())
            }
            _ => Err(ExecutionError::type_mismatch(
                "cell flex",
                format!("{:?}", stub.flavor()),
            )),
        }
    }

    /// Overwrite the cell at `index`
    pub fn set_cell(&mut self, id: StubId, index: usize, cell: Cell) -> Result<(), ExecutionError> {
        let stub = self.writable(id)?;
        check_store(stub.flavor(), &cell)?;
        let flavor = stub.flavor();
        match stub.flex_mut() {
            Flex::Cells(cells) if index < cells.len() => {
                cells[index] = cell;
                Ok(())
            }
            Flex::Cells(cells) => Err(ExecutionError::type_mismatch(
                format!("index below {}", cells.len()),
                index.to_string(),
            )),
            _ => Err(ExecutionError::type_mismatch(
                "cell flex",
                format!("{:?}", flavor),
            )),
        }
    }

    pub fn push_stub(&mut self, id: StubId, member: StubId) -> Result<(), ExecutionError> {
        match self.writable(id)?.flex_mut() {
            Flex::Stubs(stubs) => {
                stubs.push(member);
                Ok(())
            }
            _ => Err(ExecutionError::type_mismatch("stub list", "other flex")),
        }
    }

    pub fn push_symbol(&mut self, id: StubId, symbol: SymbolId) -> Result<(), ExecutionError> {
        match self.writable(id)?.flex_mut() {
            Flex::Symbols(symbols) => {
                symbols.push(symbol);
                Ok(())
            }
            _ => Err(ExecutionError::type_mismatch("symbol list", "other flex")),
        }
    }

    /// Push onto the protection stack
    pub fn protect(&mut self, id: StubId) {
        self.guards.push(id)
    }

    /// Pop from the protection stack (must be the last protected)
    pub fn unprotect(&mut self, id: StubId) {
        debug_assert_eq!(self.guards.last(), Some(&id));
        if let Some(pos) = self.guards.iter().rposition(|g| *g == id) {
            self.guards.remove(pos);
        }
    }

    pub fn guards(&self) -> &[StubId] {
        &self.guards
    }

    pub fn guards_height(&self) -> usize {
        self.guards.len()
    }

    pub fn truncate_guards(&mut self, height: usize) {
        self.guards.truncate(height)
    }

    pub fn manuals_height(&self) -> usize {
        self.manuals.len()
    }

    /// Free, newest first, every unmanaged stub allocated since the
    /// manuals stack had `height` entries
    pub fn free_manuals_above(&mut self, height: usize) -> usize {
        let mut count = 0;
        while self.manuals.len() > height {
            if let Some(id) = self.manuals.pop() {
                self.release(id);
                count += 1;
            }
        }
        count
    }

    /// Ids of all live stubs
    pub fn ids(&self) -> impl Iterator<Item = StubId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.stub
                .as_ref()
                .map(|_| StubId::new(i as u32, slot.generation))
        })
    }

    pub fn is_marked(&self, id: StubId) -> bool {
        self.stub(id)
            .map(|s| s.header().is_marked(self.mark_state))
            .unwrap_or(false)
    }

    /// Mark a live stub; true if it was not already marked
    pub fn mark(&mut self, id: StubId) -> bool {
        let state = self.mark_state;
        match self.stub_mut(id) {
            Ok(stub) if !stub.header().is_marked(state) => {
                stub.header_mut().mark(state);
                true
            }
            _ => false,
        }
    }

    pub fn set_scanned(&mut self, id: StubId) {
        let state = self.mark_state;
        if let Ok(stub) = self.stub_mut(id) {
            stub.header_mut().set_scanned(state);
        }
    }

    /// Free every managed stub left unmarked; checked builds audit
    /// each one before it goes
    pub fn sweep(&mut self) -> Result<usize, ExecutionError> {
        let state = self.mark_state;
        let dead: Vec<StubId> = self
            .ids()
            .filter(|id| {
                let stub = self.access(*id);
                stub.is_managed() && !stub.header().is_marked(state)
            })
            .collect();
        #[cfg(any(debug_assertions, feature = "gc-audit"))]
        for id in &dead {
            self.audit(*id)?;
        }
        for id in &dead {
            self.release(*id);
        }
        Ok(dead.len())
    }
}

/// Apply a flavor's antiform policy to a cell about to be stored
pub fn check_store(flavor: Flavor, cell: &Cell) -> Result<(), ExecutionError> {
    match (flavor.antiform_policy(), cell.antiform_class()) {
        (_, None) => Ok(()),
        (AntiformPolicy::StableOnly, Some(a)) if a.is_stable() => Ok(()),
        (AntiformPolicy::NoCells, _) => Err(ExecutionError::type_mismatch(
            "cell flex",
            format!("{:?}", flavor),
        )),
        (_, Some(a)) => Err(ExecutionError::AntiformInContainer(format!(
            "{} in {:?}",
            a.name(),
            flavor
        ))),
    }
}

impl Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:?}", self.stats())?;
        for id in self.ids() {
            let stub = self.access(id);
            write!(
                f,
                "{} {:?} {:?} len={}",
                id,
                stub.flavor(),
                stub.flags(),
                stub.flex().len()
            )?;
            match stub.flex() {
                Flex::Bytes(bytes) if !bytes.is_empty() => {
                    writeln!(f, " [{}]", simple_hex(bytes))?
                }
                Flex::Alias(base) => writeln!(f, " -> {}", base)?,
                _ => writeln!(f)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::cell::Cell;

    #[test]
    pub fn test_alloc_is_unmanaged_until_managed() {
        let mut heap = Heap::new();
        let id = heap.alloc(Flavor::Source, 4).unwrap();
        assert!(!heap.stub(id).unwrap().is_managed());
        assert_eq!(heap.stats().unmanaged, 1);
        heap.manage(id).unwrap();
        assert!(heap.stub(id).unwrap().is_managed());
        assert_eq!(heap.stats().managed, 1);
        assert_eq!(heap.free(id), Err(HeapError::AlreadyManaged(id)));
    }

    #[test]
    pub fn test_reclaimed_ids_are_detected() {
        let mut heap = Heap::new();
        let id = heap.alloc(Flavor::Text, 4).unwrap();
        heap.free(id).unwrap();
        assert_eq!(heap.stub(id).err(), Some(HeapError::Reclaimed(id)));

        // slot reuse does not revive the old id
        let fresh = heap.alloc(Flavor::Text, 4).unwrap();
        assert_eq!(fresh.index(), id.index());
        assert_ne!(fresh, id);
        assert!(heap.stub(id).is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "reclaimed")]
    pub fn test_unchecked_access_crashes_in_debug() {
        let mut heap = Heap::new();
        let id = heap.alloc(Flavor::Blob, 1).unwrap();
        heap.free(id).unwrap();
        heap.access(id);
    }

    #[test]
    pub fn test_capacity_limit() {
        let mut heap = Heap::new();
        let err = heap.alloc(Flavor::Source, MAX_FLEX_BYTES).unwrap_err();
        assert!(matches!(err, HeapError::CapacityExceeded { .. }));
    }

    #[test]
    pub fn test_stub_limit() {
        let mut heap = Heap::with_limit(2);
        heap.alloc(Flavor::Blob, 1).unwrap();
        heap.alloc(Flavor::Blob, 1).unwrap();
        assert_eq!(
            heap.alloc(Flavor::Blob, 1),
            Err(HeapError::OutOfStubs { limit: 2 })
        );
        assert!(heap.policy_requires_collection());
    }

    #[test]
    pub fn test_grow_preserves_elements() {
        let mut heap = Heap::new();
        let id = heap.alloc(Flavor::Source, 1).unwrap();
        heap.push_cell(id, Cell::integer(1)).unwrap();
        heap.grow(id, 100).unwrap();
        assert!(heap.stub(id).unwrap().flex().capacity() >= 101);
        heap.push_cell(id, Cell::integer(2)).unwrap();
        heap.shrink(id, 0).unwrap();
        assert_eq!(heap.cells(id).unwrap(), &[Cell::integer(1), Cell::integer(2)]);
    }

    #[test]
    pub fn test_frozen_rejects_mutation() {
        let mut heap = Heap::new();
        let id = heap.alloc(Flavor::Source, 1).unwrap();
        heap.freeze(id).unwrap();
        assert_eq!(
            heap.push_cell(id, Cell::integer(1)),
            Err(ExecutionError::Frozen)
        );
        assert_eq!(heap.grow(id, 1), Err(ExecutionError::Frozen));
    }

    #[test]
    pub fn test_antiform_policy() {
        let mut heap = Heap::new();
        let source = heap.alloc(Flavor::Source, 1).unwrap();
        assert!(matches!(
            heap.push_cell(source, Cell::null()),
            Err(ExecutionError::AntiformInContainer(_))
        ));

        let var = heap.alloc(Flavor::Let, 1).unwrap();
        heap.push_cell(var, Cell::null()).unwrap();
        assert!(matches!(
            heap.set_cell(var, 0, Cell::ghost()),
            Err(ExecutionError::AntiformInContainer(_))
        ));
    }

    #[test]
    pub fn test_alias_views_same_bytes() {
        let mut heap = Heap::new();
        let blob = heap
            .alloc_flex(Flavor::Blob, Flex::Bytes(b"abc".to_vec()))
            .unwrap();
        let text = heap.alias(blob, Flavor::Text).unwrap();
        assert_eq!(heap.bytes(text).unwrap(), b"abc");

        heap.begin_edit(blob).unwrap();
        heap.bytes_mut(blob).unwrap().push(b'd');
        heap.commit_edit(blob).unwrap();
        assert_eq!(heap.bytes(text).unwrap(), b"abcd");
    }

    #[test]
    pub fn test_text_view_stays_utf8() {
        let mut heap = Heap::new();
        let blob = heap
            .alloc_flex(Flavor::Blob, Flex::Bytes(b"ok".to_vec()))
            .unwrap();
        let text = heap.alias(blob, Flavor::Text).unwrap();

        assert_eq!(
            heap.bytes_mut(blob).map(|_| ()),
            Err(ExecutionError::EditNotPending)
        );

        heap.begin_edit(blob).unwrap();
        heap.bytes_mut(blob).unwrap().push(0xff);
        assert_eq!(heap.commit_edit(blob), Err(ExecutionError::InvalidUtf8));
        // still open, so no new views and the bytes can be repaired
        assert_eq!(
            heap.alias(blob, Flavor::Text),
            Err(ExecutionError::AliasPending)
        );
        heap.bytes_mut(blob).unwrap().pop();
        heap.commit_edit(blob).unwrap();
        assert_eq!(heap.bytes(text).unwrap(), b"ok");

        // a blob nobody reads as text may hold any bytes
        let raw = heap.alloc_flex(Flavor::Blob, Flex::Bytes(vec![])).unwrap();
        heap.begin_edit(raw).unwrap();
        heap.bytes_mut(raw).unwrap().push(0xff);
        assert!(heap.commit_edit(raw).is_ok());
    }

    #[test]
    pub fn test_alias_rejections() {
        let mut heap = Heap::new();
        let blob = heap
            .alloc_flex(Flavor::Blob, Flex::Bytes(vec![0xff, 0xfe]))
            .unwrap();
        assert!(matches!(
            heap.alias(blob, Flavor::Text),
            Err(ExecutionError::IncompatibleAlias { .. })
        ));
        assert!(matches!(
            heap.alias(blob, Flavor::Source),
            Err(ExecutionError::IncompatibleAlias { .. })
        ));

        heap.begin_edit(blob).unwrap();
        assert_eq!(
            heap.alias(blob, Flavor::Bitset),
            Err(ExecutionError::AliasPending)
        );
        heap.commit_edit(blob).unwrap();
        assert!(heap.alias(blob, Flavor::Bitset).is_ok());
    }

    #[test]
    pub fn test_free_manuals_is_lifo() {
        let mut heap = Heap::new();
        let keep = heap.alloc(Flavor::Blob, 1).unwrap();
        let height = heap.manuals_height();
        let a = heap.alloc(Flavor::Blob, 1).unwrap();
        let b = heap.alloc(Flavor::Blob, 1).unwrap();
        heap.manage(b).unwrap();
        let c = heap.alloc(Flavor::Blob, 1).unwrap();

        assert_eq!(heap.free_manuals_above(height), 2);
        assert!(heap.is_live(keep));
        assert!(heap.is_live(b));
        assert!(!heap.is_live(a));
        assert!(!heap.is_live(c));
    }

    #[test]
    pub fn test_width_mismatch_refused() {
        let mut heap = Heap::new();
        assert!(matches!(
            heap.alloc_flex(Flavor::Source, Flex::Bytes(vec![1])),
            Err(ExecutionError::WidthMismatch { .. })
        ));
    }
}
