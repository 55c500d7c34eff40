//! Collector support
//!
//! Mark and sweep over the stub arena. Marking starts from the roots
//! the machine presents, plus the heap's protection stack, and
//! follows each stub's references according to its flavor. Module
//! variables (patches) behave like ephemerons: they are marked only
//! once their module is known to be live, so marking iterates to a
//! fixpoint over the hitch chains.

use std::collections::VecDeque;

use crate::eval::{
    error::ExecutionError,
    machine::metrics::{Clock, ThreadOccupation},
};

use super::{
    cell::Cell,
    context::hitch_patches,
    heap::Heap,
    stub::{Aux, StubId},
    symbol::SymbolTable,
};

/// Anything that holds references to stubs the collector must keep
pub trait GcScannable {
    /// Mark directly referenced stubs, returning those newly marked
    fn scan(&self, marker: &mut CollectorHeapView<'_>) -> Vec<StubId>;
}

impl GcScannable for Cell {
    fn scan(&self, marker: &mut CollectorHeapView<'_>) -> Vec<StubId> {
        let mut refs = vec![];
        self.references(&mut refs);
        marker.mark_all(refs)
    }
}

impl GcScannable for [Cell] {
    fn scan(&self, marker: &mut CollectorHeapView<'_>) -> Vec<StubId> {
        let mut refs = vec![];
        for cell in self {
            cell.references(&mut refs);
        }
        marker.mark_all(refs)
    }
}

impl GcScannable for Vec<StubId> {
    fn scan(&self, marker: &mut CollectorHeapView<'_>) -> Vec<StubId> {
        marker.mark_all(self.iter().copied())
    }
}

impl GcScannable for Vec<Cell> {
    fn scan(&self, marker: &mut CollectorHeapView<'_>) -> Vec<StubId> {
        self.as_slice().scan(marker)
    }
}

/// View of the heap available to the collector
pub struct CollectorHeapView<'guard> {
    heap: &'guard mut Heap,
    marked: usize,
}

impl CollectorHeapView<'_> {
    /// Mark stub if not already marked and return whether marked
    pub fn mark(&mut self, id: StubId) -> bool {
        if self.heap.mark(id) {
            self.marked += 1;
            true
        } else {
            if !self.heap.is_live(id) {
                log::warn!("collector found reference to reclaimed stub {}", id);
            }
            false
        }
    }

    pub fn mark_all(&mut self, ids: impl IntoIterator<Item = StubId>) -> Vec<StubId> {
        ids.into_iter().filter(|id| self.mark(*id)).collect()
    }

    pub fn is_marked(&self, id: StubId) -> bool {
        self.heap.is_marked(id)
    }
}

/// Outcome of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Stubs found reachable
    pub marked: usize,
    /// Stubs freed
    pub swept: usize,
}

pub fn collect(
    roots: &dyn GcScannable,
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    clock: &mut Clock,
    dump_heap: bool,
) -> Result<CollectStats, ExecutionError> {
    log::debug!("collecting: {:?}", heap.stats());

    clock.switch(ThreadOccupation::CollectorMark);

    let guards = heap.guards().to_vec();
    let mut view = CollectorHeapView {
        heap: &mut *heap,
        marked: 0,
    };
    let mut queue = VecDeque::default();

    // find and queue the roots
    queue.extend(roots.scan(&mut view));
    queue.extend(guards.scan(&mut view));

    loop {
        while let Some(id) = queue.pop_front() {
            #[cfg(any(debug_assertions, feature = "gc-audit"))]
            view.heap.audit(id)?;

            view.heap.set_scanned(id);
            let refs = view.heap.access(id).references();
            queue.extend(view.mark_all(refs));
        }

        // patches of live modules
        for canon in symbols.hitched() {
            for patch in hitch_patches(view.heap, symbols, canon)? {
                if view.is_marked(patch) {
                    continue;
                }
                if let Aux::Stub(sea) = view.heap.access(patch).info() {
                    if view.is_marked(sea) && view.mark(patch) {
                        queue.push_back(patch);
                    }
                }
            }
        }

        if queue.is_empty() {
            break;
        }
    }

    let marked = view.marked;

    #[cfg(any(debug_assertions, feature = "gc-audit"))]
    {
        let state = heap.mark_state();
        for id in heap.ids() {
            let header = heap.access(id).header();
            if header.is_marked(state) && !header.is_scanned(state) {
                return Err(ExecutionError::Panic(format!(
                    "stub {} marked but never scanned",
                    id
                )));
            }
        }
    }

    if dump_heap {
        log::debug!("Heap after mark:\n\n{:?}", heap)
    }

    clock.switch(ThreadOccupation::CollectorSweep);

    unlink_dead_patches(heap, symbols)?;
    let swept = heap.sweep()?;

    if dump_heap {
        log::debug!("Heap after sweep:\n\n{:?}", heap)
    }

    // After collection, flip mark state ready for next collection
    heap.flip_mark_state();

    log::debug!("collected: marked {}, swept {}", marked, swept);
    Ok(CollectStats { marked, swept })
}

/// Drop managed, unmarked patches out of every hitch chain
fn unlink_dead_patches(heap: &mut Heap, symbols: &mut SymbolTable) -> Result<(), ExecutionError> {
    let state = heap.mark_state();
    for canon in symbols.hitched() {
        let patches = hitch_patches(heap, symbols, canon)?;
        let kept: Vec<StubId> = patches
            .iter()
            .copied()
            .filter(|p| {
                let stub = heap.access(*p);
                !stub.is_managed() || stub.header().is_marked(state)
            })
            .collect();

        if kept.len() == patches.len() {
            continue;
        }

        for (i, patch) in kept.iter().enumerate() {
            let next = match kept.get(i + 1) {
                Some(n) => Aux::Stub(*n),
                None => Aux::Symbol(canon),
            };
            heap.stub_mut(*patch)?.set_link(next);
        }
        symbols.set_hitch(canon, kept.first().copied());
    }
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::{
        context::{make_sea, sea_define, sea_lookup},
        flavor::Flavor,
        stub::Flex,
    };

    fn managed_block(heap: &mut Heap, cells: Vec<Cell>) -> StubId {
        let id = heap.alloc_flex(Flavor::Source, Flex::Cells(cells)).unwrap();
        heap.manage(id).unwrap();
        id
    }

    #[test]
    pub fn test_unreachable_stubs_are_swept() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let mut clock = Clock::default();

        let kept = managed_block(&mut heap, vec![Cell::integer(1)]);
        let garbage = managed_block(&mut heap, vec![Cell::integer(2)]);
        let manual = heap.alloc(Flavor::Source, 1).unwrap();

        let roots = vec![kept];
        let stats = collect(&roots, &mut heap, &mut symbols, &mut clock, false).unwrap();
        assert_eq!(stats.swept, 1);
        assert!(heap.is_live(kept));
        assert!(!heap.is_live(garbage));
        assert!(heap.is_live(manual));

        // nothing changed, nothing to sweep
        let again = collect(&roots, &mut heap, &mut symbols, &mut clock, false).unwrap();
        assert_eq!(again.swept, 0);
        assert_eq!(again.marked, stats.marked);
    }

    #[cfg(any(debug_assertions, feature = "gc-audit"))]
    #[test]
    pub fn test_sweep_audits_unreachable_stubs() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let mut clock = Clock::default();

        let garbage = managed_block(&mut heap, vec![Cell::integer(1)]);
        *heap.stub_mut(garbage).unwrap().flex_mut() = Flex::Bytes(vec![0; 4]);

        let result = collect(&Vec::<StubId>::new(), &mut heap, &mut symbols, &mut clock, false);
        assert!(matches!(
            result,
            Err(ExecutionError::WidthMismatch {
                flavor: Flavor::Source,
                stride: 1,
                ..
            })
        ));
    }

    #[test]
    pub fn test_cycles_terminate() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let mut clock = Clock::default();

        let a = managed_block(&mut heap, vec![]);
        let b = managed_block(&mut heap, vec![Cell::block(a)]);
        heap.push_cell(a, Cell::block(b)).unwrap();

        let stats = collect(&vec![a], &mut heap, &mut symbols, &mut clock, false).unwrap();
        assert_eq!(stats.marked, 2);
        assert!(heap.is_live(b));

        let stats = collect(&Vec::<StubId>::new(), &mut heap, &mut symbols, &mut clock, false)
            .unwrap();
        assert_eq!(stats.swept, 2);
    }

    #[test]
    pub fn test_protected_stubs_survive() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let mut clock = Clock::default();

        let guarded = managed_block(&mut heap, vec![]);
        heap.protect(guarded);
        collect(&Vec::<StubId>::new(), &mut heap, &mut symbols, &mut clock, false).unwrap();
        assert!(heap.is_live(guarded));
        heap.unprotect(guarded);
        collect(&Vec::<StubId>::new(), &mut heap, &mut symbols, &mut clock, false).unwrap();
        assert!(!heap.is_live(guarded));
    }

    #[test]
    pub fn test_patches_live_with_their_module() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let mut clock = Clock::default();
        let x = symbols.intern("x");

        let keep = make_sea(&mut heap, None).unwrap();
        let drop = make_sea(&mut heap, None).unwrap();
        let value = managed_block(&mut heap, vec![Cell::integer(7)]);
        sea_define(&mut heap, &mut symbols, keep, x, Cell::block(value)).unwrap();
        sea_define(&mut heap, &mut symbols, drop, x, Cell::integer(1)).unwrap();

        collect(&vec![keep], &mut heap, &mut symbols, &mut clock, false).unwrap();

        assert!(!heap.is_live(drop));
        assert!(heap.is_live(value));
        let loc = sea_lookup(&heap, &symbols, keep, x).unwrap().unwrap();
        assert!(heap.is_live(loc.stub));
        assert_eq!(hitch_patches(&heap, &symbols, x).unwrap(), vec![loc.stub]);
    }
}
