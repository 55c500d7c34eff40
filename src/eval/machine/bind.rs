//! Virtual binding
//!
//! A chain is a linked list of immutable nodes, innermost first,
//! that says which contexts to consult before a word's own binding.
//! Evaluating code under a new scope pushes a node in front of the
//! current chain; the code block itself is never copied or changed.
//!
//! Node flavors:
//!  - `Use`: one context (misc), then the next node (link)
//!  - `Overlay`: several contexts at once (flex), then link
//!  - `Let`: a single variable (info is its symbol), then link
//!  - a frame `Varlist`: the variables of a call; terminal

use crate::eval::{
    error::ExecutionError,
    memory::{
        cell::Cell,
        context::{self, Location},
        flavor::Flavor,
        heap::Heap,
        heart::Heart,
        stub::{Aux, Flex, StubId},
        symbol::{SymbolId, SymbolTable},
    },
};

/// Head of a binding chain (possibly empty)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Chain(Option<StubId>);

impl Chain {
    pub fn empty() -> Self {
        Chain(None)
    }

    pub fn from_node(node: Option<StubId>) -> Self {
        Chain(node)
    }

    pub fn node(self) -> Option<StubId> {
        self.0
    }

    fn link(self) -> Aux {
        self.0.map_or(Aux::None, Aux::Stub)
    }

    /// Consult `context` before this chain
    pub fn push_use(self, heap: &mut Heap, context: StubId) -> Result<Chain, ExecutionError> {
        check_context(heap, context)?;
        let node = heap.alloc(Flavor::Use, 0)?;
        let stub = heap.stub_mut(node)?;
        stub.set_misc(Aux::Stub(context));
        stub.set_link(self.link());
        heap.manage(node)?;
        Ok(Chain(Some(node)))
    }

    /// Consult all of `contexts` (which must not share a word)
    /// before this chain
    pub fn push_overlay(
        self,
        heap: &mut Heap,
        contexts: &[StubId],
    ) -> Result<Chain, ExecutionError> {
        for ctx in contexts {
            check_context(heap, *ctx)?;
        }
        let node = heap.alloc_flex(Flavor::Overlay, Flex::Stubs(contexts.to_vec()))?;
        heap.stub_mut(node)?.set_link(self.link());
        heap.manage(node)?;
        Ok(Chain(Some(node)))
    }

    /// Introduce a single variable in front of this chain
    pub fn push_let(
        self,
        heap: &mut Heap,
        symbol: SymbolId,
        value: Cell,
    ) -> Result<Chain, ExecutionError> {
        let node = heap.alloc_flex(Flavor::Let, Flex::Cells(vec![value]))?;
        let stub = heap.stub_mut(node)?;
        stub.set_info(Aux::Symbol(symbol));
        stub.set_link(self.link());
        heap.manage(node)?;
        Ok(Chain(Some(node)))
    }

    /// A frame ends the chain: nothing outside the call is consulted
    /// through it
    pub fn push_frame(self, frame: StubId) -> Chain {
        Chain(Some(frame))
    }
}

fn check_context(heap: &Heap, ctx: StubId) -> Result<(), ExecutionError> {
    match heap.stub(ctx)?.flavor() {
        Flavor::Varlist | Flavor::Sea => Ok(()),
        other => Err(ExecutionError::type_mismatch(
            "context",
            format!("{:?}", other),
        )),
    }
}

/// Look `symbol` up starting at `node`
pub fn walk(
    heap: &Heap,
    symbols: &SymbolTable,
    node: StubId,
    symbol: SymbolId,
) -> Result<Option<Location>, ExecutionError> {
    let mut current = Some(node);
    let mut steps = 0;
    let limit = heap.stats().live;

    while let Some(id) = current {
        steps += 1;
        if steps > limit {
            return Err(ExecutionError::BadChainNode(format!("cycle at {}", id)));
        }

        let stub = heap.stub(id)?;
        match stub.flavor() {
            Flavor::Use => {
                if let Some(ctx) = stub.misc().stub() {
                    if let Some(loc) = context::find(heap, symbols, ctx, symbol)? {
                        return Ok(Some(loc));
                    }
                }
                current = stub.link().stub();
            }
            Flavor::Overlay => {
                let mut found = None;
                for ctx in stub.stubs() {
                    if let Some(loc) = context::find(heap, symbols, *ctx, symbol)? {
                        if found.is_some() {
                            return Err(ExecutionError::AmbiguousBinding(
                                symbols.resolve(symbol).to_string(),
                            ));
                        }
                        found = Some(loc);
                    }
                }
                if found.is_some() {
                    return Ok(found);
                }
                current = stub.link().stub();
            }
            Flavor::Let => {
                if let Some(s) = stub.info().symbol() {
                    if symbols.same(s, symbol) {
                        return Ok(Some(Location::new(id, 0)));
                    }
                }
                current = stub.link().stub();
            }
            Flavor::Varlist | Flavor::Sea => return context::find(heap, symbols, id, symbol),
            Flavor::Patch => {
                let hit = stub.misc().symbol().map_or(false, |s| symbols.same(s, symbol));
                return Ok(hit.then(|| Location::new(id, 0)));
            }
            other => return Err(ExecutionError::BadChainNode(format!("{:?}", other))),
        }
    }
    Ok(None)
}

/// Where a word's variable lives: the chain first, then the word's
/// own binding
pub fn resolve(
    heap: &Heap,
    symbols: &SymbolTable,
    word: &Cell,
    chain: Chain,
) -> Result<Location, ExecutionError> {
    let symbol = word
        .symbol()
        .ok_or_else(|| ExecutionError::type_mismatch("word!", word.kind().to_string()))?;

    if let Some(node) = chain.node() {
        if let Some(loc) = walk(heap, symbols, node, symbol)? {
            return Ok(loc);
        }
    }
    if let Some(own) = word.binding() {
        if let Some(loc) = walk(heap, symbols, own, symbol)? {
            return Ok(loc);
        }
    }
    Err(ExecutionError::NotBound(symbols.resolve(symbol).to_string()))
}

/// Variable for an assignment; a word attached to a module but not
/// yet defined there gets a new variable
pub fn resolve_for_set(
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    word: &Cell,
    chain: Chain,
) -> Result<Location, ExecutionError> {
    match resolve(heap, symbols, word, chain) {
        Err(ExecutionError::NotBound(name)) => match (word.binding(), word.symbol()) {
            (Some(sea), Some(symbol)) if heap.stub(sea)?.flavor() == Flavor::Sea => {
                context::sea_define(heap, symbols, sea, symbol, Cell::trash())
            }
            _ => Err(ExecutionError::NotBound(name)),
        },
        other => other,
    }
}

/// Value of a word's variable; trash reads as unset
pub fn fetch(
    heap: &Heap,
    symbols: &SymbolTable,
    word: &Cell,
    chain: Chain,
) -> Result<Cell, ExecutionError> {
    let loc = resolve(heap, symbols, word, chain)?;
    let value = context::read(heap, loc)?;
    if value.is_trash() {
        let name = word.symbol().map_or("?", |s| symbols.resolve(s));
        return Err(ExecutionError::Unset(name.to_string()));
    }
    Ok(value)
}

/// Give a value taken from code evaluated under `chain` a binding
/// that remembers the chain
///
/// Arrays without a binding capture the chain itself. Words capture
/// the node that defines them, if the chain defines them at all.
pub fn derive(
    heap: &Heap,
    symbols: &SymbolTable,
    cell: Cell,
    chain: Chain,
) -> Result<Cell, ExecutionError> {
    let node = match chain.node() {
        Some(node) => node,
        None => return Ok(cell),
    };

    match cell.heart() {
        Heart::Word => match cell.symbol() {
            Some(symbol) => match walk(heap, symbols, node, symbol)? {
                Some(loc) => cell.with_binding(Some(loc.stub)),
                None => Ok(cell),
            },
            None => Ok(cell),
        },
        h if h.is_any_array() && cell.binding().is_none() && cell.series().is_some() => {
            cell.with_binding(Some(node))
        }
        _ => Ok(cell),
    }
}

/// Bind every unbound word in `array`, and in arrays nested in it,
/// to `context`
pub fn bind_deep(heap: &mut Heap, array: StubId, context: StubId) -> Result<(), ExecutionError> {
    let mut pending = vec![array];
    let mut seen = vec![];

    while let Some(id) = pending.pop() {
        if seen.contains(&id) {
            continue;
        }
        seen.push(id);

        let cells = heap.cells(id)?.to_vec();
        for (i, cell) in cells.iter().enumerate() {
            if cell.heart() == Heart::Word && cell.binding().is_none() && !cell.lift().is_boxed() {
                heap.set_cell(id, i, cell.with_binding(Some(context))?)?;
            } else if let (true, Some((inner, _))) = (cell.heart().is_any_array(), cell.series()) {
                pending.push(inner);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::context::{make_sea, make_varlist, sea_define, ContextKind};

    struct Fixture {
        heap: Heap,
        symbols: SymbolTable,
    }

    fn fixture() -> Fixture {
        Fixture {
            heap: Heap::new(),
            symbols: SymbolTable::new(),
        }
    }

    impl Fixture {
        fn object(&mut self, pairs: &[(&str, i64)]) -> StubId {
            let keys: Vec<_> = pairs.iter().map(|(k, _)| self.symbols.intern(k)).collect();
            let values: Vec<_> = pairs.iter().map(|(_, v)| Cell::integer(*v)).collect();
            make_varlist(&mut self.heap, ContextKind::Object, &keys, &values).unwrap()
        }

        fn word(&mut self, name: &str) -> Cell {
            Cell::word(self.symbols.intern(name))
        }

        fn get(&mut self, word: Cell, chain: Chain) -> Result<Cell, ExecutionError> {
            fetch(&self.heap, &self.symbols, &word, chain)
        }
    }

    #[test]
    pub fn test_use_shadows_own_binding() {
        let mut f = fixture();
        let user = make_sea(&mut f.heap, None).unwrap();
        let a = f.symbols.intern("a");
        sea_define(&mut f.heap, &mut f.symbols, user, a, Cell::integer(1)).unwrap();
        let obj = f.object(&[("a", 10)]);

        let word = f.word("a").with_binding(Some(user)).unwrap();
        assert_eq!(f.get(word, Chain::empty()).unwrap(), Cell::integer(1));

        let chain = Chain::empty().push_use(&mut f.heap, obj).unwrap();
        assert_eq!(f.get(word, chain).unwrap(), Cell::integer(10));

        // the word itself is untouched
        assert_eq!(word.binding(), Some(user));
    }

    #[test]
    pub fn test_innermost_node_wins() {
        let mut f = fixture();
        let outer = f.object(&[("x", 1), ("y", 2)]);
        let inner = f.object(&[("x", 3)]);
        let chain = Chain::empty()
            .push_use(&mut f.heap, outer)
            .unwrap()
            .push_use(&mut f.heap, inner)
            .unwrap();
        let x = f.word("x");
        let y = f.word("y");
        assert_eq!(f.get(x, chain).unwrap(), Cell::integer(3));
        assert_eq!(f.get(y, chain).unwrap(), Cell::integer(2));
    }

    #[test]
    pub fn test_overlay_conflict_is_ambiguous() {
        let mut f = fixture();
        let one = f.object(&[("a", 1), ("b", 2)]);
        let two = f.object(&[("a", 3), ("c", 4)]);
        let chain = Chain::empty()
            .push_overlay(&mut f.heap, &[one, two])
            .unwrap();
        let b = f.word("b");
        let c = f.word("c");
        let a = f.word("a");
        assert_eq!(f.get(b, chain).unwrap(), Cell::integer(2));
        assert_eq!(f.get(c, chain).unwrap(), Cell::integer(4));
        assert!(matches!(
            f.get(a, chain),
            Err(ExecutionError::AmbiguousBinding(_))
        ));
    }

    #[test]
    pub fn test_let_and_unset() {
        let mut f = fixture();
        let n = f.symbols.intern("n");
        let chain = Chain::empty()
            .push_let(&mut f.heap, n, Cell::trash())
            .unwrap();
        let word = f.word("N");
        assert!(matches!(f.get(word, chain), Err(ExecutionError::Unset(_))));
        let loc = resolve(&f.heap, &f.symbols, &word, chain).unwrap();
        context::write(&mut f.heap, loc, Cell::integer(5)).unwrap();
        assert_eq!(f.get(word, chain).unwrap(), Cell::integer(5));
    }

    #[test]
    pub fn test_frame_is_terminal() {
        let mut f = fixture();
        let outer = f.object(&[("z", 1)]);
        let frame = f.object(&[("p", 2)]);
        let chain = Chain::empty()
            .push_use(&mut f.heap, outer)
            .unwrap()
            .push_frame(frame);
        let z = f.word("z");
        let p = f.word("p");
        assert!(matches!(f.get(z, chain), Err(ExecutionError::NotBound(_))));
        assert_eq!(f.get(p, chain).unwrap(), Cell::integer(2));
    }

    #[test]
    pub fn test_unbound_word() {
        let mut f = fixture();
        let q = f.word("q");
        assert_eq!(
            f.get(q, Chain::empty()),
            Err(ExecutionError::NotBound("q".into()))
        );
    }

    #[test]
    pub fn test_derive_captures_defining_node() {
        let mut f = fixture();
        let obj = f.object(&[("a", 7)]);
        let chain = Chain::empty().push_use(&mut f.heap, obj).unwrap();
        let a = f.word("a");
        let derived = derive(&f.heap, &f.symbols, a, chain).unwrap();
        assert_eq!(derived.binding(), Some(obj));
        assert_eq!(f.get(derived, Chain::empty()).unwrap(), Cell::integer(7));

        let other = f.word("other");
        assert_eq!(derive(&f.heap, &f.symbols, other, chain).unwrap(), other);
    }

    #[test]
    pub fn test_push_use_requires_context() {
        let mut f = fixture();
        let block = f.heap.alloc(Flavor::Source, 0).unwrap();
        assert!(Chain::empty().push_use(&mut f.heap, block).is_err());
    }
}
