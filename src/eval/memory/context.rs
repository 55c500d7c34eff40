//! Contexts: objects, frames, errors and sea-of-vars modules
//!
//! A dense context is a `Varlist` of values whose link is a
//! `Keylist` of symbols. A module is a `Sea` with no dense storage:
//! each of its variables is a `Patch` stub threaded onto the hitch
//! chain of the variable's symbol, so adding a variable never moves
//! or resizes anything.

use crate::eval::error::ExecutionError;

use super::{
    cell::Cell,
    flavor::Flavor,
    heap::Heap,
    stub::{Aux, Flex, Stub, StubId},
    symbol::{sym, SymbolId, SymbolTable},
};

/// Where a variable lives: a cell slot in a stub
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub stub: StubId,
    pub index: usize,
}

impl Location {
    pub fn new(stub: StubId, index: usize) -> Self {
        Location { stub, index }
    }
}

/// Kinds of dense context, recorded in the varlist's misc slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    Object = 0,
    Frame = 1,
    Error = 2,
}

impl ContextKind {
    fn from_code(code: usize) -> Option<ContextKind> {
        match code {
            0 => Some(ContextKind::Object),
            1 => Some(ContextKind::Frame),
            2 => Some(ContextKind::Error),
            _ => None,
        }
    }
}

pub fn make_keylist(heap: &mut Heap, keys: &[SymbolId]) -> Result<StubId, ExecutionError> {
    let keylist = heap.alloc_flex(Flavor::Keylist, Flex::Symbols(keys.to_vec()))?;
    heap.manage(keylist)?;
    Ok(keylist)
}

/// A managed context with the given keys; missing values are trash
pub fn make_varlist(
    heap: &mut Heap,
    kind: ContextKind,
    keys: &[SymbolId],
    values: &[Cell],
) -> Result<StubId, ExecutionError> {
    let keylist = make_keylist(heap, keys)?;
    varlist_for_keylist(heap, kind, keylist, values)
}

pub fn varlist_for_keylist(
    heap: &mut Heap,
    kind: ContextKind,
    keylist: StubId,
    values: &[Cell],
) -> Result<StubId, ExecutionError> {
    let len = heap.stub(keylist)?.symbols().len();
    let mut cells = values.to_vec();
    cells.resize(len, Cell::trash());

    let varlist = heap.alloc_flex(Flavor::Varlist, Flex::Cells(cells))?;
    let stub = heap.stub_mut(varlist)?;
    stub.set_link(Aux::Stub(keylist));
    stub.set_misc(Aux::Len(kind as usize));
    heap.manage(varlist)?;
    Ok(varlist)
}

/// A frame for a composed action, remembering the action's details
pub fn make_frame(
    heap: &mut Heap,
    keylist: StubId,
    args: &[Cell],
    details: StubId,
) -> Result<StubId, ExecutionError> {
    let frame = varlist_for_keylist(heap, ContextKind::Frame, keylist, args)?;
    heap.stub_mut(frame)?.set_bonus(Aux::Stub(details));
    Ok(frame)
}

pub fn context_kind(heap: &Heap, ctx: StubId) -> Option<ContextKind> {
    let stub = heap.stub(ctx).ok()?;
    if stub.flavor() != Flavor::Varlist {
        return None;
    }
    stub.misc().len().and_then(ContextKind::from_code)
}

/// Keys of a dense context
pub fn keys(heap: &Heap, ctx: StubId) -> Result<&[SymbolId], ExecutionError> {
    let stub = heap.stub(ctx)?;
    match stub.link() {
        Aux::Stub(keylist) if stub.flavor() == Flavor::Varlist => Ok(heap.stub(keylist)?.symbols()),
        _ => Err(ExecutionError::type_mismatch(
            "context",
            format!("{:?}", stub.flavor()),
        )),
    }
}

/// Find a variable in a context or module (modules inherit from
/// their parent)
pub fn find(
    heap: &Heap,
    symbols: &SymbolTable,
    ctx: StubId,
    symbol: SymbolId,
) -> Result<Option<Location>, ExecutionError> {
    match heap.stub(ctx)?.flavor() {
        Flavor::Varlist => Ok(keys(heap, ctx)?
            .iter()
            .position(|k| symbols.same(*k, symbol))
            .map(|i| Location::new(ctx, i))),
        Flavor::Sea => sea_lookup(heap, symbols, ctx, symbol),
        other => Err(ExecutionError::type_mismatch(
            "context",
            format!("{:?}", other),
        )),
    }
}

pub fn read(heap: &Heap, location: Location) -> Result<Cell, ExecutionError> {
    heap.stub(location.stub)?
        .cells()
        .get(location.index)
        .copied()
        .ok_or_else(|| ExecutionError::Panic(format!("no variable at {:?}", location)))
}

pub fn write(heap: &mut Heap, location: Location, value: Cell) -> Result<(), ExecutionError> {
    heap.set_cell(location.stub, location.index, value)
}

/// A managed, empty module
pub fn make_sea(heap: &mut Heap, parent: Option<StubId>) -> Result<StubId, ExecutionError> {
    let sea = heap.alloc(Flavor::Sea, 0)?;
    if let Some(parent) = parent {
        heap.stub_mut(sea)?.set_link(Aux::Stub(parent));
    }
    heap.manage(sea)?;
    Ok(sea)
}

/// Walk the hitch chain of `symbol`, returning the first patch
/// accepted by `visit`
fn scan_hitch(
    heap: &Heap,
    symbols: &SymbolTable,
    symbol: SymbolId,
    mut visit: impl FnMut(StubId, &Stub) -> bool,
) -> Result<Option<StubId>, ExecutionError> {
    let canon = symbols.canon(symbol);
    let corrupt = || ExecutionError::CorruptHitchChain(symbols.resolve(canon).to_string());

    let limit = heap.stats().live;
    let mut steps = 0;
    let mut next = symbols.hitch(canon);

    while let Some(id) = next {
        steps += 1;
        if steps > limit {
            return Err(corrupt());
        }
        let stub = heap.stub(id).map_err(|_| corrupt())?;
        if stub.flavor() != Flavor::Patch {
            return Err(corrupt());
        }
        if visit(id, stub) {
            return Ok(Some(id));
        }
        next = match stub.link() {
            Aux::Stub(n) => Some(n),
            Aux::Symbol(s) if symbols.canon(s) == canon => None,
            _ => return Err(corrupt()),
        };
    }
    Ok(None)
}

/// All patches on the hitch chain of `symbol`, in chain order
pub fn hitch_patches(
    heap: &Heap,
    symbols: &SymbolTable,
    symbol: SymbolId,
) -> Result<Vec<StubId>, ExecutionError> {
    let mut patches = vec![];
    scan_hitch(heap, symbols, symbol, |id, _| {
        patches.push(id);
        false
    })?;
    Ok(patches)
}

/// The patch for `symbol` owned by exactly this sea
pub fn sea_patch(
    heap: &Heap,
    symbols: &SymbolTable,
    sea: StubId,
    symbol: SymbolId,
) -> Result<Option<StubId>, ExecutionError> {
    scan_hitch(heap, symbols, symbol, |_, stub| {
        stub.info() == Aux::Stub(sea)
    })
}

/// Look a symbol up in a sea, then its ancestors
pub fn sea_lookup(
    heap: &Heap,
    symbols: &SymbolTable,
    sea: StubId,
    symbol: SymbolId,
) -> Result<Option<Location>, ExecutionError> {
    let mut current = Some(sea);
    let mut depth = 0;
    while let Some(module) = current {
        if let Some(patch) = sea_patch(heap, symbols, module, symbol)? {
            return Ok(Some(Location::new(patch, 0)));
        }
        depth += 1;
        if depth > heap.stats().live {
            return Err(ExecutionError::Panic(format!("module {} inherits from itself", sea)));
        }
        current = heap.stub(module)?.link().stub();
    }
    Ok(None)
}

/// Set a module variable, creating its patch if the module does not
/// have one yet
pub fn sea_define(
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    sea: StubId,
    symbol: SymbolId,
    value: Cell,
) -> Result<Location, ExecutionError> {
    if let Some(patch) = sea_patch(heap, symbols, sea, symbol)? {
        let location = Location::new(patch, 0);
        write(heap, location, value)?;
        return Ok(location);
    }

    let canon = symbols.canon(symbol);
    let patch = heap.alloc_flex(Flavor::Patch, Flex::Cells(vec![value]))?;
    let stub = heap.stub_mut(patch)?;
    stub.set_misc(Aux::Symbol(canon));
    stub.set_info(Aux::Stub(sea));
    stub.set_link(match symbols.hitch(canon) {
        Some(head) => Aux::Stub(head),
        None => Aux::Symbol(canon),
    });
    heap.manage(patch)?;
    symbols.set_hitch(canon, Some(patch));
    Ok(Location::new(patch, 0))
}

/// Variables defined directly in a module, ordered by symbol
pub fn sea_vars(
    heap: &Heap,
    symbols: &SymbolTable,
    sea: StubId,
) -> Result<Vec<(SymbolId, Cell)>, ExecutionError> {
    let mut vars = vec![];
    for canon in symbols.hitched() {
        if let Some(patch) = sea_patch(heap, symbols, sea, canon)? {
            vars.push((canon, read(heap, Location::new(patch, 0))?));
        }
    }
    Ok(vars)
}

/// A managed text cell
pub fn make_text(heap: &mut Heap, text: &str) -> Result<Cell, ExecutionError> {
    let stub = heap.alloc_flex(Flavor::Text, Flex::Bytes(text.as_bytes().to_vec()))?;
    heap.manage(stub)?;
    Ok(Cell::text(stub))
}

/// Build the `error!` context for an error
pub fn make_error(
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    error: &ExecutionError,
    near: Option<Cell>,
) -> Result<StubId, ExecutionError> {
    let id = Cell::word(symbols.intern(error.id()));
    let message = make_text(heap, &error.to_string())?;
    let mut values = vec![id, message];
    for arg in error.args().iter().take(2) {
        values.push(make_text(heap, arg)?);
    }
    values.resize(4, Cell::null());
    values.push(near.unwrap_or_else(Cell::null));

    make_varlist(
        heap,
        ContextKind::Error,
        &[sym::ID, sym::MESSAGE, sym::ARG1, sym::ARG2, sym::NEAR],
        &values,
    )
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_object_lookup_ignores_case() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let a = symbols.intern("a");
        let upper = symbols.intern("A");
        let b = symbols.intern("b");

        let obj = make_varlist(
            &mut heap,
            ContextKind::Object,
            &[a, b],
            &[Cell::integer(1)],
        )
        .unwrap();

        let loc = find(&heap, &symbols, obj, upper).unwrap().unwrap();
        assert_eq!(read(&heap, loc).unwrap(), Cell::integer(1));
        let loc = find(&heap, &symbols, obj, b).unwrap().unwrap();
        assert!(read(&heap, loc).unwrap().is_trash());
        assert_eq!(context_kind(&heap, obj), Some(ContextKind::Object));
    }

    #[test]
    pub fn test_sea_define_and_inherit() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let y = symbols.intern("y");

        let lib = make_sea(&mut heap, None).unwrap();
        let user = make_sea(&mut heap, Some(lib)).unwrap();

        sea_define(&mut heap, &mut symbols, lib, x, Cell::integer(1)).unwrap();
        sea_define(&mut heap, &mut symbols, user, y, Cell::integer(2)).unwrap();

        let loc = sea_lookup(&heap, &symbols, user, x).unwrap().unwrap();
        assert_eq!(read(&heap, loc).unwrap(), Cell::integer(1));
        assert!(sea_lookup(&heap, &symbols, lib, y).unwrap().is_none());

        // shadow in user without touching lib
        sea_define(&mut heap, &mut symbols, user, x, Cell::integer(10)).unwrap();
        let loc = sea_lookup(&heap, &symbols, user, x).unwrap().unwrap();
        assert_eq!(read(&heap, loc).unwrap(), Cell::integer(10));
        let loc = sea_lookup(&heap, &symbols, lib, x).unwrap().unwrap();
        assert_eq!(read(&heap, loc).unwrap(), Cell::integer(1));

        assert_eq!(hitch_patches(&heap, &symbols, x).unwrap().len(), 2);
    }

    #[test]
    pub fn test_redefinition_reuses_patch() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let sea = make_sea(&mut heap, None).unwrap();
        let first = sea_define(&mut heap, &mut symbols, sea, x, Cell::integer(1)).unwrap();
        let second = sea_define(&mut heap, &mut symbols, sea, x, Cell::integer(2)).unwrap();
        assert_eq!(first, second);
        assert_eq!(sea_vars(&heap, &symbols, sea).unwrap(), vec![(x, Cell::integer(2))]);
    }

    #[test]
    pub fn test_corrupt_hitch_chain_detected() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let sea = make_sea(&mut heap, None).unwrap();
        let loc = sea_define(&mut heap, &mut symbols, sea, x, Cell::integer(1)).unwrap();

        // point the chain back at itself
        heap.stub_mut(loc.stub)
            .unwrap()
            .set_link(Aux::Stub(loc.stub));
        let other = symbols.intern("other");
        assert!(matches!(
            sea_lookup(&heap, &symbols, sea, x),
            Ok(Some(_))
        ));
        assert!(sea_lookup(&heap, &symbols, sea, other).unwrap().is_none());
        assert!(matches!(
            hitch_patches(&heap, &symbols, x),
            Err(ExecutionError::CorruptHitchChain(_))
        ));
    }

    #[test]
    pub fn test_error_context_fields() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let err = ExecutionError::NotBound("foo".to_string());
        let ctx = make_error(&mut heap, &mut symbols, &err, None).unwrap();
        assert_eq!(context_kind(&heap, ctx), Some(ContextKind::Error));
        let loc = find(&heap, &symbols, ctx, sym::ID).unwrap().unwrap();
        let id = read(&heap, loc).unwrap();
        assert_eq!(symbols.resolve(id.symbol().unwrap()), "not-bound");
        let loc = find(&heap, &symbols, ctx, sym::ARG2).unwrap().unwrap();
        assert!(read(&heap, loc).unwrap().is_null());
    }
}
