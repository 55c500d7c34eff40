//! Natives
//!
//! Actions implemented in Rust. A native receives its arguments
//! already evaluated and decayed (or lifted, for natives that take
//! meta arguments) and either produces a value directly or pushes
//! continuations for the machine to run.

use crate::eval::{
    error::ExecutionError,
    memory::{
        bitset::Bitset,
        cell::{ActionRef, Antiform, Cell, Kind, Sigil},
        collect::CollectStats,
        context::{self, make_error, make_text, make_varlist, ContextKind},
        flavor::Flavor,
        heap::Heap,
        heart::Heart,
        stub::{Aux, Flex, StubId},
        symbol::{SymbolId, SymbolTable},
    },
    mold::mold,
};

use super::{
    bind::{self, Chain},
    cont::{Continuation, Feed},
};

/// Result of executing a native
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The native's value
    Value(Cell),
    /// The native pushed continuations which will produce its value
    Pushed,
}

/// Machine interface exposed to natives
pub trait NativeMachine {
    fn heap(&mut self) -> &mut Heap;

    fn symbols(&mut self) -> &mut SymbolTable;

    /// Heap and symbol table together
    fn memory(&mut self) -> (&mut Heap, &mut SymbolTable);

    /// Push a continuation to run once the native returns
    fn push(&mut self, cont: Continuation) -> Result<(), ExecutionError>;

    /// A trap recording the current unwind heights
    fn checkpoint(&self) -> Continuation;

    /// Collect garbage now
    fn recycle(&mut self) -> Result<CollectStats, ExecutionError>;
}

pub trait Native: Sync {
    /// The name the native is defined under in `lib`
    fn name(&self) -> &str;

    /// Number of arguments taken from the feed
    fn arity(&self) -> usize;

    /// Arguments are received lifted instead of decayed
    fn meta_args(&self) -> bool {
        false
    }

    /// Consumes a set-word from the feed and rebinds the rest of it
    /// (handled by the machine)
    fn binds_feed(&self) -> bool {
        false
    }

    /// Index of the native in the catalogue
    fn index(&self) -> usize {
        index(self.name()).unwrap_or(usize::MAX)
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError>;
}

/// Catalogue of all natives, in index order
pub static NATIVES: &[&dyn Native] = &[
    &Add,
    &Subtract,
    &Multiply,
    &Equal,
    &Either,
    &If,
    &Do,
    &In,
    &Object,
    &Func,
    &Let,
    &Get,
    &Set,
    &Meta,
    &Unmeta,
    &Pack,
    &Raise,
    &Fail,
    &Trap,
    &Recycle,
    &Mold,
    &Charset,
    &Complement,
    &Union,
    &Intersect,
    &Difference,
    &Xor,
    &Pick,
    &Append,
    &Freeze,
    &LengthOf,
];

/// Look up the index of a native by name
pub fn index(name: &str) -> Option<usize> {
    NATIVES.iter().position(|n| n.name() == name)
}

/// Retrieve a native by index
pub fn native(index: usize) -> Option<&'static dyn Native> {
    NATIVES.get(index).copied()
}

/// Native for an action reference, if it is one
pub fn native_for(action: ActionRef) -> Option<&'static dyn Native> {
    match action {
        ActionRef::Native(i) => native(i as usize),
        ActionRef::Composed(_) => None,
    }
}

fn integer_arg(arg: &Cell) -> Result<i64, ExecutionError> {
    arg.as_integer()
        .ok_or_else(|| ExecutionError::type_mismatch("integer!", arg.kind().to_string()))
}

fn series_arg(arg: &Cell, heart: Heart) -> Result<(StubId, u32), ExecutionError> {
    match arg.series() {
        Some(series) if arg.heart() == heart && !arg.is_antiform() && !arg.is_quoted() => {
            Ok(series)
        }
        _ => Err(ExecutionError::type_mismatch(heart.name(), arg.kind().to_string())),
    }
}

/// A block or group, as a feed evaluating under the chain it
/// remembers
fn feed_arg(arg: &Cell) -> Result<Feed, ExecutionError> {
    match (arg.heart(), arg.series()) {
        (Heart::Block | Heart::Group, Some((array, index))) if !arg.is_antiform() => Ok(Feed::new(
            array,
            index,
            Chain::from_node(arg.binding()),
        )),
        _ => Err(ExecutionError::type_mismatch("block!", arg.kind().to_string())),
    }
}

fn text_arg(heap: &Heap, arg: &Cell) -> Result<String, ExecutionError> {
    let (stub, index) = series_arg(arg, Heart::Text)?;
    let bytes = heap.bytes(stub)?;
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExecutionError::type_mismatch("UTF-8 text", e.to_string()))?;
    Ok(text.chars().skip(index as usize).collect())
}

fn bitset_arg(heap: &Heap, arg: &Cell) -> Result<Bitset, ExecutionError> {
    let (stub, _) = series_arg(arg, Heart::Bitset)?;
    Bitset::from_stub(heap, stub)
}

fn context_arg(arg: &Cell) -> Result<StubId, ExecutionError> {
    match arg.context() {
        Some(ctx) if arg.heart().is_any_context() && !arg.is_antiform() => Ok(ctx),
        _ => Err(ExecutionError::type_mismatch("any-context!", arg.kind().to_string())),
    }
}

fn bitset_value(heap: &mut Heap, bitset: Bitset) -> Result<Outcome, ExecutionError> {
    Ok(Outcome::Value(Cell::bitset(bitset.to_stub(heap)?)))
}

/// `null` is the only falsey value
pub fn is_truthy(cell: &Cell) -> bool {
    !cell.is_null()
}

/// Numeric operation on two integers or decimals
fn arithmetic(
    args: &[Cell],
    int: fn(i64, i64) -> Option<i64>,
    dec: fn(f64, f64) -> f64,
) -> Result<Outcome, ExecutionError> {
    let (a, b) = (&args[0], &args[1]);
    if let (Some(x), Some(y)) = (a.as_integer(), b.as_integer()) {
        return int(x, y)
            .map(|n| Outcome::Value(Cell::integer(n)))
            .ok_or(ExecutionError::Overflow);
    }
    match (a.as_decimal(), b.as_decimal()) {
        (Some(x), Some(y)) => Ok(Outcome::Value(Cell::decimal(dec(x, y)))),
        (None, _) => Err(ExecutionError::type_mismatch("number", a.kind().to_string())),
        (_, None) => Err(ExecutionError::type_mismatch("number", b.kind().to_string())),
    }
}

/// Value equality: numbers by value, words by canon, text and
/// bitsets by content, everything else by identity
pub fn values_equal(
    heap: &Heap,
    symbols: &SymbolTable,
    a: &Cell,
    b: &Cell,
) -> Result<bool, ExecutionError> {
    if a.lift() != b.lift() {
        return Ok(false);
    }
    if let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) {
        return Ok(x == y);
    }
    if a.heart() != b.heart() {
        return Ok(false);
    }
    match a.heart() {
        Heart::Word => Ok(match (a.symbol(), b.symbol()) {
            (Some(x), Some(y)) => symbols.same(x, y) && a.sigil() == b.sigil(),
            _ => false,
        }),
        Heart::Text if a.kind() == Kind::Plain(Heart::Text) => {
            Ok(text_arg(heap, a)? == text_arg(heap, b)?)
        }
        Heart::Bitset if a.kind() == Kind::Plain(Heart::Bitset) => {
            Ok(bitset_arg(heap, a)? == bitset_arg(heap, b)?)
        }
        _ => Ok(a.payload() == b.payload()),
    }
}

pub struct Add;

impl Native for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(&self, _: &mut dyn NativeMachine, args: &[Cell]) -> Result<Outcome, ExecutionError> {
        arithmetic(args, i64::checked_add, |x, y| x + y)
    }
}

pub struct Subtract;

impl Native for Subtract {
    fn name(&self) -> &str {
        "subtract"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(&self, _: &mut dyn NativeMachine, args: &[Cell]) -> Result<Outcome, ExecutionError> {
        arithmetic(args, i64::checked_sub, |x, y| x - y)
    }
}

pub struct Multiply;

impl Native for Multiply {
    fn name(&self) -> &str {
        "multiply"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(&self, _: &mut dyn NativeMachine, args: &[Cell]) -> Result<Outcome, ExecutionError> {
        arithmetic(args, i64::checked_mul, |x, y| x * y)
    }
}

pub struct Equal;

impl Native for Equal {
    fn name(&self) -> &str {
        "equal?"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let (heap, symbols) = machine.memory();
        let same = values_equal(heap, symbols, &args[0], &args[1])?;
        Ok(Outcome::Value(Cell::logic(same)))
    }
}

pub struct Either;

impl Native for Either {
    fn name(&self) -> &str {
        "either"
    }

    fn arity(&self) -> usize {
        3
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let branch = if is_truthy(&args[0]) { &args[1] } else { &args[2] };
        machine.push(Continuation::Sequence {
            feed: feed_arg(branch)?,
            product: Cell::ghost(),
        })?;
        Ok(Outcome::Pushed)
    }
}

pub struct If;

impl Native for If {
    fn name(&self) -> &str {
        "if"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let feed = feed_arg(&args[1])?;
        if !is_truthy(&args[0]) {
            return Ok(Outcome::Value(Cell::null()));
        }
        machine.push(Continuation::Sequence {
            feed,
            product: Cell::ghost(),
        })?;
        Ok(Outcome::Pushed)
    }
}

pub struct Do;

impl Native for Do {
    fn name(&self) -> &str {
        "do"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        machine.push(Continuation::Sequence {
            feed: feed_arg(&args[0])?,
            product: Cell::ghost(),
        })?;
        Ok(Outcome::Pushed)
    }
}

/// `in context block`: the block, with `context` consulted first
/// when its words are looked up. A block of contexts is consulted
/// as an overlay.
pub struct In;

impl Native for In {
    fn name(&self) -> &str {
        "in"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let feed = feed_arg(&args[1])?;
        let (heap, symbols) = machine.memory();

        let chain = match (args[0].heart(), args[0].series()) {
            (Heart::Block, Some((stub, index))) => {
                // words in the block name their contexts
                let scope = Chain::from_node(args[0].binding());
                let contexts = heap.cells(stub)?[index as usize..]
                    .iter()
                    .map(|c| match c.heart() {
                        Heart::Word => context_arg(&bind::fetch(heap, symbols, c, scope)?),
                        _ => context_arg(c),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                feed.chain.push_overlay(heap, &contexts)?
            }
            _ => feed.chain.push_use(heap, context_arg(&args[0])?)?,
        };

        Ok(Outcome::Value(args[1].with_binding(chain.node())?))
    }
}

/// `object spec`: a context with a field for every set-word at the
/// top level of `spec`, which is then evaluated inside it
pub struct Object;

impl Native for Object {
    fn name(&self) -> &str {
        "object"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let feed = feed_arg(&args[0])?;
        let (heap, symbols) = machine.memory();

        let mut keys: Vec<SymbolId> = vec![];
        for cell in &heap.cells(feed.array)?[feed.index as usize..] {
            if let (Some(symbol), Some(Sigil::Set)) =
                (cell.symbol(), cell.sigil())
            {
                if !cell.is_quoted() && !keys.iter().any(|k| symbols.same(*k, symbol)) {
                    keys.push(symbol);
                }
            }
        }

        let obj = make_varlist(heap, ContextKind::Object, &keys, &[])?;
        let chain = feed.chain.push_use(heap, obj)?;

        machine.push(Continuation::Produce {
            value: Cell::object(obj),
        })?;
        machine.push(Continuation::Sequence {
            feed: Feed { chain, ..feed },
            product: Cell::ghost(),
        })?;
        Ok(Outcome::Pushed)
    }
}

/// `func params body`: a composed action
pub struct Func;

impl Native for Func {
    fn name(&self) -> &str {
        "func"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let (params, index) = series_arg(&args[0], Heart::Block)?;
        series_arg(&args[1], Heart::Block)?;
        let heap = machine.heap();

        let keys = heap.cells(params)?[index as usize..]
            .iter()
            .map(|p| match (p.heart(), p.symbol()) {
                (Heart::Word, Some(symbol)) if !p.is_quoted() => Ok(symbol),
                _ => Err(ExecutionError::type_mismatch("word!", p.kind().to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let keylist = context::make_keylist(heap, &keys)?;
        let details = heap.alloc_flex(Flavor::Details, Flex::Cells(vec![args[1]]))?;
        heap.stub_mut(details)?.set_link(Aux::Stub(keylist));
        heap.manage(details)?;

        Ok(Outcome::Value(Cell::action(ActionRef::Composed(details))))
    }
}

/// `let x: value`; evaluated by the machine, which owns the feed
pub struct Let;

impl Native for Let {
    fn name(&self) -> &str {
        "let"
    }

    fn arity(&self) -> usize {
        0
    }

    fn binds_feed(&self) -> bool {
        true
    }

    fn execute(&self, _: &mut dyn NativeMachine, _: &[Cell]) -> Result<Outcome, ExecutionError> {
        Err(ExecutionError::NoArg("let".to_string()))
    }
}

pub struct Get;

impl Native for Get {
    fn name(&self) -> &str {
        "get"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let (heap, symbols) = machine.memory();
        let value = bind::fetch(heap, symbols, &args[0].with_sigil(Sigil::None), Chain::empty())?;
        Ok(Outcome::Value(value))
    }
}

pub struct Set;

impl Native for Set {
    fn name(&self) -> &str {
        "set"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let (heap, symbols) = machine.memory();
        let word = args[0].with_sigil(Sigil::None);
        let location = bind::resolve_for_set(heap, symbols, &word, Chain::empty())?;
        context::write(heap, location, args[1])?;
        Ok(Outcome::Value(args[1]))
    }
}

/// The lifted form of its argument
pub struct Meta;

impl Native for Meta {
    fn name(&self) -> &str {
        "meta"
    }

    fn arity(&self) -> usize {
        1
    }

    fn meta_args(&self) -> bool {
        true
    }

    fn execute(&self, _: &mut dyn NativeMachine, args: &[Cell]) -> Result<Outcome, ExecutionError> {
        Ok(Outcome::Value(args[0]))
    }
}

pub struct Unmeta;

impl Native for Unmeta {
    fn name(&self) -> &str {
        "unmeta"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        Ok(Outcome::Value(args[0].unmeta(machine.heap())?))
    }
}

/// Pack the elements of a block as a multi-return
pub struct Pack;

impl Native for Pack {
    fn name(&self) -> &str {
        "pack"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let (stub, index) = series_arg(&args[0], Heart::Block)?;
        let heap = machine.heap();
        let elements = heap.cells(stub)?[index as usize..].to_vec();
        let lifted = elements
            .into_iter()
            .map(|e| e.meta(heap))
            .collect::<Result<Vec<_>, _>>()?;
        let pack = heap.alloc_flex(Flavor::Source, Flex::Cells(lifted))?;
        heap.manage(pack)?;
        Ok(Outcome::Value(Cell::pack(pack)))
    }
}

/// A raised error, which fails only if something tries to use it
pub struct Raise;

impl Native for Raise {
    fn name(&self) -> &str {
        "raise"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let (heap, symbols) = machine.memory();
        let message = text_arg(heap, &args[0])?;
        let ctx = make_error(heap, symbols, &ExecutionError::User(message), None)?;
        Ok(Outcome::Value(Cell::raised(ctx)))
    }
}

pub struct Fail;

impl Native for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        Err(ExecutionError::User(text_arg(machine.heap(), &args[0])?))
    }
}

/// Evaluate a block; a recoverable error raised inside it becomes an
/// `error!` value
pub struct Trap;

impl Native for Trap {
    fn name(&self) -> &str {
        "trap"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let feed = feed_arg(&args[0])?;
        let checkpoint = machine.checkpoint();
        machine.push(checkpoint)?;
        machine.push(Continuation::Sequence {
            feed,
            product: Cell::ghost(),
        })?;
        Ok(Outcome::Pushed)
    }
}

pub struct Recycle;

impl Native for Recycle {
    fn name(&self) -> &str {
        "recycle"
    }

    fn arity(&self) -> usize {
        0
    }

    fn execute(&self, machine: &mut dyn NativeMachine, _: &[Cell]) -> Result<Outcome, ExecutionError> {
        let stats = machine.recycle()?;
        Ok(Outcome::Value(Cell::integer(stats.swept as i64)))
    }
}

pub struct Mold;

impl Native for Mold {
    fn name(&self) -> &str {
        "mold"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let (heap, symbols) = machine.memory();
        let text = mold(heap, symbols, &args[0])?;
        Ok(Outcome::Value(make_text(heap, &text)?))
    }
}

/// Bitset of the characters in a text
pub struct Charset;

impl Native for Charset {
    fn name(&self) -> &str {
        "charset"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let heap = machine.heap();
        let text = text_arg(heap, &args[0])?;
        bitset_value(heap, Bitset::charset(&text))
    }
}

pub struct Complement;

impl Native for Complement {
    fn name(&self) -> &str {
        "complement"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let heap = machine.heap();
        let set = bitset_arg(heap, &args[0])?;
        bitset_value(heap, set.complement())
    }
}

fn bitset_binary(
    machine: &mut dyn NativeMachine,
    args: &[Cell],
    op: fn(&Bitset, &Bitset) -> Bitset,
) -> Result<Outcome, ExecutionError> {
    let heap = machine.heap();
    let a = bitset_arg(heap, &args[0])?;
    let b = bitset_arg(heap, &args[1])?;
    bitset_value(heap, op(&a, &b))
}

pub struct Union;

impl Native for Union {
    fn name(&self) -> &str {
        "union"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        bitset_binary(machine, args, Bitset::union)
    }
}

pub struct Intersect;

impl Native for Intersect {
    fn name(&self) -> &str {
        "intersect"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        bitset_binary(machine, args, Bitset::intersect)
    }
}

pub struct Difference;

impl Native for Difference {
    fn name(&self) -> &str {
        "difference"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        bitset_binary(machine, args, Bitset::difference)
    }
}

pub struct Xor;

impl Native for Xor {
    fn name(&self) -> &str {
        "xor"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        bitset_binary(machine, args, Bitset::xor)
    }
}

/// `pick series index`: bitsets answer membership, arrays and text
/// are indexed from 1 and give null out of range
pub struct Pick;

impl Native for Pick {
    fn name(&self) -> &str {
        "pick"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let heap = machine.heap();
        let n = integer_arg(&args[1])?;
        let series = &args[0];

        if series.heart() == Heart::Bitset {
            let set = bitset_arg(heap, series)?;
            return Ok(Outcome::Value(Cell::logic(n >= 0 && set.pick(n as usize))));
        }

        if n < 1 {
            return Ok(Outcome::Value(Cell::null()));
        }
        let offset = (n - 1) as usize;

        let picked = match series.heart() {
            Heart::Text => text_arg(heap, series)?.chars().nth(offset).map(Cell::rune),
            h if h.is_any_array() => {
                let (stub, index) = series_arg(series, h)?;
                heap.cells(stub)?.get(index as usize + offset).copied()
            }
            _ => {
                return Err(ExecutionError::type_mismatch(
                    "any-series!",
                    series.kind().to_string(),
                ))
            }
        };
        Ok(Outcome::Value(picked.unwrap_or_else(Cell::null)))
    }
}

/// `append block value`; a splice appends each of its elements
pub struct Append;

impl Native for Append {
    fn name(&self) -> &str {
        "append"
    }

    fn arity(&self) -> usize {
        2
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let (target, _) = series_arg(&args[0], Heart::Block)?;
        let heap = machine.heap();
        let value = args[1];

        if value.antiform_class() == Some(Antiform::Splice) {
            if let Some((stub, index)) = value.series() {
                let items = heap.cells(stub)?[index as usize..].to_vec();
                for item in items {
                    heap.push_cell(target, item)?;
                }
            }
        } else if value.is_antiform() {
            return Err(ExecutionError::type_mismatch(
                "element",
                value.kind().to_string(),
            ));
        } else {
            heap.push_cell(target, value)?;
        }
        Ok(Outcome::Value(args[0]))
    }
}

/// Make a series or context permanently read-only
pub struct Freeze;

impl Native for Freeze {
    fn name(&self) -> &str {
        "freeze"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let arg = &args[0];
        let stub = arg
            .series()
            .map(|(s, _)| s)
            .or_else(|| arg.context())
            .ok_or_else(|| ExecutionError::type_mismatch("series or context", arg.kind().to_string()))?;
        machine.heap().freeze(stub)?;
        Ok(Outcome::Value(*arg))
    }
}

pub struct LengthOf;

impl Native for LengthOf {
    fn name(&self) -> &str {
        "length-of"
    }

    fn arity(&self) -> usize {
        1
    }

    fn execute(
        &self,
        machine: &mut dyn NativeMachine,
        args: &[Cell],
    ) -> Result<Outcome, ExecutionError> {
        let heap = machine.heap();
        let arg = &args[0];
        let len = match arg.heart() {
            Heart::Text => text_arg(heap, arg)?.chars().count(),
            Heart::Bitset => bitset_arg(heap, arg)?.len(),
            Heart::Blob => {
                let (stub, index) = series_arg(arg, Heart::Blob)?;
                heap.bytes(stub)?.len().saturating_sub(index as usize)
            }
            h if h.is_any_array() => {
                let (stub, index) = series_arg(arg, h)?;
                heap.cells(stub)?.len().saturating_sub(index as usize)
            }
            Heart::Object | Heart::Error | Heart::Frame => {
                context::keys(heap, context_arg(arg)?)?.len()
            }
            _ => {
                return Err(ExecutionError::type_mismatch(
                    "series or context",
                    arg.kind().to_string(),
                ))
            }
        };
        Ok(Outcome::Value(Cell::integer(len as i64)))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_natives_have_unique_names() {
        for (i, n) in NATIVES.iter().enumerate() {
            assert_eq!(n.index(), i, "duplicate native {}", n.name());
        }
    }

    #[test]
    pub fn test_lookup() {
        assert_eq!(native(index("add").unwrap()).unwrap().arity(), 2);
        assert!(native(index("meta").unwrap()).unwrap().meta_args());
        assert!(native(index("let").unwrap()).unwrap().binds_feed());
        assert!(index("no-such-native").is_none());
    }

    #[test]
    pub fn test_arithmetic() {
        let sum = arithmetic(&[Cell::integer(2), Cell::integer(3)], i64::checked_add, |x, y| x + y)
            .unwrap();
        assert_eq!(sum, Outcome::Value(Cell::integer(5)));

        let mixed = arithmetic(&[Cell::integer(2), Cell::decimal(0.5)], i64::checked_mul, |x, y| {
            x * y
        })
        .unwrap();
        assert_eq!(mixed, Outcome::Value(Cell::decimal(1.0)));

        assert_eq!(
            arithmetic(&[Cell::integer(i64::MAX), Cell::integer(1)], i64::checked_add, |x, y| x + y),
            Err(ExecutionError::Overflow)
        );
    }

    #[test]
    pub fn test_truthiness() {
        assert!(!is_truthy(&Cell::null()));
        assert!(is_truthy(&Cell::okay()));
        assert!(is_truthy(&Cell::integer(0)));
    }
}
