//! Cells
//!
//! A cell is the fixed-size tagged value that fills arrays, variables
//! and evaluator registers. Its type is the combination of a `Heart`
//! (the underlying datatype) and a `Lift` (quoting level, quasi
//! state, or antiform).
//!
//! Cells quoted more deeply than fits inline are boxed: the inner
//! cell moves to a `Singular` stub and the outer cell records the
//! depth. The heart stays visible on the outer cell.

use std::fmt;

use crate::eval::error::ExecutionError;

use super::{
    flavor::Flavor,
    heap::Heap,
    heart::Heart,
    stub::StubId,
    symbol::{sym, SymbolId},
};

/// Deepest quoting level stored inline
pub const MAX_INLINE_QUOTES: u32 = 126;

/// Quoting level, quasi state or antiform
///
/// `0` is antiform, `1 + 2n` a plain value quoted `n` times and
/// `2 + 2n` a quasiform quoted `n` times. `BOXED` marks a cell whose
/// depth lives in its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Lift(u8);

impl Lift {
    pub const ANTIFORM: Lift = Lift(0);
    pub const NOQUOTE: Lift = Lift(1);
    pub const QUASIFORM: Lift = Lift(2);
    pub const BOXED: Lift = Lift(255);

    /// Inline lift for a depth, if it fits
    pub fn quoted(depth: u32, quasi: bool) -> Option<Lift> {
        if depth > MAX_INLINE_QUOTES {
            None
        } else {
            Some(Lift((1 + 2 * depth + quasi as u32) as u8))
        }
    }

    pub fn is_antiform(self) -> bool {
        self == Lift::ANTIFORM
    }

    pub fn is_boxed(self) -> bool {
        self == Lift::BOXED
    }

    fn depth(self) -> u32 {
        (self.0 as u32).saturating_sub(1) / 2
    }

    fn is_quasi(self) -> bool {
        self.0 != 0 && self.0 % 2 == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sigil {
    None,
    /// `a:`
    Set,
    /// `:a`
    Get,
    /// `^a`
    Meta,
}

/// An action: built in, or composed from a body and parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionRef {
    Native(u16),
    /// Details stub of a composed action
    Composed(StubId),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Payload {
    None,
    Integer(i64),
    Decimal(f64),
    Char(char),
    Word { symbol: SymbolId, sigil: Sigil },
    Series { stub: StubId, index: u32 },
    Context(StubId),
    Action(ActionRef),
    Handle(u64),
    Boxed { stub: StubId, depth: u32, quasi: bool },
}

/// Antiform classes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Antiform {
    Raised,
    Action,
    Trash,
    Ghost,
    Keyword,
    Splice,
    Pack,
}

impl Antiform {
    pub fn for_heart(heart: Heart) -> Option<Antiform> {
        match heart {
            Heart::Error => Some(Antiform::Raised),
            Heart::Frame => Some(Antiform::Action),
            Heart::Rune => Some(Antiform::Trash),
            Heart::Comma => Some(Antiform::Ghost),
            Heart::Word => Some(Antiform::Keyword),
            Heart::Group => Some(Antiform::Splice),
            Heart::Block => Some(Antiform::Pack),
            _ => None,
        }
    }

    /// Stable antiforms may be stored in variables
    pub fn is_stable(self) -> bool {
        !matches!(self, Antiform::Raised | Antiform::Ghost | Antiform::Pack)
    }

    pub fn name(self) -> &'static str {
        match self {
            Antiform::Raised => "raised",
            Antiform::Action => "action",
            Antiform::Trash => "trash",
            Antiform::Ghost => "ghost",
            Antiform::Keyword => "keyword",
            Antiform::Splice => "splice",
            Antiform::Pack => "pack",
        }
    }
}

/// Normalised type of a cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Quoted,
    Quasi,
    Anti(Antiform),
    Plain(Heart),
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Quoted => write!(f, "quoted!"),
            Kind::Quasi => write!(f, "quasiform!"),
            Kind::Anti(a) => write!(f, "{}!", a.name()),
            Kind::Plain(h) => write!(f, "{}", h),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    heart: Heart,
    lift: Lift,
    payload: Payload,
    binding: Option<StubId>,
}

impl Cell {
    fn plain(heart: Heart, payload: Payload) -> Cell {
        Cell {
            heart,
            lift: Lift::NOQUOTE,
            payload,
            binding: None,
        }
    }

    fn antiform(heart: Heart, payload: Payload) -> Cell {
        Cell {
            heart,
            lift: Lift::ANTIFORM,
            payload,
            binding: None,
        }
    }

    pub fn integer(n: i64) -> Cell {
        Cell::plain(Heart::Integer, Payload::Integer(n))
    }

    pub fn decimal(d: f64) -> Cell {
        Cell::plain(Heart::Decimal, Payload::Decimal(d))
    }

    pub fn text(stub: StubId) -> Cell {
        Cell::plain(Heart::Text, Payload::Series { stub, index: 0 })
    }

    pub fn blob(stub: StubId) -> Cell {
        Cell::plain(Heart::Blob, Payload::Series { stub, index: 0 })
    }

    pub fn bitset(stub: StubId) -> Cell {
        Cell::plain(Heart::Bitset, Payload::Series { stub, index: 0 })
    }

    pub fn handle(h: u64) -> Cell {
        Cell::plain(Heart::Handle, Payload::Handle(h))
    }

    pub fn object(varlist: StubId) -> Cell {
        Cell::plain(Heart::Object, Payload::Context(varlist))
    }

    pub fn module(sea: StubId) -> Cell {
        Cell::plain(Heart::Module, Payload::Context(sea))
    }

    pub fn error(varlist: StubId) -> Cell {
        Cell::plain(Heart::Error, Payload::Context(varlist))
    }

    pub fn frame(varlist: StubId) -> Cell {
        Cell::plain(Heart::Frame, Payload::Context(varlist))
    }

    pub fn rune(c: char) -> Cell {
        Cell::plain(Heart::Rune, Payload::Char(c))
    }

    /// The blank rune `_`
    pub fn space() -> Cell {
        Cell::plain(Heart::Rune, Payload::None)
    }

    pub fn comma() -> Cell {
        Cell::plain(Heart::Comma, Payload::None)
    }

    pub fn word(symbol: SymbolId) -> Cell {
        Cell::sigiled(symbol, Sigil::None)
    }

    pub fn sigiled(symbol: SymbolId, sigil: Sigil) -> Cell {
        Cell::plain(Heart::Word, Payload::Word { symbol, sigil })
    }

    /// An array cell of the given heart at index 0
    pub fn array(heart: Heart, stub: StubId) -> Cell {
        debug_assert!(heart.is_any_array());
        Cell::plain(heart, Payload::Series { stub, index: 0 })
    }

    pub fn block(stub: StubId) -> Cell {
        Cell::array(Heart::Block, stub)
    }

    pub fn group(stub: StubId) -> Cell {
        Cell::array(Heart::Group, stub)
    }

    /// The quasiform `~` (space)
    pub fn quasi_space() -> Cell {
        Cell {
            lift: Lift::QUASIFORM,
            ..Cell::space()
        }
    }

    /// Antiform space: the content of an unset variable
    pub fn trash() -> Cell {
        Cell::antiform(Heart::Rune, Payload::None)
    }

    /// Antiform comma: no value at all
    pub fn ghost() -> Cell {
        Cell::antiform(Heart::Comma, Payload::None)
    }

    pub fn keyword(symbol: SymbolId) -> Cell {
        Cell::antiform(
            Heart::Word,
            Payload::Word {
                symbol,
                sigil: Sigil::None,
            },
        )
    }

    pub fn null() -> Cell {
        Cell::keyword(sym::NULL)
    }

    pub fn okay() -> Cell {
        Cell::keyword(sym::OKAY)
    }

    pub fn logic(b: bool) -> Cell {
        if b {
            Cell::okay()
        } else {
            Cell::null()
        }
    }

    pub fn action(action: ActionRef) -> Cell {
        Cell::antiform(Heart::Frame, Payload::Action(action))
    }

    /// Antiform block whose elements are lifted values
    pub fn pack(stub: StubId) -> Cell {
        Cell::antiform(Heart::Block, Payload::Series { stub, index: 0 })
    }

    pub fn splice(stub: StubId) -> Cell {
        Cell::antiform(Heart::Group, Payload::Series { stub, index: 0 })
    }

    pub fn raised(varlist: StubId) -> Cell {
        Cell::antiform(Heart::Error, Payload::Context(varlist))
    }

    pub fn heart(&self) -> Heart {
        self.heart
    }

    pub fn lift(&self) -> Lift {
        self.lift
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    pub fn binding(&self) -> Option<StubId> {
        self.binding
    }

    /// Depth of quoting, without consulting the heap
    pub fn quote_depth(&self) -> u32 {
        match self.payload {
            Payload::Boxed { depth, .. } => depth,
            _ => self.lift.depth(),
        }
    }

    pub fn is_quasi(&self) -> bool {
        match self.payload {
            Payload::Boxed { quasi, .. } => quasi,
            _ => self.lift.is_quasi(),
        }
    }

    pub fn is_antiform(&self) -> bool {
        self.lift.is_antiform()
    }

    pub fn is_quoted(&self) -> bool {
        self.quote_depth() > 0
    }

    pub fn kind(&self) -> Kind {
        if self.is_antiform() {
            match Antiform::for_heart(self.heart) {
                Some(a) => Kind::Anti(a),
                // only constructible through a broken invariant
                None => Kind::Plain(self.heart),
            }
        } else if self.quote_depth() > 0 {
            Kind::Quoted
        } else if self.is_quasi() {
            Kind::Quasi
        } else {
            Kind::Plain(self.heart)
        }
    }

    pub fn antiform_class(&self) -> Option<Antiform> {
        match self.kind() {
            Kind::Anti(a) => Some(a),
            _ => None,
        }
    }

    /// Not an antiform, or an antiform that may live in a variable
    pub fn is_stable(&self) -> bool {
        self.antiform_class().map_or(true, Antiform::is_stable)
    }

    pub fn is_trash(&self) -> bool {
        self.antiform_class() == Some(Antiform::Trash)
    }

    pub fn is_ghost(&self) -> bool {
        self.antiform_class() == Some(Antiform::Ghost)
    }

    pub fn is_keyword(&self, symbol: SymbolId) -> bool {
        self.antiform_class() == Some(Antiform::Keyword) && self.symbol() == Some(symbol)
    }

    pub fn is_null(&self) -> bool {
        self.is_keyword(sym::NULL)
    }

    pub fn is_bindable(&self) -> bool {
        self.heart.is_bindable()
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.payload {
            Payload::Integer(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self.payload {
            Payload::Decimal(d) => Some(d),
            Payload::Integer(n) => Some(n as f64),
            _ => None,
        }
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        match self.payload {
            Payload::Word { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    pub fn sigil(&self) -> Option<Sigil> {
        match self.payload {
            Payload::Word { sigil, .. } => Some(sigil),
            _ => None,
        }
    }

    pub fn series(&self) -> Option<(StubId, u32)> {
        match self.payload {
            Payload::Series { stub, index } => Some((stub, index)),
            _ => None,
        }
    }

    pub fn context(&self) -> Option<StubId> {
        match self.payload {
            Payload::Context(stub) => Some(stub),
            _ => None,
        }
    }

    pub fn action_ref(&self) -> Option<ActionRef> {
        match self.payload {
            Payload::Action(a) => Some(a),
            _ => None,
        }
    }

    /// Same cell with a new binding; only bindable hearts carry one
    pub fn with_binding(self, binding: Option<StubId>) -> Result<Cell, ExecutionError> {
        if binding.is_some() && !self.is_bindable() {
            return Err(ExecutionError::NotBindable(self.heart));
        }
        Ok(Cell { binding, ..self })
    }

    pub fn with_sigil(self, sigil: Sigil) -> Cell {
        match self.payload {
            Payload::Word { symbol, .. } => Cell {
                payload: Payload::Word { symbol, sigil },
                ..self
            },
            _ => self,
        }
    }

    pub fn with_index(self, index: u32) -> Cell {
        match self.payload {
            Payload::Series { stub, .. } => Cell {
                payload: Payload::Series { stub, index },
                ..self
            },
            _ => self,
        }
    }

    /// Same cell viewed as a different array heart
    pub fn with_heart(self, heart: Heart) -> Cell {
        debug_assert!(self.heart.is_any_array() && heart.is_any_array());
        Cell { heart, ..self }
    }

    /// The unquoted, non-quasi plain form of an inline cell
    fn with_lift(self, lift: Lift) -> Cell {
        Cell { lift, ..self }
    }

    /// Add `n` levels of quoting. Antiforms cannot be quoted.
    pub fn quotify(self, heap: &mut Heap, n: u32) -> Result<Cell, ExecutionError> {
        if self.is_antiform() {
            return Err(ExecutionError::type_mismatch(
                "non-antiform",
                self.kind().to_string(),
            ));
        }
        if n == 0 {
            return Ok(self);
        }

        if let Payload::Boxed { stub, depth, quasi } = self.payload {
            return Ok(Cell {
                payload: Payload::Boxed {
                    stub,
                    depth: depth + n,
                    quasi,
                },
                ..self
            });
        }

        let depth = self.lift.depth() + n;
        let quasi = self.lift.is_quasi();
        match Lift::quoted(depth, quasi) {
            Some(lift) => Ok(self.with_lift(lift)),
            None => {
                let inner = self.with_lift(Lift::NOQUOTE);
                let stub = heap.alloc(Flavor::Singular, 1)?;
                heap.push_cell(stub, inner)?;
                heap.manage(stub)?;
                Ok(Cell {
                    heart: self.heart,
                    lift: Lift::BOXED,
                    payload: Payload::Boxed { stub, depth, quasi },
                    binding: None,
                })
            }
        }
    }

    /// Remove `n` levels of quoting
    pub fn unquotify(self, heap: &Heap, n: u32) -> Result<Cell, ExecutionError> {
        let depth = self.quote_depth();
        if depth < n {
            return Err(ExecutionError::type_mismatch(
                format!("value quoted {} times", n),
                format!("value quoted {} times", depth),
            ));
        }

        match self.payload {
            Payload::Boxed { stub, quasi, .. } => {
                let depth = depth - n;
                if depth > MAX_INLINE_QUOTES {
                    Ok(Cell {
                        payload: Payload::Boxed { stub, depth, quasi },
                        ..self
                    })
                } else {
                    let inner = heap.stub(stub)?.cells().first().copied().ok_or_else(|| {
                        ExecutionError::Panic(format!("empty quote box {}", stub))
                    })?;
                    // depth fits by the branch condition
                    let lift = Lift::quoted(depth, quasi).unwrap_or(Lift::NOQUOTE);
                    Ok(inner.with_lift(lift))
                }
            }
            _ => {
                let lift = Lift::quoted(depth - n, self.lift.is_quasi()).unwrap_or(Lift::NOQUOTE);
                Ok(self.with_lift(lift))
            }
        }
    }

    /// Plain form to quasiform
    pub fn quasify(self) -> Result<Cell, ExecutionError> {
        match self.kind() {
            Kind::Plain(heart) if heart_has_antiform(&self, heart) => {
                Ok(self.with_lift(Lift::QUASIFORM))
            }
            Kind::Plain(heart) => Err(ExecutionError::IllegalAntiform(heart)),
            other => Err(ExecutionError::type_mismatch("plain value", other.to_string())),
        }
    }

    /// Quasiform to plain form
    pub fn unquasify(self) -> Result<Cell, ExecutionError> {
        match self.kind() {
            Kind::Quasi => Ok(self.with_lift(Lift::NOQUOTE)),
            other => Err(ExecutionError::type_mismatch("quasiform!", other.to_string())),
        }
    }

    /// Plain form or quasiform to antiform
    pub fn anti(self) -> Result<Cell, ExecutionError> {
        match self.kind() {
            Kind::Anti(_) => Ok(self),
            Kind::Quoted => Err(ExecutionError::type_mismatch(
                "plain value",
                Kind::Quoted.to_string(),
            )),
            Kind::Plain(_) | Kind::Quasi => {
                if !heart_has_antiform(&self, self.heart) {
                    return Err(ExecutionError::IllegalAntiform(self.heart));
                }
                Ok(Cell {
                    binding: None,
                    ..self.with_lift(Lift::ANTIFORM)
                })
            }
        }
    }

    /// Lift one level: antiforms become quasiforms, everything else
    /// gains a quote
    pub fn meta(self, heap: &mut Heap) -> Result<Cell, ExecutionError> {
        if self.is_antiform() {
            Ok(self.with_lift(Lift::QUASIFORM))
        } else {
            self.quotify(heap, 1)
        }
    }

    /// Inverse of `meta`
    pub fn unmeta(self, heap: &Heap) -> Result<Cell, ExecutionError> {
        match self.kind() {
            Kind::Quasi => self.with_lift(Lift::NOQUOTE).anti(),
            Kind::Quoted => self.unquotify(heap, 1),
            other => Err(ExecutionError::type_mismatch(
                "quoted! or quasiform!",
                other.to_string(),
            )),
        }
    }

    /// Reduce an unstable antiform to a storable value
    ///
    /// Packs give their first element, unlifted. Empty packs and
    /// ghosts have no value. Raised errors fail. Everything else is
    /// returned unchanged.
    pub fn decay(self, heap: &Heap) -> Result<Cell, ExecutionError> {
        match self.antiform_class() {
            Some(Antiform::Pack) => {
                let (stub, index) = self.series().ok_or(ExecutionError::NoValue)?;
                let first = heap
                    .stub(stub)?
                    .cells()
                    .get(index as usize)
                    .copied()
                    .ok_or(ExecutionError::NoValue)?;
                first.unmeta(heap)?.decay(heap)
            }
            Some(Antiform::Raised) => match self.context() {
                Some(ctx) => Err(ExecutionError::Raised(ctx)),
                None => Err(ExecutionError::Panic("raised error without context".into())),
            },
            Some(Antiform::Ghost) => Err(ExecutionError::NoValue),
            _ => Ok(self),
        }
    }

    /// Push the stubs this cell keeps alive
    pub fn references(&self, refs: &mut Vec<StubId>) {
        match self.payload {
            Payload::Series { stub, .. }
            | Payload::Context(stub)
            | Payload::Action(ActionRef::Composed(stub))
            | Payload::Boxed { stub, .. } => refs.push(stub),
            _ => {}
        }
        if let Some(binding) = self.binding {
            refs.push(binding);
        }
    }
}

/// Only the blank rune has an antiform (trash)
fn heart_has_antiform(cell: &Cell, heart: Heart) -> bool {
    match heart {
        Heart::Rune => cell.payload == Payload::None,
        h => h.is_antiform_legal(),
    }
}
