//! Source form of values
//!
//! Molding is the inverse of scanning for everything that has a
//! literal form. Arrays and contexts already being molded print as
//! `...`, so cyclic structures terminate. Nested values are molded
//! from an explicit work list, so nesting depth is bounded by the heap
//! rather than the native stack.

use std::collections::HashSet;

use itertools::Itertools;

use super::{
    error::ExecutionError,
    machine::native,
    memory::{
        bitset::Bitset,
        cell::{ActionRef, Cell, Payload, Sigil},
        context::{self, sea_vars},
        heap::Heap,
        heart::Heart,
        stub::StubId,
        symbol::SymbolTable,
    },
};

/// Mold a value; antiforms are shown as their quasiform with a
/// trailing comment
pub fn mold(heap: &Heap, symbols: &SymbolTable, cell: &Cell) -> Result<String, ExecutionError> {
    let mut molder = Molder {
        heap,
        symbols,
        active: HashSet::new(),
        work: vec![Work::Cell(*cell)],
        out: String::new(),
    };
    while let Some(work) = molder.work.pop() {
        match work {
            Work::Cell(cell) => molder.mold_cell(&cell)?,
            Work::Text(text) => molder.out.push_str(&text),
            Work::Leave(stub, close) => {
                molder.active.remove(&stub);
                molder.out.push_str(close);
            }
        }
    }
    if cell.is_antiform() {
        molder.out.push_str("  ; anti");
    }
    Ok(molder.out)
}

/// Pending output, taken last-in first-out
enum Work {
    Cell(Cell),
    Text(String),
    /// Close an array or context that is no longer being molded
    Leave(StubId, &'static str),
}

struct Molder<'a> {
    heap: &'a Heap,
    symbols: &'a SymbolTable,
    /// arrays and contexts currently being molded
    active: HashSet<StubId>,
    work: Vec<Work>,
    out: String,
}

impl Molder<'_> {
    /// Write the prefix of a cell, queueing its contents and suffix
    fn mold_cell(&mut self, cell: &Cell) -> Result<(), ExecutionError> {
        let (inner, depth, quasi) = match cell.payload() {
            Payload::Boxed { stub, depth, quasi } => {
                let inner = self
                    .heap
                    .stub(stub)?
                    .cells()
                    .first()
                    .copied()
                    .ok_or_else(|| ExecutionError::Panic(format!("empty quote box {}", stub)))?;
                (inner, depth, quasi)
            }
            _ => (*cell, cell.quote_depth(), cell.is_quasi() || cell.is_antiform()),
        };

        for _ in 0..depth {
            self.out.push('\'');
        }

        // `~` alone is the quasiform of the blank rune
        if quasi && inner.heart() == Heart::Rune && inner.payload() == Payload::None {
            self.out.push('~');
            return Ok(());
        }

        if quasi {
            self.out.push('~');
            self.work.push(Work::Text("~".to_string()));
        }
        self.mold_plain(&inner)
    }

    fn mold_plain(&mut self, cell: &Cell) -> Result<(), ExecutionError> {
        match (cell.heart(), cell.payload()) {
            (Heart::Integer, Payload::Integer(n)) => self.out.push_str(&n.to_string()),
            (Heart::Decimal, Payload::Decimal(d)) => {
                if d.is_finite() && d.fract() == 0.0 {
                    self.out.push_str(&format!("{:.1}", d))
                } else {
                    self.out.push_str(&d.to_string())
                }
            }
            (Heart::Text, Payload::Series { stub, index }) => {
                let text = std::str::from_utf8(self.heap.bytes(stub)?)
                    .map_err(|e| ExecutionError::type_mismatch("UTF-8 text", e.to_string()))?;
                self.out.push('"');
                for c in text.chars().skip(index as usize) {
                    self.push_escaped(c);
                }
                self.out.push('"');
            }
            (Heart::Blob, Payload::Series { stub, index }) => {
                let bytes = &self.heap.bytes(stub)?[index as usize..];
                self.out
                    .push_str(&format!("#{{{:02X}}}", bytes.iter().format("")));
            }
            (Heart::Bitset, Payload::Series { stub, .. }) => {
                self.out.push_str(&Bitset::from_stub(self.heap, stub)?.mold())
            }
            (Heart::Handle, Payload::Handle(h)) => self.out.push_str(&format!("#[handle! {}]", h)),
            (Heart::Rune, Payload::None) => self.out.push('_'),
            (Heart::Rune, Payload::Char(c)) => {
                self.out.push_str("#\"");
                self.push_escaped(c);
                self.out.push('"');
            }
            (Heart::Comma, _) => self.out.push(','),
            (Heart::Word, Payload::Word { symbol, sigil }) => {
                let name = self.symbols.resolve(symbol);
                match sigil {
                    Sigil::None => self.out.push_str(name),
                    Sigil::Set => {
                        self.out.push_str(name);
                        self.out.push(':');
                    }
                    Sigil::Get => {
                        self.out.push(':');
                        self.out.push_str(name);
                    }
                    Sigil::Meta => {
                        self.out.push('^');
                        self.out.push_str(name);
                    }
                }
            }
            (Heart::Block, Payload::Series { stub, index }) => {
                self.mold_array("[", "]", " ", stub, index)?
            }
            (Heart::Group, Payload::Series { stub, index }) => {
                self.mold_array("(", ")", " ", stub, index)?
            }
            (Heart::Path, Payload::Series { stub, index }) => {
                self.mold_array("", "", "/", stub, index)?
            }
            (Heart::Tuple, Payload::Series { stub, index }) => {
                self.mold_array("", "", ".", stub, index)?
            }
            (Heart::Frame, Payload::Action(action)) => self.mold_action(action)?,
            (Heart::Module, Payload::Context(sea)) => self.mold_module(sea)?,
            (heart @ (Heart::Object | Heart::Error | Heart::Frame), Payload::Context(ctx)) => {
                self.mold_context(heart, ctx)?
            }
            (heart, payload) => {
                return Err(ExecutionError::Panic(format!(
                    "cannot mold {} with payload {:?}",
                    heart, payload
                )))
            }
        }
        Ok(())
    }

    fn push_escaped(&mut self, c: char) {
        match c {
            '"' => self.out.push_str("^\""),
            '^' => self.out.push_str("^^"),
            '\n' => self.out.push_str("^/"),
            '\t' => self.out.push_str("^-"),
            c => self.out.push(c),
        }
    }

    fn mold_array(
        &mut self,
        open: &str,
        close: &'static str,
        separator: &str,
        stub: StubId,
        index: u32,
    ) -> Result<(), ExecutionError> {
        self.out.push_str(open);
        if !self.active.insert(stub) {
            self.out.push_str("...");
            self.out.push_str(close);
            return Ok(());
        }
        self.work.push(Work::Leave(stub, close));
        let cells = &self.heap.cells(stub)?[index as usize..];
        for (i, cell) in cells.iter().enumerate().rev() {
            self.work.push(Work::Cell(*cell));
            if i > 0 {
                self.work.push(Work::Text(separator.to_string()));
            }
        }
        Ok(())
    }

    /// Queue fields as `key: value`; unstable values cannot be
    /// stored, so antiform fields are shown lifted
    fn queue_fields(&mut self, stub: StubId, fields: Vec<(String, Cell)>) {
        self.work.push(Work::Leave(stub, "]"));
        for (i, (key, value)) in fields.into_iter().enumerate().rev() {
            self.work.push(Work::Cell(value));
            let sep = if i > 0 { " " } else { "" };
            self.work.push(Work::Text(format!("{}{}: ", sep, key)));
        }
    }

    fn mold_context(&mut self, heart: Heart, ctx: StubId) -> Result<(), ExecutionError> {
        self.out.push_str(&format!("make {} [", heart.name()));
        if !self.active.insert(ctx) {
            self.out.push_str("...]");
            return Ok(());
        }
        let keys = context::keys(self.heap, ctx)?;
        let values = self.heap.cells(ctx)?;
        let fields = keys
            .iter()
            .zip(values.iter())
            .map(|(k, v)| (self.symbols.resolve(*k).to_string(), *v))
            .collect::<Vec<_>>();
        self.queue_fields(ctx, fields);
        Ok(())
    }

    fn mold_module(&mut self, sea: StubId) -> Result<(), ExecutionError> {
        self.out.push_str("make module! [");
        if !self.active.insert(sea) {
            self.out.push_str("...]");
            return Ok(());
        }
        let fields = sea_vars(self.heap, self.symbols, sea)?
            .into_iter()
            .map(|(k, v)| (self.symbols.resolve(k).to_string(), v))
            .collect::<Vec<_>>();
        self.queue_fields(sea, fields);
        Ok(())
    }

    fn mold_action(&mut self, action: ActionRef) -> Result<(), ExecutionError> {
        match action {
            ActionRef::Native(i) => {
                let name = native::native(i as usize).map_or("?", |n| n.name());
                self.out.push_str(&format!("#[action! {}]", name));
            }
            ActionRef::Composed(details) => {
                let keylist = self
                    .heap
                    .stub(details)?
                    .link()
                    .stub()
                    .ok_or(ExecutionError::NoValue)?;
                let params = self
                    .heap
                    .stub(keylist)?
                    .symbols()
                    .iter()
                    .map(|s| self.symbols.resolve(*s))
                    .join(" ");
                self.out.push_str(&format!("#[action! [{}]]", params));
            }
        }
        Ok(())
    }
}
