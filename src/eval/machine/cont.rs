//! Continuations stored on the machine stack

use std::fmt;

use crate::eval::memory::{
    cell::{ActionRef, Cell},
    collect::{CollectorHeapView, GcScannable},
    context::Location,
    stub::StubId,
    symbol::SymbolId,
};

use super::bind::Chain;

/// Position in an array of code, with the chain to evaluate it under
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Feed {
    pub array: StubId,
    pub index: u32,
    pub chain: Chain,
}

impl Feed {
    pub fn new(array: StubId, index: u32, chain: Chain) -> Self {
        Feed {
            array,
            index,
            chain,
        }
    }
}

/// Continuations used on the stack to record what to do with the
/// next value produced
///
/// A continuation is either proceeded (popped when the output
/// register is empty, so it does its next piece of work) or resumed
/// (popped with the value just produced).
#[derive(Clone, Debug)]
pub enum Continuation {
    /// Evaluate a feed to its end, producing the last value that was
    /// not a ghost
    Sequence { feed: Feed, product: Cell },
    /// Evaluate one expression from the sequence at stack `level`
    Eval { level: usize },
    /// Gather arguments from the sequence at `level`, then invoke
    Call {
        action: ActionRef,
        label: Option<SymbolId>,
        args: Vec<Cell>,
        arity: usize,
        /// Arguments are lifted rather than decayed
        meta: bool,
        level: usize,
    },
    /// Store the value produced in a variable
    Assign { location: Location },
    /// Recovery point for errors; records the heights to unwind to
    Trap {
        data_height: usize,
        guard_height: usize,
        manuals_height: usize,
    },
    /// Ignore the value produced and produce this one instead
    Produce { value: Cell },
}

impl fmt::Display for Continuation {
    /// Summarise a continuation
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Sequence { feed, .. } => {
                write!(f, "≫[{}@{}]", feed.array, feed.index)
            }
            Continuation::Eval { level } => write!(f, "ε{}", level),
            Continuation::Call {
                args, arity, label, ..
            } => match label {
                Some(label) => write!(f, "•{}({}/{})", label, args.len(), arity),
                None => write!(f, "•({}/{})", args.len(), arity),
            },
            Continuation::Assign { location } => {
                write!(f, "←[{},{}]", location.stub, location.index)
            }
            Continuation::Trap { .. } => write!(f, "⚑"),
            Continuation::Produce { .. } => write!(f, "↦"),
        }
    }
}

impl GcScannable for Continuation {
    fn scan(&self, marker: &mut CollectorHeapView<'_>) -> Vec<StubId> {
        let mut refs = vec![];
        match self {
            Continuation::Sequence { feed, product } => {
                refs.push(feed.array);
                refs.extend(feed.chain.node());
                product.references(&mut refs);
            }
            Continuation::Call { action, args, .. } => {
                if let ActionRef::Composed(details) = action {
                    refs.push(*details);
                }
                for arg in args {
                    arg.references(&mut refs);
                }
            }
            Continuation::Assign { location } => refs.push(location.stub),
            Continuation::Produce { value } => value.references(&mut refs),
            Continuation::Eval { .. } | Continuation::Trap { .. } => {}
        }
        marker.mark_all(refs)
    }
}
