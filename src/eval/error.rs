//! Execution errors
use thiserror::Error;

use super::{
    memory::{flavor::Flavor, heap::HeapError, heart::Heart, stub::StubId},
    scan::ScanError,
};

/// Broad classes of failure, which determine whether `trap` may
/// intercept an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Word resolution failed
    Binding,
    /// The heap could not satisfy a request
    Allocation,
    /// A core invariant was found broken
    Internal,
    /// An operation was applied to an unsuitable value
    Value,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("{0} has no binding")]
    NotBound(String),
    #[error("{0} is unset")]
    Unset(String),
    #[error("{0} is defined by more than one context in an overlay")]
    AmbiguousBinding(String),
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error("{0} has no antiform")]
    IllegalAntiform(Heart),
    #[error("illegal antiform in container: {0}")]
    AntiformInContainer(String),
    #[error("flex stride {stride} does not match {flavor:?} width {width}")]
    WidthMismatch {
        flavor: Flavor,
        stride: usize,
        width: usize,
    },
    #[error("hitch chain of {0} is corrupt")]
    CorruptHitchChain(String),
    #[error("{0} cannot carry a binding")]
    NotBindable(Heart),
    #[error("{0} is not a binding chain node")]
    BadChainNode(String),
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("arithmetic overflow")]
    Overflow,
    #[error("no value")]
    NoValue,
    #[error("{0} is missing an argument")]
    NoArg(String),
    #[error("series is frozen")]
    Frozen,
    #[error("cannot view {from:?} as {to:?}")]
    IncompatibleAlias { from: Flavor, to: Flavor },
    #[error("alias source has an edit pending")]
    AliasPending,
    #[error("bytes changed outside an edit")]
    EditNotPending,
    #[error("edit left a text view with invalid UTF-8")]
    InvalidUtf8,
    #[error("raised error {0}")]
    Raised(StubId),
    #[error("{0}")]
    User(String),
    #[error("stack limit exceeded ({0} continuations)")]
    StackOverflow(usize),
    #[error("machine did not terminate after {0} steps")]
    DidntTerminate(usize),
    #[error("bad bitset: {0}")]
    BadBitset(String),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("panic: {0}")]
    Panic(String),
}

impl ExecutionError {
    pub fn category(&self) -> ErrorCategory {
        use ExecutionError::*;
        match self {
            NotBound(_) | Unset(_) | AmbiguousBinding(_) => ErrorCategory::Binding,
            Heap(_) => ErrorCategory::Allocation,
            IllegalAntiform(_)
            | AntiformInContainer(_)
            | WidthMismatch { .. }
            | CorruptHitchChain(_)
            | NotBindable(_)
            | BadChainNode(_)
            | Panic(_) => ErrorCategory::Internal,
            _ => ErrorCategory::Value,
        }
    }

    /// Whether `trap` may turn this error into a value
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Binding | ErrorCategory::Value
        )
    }

    /// Symbolic id of the error, as stored in an error context
    pub fn id(&self) -> &'static str {
        use ExecutionError::*;
        match self {
            NotBound(_) => "not-bound",
            Unset(_) => "unset",
            AmbiguousBinding(_) => "ambiguous-binding",
            Heap(HeapError::CapacityExceeded { .. }) => "capacity-exceeded",
            Heap(HeapError::OutOfStubs { .. }) => "out-of-stubs",
            Heap(HeapError::Reclaimed(_)) => "reclaimed",
            Heap(HeapError::AlreadyManaged(_)) => "already-managed",
            IllegalAntiform(_) => "illegal-antiform",
            AntiformInContainer(_) => "antiform-in-container",
            WidthMismatch { .. } => "width-mismatch",
            CorruptHitchChain(_) => "corrupt-hitch-chain",
            NotBindable(_) => "not-bindable",
            BadChainNode(_) => "bad-chain-node",
            TypeMismatch { .. } => "type-mismatch",
            Overflow => "overflow",
            NoValue => "no-value",
            NoArg(_) => "no-arg",
            Frozen => "frozen",
            IncompatibleAlias { .. } => "incompatible-alias",
            AliasPending => "alias-pending",
            EditNotPending => "edit-not-pending",
            InvalidUtf8 => "invalid-utf8",
            Raised(_) => "raised",
            User(_) => "user",
            StackOverflow(_) => "stack-overflow",
            DidntTerminate(_) => "didnt-terminate",
            BadBitset(_) => "bad-bitset",
            Scan(_) => "scan",
            Panic(_) => "panic",
        }
    }

    /// Up to two textual arguments for the error context
    pub fn args(&self) -> Vec<String> {
        use ExecutionError::*;
        match self {
            NotBound(w) | Unset(w) | AmbiguousBinding(w) | NoArg(w) => vec![w.clone()],
            TypeMismatch { expected, found } => vec![expected.clone(), found.clone()],
            IllegalAntiform(h) | NotBindable(h) => vec![h.to_string()],
            IncompatibleAlias { from, to } => vec![format!("{:?}", from), format!("{:?}", to)],
            StackOverflow(n) | DidntTerminate(n) => vec![n.to_string()],
            BadBitset(s) | User(s) | AntiformInContainer(s) => vec![s.clone()],
            Scan(e) => vec![e.to_string()],
            _ => vec![],
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        ExecutionError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_binding_errors_are_recoverable() {
        assert!(ExecutionError::NotBound("a".into()).is_recoverable());
        assert!(ExecutionError::Unset("a".into()).is_recoverable());
        assert_eq!(
            ExecutionError::Unset("a".into()).category(),
            ErrorCategory::Binding
        );
    }

    #[test]
    pub fn test_internal_errors_are_not_recoverable() {
        let e = ExecutionError::AntiformInContainer("~[]~".into());
        assert_eq!(e.category(), ErrorCategory::Internal);
        assert!(!e.is_recoverable());
        assert!(e.to_string().contains("illegal antiform in container"));
        let e = ExecutionError::Heap(HeapError::OutOfStubs { limit: 3 });
        assert!(!e.is_recoverable());
    }

    #[test]
    pub fn test_stack_overflow_message() {
        let e = ExecutionError::StackOverflow(100);
        assert!(e.to_string().starts_with("stack limit exceeded"));
        assert_eq!(e.id(), "stack-overflow");
        assert_eq!(e.args(), vec!["100".to_string()]);
    }
}
