//! Overall high-level error type for rebind
use crate::eval::{error::ExecutionError, scan::ScanError};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use std::fmt::Display;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RebindError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("bad configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("path {0} could not be read")]
    FileCouldNotBeRead(String),
}

fn default_diagnostic<E>(e: &E) -> Diagnostic<usize>
where
    E: Display,
{
    Diagnostic::error().with_message(format!("{}", e))
}

fn scan_diagnostic(e: &ScanError, file: usize) -> Diagnostic<usize> {
    Diagnostic::error()
        .with_message("could not scan source")
        .with_labels(vec![Label::primary(file, e.span()).with_message(e.to_string())])
}

impl RebindError {
    /// Convert to a diagnostic, locating scan errors in `file`
    pub fn to_diagnostic(&self, file: Option<usize>) -> Diagnostic<usize> {
        match (self, file) {
            (RebindError::Execution(ExecutionError::Scan(e)), Some(file)) => {
                scan_diagnostic(e, file)
            }
            (RebindError::Execution(e), _) => Diagnostic::error()
                .with_code(e.id())
                .with_message(e.to_string()),
            (e, _) => default_diagnostic(e),
        }
    }
}
