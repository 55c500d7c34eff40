//! Evaluator

pub mod bind;
pub mod cont;
pub mod metrics;
pub mod native;
pub mod vm;
