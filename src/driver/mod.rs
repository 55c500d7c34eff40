pub mod config;
pub mod error;
pub mod eval;
pub mod options;
pub mod statistics;
