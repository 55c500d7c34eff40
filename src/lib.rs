extern crate codespan_reporting;
extern crate indexmap;
extern crate itertools;
extern crate structopt;
extern crate thiserror;

pub mod driver;
pub mod eval;
