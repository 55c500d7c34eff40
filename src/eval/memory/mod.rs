//! Cells, stubs and the heap they live in, with the collector
pub mod bitset;
pub mod cell;
pub mod collect;
pub mod context;
pub mod flavor;
pub mod header;
pub mod heap;
pub mod heart;
pub mod stub;
pub mod symbol;
