pub mod error;
pub mod machine;
pub mod memory;
pub mod mold;
pub mod scan;
pub mod settings;
