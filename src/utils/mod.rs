//! Utility modules

pub mod memory_storage;
pub mod money;
pub mod validation;

pub use memory_storage::*;
pub use validation::*;
