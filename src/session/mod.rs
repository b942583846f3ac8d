//! Per-conversation session persistence.

mod file;
mod memory;
mod store;

pub use file::*;
pub use memory::*;
pub use store::*;
