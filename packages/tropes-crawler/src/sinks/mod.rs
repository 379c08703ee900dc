//! Sink implementations.

mod json;
mod memory;

pub use json::JsonFileSink;
pub use memory::MemorySink;
