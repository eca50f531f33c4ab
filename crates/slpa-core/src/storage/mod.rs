pub mod graph;
pub mod memory;

pub use graph::{EdgeMutation, GraphStore};
pub use memory::{MemoryStore, NodeMemory};
