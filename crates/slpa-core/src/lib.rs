pub mod community;
pub mod engine;
pub mod storage;
pub mod worker;

pub use community::{CommunityExtractor, CommunityResult, IncrementalUpdater, PropagationEngine, UpdateReport};
pub use engine::SlpaEngine;
pub use storage::{GraphStore, MemoryStore, NodeMemory};
pub use worker::{UpdateWorker, WorkerHandle};

// Re-export common types for convenience
pub use slpa_common::{
    ChangeEffect, ChangeKind, ChangeOutcome, ChangeRecord, GraphError, MembershipMap, NodeId,
};
