//! Error types for the synchronization core.

use thiserror::Error;

/// Failure reported by a `MutationStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not complete the operation.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// All errors that can abort a processing cycle or reject an inbound
/// mutation.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Store I/O failed; the current cycle stops and retry is the
    /// driver's responsibility.
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// Pending queue bound reached for one object (backpressure).
    #[error("pending queue full for object {object_id}: {len} >= {max}")]
    QueueFull {
        object_id: String,
        len: usize,
        max: usize,
    },

    /// Live processor bound reached across all objects (backpressure).
    #[error("live processor limit reached: {count} >= {max}")]
    TooManyProcessors { count: usize, max: usize },

    /// A rollback scan moved nothing even though an integrated mutation
    /// ordered after the candidate was reported; store/driver contract
    /// violation.
    #[error("rollback scan for object {object_id} moved nothing ordered after mutation {mutation_id}")]
    RollbackUnderrun {
        object_id: String,
        mutation_id: String,
    },
}
