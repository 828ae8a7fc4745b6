//! Outbound Ports (Driven Ports / SPI)
//!
//! The persistence contract the processor consumes and the callback
//! surface it reports through. Any backend with read-your-writes
//! consistency per object can implement `MutationStore`; the processor
//! has no knowledge of storage technology.

use crate::domain::errors::{ProcessorError, StoreError};
use async_trait::async_trait;
use plait_types::{
    Address, CollectionRecord, FileRecord, Mutation, MutationRecord, ObjectSummary,
    PropertyRecord, RecordPosition,
};

/// Which mutation records an existence query should consider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExistsFilter {
    /// Any persisted record, integrated or not.
    Any,
    /// Only records currently reflected in object state.
    IntegratedOnly,
    /// Only records rolled back and awaiting reintegration.
    UnintegratedOnly,
}

/// Direction of a history iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryOrder {
    /// Oldest integrated mutation first.
    Forward,
    /// Newest integrated mutation first.
    Reverse,
}

/// Restartable cursor over an object's integrated mutation history.
///
/// Dropping the cursor abandons the iteration; requesting a new one
/// restarts it.
#[async_trait]
pub trait MutationCursor: Send {
    /// The next record, or `None` when the history is exhausted.
    async fn next(&mut self) -> Result<Option<MutationRecord>, StoreError>;
}

/// Persistence contract for mutation history and per-object state.
///
/// All operations are scoped by object id. Mutation records are keyed by
/// (object id, mutation id); `save_mutation` is an upsert so reintegration
/// after a rollback replaces the stale record.
#[async_trait]
pub trait MutationStore: Send + Sync {
    /// Is a mutation with this id recorded for the object?
    async fn mutation_exists(
        &self,
        object_id: &str,
        mutation_id: &str,
        filter: ExistsFilter,
    ) -> Result<bool, StoreError>;

    /// Fetch one mutation record, integrated or not. Serves peer resend
    /// requests as well as tests.
    async fn find_mutation(
        &self,
        object_id: &str,
        mutation_id: &str,
    ) -> Result<Option<MutationRecord>, StoreError>;

    /// The most recently integrated mutation under the canonical order,
    /// or `None` for an object with no integrated history.
    async fn latest_integrated(
        &self,
        object_id: &str,
    ) -> Result<Option<MutationRecord>, StoreError>;

    /// Iterate the object's integrated mutations in the given order.
    /// Also serves full-history resync to peers.
    async fn integrated_history(
        &self,
        object_id: &str,
        order: HistoryOrder,
    ) -> Result<Box<dyn MutationCursor>, StoreError>;

    /// Iterate integrated mutations with an index greater than the given
    /// one, oldest first. Serves delta resync to peers.
    async fn integrated_history_after(
        &self,
        object_id: &str,
        index: u64,
    ) -> Result<Box<dyn MutationCursor>, StoreError>;

    /// Upsert a mutation record by (object id, mutation id).
    async fn save_mutation(&self, record: &MutationRecord) -> Result<(), StoreError>;

    /// Flip the integrated flag of a persisted record.
    async fn mark_integrated(
        &self,
        object_id: &str,
        mutation_id: &str,
        integrated: bool,
    ) -> Result<(), StoreError>;

    /// Number of integrated mutations for the object.
    async fn mutation_count(&self, object_id: &str) -> Result<u64, StoreError>;

    /// The object's sync-handshake summary.
    async fn object_summary(&self, object_id: &str) -> Result<ObjectSummary, StoreError>;

    /// Is the blob with this id available locally?
    async fn file_exists(&self, file_id: &str) -> Result<bool, StoreError>;

    /// Decrement the externally supplied "mutations still expected"
    /// counter, maintained when a resync handshake pre-declares a count.
    async fn decrement_expected(&self, object_id: &str) -> Result<(), StoreError>;

    // Members

    async fn add_member(&self, object_id: &str, member: &Address) -> Result<(), StoreError>;

    async fn remove_member(&self, object_id: &str, member: &Address) -> Result<(), StoreError>;

    async fn members(&self, object_id: &str) -> Result<Vec<Address>, StoreError>;

    // Properties

    async fn set_property(&self, record: &PropertyRecord) -> Result<(), StoreError>;

    async fn delete_property(&self, object_id: &str, name: &str) -> Result<(), StoreError>;

    async fn get_property(
        &self,
        object_id: &str,
        name: &str,
    ) -> Result<Option<PropertyRecord>, StoreError>;

    // Collection records

    async fn set_record(&self, record: &CollectionRecord) -> Result<(), StoreError>;

    async fn reorder_record(
        &self,
        object_id: &str,
        position: &RecordPosition,
    ) -> Result<(), StoreError>;

    async fn delete_record(
        &self,
        object_id: &str,
        collection: &str,
        record_id: &str,
    ) -> Result<(), StoreError>;

    async fn get_record(
        &self,
        object_id: &str,
        collection: &str,
        record_id: &str,
    ) -> Result<Option<CollectionRecord>, StoreError>;

    // File attachments

    async fn set_file(&self, record: &FileRecord) -> Result<(), StoreError>;

    async fn delete_file(&self, object_id: &str, file_name: &str) -> Result<(), StoreError>;

    async fn get_file(
        &self,
        object_id: &str,
        file_name: &str,
    ) -> Result<Option<FileRecord>, StoreError>;
}

/// Callbacks from the processor to the driver that feeds it.
#[async_trait]
pub trait SyncDriver: Send + Sync {
    /// A mutation references a blob not yet stored locally. The mutation
    /// was dropped from the queue; the driver should fetch the blob from
    /// `mutation.originator` and redeliver the mutation once it arrives.
    async fn on_file_missing(&self, object_id: &str, mutation: &Mutation);

    /// The processor drained its queues. The driver may drop its handle;
    /// a processor is reconstructible from store state at any time.
    async fn on_mutations_completed(&self, object_id: &str);

    /// A store failure aborted the current cycle. Queued mutations are
    /// retained; retry and backoff policy belong to the driver.
    async fn on_cycle_failed(&self, object_id: &str, error: &ProcessorError);
}
