//! # Plait Synchronization Core
//!
//! Per-object mutation processing for the Plait federated collaboration
//! server. Nodes exchange asynchronous, possibly out-of-order, possibly
//! duplicated mutations against shared objects; this crate accepts them in
//! arbitrary arrival order and converges every replica on identical state
//! by applying them in a globally agreed deterministic order, rolling back
//! and reapplying when an older mutation arrives late.
//!
//! ## Architecture
//!
//! - **Domain**: canonical mutation ordering, the rolling state-hash chain,
//!   error types
//! - **Ports**: inbound (`MutationIntake`) and outbound (`MutationStore`,
//!   `SyncDriver`)
//! - **Application**: the per-object `MutationProcessor` state machine and
//!   the owning `ProcessorRegistry`
//! - **Adapters**: in-memory `MutationStore` used by the test suites

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod test_utils;

pub use adapters::memory::InMemoryMutationStore;
pub use application::processor::MutationProcessor;
pub use application::registry::ProcessorRegistry;
pub use config::ProcessorConfig;
pub use domain::errors::{ProcessorError, StoreError};
pub use ports::inbound::MutationIntake;
pub use ports::outbound::{
    ExistsFilter, HistoryOrder, MutationCursor, MutationStore, SyncDriver,
};
