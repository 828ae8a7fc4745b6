//! Inbound Ports (Driving Ports / API)

use crate::domain::errors::ProcessorError;
use plait_types::Mutation;

/// Primary entry point for inbound mutations.
///
/// The driver calls this for each mutation received from the network; the
/// implementation routes it to the right per-object processor, creating
/// one on demand. Enqueueing never suspends and never waits for
/// convergence.
pub trait MutationIntake: Send + Sync {
    /// Queue a mutation for the given object.
    ///
    /// Returns a backpressure error when the object's pending queue or the
    /// live-processor bound is exhausted; the mutation is dropped and the
    /// peer is expected to redeliver.
    fn add_mutation(&self, object_id: &str, mutation: Mutation) -> Result<(), ProcessorError>;
}
