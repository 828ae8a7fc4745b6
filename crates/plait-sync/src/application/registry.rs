//! Processor registry.
//!
//! The single owned map from object id to processor handle. Every
//! processor is created and looked up here and nowhere else, so no object
//! ever has two concurrent orchestrators. Disposal is driven by the
//! driver: after `on_mutations_completed` it may call `release`, and a
//! later mutation for the same object gets a fresh processor rebuilt from
//! store state.

use crate::application::processor::MutationProcessor;
use crate::config::ProcessorConfig;
use crate::domain::errors::ProcessorError;
use crate::ports::inbound::MutationIntake;
use crate::ports::outbound::{MutationStore, SyncDriver};
use plait_types::{Mutation, ObjectId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Owns the live processors, keyed by object id.
pub struct ProcessorRegistry<S, D> {
    store: Arc<S>,
    driver: Arc<D>,
    config: ProcessorConfig,
    processors: Mutex<HashMap<ObjectId, Arc<MutationProcessor<S, D>>>>,
}

impl<S, D> ProcessorRegistry<S, D>
where
    S: MutationStore + 'static,
    D: SyncDriver + 'static,
{
    pub fn new(store: Arc<S>, driver: Arc<D>, config: ProcessorConfig) -> Self {
        Self {
            store,
            driver,
            config,
            processors: Mutex::new(HashMap::new()),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<ObjectId, Arc<MutationProcessor<S, D>>>> {
        self.processors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get or create the processor for an object.
    fn obtain(
        &self,
        object_id: &str,
        expected: u64,
    ) -> Result<Arc<MutationProcessor<S, D>>, ProcessorError> {
        let mut map = self.map();
        if let Some(processor) = map.get(object_id) {
            return Ok(Arc::clone(processor));
        }
        if map.len() >= self.config.max_live_processors {
            return Err(ProcessorError::TooManyProcessors {
                count: map.len(),
                max: self.config.max_live_processors,
            });
        }
        debug!(object_id, "creating mutation processor");
        let processor = MutationProcessor::new(
            object_id,
            expected,
            Arc::clone(&self.store),
            Arc::clone(&self.driver),
            &self.config,
        );
        map.insert(object_id.to_string(), Arc::clone(&processor));
        Ok(processor)
    }

    /// Create the processor for an object ahead of a resync handshake
    /// that pre-declared `expected` mutations still to arrive.
    pub fn prepare(
        &self,
        object_id: &str,
        expected: u64,
    ) -> Result<Arc<MutationProcessor<S, D>>, ProcessorError> {
        self.obtain(object_id, expected)
    }

    /// Drop the handle for an object. Safe whenever the driver chooses;
    /// a processor is reconstructible from store state.
    pub fn release(&self, object_id: &str) -> bool {
        let removed = self.map().remove(object_id).is_some();
        if removed {
            debug!(object_id, "released mutation processor");
        }
        removed
    }

    /// Number of live processors.
    pub fn live_count(&self) -> usize {
        self.map().len()
    }
}

impl<S, D> MutationIntake for ProcessorRegistry<S, D>
where
    S: MutationStore + 'static,
    D: SyncDriver + 'static,
{
    fn add_mutation(&self, object_id: &str, mutation: Mutation) -> Result<(), ProcessorError> {
        let processor = self.obtain(object_id, 0)?;
        processor.add_mutation(mutation)
    }
}
