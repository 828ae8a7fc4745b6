//! Configuration for the synchronization core.

use serde::{Deserialize, Serialize};

/// Processor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Maximum mutations queued per object awaiting integration
    /// (backpressure against a flooding peer).
    pub max_pending_mutations: usize,
    /// Maximum processors live at once across all objects.
    pub max_live_processors: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_pending_mutations: 4096,
            max_live_processors: 1024,
        }
    }
}
