//! Shared test support: a recording driver and helpers for awaiting
//! processor callbacks. Used by this crate's unit tests and the workspace
//! integration suite; not part of the production surface.

use crate::domain::errors::ProcessorError;
use crate::ports::outbound::SyncDriver;
use async_trait::async_trait;
use plait_types::Mutation;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

/// One callback observed from a processor.
#[derive(Clone, Debug)]
pub enum DriverEvent {
    FileMissing {
        object_id: String,
        mutation: Mutation,
    },
    MutationsCompleted {
        object_id: String,
    },
    CycleFailed {
        object_id: String,
        error: String,
    },
}

/// Driver that forwards every callback onto a channel for assertions.
pub struct RecordingDriver {
    events: UnboundedSender<DriverEvent>,
}

impl RecordingDriver {
    /// The driver plus the receiving end of its event stream.
    pub fn channel() -> (Arc<Self>, UnboundedReceiver<DriverEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), receiver)
    }

    fn record(&self, event: DriverEvent) {
        // The receiver may be gone when a test only cares about state.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl SyncDriver for RecordingDriver {
    async fn on_file_missing(&self, object_id: &str, mutation: &Mutation) {
        self.record(DriverEvent::FileMissing {
            object_id: object_id.to_string(),
            mutation: mutation.clone(),
        });
    }

    async fn on_mutations_completed(&self, object_id: &str) {
        self.record(DriverEvent::MutationsCompleted {
            object_id: object_id.to_string(),
        });
    }

    async fn on_cycle_failed(&self, object_id: &str, error: &ProcessorError) {
        self.record(DriverEvent::CycleFailed {
            object_id: object_id.to_string(),
            error: error.to_string(),
        });
    }
}

/// Collect events until the next `MutationsCompleted`, inclusive.
pub async fn await_completed(events: &mut UnboundedReceiver<DriverEvent>) -> Vec<DriverEvent> {
    collect_until(events, |event| {
        matches!(event, DriverEvent::MutationsCompleted { .. })
    })
    .await
}

/// Collect events until the next `CycleFailed`, inclusive.
pub async fn await_failed(events: &mut UnboundedReceiver<DriverEvent>) -> Vec<DriverEvent> {
    collect_until(events, |event| {
        matches!(event, DriverEvent::CycleFailed { .. })
    })
    .await
}

async fn collect_until(
    events: &mut UnboundedReceiver<DriverEvent>,
    done: impl Fn(&DriverEvent) -> bool,
) -> Vec<DriverEvent> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a driver callback")
            .expect("driver event channel closed");
        let stop = done(&event);
        seen.push(event);
        if stop {
            return seen;
        }
    }
}
