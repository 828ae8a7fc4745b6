//! # Store Failure Scenarios
//!
//! A store I/O failure is fatal to the cycle in progress: the processor
//! stops, surfaces the error to the driver, and retries nothing on its
//! own. Redelivery after the backend recovers must still converge.

#[cfg(test)]
mod tests {
    use crate::support::{alice, bob, mutation, FaultStore, OBJECT};
    use plait_sync::test_utils::{
        await_completed, await_failed, DriverEvent, RecordingDriver,
    };
    use plait_sync::{MutationIntake, MutationStore, ProcessorConfig, ProcessorRegistry};
    use plait_types::MutationAction;
    use serde_json::json;
    use std::sync::Arc;

    fn fixture() -> (
        Arc<FaultStore>,
        ProcessorRegistry<FaultStore, RecordingDriver>,
        tokio::sync::mpsc::UnboundedReceiver<DriverEvent>,
    ) {
        let store = Arc::new(FaultStore::new());
        let (driver, events) = RecordingDriver::channel();
        let registry =
            ProcessorRegistry::new(Arc::clone(&store), driver, ProcessorConfig::default());
        (store, registry, events)
    }

    #[tokio::test]
    async fn test_store_failure_aborts_cycle_and_surfaces() {
        let (store, registry, mut events) = fixture();

        registry
            .add_mutation(
                OBJECT,
                mutation(
                    "m-1",
                    100,
                    alice(),
                    MutationAction::property_set("title", json!("one")),
                ),
            )
            .unwrap();
        await_completed(&mut events).await;

        store.set_failing(true);
        let second = mutation(
            "m-2",
            200,
            bob(),
            MutationAction::property_set("title", json!("two")),
        );
        registry.add_mutation(OBJECT, second.clone()).unwrap();
        let seen = await_failed(&mut events).await;
        assert!(seen
            .iter()
            .any(|e| matches!(e, DriverEvent::CycleFailed { .. })));

        // Nothing landed while the backend was down.
        store.set_failing(false);
        assert_eq!(store.inner().mutation_count(OBJECT).await.unwrap(), 1);

        // Redelivery after recovery converges normally.
        registry.add_mutation(OBJECT, second).unwrap();
        await_completed(&mut events).await;

        let record = store
            .inner()
            .find_mutation(OBJECT, "m-2")
            .await
            .unwrap()
            .unwrap();
        assert!(record.integrated);
        assert_eq!(record.index, 1);
        let title = store
            .inner()
            .get_property(OBJECT, "title")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(title.value, json!("two"));
    }

    #[tokio::test]
    async fn test_failure_during_rollback_recovers_on_redelivery() {
        let (store, registry, mut events) = fixture();

        let newer = mutation(
            "m-2",
            200,
            alice(),
            MutationAction::property_set("title", json!("two")),
        );
        let older = mutation(
            "m-1",
            100,
            alice(),
            MutationAction::property_set("title", json!("one")),
        );

        registry.add_mutation(OBJECT, newer).unwrap();
        await_completed(&mut events).await;

        // The late arrival hits a dead backend mid-cycle.
        store.set_failing(true);
        registry.add_mutation(OBJECT, older.clone()).unwrap();
        await_failed(&mut events).await;

        store.set_failing(false);
        registry.add_mutation(OBJECT, older).unwrap();
        await_completed(&mut events).await;

        let title = store
            .inner()
            .get_property(OBJECT, "title")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(title.value, json!("two"));
        let first = store
            .inner()
            .find_mutation(OBJECT, "m-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.index, 0);
        let second = store
            .inner()
            .find_mutation(OBJECT, "m-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.index, 1);
    }
}
