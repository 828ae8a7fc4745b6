//! # File Dependency Scenarios
//!
//! A mutation referencing a blob the node has not stored yet is deferred,
//! not failed: the driver is asked to fetch the blob from the originator
//! and redeliver the mutation once it arrives.

#[cfg(test)]
mod tests {
    use crate::support::{alice, mutation, TestNode, OBJECT};
    use plait_sync::test_utils::DriverEvent;
    use plait_sync::MutationStore;
    use plait_types::MutationAction;
    use serde_json::json;

    fn file_missing_ids(events: &[DriverEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                DriverEvent::FileMissing { mutation, .. } => {
                    Some(mutation.mutation_id.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_missing_blob_defers_until_redelivery() {
        let attach = mutation(
            "m-1",
            100,
            alice(),
            MutationAction::record_set("tasks", "t-1", 1.0, json!({"label": "laundry"})),
        )
        .with_file_id("blob-9");

        let mut node = TestNode::new();
        let events = node.deliver_all(&[attach.clone()]).await;

        // Deferred: the driver was told which blob to fetch and nothing
        // was persisted.
        assert_eq!(file_missing_ids(&events), vec!["m-1".to_string()]);
        assert!(node
            .store
            .find_mutation(OBJECT, "m-1")
            .await
            .unwrap()
            .is_none());
        assert!(node
            .store
            .get_record(OBJECT, "tasks", "t-1")
            .await
            .unwrap()
            .is_none());

        // The blob arrives and the identical mutation is redelivered.
        node.store.insert_blob("blob-9");
        let events = node.deliver_all(&[attach]).await;

        assert!(file_missing_ids(&events).is_empty());
        let record = node
            .store
            .find_mutation(OBJECT, "m-1")
            .await
            .unwrap()
            .unwrap();
        assert!(record.integrated);
        assert_eq!(record.index, 0);
        assert!(node
            .store
            .get_record(OBJECT, "tasks", "t-1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_any_action_carrying_a_file_reference_is_verified() {
        let attach = mutation(
            "m-1",
            100,
            alice(),
            MutationAction::property_set("avatar", json!("blob-3")),
        )
        .with_file_id("blob-3");

        let mut node = TestNode::new();
        let events = node.deliver_all(&[attach.clone()]).await;

        assert_eq!(file_missing_ids(&events), vec!["m-1".to_string()]);
        assert!(node
            .store
            .get_property(OBJECT, "avatar")
            .await
            .unwrap()
            .is_none());

        node.store.insert_blob("blob-3");
        let events = node.deliver_all(&[attach]).await;

        assert!(file_missing_ids(&events).is_empty());
        assert!(node
            .store
            .get_property(OBJECT, "avatar")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_missing_blob_does_not_block_other_mutations() {
        let attach = mutation(
            "m-1",
            100,
            alice(),
            MutationAction::file_set("photo", "blob-9"),
        )
        .with_file_id("blob-9");
        let title = mutation(
            "m-2",
            200,
            alice(),
            MutationAction::property_set("title", json!("Hello")),
        );

        let mut node = TestNode::new();
        node.deliver_all(&[attach, title]).await;

        // The deferred attachment never lands, the later write does.
        assert!(node.store.get_file(OBJECT, "photo").await.unwrap().is_none());
        let record = node
            .store
            .find_mutation(OBJECT, "m-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.index, 0);
    }

    #[tokio::test]
    async fn test_file_set_rollback_restores_previous_descriptor() {
        let first = mutation(
            "m-1",
            100,
            alice(),
            MutationAction::file_set("photo", "blob-1"),
        );
        let last = mutation(
            "m-3",
            300,
            alice(),
            MutationAction::file_set("photo", "blob-3"),
        );
        let middle = mutation(
            "m-2",
            200,
            alice(),
            MutationAction::file_set("photo", "blob-2"),
        );

        let mut node = TestNode::new();
        node.deliver_all(&[first]).await;
        node.deliver_all(&[last]).await;
        node.deliver_all(&[middle]).await;

        // Newest descriptor wins after the middle write is slotted in.
        let photo = node.store.get_file(OBJECT, "photo").await.unwrap().unwrap();
        assert_eq!(photo.file_id, "blob-3");

        let middle = node
            .store
            .find_mutation(OBJECT, "m-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(middle.index, 1);
    }

    #[tokio::test]
    async fn test_file_delete_rollback_restores_descriptor() {
        let set_one = mutation(
            "m-1",
            100,
            alice(),
            MutationAction::file_set("photo", "blob-1"),
        );
        let delete = mutation("m-3", 300, alice(), MutationAction::file_delete("photo"));
        let set_two = mutation(
            "m-2",
            200,
            alice(),
            MutationAction::file_set("photo", "blob-2"),
        );

        let mut node = TestNode::new();
        node.deliver_all(&[set_one]).await;
        node.deliver_all(&[delete]).await;
        node.deliver_all(&[set_two]).await;

        // Replayed in order set, set, delete: the photo stays gone.
        assert!(node.store.get_file(OBJECT, "photo").await.unwrap().is_none());
        assert_eq!(node.store.mutation_count(OBJECT).await.unwrap(), 3);
    }
}
