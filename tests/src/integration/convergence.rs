//! # Convergence Scenarios
//!
//! Replicas receiving the same mutations in different arrival orders must
//! end up with identical state, identical index assignments, and identical
//! state hashes. These tests run the same mutation set through fresh
//! replicas in permuted and shuffled orders and compare against an
//! in-order reference replica.

#[cfg(test)]
mod tests {
    use crate::support::{alice, assert_converged, bob, mutation, TestNode, OBJECT};
    use plait_sync::MutationStore;
    use plait_types::{Mutation, MutationAction, StateHash};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use serde_json::json;

    fn assert_contiguous(history: &[(String, u64, StateHash)]) {
        for (position, (mutation_id, index, _)) in history.iter().enumerate() {
            assert_eq!(
                *index, position as u64,
                "index gap at {mutation_id}: got {index}, expected {position}"
            );
        }
    }

    /// Two property writes from different nodes, mixed actions elsewhere.
    fn small_set() -> Vec<Mutation> {
        vec![
            mutation(
                "m-1",
                100,
                alice(),
                MutationAction::property_set("title", json!("first")),
            ),
            mutation(
                "m-2",
                200,
                bob(),
                MutationAction::property_set("title", json!("second")),
            ),
        ]
    }

    fn mixed_set() -> Vec<Mutation> {
        vec![
            mutation(
                "m-1",
                100,
                alice(),
                MutationAction::property_set("title", json!("one")),
            ),
            mutation("m-2", 150, bob(), MutationAction::member_add(&bob())),
            mutation(
                "m-3",
                200,
                alice(),
                MutationAction::record_set("tasks", "t-1", 1.0, json!({"label": "laundry"})),
            ),
            mutation(
                "m-4",
                250,
                bob(),
                MutationAction::record_set("tasks", "t-2", 2.0, json!({"label": "dishes"})),
            ),
            mutation(
                "m-5",
                300,
                alice(),
                MutationAction::record_reorder("tasks", "t-1", 3.0),
            ),
            mutation(
                "m-6",
                350,
                bob(),
                MutationAction::property_set("title", json!("two")),
            ),
            mutation(
                "m-7",
                400,
                alice(),
                MutationAction::record_delete("tasks", "t-2"),
            ),
            mutation(
                "m-8",
                450,
                bob(),
                MutationAction::file_set("photo", "blob-7"),
            ),
        ]
    }

    /// Deliver one mutation per burst so late arrivals exercise the
    /// rollback path rather than queue sorting.
    async fn deliver_each(node: &mut TestNode, mutations: &[Mutation]) {
        for mutation in mutations {
            node.deliver_all(std::slice::from_ref(mutation)).await;
        }
    }

    #[tokio::test]
    async fn test_two_arrival_orders_converge() {
        let set = small_set();
        let mut in_order = TestNode::new();
        deliver_each(&mut in_order, &set).await;

        let mut reversed = TestNode::new();
        deliver_each(&mut reversed, &[set[1].clone(), set[0].clone()]).await;

        assert_converged(&in_order, &reversed).await;
        let title = reversed
            .store
            .get_property(OBJECT, "title")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(title.value, json!("second"));
    }

    #[tokio::test]
    async fn test_queued_burst_matches_one_by_one_delivery() {
        let set = small_set();
        let mut burst = TestNode::new();
        burst.deliver_all(&set).await;

        let mut one_by_one = TestNode::new();
        deliver_each(&mut one_by_one, &set).await;

        assert_converged(&burst, &one_by_one).await;
    }

    #[tokio::test]
    async fn test_all_permutations_of_three_converge() {
        let set = vec![
            mutation(
                "m-1",
                100,
                alice(),
                MutationAction::property_set("title", json!("one")),
            ),
            mutation("m-2", 200, bob(), MutationAction::member_add(&bob())),
            mutation(
                "m-3",
                300,
                alice(),
                MutationAction::record_set("tasks", "t-1", 1.0, json!({"label": "laundry"})),
            ),
        ];
        let mut reference = TestNode::new();
        deliver_each(&mut reference, &set).await;

        const PERMUTATIONS: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for permutation in PERMUTATIONS {
            let mut node = TestNode::new();
            for &position in &permutation {
                node.deliver_all(std::slice::from_ref(&set[position])).await;
            }
            assert_converged(&reference, &node).await;
            assert_contiguous(&node.history().await);
        }
    }

    #[tokio::test]
    async fn test_seeded_shuffles_converge() {
        let set = mixed_set();
        let mut reference = TestNode::new();
        deliver_each(&mut reference, &set).await;

        for seed in 0..5u64 {
            let mut order: Vec<usize> = (0..set.len()).collect();
            order.shuffle(&mut StdRng::seed_from_u64(seed));

            let mut node = TestNode::new();
            for &position in &order {
                node.deliver_all(std::slice::from_ref(&set[position])).await;
            }

            assert_converged(&reference, &node).await;
            assert_contiguous(&node.history().await);

            let title = node
                .store
                .get_property(OBJECT, "title")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(title.value, json!("two"), "seed {seed}");

            let task = node
                .store
                .get_record(OBJECT, "tasks", "t-1")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(task.sort, 3.0, "seed {seed}");
            assert!(node
                .store
                .get_record(OBJECT, "tasks", "t-2")
                .await
                .unwrap()
                .is_none());

            assert_eq!(node.store.members(OBJECT).await.unwrap(), vec![bob()]);

            let photo = node
                .store
                .get_file(OBJECT, "photo")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(photo.file_id, "blob-7");
        }
    }

    #[tokio::test]
    async fn test_duplicate_redelivery_is_idempotent() {
        let set = mixed_set();
        let mut node = TestNode::new();
        deliver_each(&mut node, &set).await;
        let converged = node.summary().await;

        // At-least-once delivery: the entire set shows up again.
        deliver_each(&mut node, &set).await;

        assert_eq!(node.summary().await, converged);
        assert_eq!(
            node.store.mutation_count(OBJECT).await.unwrap(),
            set.len() as u64
        );
        assert_contiguous(&node.history().await);
    }
}
