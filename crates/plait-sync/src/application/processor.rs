//! Per-object mutation processor.
//!
//! One processor orchestrates the apply/rollback cycle for one object.
//! Mutations arrive in arbitrary order; the processor integrates them in
//! the canonical order, rolling back already-integrated mutations when an
//! older one arrives late and reapplying them afterwards. Work proceeds as
//! discrete steps rescheduled on the runtime rather than recursing, so one
//! store round trip is in flight per object and stack depth stays bounded.
//!
//! An instance is transient: ordering and idempotence are enforced against
//! durable store state, so a processor can be dropped once idle and
//! recreated later without loss.

use crate::config::ProcessorConfig;
use crate::domain::comparator;
use crate::domain::errors::ProcessorError;
use crate::domain::hash_chain;
use crate::ports::outbound::{ExistsFilter, HistoryOrder, MutationStore, SyncDriver};
use plait_types::{
    CollectionRecord, FileRecord, Mutation, MutationAction, MutationRecord, ObjectId,
    PreviousValue, PropertyRecord,
};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Outcome of one unit of work.
enum Step {
    /// Something was done; yield and reschedule.
    Continue,
    /// Both queues drained; the cycle is over. `queued` is how many
    /// mutations were accepted since the last idle transition.
    Idle { queued: u64 },
}

struct ProcessorState {
    /// Mutations awaiting integration, re-sorted each step.
    pending_forward: Vec<Mutation>,
    /// Integrated records being unwound, newest first; drained in that
    /// order so newer effects are undone before the pre-images they
    /// captured are restored.
    pending_rollback: VecDeque<MutationRecord>,
    /// Mutations still expected by a resync handshake; zero when no
    /// handshake pre-declared a count.
    expected_remaining: u64,
    /// Single-flight guard: at most one drive task per object.
    cycle_active: bool,
    /// Accepted since the last idle transition; drives the completion
    /// callback.
    queued_since_idle: u64,
}

/// Orchestrates the apply/rollback cycle for one object.
pub struct MutationProcessor<S, D> {
    object_id: ObjectId,
    store: Arc<S>,
    driver: Arc<D>,
    max_pending: usize,
    state: Mutex<ProcessorState>,
}

impl<S, D> MutationProcessor<S, D>
where
    S: MutationStore + 'static,
    D: SyncDriver + 'static,
{
    /// Create a processor for one object. `expected` is the mutation count
    /// a resync handshake pre-declared, or zero.
    pub fn new(
        object_id: impl Into<ObjectId>,
        expected: u64,
        store: Arc<S>,
        driver: Arc<D>,
        config: &ProcessorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            object_id: object_id.into(),
            store,
            driver,
            max_pending: config.max_pending_mutations,
            state: Mutex::new(ProcessorState {
                pending_forward: Vec::new(),
                pending_rollback: VecDeque::new(),
                expected_remaining: expected,
                cycle_active: false,
                queued_since_idle: 0,
            }),
        })
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// True when no cycle is running and nothing is queued.
    pub fn is_idle(&self) -> bool {
        let state = self.state();
        !state.cycle_active
            && state.pending_forward.is_empty()
            && state.pending_rollback.is_empty()
    }

    /// Queue a mutation and trigger processing. Returns immediately; the
    /// caller never waits for convergence.
    pub fn add_mutation(self: &Arc<Self>, mutation: Mutation) -> Result<(), ProcessorError> {
        if mutation.object_id != self.object_id {
            warn!(
                object_id = %self.object_id,
                mutation_object_id = %mutation.object_id,
                mutation_id = %mutation.mutation_id,
                "mutation routed to the wrong processor, dropping"
            );
            return Ok(());
        }
        let spawn = {
            let mut state = self.state();
            if state.pending_forward.len() >= self.max_pending {
                return Err(ProcessorError::QueueFull {
                    object_id: self.object_id.clone(),
                    len: state.pending_forward.len(),
                    max: self.max_pending,
                });
            }
            state.pending_forward.push(mutation);
            state.queued_since_idle += 1;
            !std::mem::replace(&mut state.cycle_active, true)
        };
        if spawn {
            let processor = Arc::clone(self);
            tokio::spawn(async move { processor.drive().await });
        }
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, ProcessorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive task: one unit of work per activation, yielding between
    /// units so other objects' processors interleave.
    async fn drive(&self) {
        debug!(object_id = %self.object_id, "processing cycle started");
        loop {
            match self.step().await {
                Ok(Step::Continue) => tokio::task::yield_now().await,
                Ok(Step::Idle { queued }) => {
                    debug!(object_id = %self.object_id, queued, "processing cycle complete");
                    if queued > 0 {
                        self.driver.on_mutations_completed(&self.object_id).await;
                    }
                    break;
                }
                Err(err) => {
                    error!(object_id = %self.object_id, error = %err, "processing cycle aborted");
                    self.state().cycle_active = false;
                    self.driver.on_cycle_failed(&self.object_id, &err).await;
                    break;
                }
            }
        }
    }

    async fn step(&self) -> Result<Step, ProcessorError> {
        // Rollbacks drain before any forward work.
        let next_rollback = self.state().pending_rollback.pop_front();
        if let Some(record) = next_rollback {
            debug!(
                object_id = %self.object_id,
                mutation_id = %record.mutation.mutation_id,
                index = record.index,
                "rolling back mutation"
            );
            self.rollback_mutation(&record).await?;
            // Reconsidered as if freshly arrived, in corrected order.
            self.state().pending_forward.push(record.mutation);
            return Ok(Step::Continue);
        }

        let candidate = {
            let mut state = self.state();
            state
                .pending_forward
                .sort_by(|a, b| comparator::compare(a, b));
            state.pending_forward.first().cloned()
        };
        let Some(candidate) = candidate else {
            let queued = {
                let mut state = self.state();
                // An arrival may have raced the last store round trip.
                if !state.pending_forward.is_empty() || !state.pending_rollback.is_empty() {
                    return Ok(Step::Continue);
                }
                state.cycle_active = false;
                std::mem::take(&mut state.queued_since_idle)
            };
            return Ok(Step::Idle { queued });
        };

        if self
            .store
            .mutation_exists(
                &self.object_id,
                &candidate.mutation_id,
                ExistsFilter::IntegratedOnly,
            )
            .await?
        {
            warn!(
                object_id = %self.object_id,
                mutation_id = %candidate.mutation_id,
                "mutation already integrated, skipping duplicate"
            );
            self.discard(&candidate.mutation_id);
            return Ok(Step::Continue);
        }

        let latest = self.store.latest_integrated(&self.object_id).await?;
        let ordering = latest
            .as_ref()
            .map_or(Ordering::Less, |l| comparator::compare(&l.mutation, &candidate));
        match ordering {
            Ordering::Equal => {
                warn!(
                    object_id = %self.object_id,
                    mutation_id = %candidate.mutation_id,
                    "candidate matches the latest integrated mutation, skipping"
                );
                self.discard(&candidate.mutation_id);
            }
            Ordering::Less => {
                // Candidate is causally next.
                if !self.verify(&candidate).await? {
                    self.discard(&candidate.mutation_id);
                    return Ok(Step::Continue);
                }
                self.discard(&candidate.mutation_id);
                self.apply_mutation(candidate, latest).await?;
            }
            Ordering::Greater => {
                info!(
                    object_id = %self.object_id,
                    mutation_id = %candidate.mutation_id,
                    "mutation arrived out of order, starting rollback"
                );
                self.begin_rollback(&candidate).await?;
            }
        }
        Ok(Step::Continue)
    }

    /// Remove one queued mutation by id.
    fn discard(&self, mutation_id: &str) {
        let mut state = self.state();
        if let Some(pos) = state
            .pending_forward
            .iter()
            .position(|m| m.mutation_id == mutation_id)
        {
            state.pending_forward.swap_remove(pos);
        }
    }

    /// Preconditions that defer or drop a mutation without failing the
    /// cycle: unknown actions are dropped, and a mutation referencing a
    /// blob not yet stored is handed back to the driver for redelivery
    /// once the blob arrives.
    async fn verify(&self, mutation: &Mutation) -> Result<bool, ProcessorError> {
        if matches!(mutation.action, MutationAction::Unknown) {
            warn!(
                object_id = %self.object_id,
                mutation_id = %mutation.mutation_id,
                "unrecognized mutation action, dropping"
            );
            return Ok(false);
        }
        if let Some(file_id) = &mutation.file_id {
            if !self.store.file_exists(file_id).await? {
                info!(
                    object_id = %self.object_id,
                    mutation_id = %mutation.mutation_id,
                    file_id = %file_id,
                    "mutation references a file not yet stored, deferring"
                );
                self.driver.on_file_missing(&self.object_id, mutation).await;
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn apply_mutation(
        &self,
        mutation: Mutation,
        latest: Option<MutationRecord>,
    ) -> Result<(), ProcessorError> {
        let previous_value = self.capture_previous(&mutation).await?;
        let (index, state_hash) = match &latest {
            Some(l) => (
                l.index + 1,
                hash_chain::advance(l.state_hash, &mutation.mutation_id),
            ),
            None => (0, hash_chain::advance(0, &mutation.mutation_id)),
        };
        debug!(
            object_id = %self.object_id,
            mutation_id = %mutation.mutation_id,
            action = mutation.action.name(),
            index,
            state_hash,
            "applying mutation"
        );
        let record = MutationRecord {
            mutation,
            state_hash,
            previous_value,
            integrated: true,
            index,
        };
        self.store.save_mutation(&record).await?;
        self.perform(&record.mutation).await?;
        self.note_applied().await?;
        Ok(())
    }

    /// Read the state this mutation is about to overwrite, so it can be
    /// rolled back exactly.
    async fn capture_previous(
        &self,
        mutation: &Mutation,
    ) -> Result<Option<PreviousValue>, ProcessorError> {
        let previous = match &mutation.action {
            MutationAction::MemberAdd(_) | MutationAction::MemberRemove(_) => None,
            MutationAction::PropertySet(value) => self
                .store
                .get_property(&self.object_id, &value.name)
                .await?
                .map(PreviousValue::Property),
            MutationAction::RecordSet(value) => self
                .store
                .get_record(&self.object_id, &value.collection, &value.record_id)
                .await?
                .map(PreviousValue::Record),
            MutationAction::RecordDelete(key) => self
                .store
                .get_record(&self.object_id, &key.collection, &key.record_id)
                .await?
                .map(PreviousValue::Record),
            MutationAction::RecordReorder(position) => self
                .store
                .get_record(&self.object_id, &position.collection, &position.record_id)
                .await?
                .map(|record| PreviousValue::Position(record.position())),
            MutationAction::FileSet(value) => self
                .store
                .get_file(&self.object_id, &value.file_name)
                .await?
                .map(PreviousValue::File),
            MutationAction::FileDelete(key) => self
                .store
                .get_file(&self.object_id, &key.file_name)
                .await?
                .map(PreviousValue::File),
            MutationAction::Unknown => None,
        };
        Ok(previous)
    }

    /// Dispatch the mutation's effect onto object state.
    async fn perform(&self, mutation: &Mutation) -> Result<(), ProcessorError> {
        match &mutation.action {
            MutationAction::MemberAdd(value) => {
                self.store.add_member(&self.object_id, &value.member).await?;
            }
            MutationAction::MemberRemove(value) => {
                self.store
                    .remove_member(&self.object_id, &value.member)
                    .await?;
            }
            MutationAction::PropertySet(value) => match value.effective_value() {
                Some(effective) => {
                    let record = PropertyRecord::new(
                        self.object_id.clone(),
                        value.name.clone(),
                        value.value_type.clone(),
                        effective.clone(),
                        mutation.originator.clone(),
                        mutation.created,
                    );
                    self.store.set_property(&record).await?;
                }
                None => {
                    self.store
                        .delete_property(&self.object_id, &value.name)
                        .await?;
                }
            },
            MutationAction::RecordSet(value) => {
                let record = CollectionRecord::new(
                    self.object_id.clone(),
                    value.collection.clone(),
                    value.record_id.clone(),
                    value.sort,
                    value.value.clone(),
                    value.file_id.clone(),
                    mutation.originator.clone(),
                    mutation.created,
                );
                self.store.set_record(&record).await?;
            }
            MutationAction::RecordReorder(position) => {
                self.store.reorder_record(&self.object_id, position).await?;
            }
            MutationAction::RecordDelete(key) => {
                self.store
                    .delete_record(&self.object_id, &key.collection, &key.record_id)
                    .await?;
            }
            MutationAction::FileSet(value) => {
                let record = FileRecord::new(
                    self.object_id.clone(),
                    value.file_name.clone(),
                    value.file_id.clone(),
                );
                self.store.set_file(&record).await?;
            }
            MutationAction::FileDelete(key) => {
                self.store
                    .delete_file(&self.object_id, &key.file_name)
                    .await?;
            }
            MutationAction::Unknown => {
                // Filtered in verify; kept non-fatal regardless.
                warn!(
                    object_id = %self.object_id,
                    mutation_id = %mutation.mutation_id,
                    "unrecognized mutation action reached dispatch, ignoring"
                );
            }
        }
        Ok(())
    }

    async fn note_applied(&self) -> Result<(), ProcessorError> {
        let should_decrement = {
            let mut state = self.state();
            if state.expected_remaining > 0 {
                state.expected_remaining -= 1;
                true
            } else {
                false
            }
        };
        if should_decrement {
            self.store.decrement_expected(&self.object_id).await?;
        }
        Ok(())
    }

    /// Un-integrate one record and apply the inverse of its effect from
    /// the captured pre-image.
    async fn rollback_mutation(&self, record: &MutationRecord) -> Result<(), ProcessorError> {
        self.store
            .mark_integrated(&self.object_id, &record.mutation.mutation_id, false)
            .await?;
        match (&record.mutation.action, &record.previous_value) {
            (MutationAction::MemberAdd(value), _) => {
                self.store
                    .remove_member(&self.object_id, &value.member)
                    .await?;
            }
            (MutationAction::MemberRemove(value), _) => {
                self.store.add_member(&self.object_id, &value.member).await?;
            }
            (MutationAction::PropertySet(_), Some(PreviousValue::Property(previous))) => {
                self.store.set_property(previous).await?;
            }
            (MutationAction::PropertySet(value), _) => {
                self.store
                    .delete_property(&self.object_id, &value.name)
                    .await?;
            }
            (MutationAction::RecordSet(_), Some(PreviousValue::Record(previous))) => {
                self.store.set_record(previous).await?;
            }
            (MutationAction::RecordSet(value), _) => {
                self.store
                    .delete_record(&self.object_id, &value.collection, &value.record_id)
                    .await?;
            }
            (MutationAction::RecordReorder(_), Some(PreviousValue::Position(previous))) => {
                self.store.reorder_record(&self.object_id, previous).await?;
            }
            (MutationAction::RecordDelete(_), Some(PreviousValue::Record(previous))) => {
                self.store.set_record(previous).await?;
            }
            (MutationAction::FileSet(_), Some(PreviousValue::File(previous))) => {
                self.store.set_file(previous).await?;
            }
            (MutationAction::FileSet(value), _) => {
                self.store
                    .delete_file(&self.object_id, &value.file_name)
                    .await?;
            }
            (MutationAction::FileDelete(_), Some(PreviousValue::File(previous))) => {
                self.store.set_file(previous).await?;
            }
            (action, _) => {
                warn!(
                    object_id = %self.object_id,
                    mutation_id = %record.mutation.mutation_id,
                    action = action.name(),
                    "no usable pre-image for rollback, leaving state as is"
                );
            }
        }
        Ok(())
    }

    /// Scan integrated history newest-first, moving every record ordered
    /// after the candidate onto the rollback queue; stop at the first
    /// record that precedes it.
    async fn begin_rollback(&self, candidate: &Mutation) -> Result<(), ProcessorError> {
        let mut cursor = self
            .store
            .integrated_history(&self.object_id, HistoryOrder::Reverse)
            .await?;
        let mut moved = 0usize;
        while let Some(record) = cursor.next().await? {
            if comparator::compare(&record.mutation, candidate) == Ordering::Less {
                break;
            }
            debug!(
                object_id = %self.object_id,
                mutation_id = %record.mutation.mutation_id,
                index = record.index,
                "queueing integrated mutation for rollback"
            );
            self.state().pending_rollback.push_back(record);
            moved += 1;
        }
        if moved == 0 {
            return Err(ProcessorError::RollbackUnderrun {
                object_id: self.object_id.clone(),
                mutation_id: candidate.mutation_id.clone(),
            });
        }
        debug!(object_id = %self.object_id, moved, "rollback scan complete");
        Ok(())
    }
}
