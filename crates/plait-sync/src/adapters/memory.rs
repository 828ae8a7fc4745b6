//! In-memory mutation store.
//!
//! Backs the unit and integration suites. Everything lives in hash maps
//! behind one mutex; history cursors iterate a snapshot taken at creation
//! time, which satisfies the processor's access pattern (the rollback scan
//! only reads, and writes happen between cursor lifetimes). Production
//! deployments implement `MutationStore` against a real database instead.

use crate::domain::comparator;
use crate::domain::errors::StoreError;
use crate::ports::outbound::{ExistsFilter, HistoryOrder, MutationCursor, MutationStore};
use async_trait::async_trait;
use plait_types::{
    Address, CollectionRecord, FileId, FileRecord, LatestMutation, MutationRecord, ObjectId,
    ObjectSummary, PropertyRecord, RecordPosition,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    /// Mutation records per object, unordered; queries sort on demand.
    mutations: HashMap<ObjectId, Vec<MutationRecord>>,
    /// Member set per object, keyed by canonical address string.
    members: HashMap<ObjectId, BTreeMap<String, Address>>,
    properties: HashMap<ObjectId, HashMap<String, PropertyRecord>>,
    /// Collection records keyed by (collection, record id).
    records: HashMap<ObjectId, HashMap<(String, String), CollectionRecord>>,
    files: HashMap<ObjectId, HashMap<String, FileRecord>>,
    /// Blob ids available locally; stands in for the external file store.
    blobs: HashSet<FileId>,
    /// Externally supplied "mutations still expected" counters.
    expected: HashMap<ObjectId, i64>,
}

/// In-memory `MutationStore` for tests.
#[derive(Default)]
pub struct InMemoryMutationStore {
    inner: Mutex<Inner>,
}

struct SnapshotCursor {
    records: std::vec::IntoIter<MutationRecord>,
}

#[async_trait]
impl MutationCursor for SnapshotCursor {
    async fn next(&mut self) -> Result<Option<MutationRecord>, StoreError> {
        Ok(self.records.next())
    }
}

impl InMemoryMutationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a blob id available, as the file server would after storing
    /// its content.
    pub fn insert_blob(&self, file_id: impl Into<FileId>) {
        self.inner().blobs.insert(file_id.into());
    }

    /// Seed the "mutations still expected" counter for an object.
    pub fn set_expected_count(&self, object_id: &str, count: i64) {
        self.inner().expected.insert(object_id.to_string(), count);
    }

    /// Current "mutations still expected" counter for an object.
    pub fn expected_count(&self, object_id: &str) -> i64 {
        self.inner().expected.get(object_id).copied().unwrap_or(0)
    }

    fn integrated_sorted(&self, object_id: &str, order: HistoryOrder) -> Vec<MutationRecord> {
        let inner = self.inner();
        let mut records: Vec<MutationRecord> = inner
            .mutations
            .get(object_id)
            .map(|records| records.iter().filter(|r| r.integrated).cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| comparator::compare(&a.mutation, &b.mutation));
        if order == HistoryOrder::Reverse {
            records.reverse();
        }
        records
    }
}

#[async_trait]
impl MutationStore for InMemoryMutationStore {
    async fn mutation_exists(
        &self,
        object_id: &str,
        mutation_id: &str,
        filter: ExistsFilter,
    ) -> Result<bool, StoreError> {
        let inner = self.inner();
        let exists = inner
            .mutations
            .get(object_id)
            .map(|records| {
                records.iter().any(|r| {
                    r.mutation.mutation_id == mutation_id
                        && match filter {
                            ExistsFilter::Any => true,
                            ExistsFilter::IntegratedOnly => r.integrated,
                            ExistsFilter::UnintegratedOnly => !r.integrated,
                        }
                })
            })
            .unwrap_or(false);
        Ok(exists)
    }

    async fn find_mutation(
        &self,
        object_id: &str,
        mutation_id: &str,
    ) -> Result<Option<MutationRecord>, StoreError> {
        let inner = self.inner();
        Ok(inner.mutations.get(object_id).and_then(|records| {
            records
                .iter()
                .find(|r| r.mutation.mutation_id == mutation_id)
                .cloned()
        }))
    }

    async fn latest_integrated(
        &self,
        object_id: &str,
    ) -> Result<Option<MutationRecord>, StoreError> {
        Ok(self
            .integrated_sorted(object_id, HistoryOrder::Forward)
            .pop())
    }

    async fn integrated_history(
        &self,
        object_id: &str,
        order: HistoryOrder,
    ) -> Result<Box<dyn MutationCursor>, StoreError> {
        Ok(Box::new(SnapshotCursor {
            records: self.integrated_sorted(object_id, order).into_iter(),
        }))
    }

    async fn integrated_history_after(
        &self,
        object_id: &str,
        index: u64,
    ) -> Result<Box<dyn MutationCursor>, StoreError> {
        let records: Vec<MutationRecord> = self
            .integrated_sorted(object_id, HistoryOrder::Forward)
            .into_iter()
            .filter(|r| r.index > index)
            .collect();
        Ok(Box::new(SnapshotCursor {
            records: records.into_iter(),
        }))
    }

    async fn save_mutation(&self, record: &MutationRecord) -> Result<(), StoreError> {
        let mut inner = self.inner();
        let records = inner
            .mutations
            .entry(record.mutation.object_id.clone())
            .or_default();
        match records
            .iter_mut()
            .find(|r| r.mutation.mutation_id == record.mutation.mutation_id)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn mark_integrated(
        &self,
        object_id: &str,
        mutation_id: &str,
        integrated: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if let Some(records) = inner.mutations.get_mut(object_id) {
            if let Some(record) = records
                .iter_mut()
                .find(|r| r.mutation.mutation_id == mutation_id)
            {
                record.integrated = integrated;
            }
        }
        Ok(())
    }

    async fn mutation_count(&self, object_id: &str) -> Result<u64, StoreError> {
        let inner = self.inner();
        Ok(inner
            .mutations
            .get(object_id)
            .map(|records| records.iter().filter(|r| r.integrated).count() as u64)
            .unwrap_or(0))
    }

    async fn object_summary(&self, object_id: &str) -> Result<ObjectSummary, StoreError> {
        let records = self.integrated_sorted(object_id, HistoryOrder::Forward);
        Ok(match records.last() {
            Some(latest) => ObjectSummary {
                mutation_count: records.len() as u64,
                state_hash: latest.state_hash,
                latest_mutation: Some(LatestMutation::from(&latest.mutation)),
            },
            None => ObjectSummary::empty(),
        })
    }

    async fn file_exists(&self, file_id: &str) -> Result<bool, StoreError> {
        Ok(self.inner().blobs.contains(file_id))
    }

    async fn decrement_expected(&self, object_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner();
        *inner.expected.entry(object_id.to_string()).or_insert(0) -= 1;
        Ok(())
    }

    async fn add_member(&self, object_id: &str, member: &Address) -> Result<(), StoreError> {
        self.inner()
            .members
            .entry(object_id.to_string())
            .or_default()
            .insert(member.canonical_string(), member.clone());
        Ok(())
    }

    async fn remove_member(&self, object_id: &str, member: &Address) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if let Some(members) = inner.members.get_mut(object_id) {
            members.remove(&member.canonical_string());
        }
        Ok(())
    }

    async fn members(&self, object_id: &str) -> Result<Vec<Address>, StoreError> {
        let inner = self.inner();
        Ok(inner
            .members
            .get(object_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_property(&self, record: &PropertyRecord) -> Result<(), StoreError> {
        self.inner()
            .properties
            .entry(record.object_id.clone())
            .or_default()
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete_property(&self, object_id: &str, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if let Some(properties) = inner.properties.get_mut(object_id) {
            properties.remove(name);
        }
        Ok(())
    }

    async fn get_property(
        &self,
        object_id: &str,
        name: &str,
    ) -> Result<Option<PropertyRecord>, StoreError> {
        let inner = self.inner();
        Ok(inner
            .properties
            .get(object_id)
            .and_then(|properties| properties.get(name).cloned()))
    }

    async fn set_record(&self, record: &CollectionRecord) -> Result<(), StoreError> {
        self.inner()
            .records
            .entry(record.object_id.clone())
            .or_default()
            .insert(
                (record.collection.clone(), record.record_id.clone()),
                record.clone(),
            );
        Ok(())
    }

    async fn reorder_record(
        &self,
        object_id: &str,
        position: &RecordPosition,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if let Some(records) = inner.records.get_mut(object_id) {
            if let Some(record) =
                records.get_mut(&(position.collection.clone(), position.record_id.clone()))
            {
                record.sort = position.sort;
            }
        }
        Ok(())
    }

    async fn delete_record(
        &self,
        object_id: &str,
        collection: &str,
        record_id: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if let Some(records) = inner.records.get_mut(object_id) {
            records.remove(&(collection.to_string(), record_id.to_string()));
        }
        Ok(())
    }

    async fn get_record(
        &self,
        object_id: &str,
        collection: &str,
        record_id: &str,
    ) -> Result<Option<CollectionRecord>, StoreError> {
        let inner = self.inner();
        Ok(inner.records.get(object_id).and_then(|records| {
            records
                .get(&(collection.to_string(), record_id.to_string()))
                .cloned()
        }))
    }

    async fn set_file(&self, record: &FileRecord) -> Result<(), StoreError> {
        self.inner()
            .files
            .entry(record.object_id.clone())
            .or_default()
            .insert(record.file_name.clone(), record.clone());
        Ok(())
    }

    async fn delete_file(&self, object_id: &str, file_name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if let Some(files) = inner.files.get_mut(object_id) {
            files.remove(file_name);
        }
        Ok(())
    }

    async fn get_file(
        &self,
        object_id: &str,
        file_name: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        let inner = self.inner();
        Ok(inner
            .files
            .get(object_id)
            .and_then(|files| files.get(file_name).cloned()))
    }
}
