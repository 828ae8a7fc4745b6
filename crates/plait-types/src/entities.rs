//! Mutation and aggregate-state entities.
//!
//! The wire shapes here are what peers exchange; the persisted shapes are
//! the supersets the store keeps. Serialized field names are camelCase and
//! action tags are kebab-case to match the federation wire protocol.

use crate::address::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Identifier of a replicated aggregate. Globally unique.
pub type ObjectId = String;
/// Globally unique identifier of one mutation.
pub type MutationId = String;
/// Identifier of a stored blob.
pub type FileId = String;
/// Milliseconds since the epoch, as stamped by the originating node.
pub type Timestamp = u64;
/// Chained, non-cryptographic fingerprint over an object's mutation
/// history. Divergence detector only, not a security mechanism.
pub type StateHash = u32;

/// Generate a fresh mutation id.
pub fn new_mutation_id() -> MutationId {
    Uuid::new_v4().to_string()
}

/// Member descriptor payload for `member-add` / `member-remove`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberValue {
    pub member: Address,
}

/// Payload for `property-set`.
///
/// An absent, null, or empty-string value encodes deletion of the property.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValue {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl PropertyValue {
    /// The value to store, or `None` when this payload encodes deletion.
    pub fn effective_value(&self) -> Option<&JsonValue> {
        match &self.value {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) if s.is_empty() => None,
            Some(value) => Some(value),
        }
    }
}

/// Payload for `record-set`: one record of a named ordered collection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordValue {
    pub collection: String,
    pub record_id: String,
    pub sort: f64,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
}

/// Payload for `record-reorder`: a record's position within its collection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordPosition {
    pub collection: String,
    pub record_id: String,
    pub sort: f64,
}

/// Payload for `record-delete`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub collection: String,
    pub record_id: String,
}

/// Payload for `file-set`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileValue {
    pub file_name: String,
    pub file_id: FileId,
}

/// Payload for `file-delete`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileKey {
    pub file_name: String,
}

/// A mutation's action together with its action-specific payload.
///
/// Unrecognized wire actions deserialize to `Unknown` so a newer peer's
/// mutations never fail parsing; the processor drops them with a warning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", content = "value", rename_all = "kebab-case")]
pub enum MutationAction {
    MemberAdd(MemberValue),
    MemberRemove(MemberValue),
    PropertySet(PropertyValue),
    RecordSet(RecordValue),
    RecordReorder(RecordPosition),
    RecordDelete(RecordKey),
    FileSet(FileValue),
    FileDelete(FileKey),
    #[serde(other)]
    Unknown,
}

impl MutationAction {
    /// Wire tag of this action, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MemberAdd(_) => "member-add",
            Self::MemberRemove(_) => "member-remove",
            Self::PropertySet(_) => "property-set",
            Self::RecordSet(_) => "record-set",
            Self::RecordReorder(_) => "record-reorder",
            Self::RecordDelete(_) => "record-delete",
            Self::FileSet(_) => "file-set",
            Self::FileDelete(_) => "file-delete",
            Self::Unknown => "unknown",
        }
    }

    /// Add the given address (bare, resource stripped) to the member set.
    pub fn member_add(member: &Address) -> Self {
        Self::MemberAdd(MemberValue {
            member: member.bare(),
        })
    }

    /// Remove the given address from the member set.
    pub fn member_remove(member: &Address) -> Self {
        Self::MemberRemove(MemberValue {
            member: member.bare(),
        })
    }

    /// Set a property to a value.
    pub fn property_set(name: impl Into<String>, value: JsonValue) -> Self {
        Self::PropertySet(PropertyValue {
            name: name.into(),
            value_type: None,
            value: Some(value),
        })
    }

    /// Delete a property.
    pub fn property_delete(name: impl Into<String>) -> Self {
        Self::PropertySet(PropertyValue {
            name: name.into(),
            value_type: None,
            value: None,
        })
    }

    /// Upsert a collection record.
    pub fn record_set(
        collection: impl Into<String>,
        record_id: impl Into<String>,
        sort: f64,
        value: JsonValue,
    ) -> Self {
        Self::RecordSet(RecordValue {
            collection: collection.into(),
            record_id: record_id.into(),
            sort,
            value,
            file_id: None,
        })
    }

    /// Move a collection record to a new sort position.
    pub fn record_reorder(
        collection: impl Into<String>,
        record_id: impl Into<String>,
        sort: f64,
    ) -> Self {
        Self::RecordReorder(RecordPosition {
            collection: collection.into(),
            record_id: record_id.into(),
            sort,
        })
    }

    /// Delete a collection record.
    pub fn record_delete(collection: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self::RecordDelete(RecordKey {
            collection: collection.into(),
            record_id: record_id.into(),
        })
    }

    /// Attach a file descriptor under a name.
    pub fn file_set(file_name: impl Into<String>, file_id: impl Into<FileId>) -> Self {
        Self::FileSet(FileValue {
            file_name: file_name.into(),
            file_id: file_id.into(),
        })
    }

    /// Detach a file descriptor.
    pub fn file_delete(file_name: impl Into<String>) -> Self {
        Self::FileDelete(FileKey {
            file_name: file_name.into(),
        })
    }
}

/// One atomic, uniquely identified change to an object, as received from
/// a peer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub object_type: String,
    pub object_id: ObjectId,
    pub mutation_id: MutationId,
    pub created: Timestamp,
    pub originator: Address,
    #[serde(flatten)]
    pub action: MutationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
}

impl Mutation {
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<ObjectId>,
        mutation_id: impl Into<MutationId>,
        created: Timestamp,
        originator: Address,
        action: MutationAction,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            mutation_id: mutation_id.into(),
            created,
            originator,
            action,
            file_id: None,
        }
    }

    /// Like [`Mutation::new`] with a freshly generated mutation id.
    pub fn generated(
        object_type: impl Into<String>,
        object_id: impl Into<ObjectId>,
        created: Timestamp,
        originator: Address,
        action: MutationAction,
    ) -> Self {
        Self::new(
            object_type,
            object_id,
            new_mutation_id(),
            created,
            originator,
            action,
        )
    }

    /// Reference the blob this mutation depends on.
    pub fn with_file_id(mut self, file_id: impl Into<FileId>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }
}

/// Pre-image of the state a mutation overwrote, captured before the write
/// so the mutation can be rolled back exactly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum PreviousValue {
    Property(PropertyRecord),
    Record(CollectionRecord),
    Position(RecordPosition),
    File(FileRecord),
}

/// Persisted form of a mutation: the wire shape plus the bookkeeping the
/// processor adds as it integrates it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    #[serde(flatten)]
    pub mutation: Mutation,
    pub state_hash: StateHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<PreviousValue>,
    pub integrated: bool,
    pub index: u64,
}

/// A property of an object, as persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub object_id: ObjectId,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    pub value: JsonValue,
    pub updated_by: Address,
    pub updated: Timestamp,
}

impl PropertyRecord {
    pub fn new(
        object_id: impl Into<ObjectId>,
        name: impl Into<String>,
        value_type: Option<String>,
        value: JsonValue,
        updated_by: Address,
        updated: Timestamp,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            name: name.into(),
            value_type,
            value,
            updated_by,
            updated,
        }
    }
}

/// One record of a named ordered collection, as persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub object_id: ObjectId,
    pub collection: String,
    pub record_id: String,
    pub sort: f64,
    pub value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
    pub updated_by: Address,
    pub updated: Timestamp,
}

impl CollectionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        object_id: impl Into<ObjectId>,
        collection: impl Into<String>,
        record_id: impl Into<String>,
        sort: f64,
        value: JsonValue,
        file_id: Option<FileId>,
        updated_by: Address,
        updated: Timestamp,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            collection: collection.into(),
            record_id: record_id.into(),
            sort,
            value,
            file_id,
            updated_by,
            updated,
        }
    }

    /// This record's position descriptor, for reorder pre-images.
    pub fn position(&self) -> RecordPosition {
        RecordPosition {
            collection: self.collection.clone(),
            record_id: self.record_id.clone(),
            sort: self.sort,
        }
    }
}

/// A named file attachment of an object, as persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub object_id: ObjectId,
    pub file_name: String,
    pub file_id: FileId,
}

impl FileRecord {
    pub fn new(
        object_id: impl Into<ObjectId>,
        file_name: impl Into<String>,
        file_id: impl Into<FileId>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            file_name: file_name.into(),
            file_id: file_id.into(),
        }
    }
}

/// Identity of an object's most recently integrated mutation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatestMutation {
    pub mutation_id: MutationId,
    pub created: Timestamp,
    pub originator: Address,
}

impl From<&Mutation> for LatestMutation {
    fn from(mutation: &Mutation) -> Self {
        Self {
            mutation_id: mutation.mutation_id.clone(),
            created: mutation.created,
            originator: mutation.originator.clone(),
        }
    }
}

/// Summary of an object's mutation history, served to inventory/sync
/// protocols so peers can decide what to request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    pub mutation_count: u64,
    pub state_hash: StateHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_mutation: Option<LatestMutation>,
}

impl ObjectSummary {
    /// Summary of an object with no integrated mutations.
    pub fn empty() -> Self {
        Self {
            mutation_count: 0,
            state_hash: 0,
            latest_mutation: None,
        }
    }
}
