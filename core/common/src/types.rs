//! Record and queue types shared by the store, the remote client and the engine.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Identity of a record. Two records are the same entity iff their ids match.
pub type RecordId = String;

/// Canonical, lexicographically sortable timestamp format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current time rendered in [`TIMESTAMP_FORMAT`].
pub fn current_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Render a point in time in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Opaque binary attachment, carried as base64 text.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attachment(String);

impl Attachment {
    /// Wrap raw bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(STANDARD.encode(data))
    }

    /// Wrap text that is already base64 encoded.
    ///
    /// # Errors
    /// - Returns error if the text is not valid base64
    pub fn from_base64(encoded: impl Into<String>) -> Result<Self> {
        let encoded = encoded.into();
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("Attachment is not base64: {}", e)))?;
        Ok(Self(encoded))
    }

    /// Decode the attachment back into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.0.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("Attachment is not base64: {}", e)))
    }

    /// The base64 text.
    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// Size of the decoded payload in bytes.
    pub fn decoded_len(&self) -> usize {
        let padding = self.0.bytes().rev().take_while(|b| *b == b'=').count();
        ((self.0.len() / 4) * 3).saturating_sub(padding.min(2))
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attachment({} bytes)", self.decoded_len())
    }
}

/// Caller-supplied fields for a new record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub name: String,
    pub completed: bool,
    pub attachment: Option<Attachment>,
}

impl RecordDraft {
    /// Create a draft with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completed: false,
            attachment: None,
        }
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// An immutable snapshot of a task.
///
/// Every change produces a new snapshot through the `with_*` methods; a
/// snapshot handed out by the engine is never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub timestamp: String,
}

impl Record {
    /// Build a record with a freshly generated id and the current timestamp.
    pub fn from_draft(draft: RecordDraft) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            completed: draft.completed,
            attachment: draft.attachment,
            timestamp: current_timestamp(),
        }
    }

    /// Build a record with explicit identity and timestamp.
    pub fn new(
        id: impl Into<RecordId>,
        name: impl Into<String>,
        completed: bool,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            completed,
            attachment: None,
            timestamp: timestamp.into(),
        }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_completed(&self, completed: bool) -> Self {
        Self {
            completed,
            ..self.clone()
        }
    }

    pub fn with_attachment(&self, attachment: Option<Attachment>) -> Self {
        Self {
            attachment,
            ..self.clone()
        }
    }

    /// Whether both snapshots describe the same entity.
    pub fn same_entity(&self, other: &Record) -> bool {
        self.id == other.id
    }
}

/// Kind of a queued write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Record did not exist when it was written.
    Create,
    /// Existing record modified.
    Update,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
        }
    }

    /// Parse the stored form produced by [`OperationKind::as_str`].
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            other => Err(Error::InvalidInput(format!(
                "Unknown operation kind: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write that has not been confirmed by the remote authority yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Unique ID for this operation, independent of the record id.
    pub operation_id: String,
    /// Type of write.
    pub kind: OperationKind,
    /// Record snapshot to submit.
    pub snapshot: Record,
    /// When the operation was queued.
    pub queued_at: DateTime<Utc>,
}

impl PendingOperation {
    /// Queue a new operation for `snapshot`.
    pub fn new(kind: OperationKind, snapshot: Record) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            kind,
            snapshot,
            queued_at: Utc::now(),
        }
    }

    /// Id of the record this operation writes.
    pub fn record_id(&self) -> &str {
        &self.snapshot.id
    }

    /// Replace this operation's intent with a later write for the same record.
    ///
    /// The result carries a new operation id so that a drain still holding the
    /// old snapshot cannot acknowledge the newer one. A queued `Create` stays a
    /// `Create`.
    pub fn superseded_by(&self, kind: OperationKind, snapshot: Record) -> Self {
        let kind = match self.kind {
            OperationKind::Create => OperationKind::Create,
            OperationKind::Update => kind,
        };
        Self {
            operation_id: Uuid::new_v4().to_string(),
            kind,
            snapshot,
            queued_at: self.queued_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_record_from_draft() {
        let draft = RecordDraft::new("Buy milk").completed(true);
        let record = Record::from_draft(draft);

        assert_eq!(record.name, "Buy milk");
        assert!(record.completed);
        assert!(record.attachment.is_none());
        assert_eq!(record.id.len(), 36);
        assert_eq!(record.timestamp.len(), 19);
    }

    #[test]
    fn test_record_ids_are_unique() {
        let a = Record::from_draft(RecordDraft::new("a"));
        let b = Record::from_draft(RecordDraft::new("a"));
        assert_ne!(a.id, b.id);
        assert!(!a.same_entity(&b));
    }

    #[test]
    fn test_with_methods_produce_new_snapshots() {
        let original = Record::new("1", "Draft", false, "2025-10-13 10:00:00");
        let renamed = original.with_name("Final").with_completed(true);

        assert_eq!(original.name, "Draft");
        assert!(!original.completed);
        assert_eq!(renamed.name, "Final");
        assert!(renamed.completed);
        assert!(renamed.same_entity(&original));
        assert_eq!(renamed.timestamp, original.timestamp);
    }

    #[test]
    fn test_attachment_bytes() {
        let attachment = Attachment::from_bytes(b"\x89PNG\r\n");
        assert_eq!(attachment.decoded_len(), 6);
        assert_eq!(attachment.to_bytes().unwrap(), b"\x89PNG\r\n");
        assert_eq!(format!("{:?}", attachment), "Attachment(6 bytes)");
    }

    #[test]
    fn test_attachment_rejects_invalid_base64() {
        assert!(Attachment::from_base64("not base64!").is_err());
        assert!(Attachment::from_base64("aGVsbG8=").is_ok());
    }

    #[test]
    fn test_record_serialization_omits_missing_attachment() {
        let record = Record::new("1", "Task", false, "2025-10-13 10:00:00");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("attachment").is_none());

        let restored: Record = serde_json::from_value(json).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_operation_kind_parse() {
        assert_eq!(OperationKind::parse("create").unwrap(), OperationKind::Create);
        assert_eq!(OperationKind::parse("update").unwrap(), OperationKind::Update);
        assert!(OperationKind::parse("delete").is_err());
    }

    #[test]
    fn test_superseded_create_stays_create() {
        let record = Record::new("7", "v1", false, "2025-10-13 10:00:00");
        let queued = PendingOperation::new(OperationKind::Create, record.clone());
        let next = queued.superseded_by(OperationKind::Update, record.with_name("v2"));

        assert_eq!(next.kind, OperationKind::Create);
        assert_eq!(next.snapshot.name, "v2");
        assert_ne!(next.operation_id, queued.operation_id);
        assert_eq!(next.queued_at, queued.queued_at);
    }

    #[test]
    fn test_superseded_update_takes_new_kind() {
        let record = Record::new("5", "v1", false, "2025-10-13 10:00:00");
        let queued = PendingOperation::new(OperationKind::Update, record.clone());
        let next = queued.superseded_by(OperationKind::Update, record.with_completed(true));

        assert_eq!(next.kind, OperationKind::Update);
        assert_eq!(next.record_id(), "5");
    }

    proptest! {
        #[test]
        fn timestamps_sort_like_instants(a in 0i64..4_000_000_000, b in 0i64..4_000_000_000) {
            let ta = Utc.timestamp_opt(a, 0).unwrap();
            let tb = Utc.timestamp_opt(b, 0).unwrap();
            prop_assert_eq!(ta.cmp(&tb), format_timestamp(ta).cmp(&format_timestamp(tb)));
        }

        #[test]
        fn attachment_length_matches_payload(
            data in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let attachment = Attachment::from_bytes(&data);
            prop_assert_eq!(attachment.decoded_len(), data.len());
        }
    }
}
