//! Typed records for the four collections
//!
//! The store itself is schema-agnostic and holds JSON objects; these types are
//! the client-side contract. Each record type has a draft (fields accepted on
//! create) and an update (every field optional, absent fields untouched).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::kind::RecordKind;
use crate::status::{effective_status, DocumentStatus, Status};

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Kind of metal test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestType {
    #[serde(rename = "DP_tension")]
    DpTension,
    #[serde(rename = "technological")]
    Technological,
    #[serde(rename = "metallographic")]
    Metallographic,
}

/// A record type stored in one collection
pub trait TrackedRecord: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection this type lives in
    const KIND: RecordKind;
    /// Fields accepted on create
    type Draft: Serialize + Send + Sync;
    /// Partial update payload
    type Update: Serialize + Send + Sync;

    fn id(&self) -> &str;
}

/// Serialize a draft or update into a JSON object payload
pub fn to_payload<T: Serialize>(value: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidPayload(format!(
            "expected an object, got {other}"
        ))),
    }
}

// ==================== Task ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
    pub assignee_id: String,
    pub created_by: String,
    #[serde(with = "crate::timestamp::lenient")]
    pub due_date: DateTime<Utc>,
    #[serde(with = "crate::timestamp::lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp::lenient")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn effective_status(&self, now: DateTime<Utc>) -> Status {
        effective_status(self.status, self.due_date, now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub assignee_id: String,
    pub created_by: String,
    #[serde(with = "crate::timestamp::lenient")]
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::lenient_option"
    )]
    pub due_date: Option<DateTime<Utc>>,
}

impl TrackedRecord for Task {
    const KIND: RecordKind = RecordKind::Tasks;
    type Draft = NewTask;
    type Update = TaskUpdate;

    fn id(&self) -> &str {
        &self.id
    }
}

// ==================== Metal tracking ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetalTracking {
    pub id: String,
    pub factory: String,
    pub diameter: String,
    pub thickness: String,
    pub melt: String,
    pub test_type: TestType,
    #[serde(default)]
    pub samples_count: u32,
    #[serde(with = "crate::timestamp::lenient")]
    pub test_end_date: DateTime<Utc>,
    #[serde(default)]
    pub status: Status,
    #[serde(with = "crate::timestamp::lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp::lenient")]
    pub updated_at: DateTime<Utc>,
}

impl MetalTracking {
    pub fn effective_status(&self, now: DateTime<Utc>) -> Status {
        effective_status(self.status, self.test_end_date, now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMetalTracking {
    pub factory: String,
    pub diameter: String,
    pub thickness: String,
    pub melt: String,
    pub test_type: TestType,
    pub samples_count: u32,
    #[serde(with = "crate::timestamp::lenient")]
    pub test_end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetalTrackingUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<TestType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_count: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::lenient_option"
    )]
    pub test_end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl TrackedRecord for MetalTracking {
    const KIND: RecordKind = RecordKind::MetalTracking;
    type Draft = NewMetalTracking;
    type Update = MetalTrackingUpdate;

    fn id(&self) -> &str {
        &self.id
    }
}

// ==================== Work closures ====================

/// A work closure
///
/// Uses the factory/diameter/thickness/melt layout. Fields from other
/// layouts (contract and stage numbers) are not modelled here but still
/// round-trip through the store untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkClosure {
    pub id: String,
    pub factory: String,
    #[serde(default)]
    pub diameter: String,
    #[serde(default)]
    pub thickness: String,
    #[serde(default)]
    pub melt: String,
    #[serde(with = "crate::timestamp::lenient")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "crate::timestamp::lenient")]
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub status: Status,
    #[serde(with = "crate::timestamp::lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp::lenient")]
    pub updated_at: DateTime<Utc>,
}

impl WorkClosure {
    pub fn effective_status(&self, now: DateTime<Utc>) -> Status {
        effective_status(self.status, self.end_date, now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkClosure {
    pub factory: String,
    pub diameter: String,
    pub thickness: String,
    pub melt: String,
    #[serde(with = "crate::timestamp::lenient")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "crate::timestamp::lenient")]
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkClosureUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melt: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::lenient_option"
    )]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::lenient_option"
    )]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl TrackedRecord for WorkClosure {
    const KIND: RecordKind = RecordKind::WorkClosures;
    type Draft = NewWorkClosure;
    type Update = WorkClosureUpdate;

    fn id(&self) -> &str {
        &self.id
    }
}

// ==================== Document tracking ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTracking {
    pub id: String,
    pub factory: String,
    pub diameter: String,
    pub thickness: String,
    pub melt: String,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(with = "crate::timestamp::lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp::lenient")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocumentTracking {
    pub factory: String,
    pub diameter: String,
    pub thickness: String,
    pub melt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTrackingUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
}

impl TrackedRecord for DocumentTracking {
    const KIND: RecordKind = RecordKind::DocumentTracking;
    type Draft = NewDocumentTracking;
    type Update = DocumentTrackingUpdate;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_task_from_wire() {
        let task: Task = serde_json::from_value(json!({
            "id": "t1",
            "title": "Calibrate press",
            "priority": "high",
            "status": "working",
            "assigneeId": "2",
            "createdBy": "5",
            "dueDate": "2025-02-01",
            "createdAt": "2025-01-01T10:00:00.000Z",
            "updatedAt": "2025-01-01T10:00:00.000Z",
            "unknownField": true
        }))
        .unwrap();

        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.description, None);
        assert_eq!(task.due_date, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_status_defaults_to_working() {
        let doc: DocumentTracking = serde_json::from_value(json!({
            "id": "d1",
            "factory": "North",
            "diameter": "530",
            "thickness": "10",
            "melt": "M-1",
            "createdAt": "2025-01-01T10:00:00Z",
            "updatedAt": "2025-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(doc.status, DocumentStatus::Working);
    }

    #[test]
    fn test_update_payload_skips_absent_fields() {
        let update = TaskUpdate {
            status: Some(Status::Completed),
            ..Default::default()
        };
        let payload = to_payload(&update).unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["status"], "completed");
    }

    #[test]
    fn test_metal_draft_wire_names() {
        let draft = NewMetalTracking {
            factory: "South".into(),
            diameter: "720".into(),
            thickness: "12".into(),
            melt: "M-7".into(),
            test_type: TestType::DpTension,
            samples_count: 4,
            test_end_date: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        };
        let payload = to_payload(&draft).unwrap();
        assert_eq!(payload["testType"], "DP_tension");
        assert_eq!(payload["samplesCount"], 4);
        assert_eq!(payload["testEndDate"], "2025-03-01T00:00:00.000Z");
    }

    #[test]
    fn test_effective_status_on_records() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let work: WorkClosure = serde_json::from_value(json!({
            "id": "w1",
            "factory": "East",
            "startDate": "2025-01-01",
            "endDate": "2025-02-01",
            "status": "working",
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(work.effective_status(now), Status::Overdue);
    }
}
