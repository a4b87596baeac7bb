//! Record status and its derivation
//!
//! Date-driven collections follow the overdue rule:
//! ```text
//! due < now  → overdue
//! due >= now → working
//! ```
//! `completed` is never produced by the rule. It is set by an explicit update
//! and survives later writes unless those writes change the date field.
//!
//! Documents move through explicit transitions:
//! ```text
//! Working → Signing → Completed
//!    └─────────────────↑
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::kind::{RecordKind, StatusRule};
use crate::timestamp;

/// Status of a task, metal test or work closure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Working,
    Completed,
    Overdue,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Working => "working",
            Status::Completed => "completed",
            Status::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a tracked document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Working,
    Signing,
    Completed,
}

impl DocumentStatus {
    /// Check if a status transition is valid
    ///
    /// Re-asserting the current status is accepted.
    pub fn can_transition_to(&self, target: &DocumentStatus) -> bool {
        match (self, target) {
            (a, b) if a == b => true,
            (DocumentStatus::Working, DocumentStatus::Signing) => true,
            (DocumentStatus::Working, DocumentStatus::Completed) => true,
            (DocumentStatus::Signing, DocumentStatus::Completed) => true,
            // Completed is terminal
            _ => false,
        }
    }

    /// Get valid next states from the current state
    pub fn valid_transitions(&self) -> Vec<DocumentStatus> {
        match self {
            DocumentStatus::Working => vec![DocumentStatus::Signing, DocumentStatus::Completed],
            DocumentStatus::Signing => vec![DocumentStatus::Completed],
            DocumentStatus::Completed => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Working => "working",
            DocumentStatus::Signing => "signing",
            DocumentStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply the overdue rule to a due date
pub fn derive_status(due: DateTime<Utc>, now: DateTime<Utc>) -> Status {
    if due < now {
        Status::Overdue
    } else {
        Status::Working
    }
}

/// Interpret a stored status at `now`
///
/// A stored `completed` wins; anything else is re-derived from the date so a
/// record written as `working` reads as `overdue` once its date has passed.
pub fn effective_status(stored: Status, due: DateTime<Utc>, now: DateTime<Utc>) -> Status {
    match stored {
        Status::Completed => Status::Completed,
        _ => derive_status(due, now),
    }
}

fn date_in(
    payload: &Map<String, Value>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => timestamp::parse(s)
            .map(Some)
            .ok_or_else(|| StoreError::InvalidPayload(format!("{field} is not a date: {s}"))),
        Some(other) => Err(StoreError::InvalidPayload(format!(
            "{field} must be a date string, got {other}"
        ))),
    }
}

/// Set `status` on a payload about to be created
///
/// Date-driven kinds require their date field. Manual kinds start at their
/// initial status.
pub fn prepare_create(
    kind: RecordKind,
    payload: &mut Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    match kind.spec().status_rule {
        StatusRule::DateDriven { field } => {
            let due = date_in(payload, field)?
                .ok_or_else(|| StoreError::InvalidPayload(format!("{field} is required")))?;
            payload.insert(
                "status".to_string(),
                Value::String(derive_status(due, now).as_str().to_string()),
            );
        }
        StatusRule::Manual { initial } => {
            payload.insert("status".to_string(), Value::String(initial.to_string()));
        }
    }
    Ok(())
}

/// Recompute `status` on a partial update, only if the date field is present
///
/// A date in the payload always wins over a `status` sent alongside it.
pub fn prepare_update(
    kind: RecordKind,
    payload: &mut Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let Some(field) = kind.date_field() else {
        return Ok(());
    };
    if let Some(due) = date_in(payload, field)? {
        payload.insert(
            "status".to_string(),
            Value::String(derive_status(due, now).as_str().to_string()),
        );
    }
    Ok(())
}
