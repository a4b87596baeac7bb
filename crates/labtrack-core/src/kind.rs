//! Record kinds and their per-collection configuration
//!
//! Every collection is described by one [`KindSpec`]: its storage key, the
//! date field that drives its status (if any), and the status rule. Generic
//! code iterates [`RecordKind::ALL`] instead of special-casing each collection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One of the four record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    Tasks,
    MetalTracking,
    WorkClosures,
    DocumentTracking,
}

/// How the `status` field of a collection is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRule {
    /// Status follows the overdue rule on the named date field
    DateDriven { field: &'static str },
    /// Status is set by explicit user transitions, starting at `initial`
    Manual { initial: &'static str },
}

/// Static configuration for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSpec {
    pub kind: RecordKind,
    /// Key used in the query string and the persisted document
    pub key: &'static str,
    pub status_rule: StatusRule,
    /// Prefix for calendar event ids; `None` keeps the collection off the calendar
    pub calendar_prefix: Option<&'static str>,
}

const SPECS: [KindSpec; 4] = [
    KindSpec {
        kind: RecordKind::Tasks,
        key: "tasks",
        status_rule: StatusRule::DateDriven { field: "dueDate" },
        calendar_prefix: Some("task"),
    },
    KindSpec {
        kind: RecordKind::MetalTracking,
        key: "metalTracking",
        status_rule: StatusRule::DateDriven {
            field: "testEndDate",
        },
        calendar_prefix: Some("metal"),
    },
    KindSpec {
        kind: RecordKind::WorkClosures,
        key: "workClosures",
        status_rule: StatusRule::DateDriven { field: "endDate" },
        calendar_prefix: Some("work"),
    },
    KindSpec {
        kind: RecordKind::DocumentTracking,
        key: "documentTracking",
        status_rule: StatusRule::Manual { initial: "working" },
        calendar_prefix: None,
    },
];

impl RecordKind {
    /// All kinds, in storage order
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Tasks,
        RecordKind::MetalTracking,
        RecordKind::WorkClosures,
        RecordKind::DocumentTracking,
    ];

    /// Configuration for this kind
    pub fn spec(&self) -> &'static KindSpec {
        &SPECS[self.index()]
    }

    /// Stable position of this kind in [`RecordKind::ALL`]
    pub fn index(&self) -> usize {
        match self {
            RecordKind::Tasks => 0,
            RecordKind::MetalTracking => 1,
            RecordKind::WorkClosures => 2,
            RecordKind::DocumentTracking => 3,
        }
    }

    pub fn key(&self) -> &'static str {
        self.spec().key
    }

    /// The date field that drives status, if the collection is date-driven
    pub fn date_field(&self) -> Option<&'static str> {
        match self.spec().status_rule {
            StatusRule::DateDriven { field } => Some(field),
            StatusRule::Manual { .. } => None,
        }
    }

    /// Whether records of this kind appear on the calendar
    pub fn on_calendar(&self) -> bool {
        self.spec().calendar_prefix.is_some()
    }

    /// Parse a query-string type selector
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        SPECS
            .iter()
            .find(|spec| spec.key == value)
            .map(|spec| spec.kind)
            .ok_or_else(|| StoreError::InvalidKind(value.to_string()))
    }
}

impl FromStr for RecordKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::parse(s)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
