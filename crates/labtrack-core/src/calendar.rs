//! Calendar projection
//!
//! The calendar is rebuilt in full from the current task, metal test and work
//! closure collections. Documents never appear on it.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::RecordKind;
use crate::record::{MetalTracking, Task, WorkClosure};
use crate::status::Status;

/// Source of a calendar event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Task,
    MetalTest,
    WorkClosure,
}

impl EventType {
    pub fn kind(&self) -> RecordKind {
        match self {
            EventType::Task => RecordKind::Tasks,
            EventType::MetalTest => RecordKind::MetalTracking,
            EventType::WorkClosure => RecordKind::WorkClosures,
        }
    }
}

/// A date-anchored entry derived from one source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    /// `<prefix>-<source id>`
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

fn event_id(kind: RecordKind, source_id: &str) -> String {
    let prefix = kind.spec().calendar_prefix.unwrap_or(kind.key());
    format!("{prefix}-{source_id}")
}

impl From<&Task> for CalendarEvent {
    fn from(task: &Task) -> Self {
        Self {
            id: event_id(RecordKind::Tasks, &task.id),
            source_id: task.id.clone(),
            title: task.title.clone(),
            date: task.due_date,
            event_type: EventType::Task,
            status: task.status,
            user_id: Some(task.assignee_id.clone()),
        }
    }
}

impl From<&MetalTracking> for CalendarEvent {
    fn from(metal: &MetalTracking) -> Self {
        Self {
            id: event_id(RecordKind::MetalTracking, &metal.id),
            source_id: metal.id.clone(),
            title: format!("Metal test: {}", metal.factory),
            date: metal.test_end_date,
            event_type: EventType::MetalTest,
            status: metal.status,
            user_id: None,
        }
    }
}

impl From<&WorkClosure> for CalendarEvent {
    fn from(work: &WorkClosure) -> Self {
        Self {
            id: event_id(RecordKind::WorkClosures, &work.id),
            source_id: work.id.clone(),
            title: format!("Work closure: {}", work.factory),
            date: work.end_date,
            event_type: EventType::WorkClosure,
            status: work.status,
            user_id: None,
        }
    }
}

/// Rebuild the full event list from the three calendar collections
pub fn build(
    tasks: &[Task],
    metal_tracking: &[MetalTracking],
    work_closures: &[WorkClosure],
) -> Vec<CalendarEvent> {
    let mut events =
        Vec::with_capacity(tasks.len() + metal_tracking.len() + work_closures.len());
    events.extend(tasks.iter().map(CalendarEvent::from));
    events.extend(metal_tracking.iter().map(CalendarEvent::from));
    events.extend(work_closures.iter().map(CalendarEvent::from));
    events
}

/// Per-status event counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub working: usize,
    pub completed: usize,
    pub overdue: usize,
}

/// Read-only queries over a built event list
#[derive(Debug, Clone, Copy)]
pub struct CalendarProjection<'a> {
    events: &'a [CalendarEvent],
}

impl<'a> CalendarProjection<'a> {
    pub fn new(events: &'a [CalendarEvent]) -> Self {
        Self { events }
    }

    pub fn all(&self) -> impl Iterator<Item = &'a CalendarEvent> {
        self.events.iter()
    }

    /// Events falling on a calendar day (UTC)
    pub fn on_day(&self, day: NaiveDate) -> impl Iterator<Item = &'a CalendarEvent> {
        self.events
            .iter()
            .filter(move |e| e.date.date_naive() == day)
    }

    /// Events in a calendar month (UTC)
    pub fn in_month(&self, year: i32, month: u32) -> impl Iterator<Item = &'a CalendarEvent> {
        self.events
            .iter()
            .filter(move |e| e.date.year() == year && e.date.month() == month)
    }

    /// Events tied to a user (tasks assigned to them)
    pub fn for_user<'u>(&self, user_id: &'u str) -> impl Iterator<Item = &'a CalendarEvent> + 'u
    where
        'a: 'u,
    {
        self.events
            .iter()
            .filter(move |e| e.user_id.as_deref() == Some(user_id))
    }
}

/// Count events by status
pub fn status_counts<'a>(events: impl IntoIterator<Item = &'a CalendarEvent>) -> StatusCounts {
    events
        .into_iter()
        .fold(StatusCounts::default(), |mut counts, event| {
            match event.status {
                Status::Working => counts.working += 1,
                Status::Completed => counts.completed += 1,
                Status::Overdue => counts.overdue += 1,
            }
            counts
        })
}
