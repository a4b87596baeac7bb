//! Per-user task statistics and task list filters

use serde::{Deserialize, Serialize};

use crate::record::Task;
use crate::status::Status;

/// Task completion figures for one assignee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: String,
    pub completed_tasks: usize,
    pub overdue_tasks: usize,
    pub total_tasks: usize,
    /// Percentage of assigned tasks that are completed, 0 when none are assigned
    pub completion_rate: f64,
}

impl UserStats {
    pub fn for_user(user_id: &str, tasks: &[Task]) -> Self {
        let assigned: Vec<&Task> = tasks.iter().filter(|t| t.assignee_id == user_id).collect();
        let total_tasks = assigned.len();
        let completed_tasks = assigned
            .iter()
            .filter(|t| t.status == Status::Completed)
            .count();
        let overdue_tasks = assigned
            .iter()
            .filter(|t| t.status == Status::Overdue)
            .count();
        let completion_rate = if total_tasks > 0 {
            completed_tasks as f64 / total_tasks as f64 * 100.0
        } else {
            0.0
        };

        Self {
            user_id: user_id.to_string(),
            completed_tasks,
            overdue_tasks,
            total_tasks,
            completion_rate,
        }
    }
}

/// Task list filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFilter {
    All,
    /// Tasks assigned to the given user
    Mine(String),
    Overdue,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Mine(user_id) => &task.assignee_id == user_id,
            TaskFilter::Overdue => task.status == Status::Overdue,
        }
    }

    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        tasks.iter().filter(|t| self.matches(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Priority;
    use chrono::{TimeZone, Utc};

    fn task(id: &str, assignee: &str, status: Status) -> Task {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Task {
            id: id.into(),
            title: id.into(),
            description: None,
            priority: Priority::Medium,
            status,
            assignee_id: assignee.into(),
            created_by: "5".into(),
            due_date: ts,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_user_stats() {
        let tasks = vec![
            task("a", "1", Status::Completed),
            task("b", "1", Status::Overdue),
            task("c", "1", Status::Working),
            task("d", "1", Status::Completed),
            task("e", "2", Status::Completed),
        ];
        let stats = UserStats::for_user("1", &tasks);
        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.completed_tasks, 2);
        assert_eq!(stats.overdue_tasks, 1);
        assert!((stats.completion_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_user_stats_without_tasks() {
        let stats = UserStats::for_user("9", &[]);
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.completion_rate, 0.0);
    }

    #[test]
    fn test_task_filters() {
        let tasks = vec![
            task("a", "1", Status::Overdue),
            task("b", "2", Status::Working),
            task("c", "1", Status::Working),
        ];
        assert_eq!(TaskFilter::All.apply(&tasks).len(), 3);
        let mine: Vec<_> = TaskFilter::Mine("1".into())
            .apply(&tasks)
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(mine, vec!["a", "c"]);
        assert_eq!(TaskFilter::Overdue.apply(&tasks).len(), 1);
    }
}
