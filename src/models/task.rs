use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "task_status")]
pub enum TaskStatus {
    #[default]
    Todo,
    #[serde(rename = "In Progress")]
    #[sqlx(rename = "In Progress")]
    InProgress,
    Done,
}

impl TaskStatus {
    /// Board order.
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "Todo",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub project_id: Uuid,
    pub assigned_user_id: Option<Uuid>,
    pub company_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Name of the owning project, joined on read.
    #[sqlx(default)]
    #[serde(default)]
    pub project_name: Option<String>,
}

/// Caller-supplied fields for a new task. When `assigned_user_id` is omitted
/// the task is assigned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub project_id: Uuid,
    #[serde(default)]
    pub assigned_user_id: Option<Uuid>,
}

impl TaskInput {
    pub fn new(title: impl Into<String>, project_id: Uuid) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            project_id,
            assigned_user_id: None,
        }
    }
}

/// Insert payload as sent to the backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub project_id: Uuid,
    pub assigned_user_id: Uuid,
    pub company_id: Uuid,
}

/// Partial update. An empty description clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names_match_board_labels() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"In Progress\""
        );
        let status: TaskStatus = serde_json::from_str("\"Done\"").unwrap();
        assert_eq!(status, TaskStatus::Done);
        assert!(serde_json::from_str::<TaskStatus>("\"InProgress\"").is_err());
    }

    #[test]
    fn task_input_defaults_to_todo() {
        let input: TaskInput = serde_json::from_value(serde_json::json!({
            "title": "Write docs",
            "project_id": Uuid::now_v7(),
        }))
        .unwrap();
        assert_eq!(input.status, TaskStatus::Todo);
        assert!(input.assigned_user_id.is_none());
    }

    #[test]
    fn changes_only_serialize_present_fields() {
        let changes = TaskChanges {
            status: Some(TaskStatus::Done),
            ..Default::default()
        };
        let value = serde_json::to_value(&changes).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "Done" }));
    }
}
