//! Tasks and their status workflow.
//!
//! A task moves `pending -> in-progress -> completed` and never backwards.
//! Generic edits go through [`TaskPatch`], which cannot express a status,
//! owner or creation-time change; status moves go through
//! [`TaskService::advance_status`] and are re-checked by the backend as a
//! [`TaskChange::Status`] compare-and-set.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::backend::Backend;
use crate::config::TasksConfig;
use crate::error::{Error, Result};
use crate::filter::QuerySpec;
use crate::guard::Viewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }

    /// Heading used by the per-status task list.
    pub fn list_title(self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending Tasks",
            TaskStatus::InProgress => "In Progress Tasks",
            TaskStatus::Completed => "Completed Tasks",
        }
    }

    /// The single forward step from this status, if any.
    pub fn next(self) -> Option<TaskStatus> {
        match self {
            TaskStatus::Pending => Some(TaskStatus::InProgress),
            TaskStatus::InProgress => Some(TaskStatus::Completed),
            TaskStatus::Completed => None,
        }
    }

    pub fn can_advance_to(self, target: TaskStatus) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" | "in_progress" | "inprogress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(Error::InvalidArgument(format!(
                "invalid status '{other}': expected pending, in-progress or completed"
            ))),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(Error::InvalidArgument(format!(
                "invalid priority '{other}': expected low, medium or high"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl Task {
    /// Apply a backend-side change, enforcing the transition rule.
    pub fn apply_change(&mut self, change: &TaskChange) -> Result<()> {
        match change {
            TaskChange::Fields(patch) => {
                patch.apply_to(self);
                Ok(())
            }
            TaskChange::Status { from, to } => {
                if self.status != *from || !from.can_advance_to(*to) {
                    return Err(Error::InvalidTransition {
                        from: self.status,
                        to: *to,
                    });
                }
                self.status = *to;
                Ok(())
            }
        }
    }
}

/// Compute the advanced copy of `task`, or reject the move.
pub fn advance(task: &Task, target: TaskStatus) -> Result<Task> {
    if !task.status.can_advance_to(target) {
        return Err(Error::InvalidTransition {
            from: task.status,
            to: target,
        });
    }
    let mut next = task.clone();
    next.status = target;
    Ok(next)
}

/// Fields a caller supplies when creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    /// Owner override; only honoured for administrators.
    pub owner: Option<Uuid>,
}

/// Row handed to the backend on insert. Status is always `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInsert {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

impl TaskInsert {
    pub fn into_task(self, id: Uuid, created_at: DateTime<Utc>) -> Task {
        Task {
            id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            due_date: self.due_date,
            created_at,
            remarks: self.remarks,
        }
    }
}

/// Editable fields. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.remarks.is_none()
    }

    fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(remarks) = &self.remarks {
            task.remarks = remarks.clone();
        }
    }

    /// Trim text fields and reject empty titles or oversized remarks.
    fn normalized(mut self, remarks_max_len: usize) -> Result<Self> {
        if let Some(title) = self.title.take() {
            self.title = Some(normalize_title(&title)?);
        }
        if let Some(description) = self.description.take() {
            self.description = Some(non_empty(description));
        }
        if let Some(remarks) = self.remarks.take() {
            let remarks = non_empty(remarks);
            check_remarks(remarks.as_deref(), remarks_max_len)?;
            self.remarks = Some(remarks);
        }
        Ok(self)
    }
}

/// A write against an existing task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskChange {
    Fields(TaskPatch),
    Status { from: TaskStatus, to: TaskStatus },
}

/// Task joined with its owner's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedTask {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total_tasks: u64,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
}

impl TaskCounts {
    pub fn tally<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut counts = TaskCounts::default();
        for task in tasks {
            counts.total_tasks += 1;
            match task.status {
                TaskStatus::Pending => counts.pending_tasks += 1,
                TaskStatus::InProgress => counts.in_progress_tasks += 1,
                TaskStatus::Completed => counts.completed_tasks += 1,
            }
        }
        counts
    }
}

fn normalize_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("title cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn check_remarks(remarks: Option<&str>, max_len: usize) -> Result<()> {
    if let Some(remarks) = remarks {
        if remarks.chars().count() > max_len {
            return Err(Error::InvalidArgument(format!(
                "remarks must not exceed {max_len} characters"
            )));
        }
    }
    Ok(())
}

/// Task operations on top of a backend.
#[derive(Clone)]
pub struct TaskService {
    backend: Arc<dyn Backend>,
    config: TasksConfig,
}

impl TaskService {
    pub fn new(backend: Arc<dyn Backend>, config: TasksConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &TasksConfig {
        &self.config
    }

    pub async fn create_task(&self, viewer: &Viewer, fields: NewTask) -> Result<Task> {
        let title = normalize_title(&fields.title)?;
        let remarks = non_empty(fields.remarks);
        check_remarks(remarks.as_deref(), self.config.remarks_max_len)?;

        let user_id = match fields.owner {
            Some(owner) if owner != viewer.user_id() => {
                if !viewer.is_admin() {
                    return Err(Error::InvalidArgument(
                        "only administrators can create tasks for other users".to_string(),
                    ));
                }
                owner
            }
            _ => viewer.user_id(),
        };

        let insert = TaskInsert {
            user_id,
            title,
            description: non_empty(fields.description),
            status: TaskStatus::Pending,
            priority: fields.priority.unwrap_or(self.config.default_priority),
            due_date: fields.due_date,
            remarks,
        };
        let task = self.backend.insert_task(insert).await?;
        debug!(task = %task.id, owner = %task.user_id, "task created");
        Ok(task)
    }

    /// Move `task` one step forward. Illegal moves never reach the backend.
    pub async fn advance_status(&self, task: &Task, target: TaskStatus) -> Result<Task> {
        let next = advance(task, target)?;
        let stored = self
            .backend
            .update_task(
                task.id,
                TaskChange::Status {
                    from: task.status,
                    to: next.status,
                },
            )
            .await?;
        debug!(task = %stored.id, from = %task.status, to = %stored.status, "task advanced");
        Ok(stored)
    }

    pub async fn update_fields(&self, task: &Task, patch: TaskPatch) -> Result<Task> {
        let patch = patch.normalized(self.config.remarks_max_len)?;
        if patch.is_empty() {
            return Err(Error::InvalidArgument("nothing to update".to_string()));
        }
        let stored = self
            .backend
            .update_task(task.id, TaskChange::Fields(patch))
            .await?;
        debug!(task = %stored.id, "task fields updated");
        Ok(stored)
    }

    /// Start a delete. Nothing is removed until the returned request is confirmed.
    pub fn request_delete(&self, task_id: Uuid) -> PendingDelete<'_> {
        PendingDelete {
            service: self,
            task_id,
        }
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Task> {
        self.backend
            .select_task(task_id)
            .await?
            .ok_or_else(|| Error::not_found("task", task_id))
    }

    pub async fn list_tasks(&self, query: &QuerySpec) -> Result<Vec<Task>> {
        self.backend.select_tasks(query).await
    }

    /// The task with its owner's first name and department.
    pub async fn task_details(&self, task_id: Uuid) -> Result<AssignedTask> {
        let query = QuerySpec::by_id(task_id);
        self.backend
            .tasks_with_profiles(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("task", task_id))
    }
}

/// An irreversible delete awaiting explicit confirmation.
#[must_use = "a pending delete does nothing until confirmed"]
pub struct PendingDelete<'a> {
    service: &'a TaskService,
    task_id: Uuid,
}

impl PendingDelete<'_> {
    /// Prompt text shown before the delete is confirmed.
    pub fn prompt(&self) -> String {
        format!(
            "This will permanently delete task {} and cannot be undone.",
            self.task_id
        )
    }

    pub async fn confirm(self) -> Result<Uuid> {
        self.service.backend.delete_task(self.task_id).await?;
        debug!(task = %self.task_id, "task deleted");
        Ok(self.task_id)
    }

    pub fn cancel(self) -> Uuid {
        self.task_id
    }
}
