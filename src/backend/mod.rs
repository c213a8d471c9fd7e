//! Backend contract.
//!
//! Authentication, persistence and row-level policy live behind [`Backend`].
//! Two stand-ins ship in-tree: [`MemoryBackend`] for tests and embedding,
//! and [`LocalBackend`], a file store used by the CLI.

mod dataset;
mod local;
mod memory;

pub use dataset::{hash_password, verify_password, Caller, Dataset, UserRecord};
pub use local::LocalBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::announcement::{Announcement, AnnouncementDraft};
use crate::error::Result;
use crate::filter::QuerySpec;
use crate::profile::Profile;
use crate::session::{AuthHandler, Session, Subscription};
use crate::task::{AssignedTask, Task, TaskChange, TaskCounts, TaskInsert};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub department: Option<String>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    // Auth
    async fn sign_up(&self, request: SignUpRequest) -> Result<Session>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;
    async fn get_session(&self) -> Result<Option<Session>>;
    async fn refresh_session(&self) -> Result<Session>;
    fn on_auth_state_change(&self, handler: AuthHandler) -> Subscription;
    async fn sign_out(&self) -> Result<()>;
    async fn update_password(&self, new_password: &str) -> Result<()>;

    // Rows
    async fn select_tasks(&self, query: &QuerySpec) -> Result<Vec<Task>>;
    async fn select_task(&self, task_id: Uuid) -> Result<Option<Task>>;
    async fn insert_task(&self, task: TaskInsert) -> Result<Task>;
    async fn update_task(&self, task_id: Uuid, change: TaskChange) -> Result<Task>;
    async fn delete_task(&self, task_id: Uuid) -> Result<()>;
    async fn select_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;
    async fn select_profiles(&self) -> Result<Vec<Profile>>;
    async fn select_announcement(&self) -> Result<Option<Announcement>>;
    async fn upsert_announcement(&self, draft: AnnouncementDraft) -> Result<Announcement>;

    // Aggregates
    async fn all_task_counts(&self) -> Result<TaskCounts>;
    async fn my_tasks_for_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>>;
    async fn tasks_with_profiles(&self, query: &QuerySpec) -> Result<Vec<AssignedTask>>;
}
