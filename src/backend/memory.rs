//! In-process backend for tests and embedding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use super::dataset::{Caller, Dataset};
use super::{Backend, SignUpRequest};
use crate::announcement::{Announcement, AnnouncementDraft};
use crate::error::{Error, Result};
use crate::filter::QuerySpec;
use crate::profile::{Profile, Role};
use crate::session::{AuthEvent, AuthHandler, AuthListeners, Session, Subscription};
use crate::task::{AssignedTask, Task, TaskChange, TaskCounts, TaskInsert};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MemoryBackend {
    data: Mutex<Dataset>,
    session: Mutex<Option<Session>>,
    listeners: AuthListeners,
    session_ttl: Duration,
    fail_sessions: AtomicBool,
    fail_profiles: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_session_ttl(Duration::hours(8))
    }

    pub fn with_session_ttl(session_ttl: Duration) -> Self {
        Self {
            data: Mutex::new(Dataset::default()),
            session: Mutex::new(None),
            listeners: AuthListeners::new(),
            session_ttl,
            fail_sessions: AtomicBool::new(false),
            fail_profiles: AtomicBool::new(false),
        }
    }

    /// Register an account directly, bypassing sign-up.
    pub fn create_user(&self, email: &str, password: &str, first_name: &str, role: Role) -> Result<Uuid> {
        let request = SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            first_name: Some(first_name.to_string()),
            department: None,
        };
        lock(&self.data).register(&request, role, Utc::now())
    }

    pub fn set_department(&self, user_id: Uuid, department: &str) -> Result<()> {
        let mut data = lock(&self.data);
        let profile = data
            .profiles
            .iter_mut()
            .find(|profile| profile.id == user_id)
            .ok_or_else(|| Error::not_found("profile", user_id))?;
        profile.department = Some(department.to_string());
        Ok(())
    }

    /// Drop a profile row, leaving the account in place.
    pub fn remove_profile(&self, user_id: Uuid) {
        lock(&self.data).profiles.retain(|profile| profile.id != user_id);
    }

    /// Start a session for `user_id` without a password check.
    pub fn sign_in_as(&self, user_id: Uuid) -> Result<Session> {
        let session = lock(&self.data).issue_session(user_id, self.session_ttl, Utc::now())?;
        self.replace_session(Some(session.clone()), AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    /// Insert a row as-is, including its `created_at`.
    pub fn seed_task(&self, task: Task) {
        lock(&self.data).tasks.push(task);
    }

    pub fn fail_session_lookups(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profile_lookups(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn replace_session(&self, session: Option<Session>, event: AuthEvent) {
        *lock(&self.session) = session;
        self.listeners.emit(&event);
    }

    fn live_session(&self) -> Option<Session> {
        let session = lock(&self.session).clone()?;
        lock(&self.data).find_session(&session.access_token, Utc::now())
    }

    fn caller(&self) -> Result<Caller> {
        let session = self.live_session();
        lock(&self.data).caller(session.as_ref())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_up(&self, request: SignUpRequest) -> Result<Session> {
        let session = {
            let mut data = lock(&self.data);
            let user_id = data.register(&request, Role::Regular, Utc::now())?;
            data.issue_session(user_id, self.session_ttl, Utc::now())?
        };
        self.replace_session(Some(session.clone()), AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = {
            let mut data = lock(&self.data);
            let user_id = data.authenticate(email, password)?.id;
            data.issue_session(user_id, self.session_ttl, Utc::now())?
        };
        self.replace_session(Some(session.clone()), AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(Error::RemoteFailure("session endpoint unavailable".to_string()));
        }
        Ok(self.live_session())
    }

    async fn refresh_session(&self) -> Result<Session> {
        let current = self.live_session().ok_or(Error::Unauthenticated)?;
        let session = {
            let mut data = lock(&self.data);
            data.revoke_session(&current.access_token);
            data.issue_session(current.user_id, self.session_ttl, Utc::now())?
        };
        self.replace_session(Some(session.clone()), AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    fn on_auth_state_change(&self, handler: AuthHandler) -> Subscription {
        self.listeners.subscribe(handler)
    }

    async fn sign_out(&self) -> Result<()> {
        let current = lock(&self.session).clone();
        if let Some(session) = current {
            lock(&self.data).revoke_session(&session.access_token);
        }
        self.replace_session(None, AuthEvent::SignedOut);
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        let session = self.live_session().ok_or(Error::Unauthenticated)?;
        lock(&self.data).set_password(session.user_id, new_password)
    }

    async fn select_tasks(&self, query: &QuerySpec) -> Result<Vec<Task>> {
        let caller = self.caller()?;
        debug!(predicates = query.predicates.len(), "memory: select tasks");
        Ok(lock(&self.data).select_tasks(caller, query))
    }

    async fn select_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let caller = self.caller()?;
        Ok(lock(&self.data).select_task(caller, task_id))
    }

    async fn insert_task(&self, task: TaskInsert) -> Result<Task> {
        let caller = self.caller()?;
        lock(&self.data).insert_task(caller, task, Utc::now())
    }

    async fn update_task(&self, task_id: Uuid, change: TaskChange) -> Result<Task> {
        let caller = self.caller()?;
        lock(&self.data).update_task(caller, task_id, &change)
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        let caller = self.caller()?;
        lock(&self.data).delete_task(caller, task_id)
    }

    async fn select_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        if self.fail_profiles.load(Ordering::SeqCst) {
            return Err(Error::RemoteFailure("profiles endpoint unavailable".to_string()));
        }
        self.caller()?;
        Ok(lock(&self.data).profile(user_id).cloned())
    }

    async fn select_profiles(&self) -> Result<Vec<Profile>> {
        self.caller()?;
        Ok(lock(&self.data).profiles_sorted())
    }

    async fn select_announcement(&self) -> Result<Option<Announcement>> {
        Ok(lock(&self.data).announcement.clone())
    }

    async fn upsert_announcement(&self, draft: AnnouncementDraft) -> Result<Announcement> {
        let caller = self.caller()?;
        lock(&self.data).upsert_announcement(caller, draft, Utc::now())
    }

    async fn all_task_counts(&self) -> Result<TaskCounts> {
        let caller = self.caller()?;
        Ok(lock(&self.data).task_counts(caller))
    }

    async fn my_tasks_for_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let caller = self.caller()?;
        Ok(lock(&self.data).tasks_for_report(caller, start, end))
    }

    async fn tasks_with_profiles(&self, query: &QuerySpec) -> Result<Vec<AssignedTask>> {
        let caller = self.caller()?;
        Ok(lock(&self.data).tasks_with_profiles(caller, query))
    }
}
