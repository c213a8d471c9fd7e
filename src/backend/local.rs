//! File-backed backend used by the CLI.
//!
//! Layout under the home directory:
//! - `store.json`: accounts, profiles, tasks, announcement, issued sessions
//! - `session.json`: the session this client is signed in with
//!
//! Every access holds an exclusive lock on `store.json.lock`; writes go
//! through an atomic rename.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use super::dataset::{Caller, Dataset};
use super::{Backend, SignUpRequest};
use crate::announcement::{Announcement, AnnouncementDraft};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::QuerySpec;
use crate::lock::{lock_path_for, write_atomic, FileLock};
use crate::profile::{Profile, Role};
use crate::session::{AuthEvent, AuthHandler, AuthListeners, Session, Subscription};
use crate::task::{AssignedTask, Task, TaskChange, TaskCounts, TaskInsert};

const STORE_FILE: &str = "store.json";
const SESSION_FILE: &str = "session.json";

pub struct LocalBackend {
    root: PathBuf,
    session_ttl: Duration,
    lock_timeout_ms: u64,
    listeners: AuthListeners,
}

/// Storage-level failures look like an unreachable backend to callers.
fn storage_failure(err: Error) -> Error {
    match err {
        Error::Io(_) | Error::Json(_) | Error::LockFailed(_) => {
            Error::RemoteFailure(format!("local store: {err}"))
        }
        other => other,
    }
}

impl LocalBackend {
    pub fn open(root: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            session_ttl: config.session.ttl()?,
            lock_timeout_ms: config.storage.lock_timeout_ms,
            listeners: AuthListeners::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_FILE)
    }

    /// Create an account with an explicit role.
    pub fn provision_user(&self, request: SignUpRequest, role: Role) -> Result<Profile> {
        self.update(|data| {
            let user_id = data.register(&request, role, Utc::now())?;
            data.profile(user_id)
                .cloned()
                .ok_or_else(|| Error::not_found("profile", user_id))
        })
    }

    pub fn set_role(&self, email: &str, role: Role) -> Result<Profile> {
        self.update(|data| {
            let user_id = data
                .user_by_email(email)
                .map(|user| user.id)
                .ok_or_else(|| Error::not_found("user", email))?;
            data.set_role(user_id, role)
        })
    }

    pub fn user_id_for_email(&self, email: &str) -> Result<Option<Uuid>> {
        self.read(|data| data.user_by_email(email).map(|user| user.id))
    }

    fn load_store(path: &Path) -> Result<Dataset> {
        if !path.exists() {
            return Ok(Dataset::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Dataset::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn read<T>(&self, f: impl FnOnce(&Dataset) -> T) -> Result<T> {
        let path = self.store_path();
        let _lock = FileLock::acquire(lock_path_for(&path), self.lock_timeout_ms)
            .map_err(storage_failure)?;
        let data = Self::load_store(&path).map_err(storage_failure)?;
        Ok(f(&data))
    }

    fn update<T>(&self, f: impl FnOnce(&mut Dataset) -> Result<T>) -> Result<T> {
        let path = self.store_path();
        let _lock = FileLock::acquire(lock_path_for(&path), self.lock_timeout_ms)
            .map_err(storage_failure)?;
        let mut data = Self::load_store(&path).map_err(storage_failure)?;
        let value = f(&mut data)?;
        let encoded = serde_json::to_vec_pretty(&data).map_err(|err| storage_failure(err.into()))?;
        write_atomic(&path, &encoded).map_err(storage_failure)?;
        debug!(path = %path.display(), "local store written");
        Ok(value)
    }

    fn stored_session(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|err| storage_failure(err.into()))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| storage_failure(err.into()))
    }

    fn store_session(&self, session: Option<&Session>, event: AuthEvent) -> Result<()> {
        let path = self.session_path();
        match session {
            Some(session) => {
                let encoded =
                    serde_json::to_vec_pretty(session).map_err(|err| storage_failure(err.into()))?;
                write_atomic(&path, &encoded).map_err(storage_failure)?;
            }
            None => {
                if path.exists() {
                    fs::remove_file(&path).map_err(|err| storage_failure(err.into()))?;
                }
            }
        }
        self.listeners.emit(&event);
        Ok(())
    }

    /// The client session, if the store still honours its token.
    fn live_session(&self) -> Result<Option<Session>> {
        let session = self.stored_session()?;
        self.read(|data| live_in(data, session.as_ref()))
    }

    /// Run `f` as the signed-in caller, checking the token under the same
    /// store lock as the access itself.
    fn read_as<T>(&self, f: impl FnOnce(&Dataset, Caller) -> T) -> Result<T> {
        let session = self.stored_session()?;
        self.read(|data| {
            let caller = data.caller(live_in(data, session.as_ref()).as_ref())?;
            Ok(f(data, caller))
        })?
    }

    fn update_as<T>(&self, f: impl FnOnce(&mut Dataset, Caller) -> Result<T>) -> Result<T> {
        let session = self.stored_session()?;
        self.update(|data| {
            let caller = data.caller(live_in(data, session.as_ref()).as_ref())?;
            f(data, caller)
        })
    }
}

fn live_in(data: &Dataset, session: Option<&Session>) -> Option<Session> {
    session.and_then(|session| data.find_session(&session.access_token, Utc::now()))
}

#[async_trait]
impl Backend for LocalBackend {
    async fn sign_up(&self, request: SignUpRequest) -> Result<Session> {
        let ttl = self.session_ttl;
        let session = self.update(|data| {
            let user_id = data.register(&request, Role::Regular, Utc::now())?;
            data.issue_session(user_id, ttl, Utc::now())
        })?;
        self.store_session(Some(&session), AuthEvent::SignedIn(session.clone()))?;
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let ttl = self.session_ttl;
        let session = self.update(|data| {
            let user_id = data.authenticate(email, password)?.id;
            data.issue_session(user_id, ttl, Utc::now())
        })?;
        self.store_session(Some(&session), AuthEvent::SignedIn(session.clone()))?;
        Ok(session)
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        self.live_session()
    }

    async fn refresh_session(&self) -> Result<Session> {
        let stored = self.stored_session()?;
        let ttl = self.session_ttl;
        let session = self.update(|data| {
            let current = live_in(data, stored.as_ref()).ok_or(Error::Unauthenticated)?;
            data.revoke_session(&current.access_token);
            data.issue_session(current.user_id, ttl, Utc::now())
        })?;
        self.store_session(Some(&session), AuthEvent::TokenRefreshed(session.clone()))?;
        Ok(session)
    }

    fn on_auth_state_change(&self, handler: AuthHandler) -> Subscription {
        self.listeners.subscribe(handler)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.stored_session()? {
            self.update(|data| {
                data.revoke_session(&session.access_token);
                Ok(())
            })?;
        }
        self.store_session(None, AuthEvent::SignedOut)
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        self.update_as(|data, caller| data.set_password(caller.user_id, new_password))
    }

    async fn select_tasks(&self, query: &QuerySpec) -> Result<Vec<Task>> {
        self.read_as(|data, caller| data.select_tasks(caller, query))
    }

    async fn select_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        self.read_as(|data, caller| data.select_task(caller, task_id))
    }

    async fn insert_task(&self, task: TaskInsert) -> Result<Task> {
        self.update_as(|data, caller| data.insert_task(caller, task, Utc::now()))
    }

    async fn update_task(&self, task_id: Uuid, change: TaskChange) -> Result<Task> {
        self.update_as(|data, caller| data.update_task(caller, task_id, &change))
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        self.update_as(|data, caller| data.delete_task(caller, task_id))
    }

    async fn select_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.read_as(|data, _| data.profile(user_id).cloned())
    }

    async fn select_profiles(&self) -> Result<Vec<Profile>> {
        self.read_as(|data, _| data.profiles_sorted())
    }

    async fn select_announcement(&self) -> Result<Option<Announcement>> {
        self.read(|data| data.announcement.clone())
    }

    async fn upsert_announcement(&self, draft: AnnouncementDraft) -> Result<Announcement> {
        self.update_as(|data, caller| data.upsert_announcement(caller, draft, Utc::now()))
    }

    async fn all_task_counts(&self) -> Result<TaskCounts> {
        self.read_as(|data, caller| data.task_counts(caller))
    }

    async fn my_tasks_for_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        self.read_as(|data, caller| data.tasks_for_report(caller, start, end))
    }

    async fn tasks_with_profiles(&self, query: &QuerySpec) -> Result<Vec<AssignedTask>> {
        self.read_as(|data, caller| data.tasks_with_profiles(caller, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskStatus};

    fn request(email: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: "secret1".to_string(),
            first_name: Some("Ada".to_string()),
            department: Some("Ops".to_string()),
        }
    }

    #[tokio::test]
    async fn session_survives_reopen_and_sign_out_clears_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::default();
        let backend = LocalBackend::open(dir.path(), &config).expect("open");
        let session = backend.sign_up(request("ada@example.com")).await.expect("sign up");

        let reopened = LocalBackend::open(dir.path(), &config).expect("reopen");
        assert_eq!(
            reopened.get_session().await.expect("session"),
            Some(session.clone())
        );

        reopened.sign_out().await.expect("sign out");
        assert!(!reopened.session_path().exists());
        assert_eq!(backend.get_session().await.expect("session"), None);
    }

    #[tokio::test]
    async fn tasks_persist_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::default();
        let backend = LocalBackend::open(dir.path(), &config).expect("open");
        let session = backend.sign_up(request("ada@example.com")).await.expect("sign up");
        let task = backend
            .insert_task(TaskInsert {
                user_id: session.user_id,
                title: "Persist me".to_string(),
                description: None,
                status: TaskStatus::Pending,
                priority: Priority::High,
                due_date: None,
                remarks: None,
            })
            .await
            .expect("insert");

        let reopened = LocalBackend::open(dir.path(), &config).expect("reopen");
        let loaded = reopened.select_task(task.id).await.expect("select");
        assert_eq!(loaded, Some(task));
    }

    #[tokio::test]
    async fn data_calls_without_session_are_unauthenticated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::open(dir.path(), &Config::default()).expect("open");
        let err = backend
            .select_tasks(&QuerySpec::default())
            .await
            .expect_err("no session");
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn corrupt_store_is_a_remote_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::open(dir.path(), &Config::default()).expect("open");
        fs::write(backend.store_path(), "{not json").expect("write");
        let err = backend
            .sign_in("ada@example.com", "secret1")
            .await
            .expect_err("corrupt store");
        assert!(matches!(err, Error::RemoteFailure(_)));
    }

    #[tokio::test]
    async fn revoked_token_is_rejected_on_next_access() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::open(dir.path(), &Config::default()).expect("open");
        let session = backend.sign_up(request("ada@example.com")).await.expect("sign up");

        // Another client on the same store revokes the token.
        let other = LocalBackend::open(dir.path(), &Config::default()).expect("reopen");
        other
            .update(|data| {
                data.revoke_session(&session.access_token);
                Ok(())
            })
            .expect("revoke");

        let err = backend.all_task_counts().await.expect_err("revoked");
        assert!(matches!(err, Error::Unauthenticated));
        let err = backend.update_password("secret2").await.expect_err("revoked");
        assert!(matches!(err, Error::Unauthenticated));
        let err = backend.refresh_session().await.expect_err("revoked");
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn role_changes_apply_to_the_next_access() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::default();
        let backend = LocalBackend::open(dir.path(), &config).expect("open");
        backend.sign_up(request("ada@example.com")).await.expect("sign up");
        let bob = backend
            .provision_user(request("bob@example.com"), Role::Regular)
            .expect("provision");
        let insert = || TaskInsert {
            user_id: bob.id,
            title: "For Bob".to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: Priority::Low,
            due_date: None,
            remarks: None,
        };

        let err = backend.insert_task(insert()).await.expect_err("regular");
        assert!(matches!(err, Error::RemoteFailure(_)));

        LocalBackend::open(dir.path(), &config)
            .expect("reopen")
            .set_role("ada@example.com", Role::Admin)
            .expect("promote");
        let task = backend.insert_task(insert()).await.expect("admin insert");
        assert_eq!(task.user_id, bob.id);
    }
}
