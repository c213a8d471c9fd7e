//! Row store and policy shared by the in-tree backends.
//!
//! Regular callers see and modify only their own task rows; admins see all.
//! Policy violations surface as `RemoteFailure`, the way a hosted backend
//! reports them.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

use super::{SignUpRequest, MIN_PASSWORD_LEN};
use crate::announcement::{Announcement, AnnouncementDraft};
use crate::error::{Error, Result};
use crate::filter::{Predicate, QuerySpec};
use crate::profile::{Profile, Role};
use crate::session::Session;
use crate::task::{AssignedTask, Task, TaskChange, TaskCounts, TaskInsert, TaskStatus};

/// Hash a password with Argon2id. Returns a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::RemoteFailure(format!("failed to hash password: {err}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| Error::RemoteFailure(format!("invalid password hash: {err}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::InvalidArgument(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn policy_violation(table: &str) -> Error {
    Error::RemoteFailure(format!(
        "new row violates row-level security policy for table \"{table}\""
    ))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The identity and role a request runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn can_see(&self, task: &Task) -> bool {
        self.is_admin() || task.user_id == self.user_id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub announcement: Option<Announcement>,
    /// Sessions issued and not yet revoked.
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl Dataset {
    // Accounts and sessions

    pub fn register(&mut self, request: &SignUpRequest, role: Role, now: DateTime<Utc>) -> Result<Uuid> {
        let email = normalize_email(&request.email)?;
        check_password(&request.password)?;
        if self.users.iter().any(|user| user.email == email) {
            return Err(Error::InvalidArgument(format!(
                "user already registered: {email}"
            )));
        }
        let id = Uuid::new_v4();
        self.users.push(UserRecord {
            id,
            email,
            password_hash: hash_password(&request.password)?,
            created_at: now,
        });
        self.profiles.push(Profile {
            id,
            first_name: request.first_name.clone(),
            role,
            department: request.department.clone(),
        });
        Ok(id)
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Result<&UserRecord> {
        let email = normalize_email(email)?;
        let invalid = || Error::InvalidArgument("invalid login credentials".to_string());
        let user = self
            .users
            .iter()
            .find(|user| user.email == email)
            .ok_or_else(invalid)?;
        if !verify_password(password, &user.password_hash)? {
            return Err(invalid());
        }
        Ok(user)
    }

    pub fn issue_session(
        &mut self,
        user_id: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            Error::RemoteFailure(format!("session lifetime out of range: {ttl}"))
        })?;
        self.sessions.retain(|session| !session.is_expired(now));
        let email = self
            .users
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.email.clone());
        let session = Session {
            access_token: format!("tdk_{}", Ulid::new()),
            user_id,
            email,
            expires_at,
        };
        self.sessions.push(session.clone());
        Ok(session)
    }

    /// The live session for `token`, if it was issued and has not expired.
    pub fn find_session(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        self.sessions
            .iter()
            .find(|session| session.access_token == token && !session.is_expired(now))
            .cloned()
    }

    pub fn revoke_session(&mut self, token: &str) {
        self.sessions.retain(|session| session.access_token != token);
    }

    pub fn set_password(&mut self, user_id: Uuid, password: &str) -> Result<()> {
        check_password(password)?;
        let hash = hash_password(password)?;
        let user = self
            .users
            .iter_mut()
            .find(|user| user.id == user_id)
            .ok_or_else(|| Error::not_found("user", user_id))?;
        user.password_hash = hash;
        Ok(())
    }

    pub fn set_role(&mut self, user_id: Uuid, role: Role) -> Result<Profile> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|profile| profile.id == user_id)
            .ok_or_else(|| Error::not_found("profile", user_id))?;
        profile.role = role;
        Ok(profile.clone())
    }

    pub fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        let email = email.trim().to_ascii_lowercase();
        self.users.iter().find(|user| user.email == email)
    }

    /// Resolve the caller behind a session. Missing profiles act as Regular.
    pub fn caller(&self, session: Option<&Session>) -> Result<Caller> {
        let session = session.ok_or(Error::Unauthenticated)?;
        let role = self
            .profile(session.user_id)
            .map(|profile| profile.role)
            .unwrap_or(Role::Regular);
        Ok(Caller {
            user_id: session.user_id,
            role,
        })
    }

    // Profiles and announcement

    pub fn profile(&self, user_id: Uuid) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.id == user_id)
    }

    pub fn profiles_sorted(&self) -> Vec<Profile> {
        let mut profiles = self.profiles.clone();
        profiles.sort_by(|a, b| {
            a.first_name
                .as_deref()
                .unwrap_or("")
                .cmp(b.first_name.as_deref().unwrap_or(""))
                .then(a.id.cmp(&b.id))
        });
        profiles
    }

    pub fn upsert_announcement(
        &mut self,
        caller: Caller,
        draft: AnnouncementDraft,
        now: DateTime<Utc>,
    ) -> Result<Announcement> {
        if !caller.is_admin() {
            return Err(policy_violation("announcements"));
        }
        let saved = draft.apply(self.announcement.as_ref(), now);
        self.announcement = Some(saved.clone());
        Ok(saved)
    }

    // Tasks

    pub fn select_tasks(&self, caller: Caller, query: &QuerySpec) -> Vec<Task> {
        query.select(self.tasks.iter().filter(|task| caller.can_see(task)))
    }

    pub fn select_task(&self, caller: Caller, task_id: Uuid) -> Option<Task> {
        self.tasks
            .iter()
            .find(|task| task.id == task_id && caller.can_see(task))
            .cloned()
    }

    pub fn insert_task(&mut self, caller: Caller, insert: TaskInsert, now: DateTime<Utc>) -> Result<Task> {
        if insert.user_id != caller.user_id && !caller.is_admin() {
            return Err(policy_violation("tasks"));
        }
        if insert.status != TaskStatus::Pending {
            return Err(Error::RemoteFailure(
                "new tasks must start as pending".to_string(),
            ));
        }
        if insert.title.trim().is_empty() {
            return Err(Error::RemoteFailure(
                "null value in column \"title\" violates not-null constraint".to_string(),
            ));
        }
        let task = insert.into_task(Uuid::new_v4(), now);
        self.tasks.push(task.clone());
        Ok(task)
    }

    pub fn update_task(&mut self, caller: Caller, task_id: Uuid, change: &TaskChange) -> Result<Task> {
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.id == task_id && caller.can_see(task))
            .ok_or_else(|| Error::not_found("task", task_id))?;
        let mut updated = task.clone();
        updated.apply_change(change)?;
        *task = updated.clone();
        Ok(updated)
    }

    pub fn delete_task(&mut self, caller: Caller, task_id: Uuid) -> Result<()> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == task_id && caller.can_see(task))
            .ok_or_else(|| Error::not_found("task", task_id))?;
        self.tasks.remove(index);
        Ok(())
    }

    pub fn task_counts(&self, caller: Caller) -> TaskCounts {
        TaskCounts::tally(self.tasks.iter().filter(|task| caller.can_see(task)))
    }

    /// The caller's own tasks created within `[start, end]`.
    pub fn tasks_for_report(&self, caller: Caller, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Task> {
        let query = QuerySpec::default()
            .and(Predicate::OwnedBy {
                user_id: caller.user_id,
            })
            .and(Predicate::CreatedBetween { start, end });
        query.select(&self.tasks)
    }

    pub fn tasks_with_profiles(&self, caller: Caller, query: &QuerySpec) -> Vec<AssignedTask> {
        self.select_tasks(caller, query)
            .into_iter()
            .map(|task| {
                let profile = self.profile(task.user_id);
                AssignedTask {
                    first_name: profile.and_then(|profile| profile.first_name.clone()),
                    department: profile.and_then(|profile| profile.department.clone()),
                    task,
                }
            })
            .collect()
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !valid {
        return Err(Error::InvalidArgument(format!("invalid email address '{email}'")));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(email: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: "secret1".to_string(),
            first_name: Some("Ada".to_string()),
            department: Some("Ops".to_string()),
        }
    }

    fn insert(owner: Uuid) -> TaskInsert {
        TaskInsert {
            user_id: owner,
            title: "Write docs".to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: Default::default(),
            due_date: None,
            remarks: None,
        }
    }

    #[test]
    fn register_and_authenticate() {
        let mut data = Dataset::default();
        let now = Utc::now();
        let id = data.register(&signup("Ada@Example.com"), Role::Regular, now).unwrap();
        assert_eq!(data.authenticate("ada@example.com", "secret1").unwrap().id, id);
        assert!(data.authenticate("ada@example.com", "wrong-pass").is_err());
        assert!(data.register(&signup("ada@example.com"), Role::Regular, now).is_err());

        let mut short = signup("bob@example.com");
        short.password = "12345".to_string();
        assert!(data.register(&short, Role::Regular, now).is_err());
    }

    #[test]
    fn sessions_expire_and_revoke() {
        let mut data = Dataset::default();
        let now = Utc::now();
        let id = data.register(&signup("ada@example.com"), Role::Regular, now).unwrap();
        let session = data.issue_session(id, Duration::hours(1), now).unwrap();
        assert!(data.find_session(&session.access_token, now).is_some());
        assert!(data
            .find_session(&session.access_token, now + Duration::hours(2))
            .is_none());
        data.revoke_session(&session.access_token);
        assert!(data.find_session(&session.access_token, now).is_none());
    }

    #[test]
    fn unrepresentable_expiry_is_an_error() {
        let mut data = Dataset::default();
        let now = Utc::now();
        let id = data.register(&signup("ada@example.com"), Role::Regular, now).unwrap();
        let err = data.issue_session(id, Duration::weeks(100_000_000), now).unwrap_err();
        assert!(matches!(err, Error::RemoteFailure(_)));
        assert!(data.sessions.is_empty());
    }

    #[test]
    fn regular_callers_only_touch_own_rows() {
        let mut data = Dataset::default();
        let now = Utc::now();
        let ada = Caller {
            user_id: data.register(&signup("ada@example.com"), Role::Regular, now).unwrap(),
            role: Role::Regular,
        };
        let bob = Caller {
            user_id: data.register(&signup("bob@example.com"), Role::Regular, now).unwrap(),
            role: Role::Regular,
        };
        let admin = Caller {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };

        let task = data.insert_task(ada, insert(ada.user_id), now).unwrap();
        assert!(matches!(
            data.insert_task(bob, insert(ada.user_id), now),
            Err(Error::RemoteFailure(_))
        ));
        assert!(data.select_task(bob, task.id).is_none());
        assert!(matches!(
            data.delete_task(bob, task.id),
            Err(Error::NotFound { .. })
        ));
        assert_eq!(data.select_tasks(admin, &QuerySpec::default()).len(), 1);
        assert_eq!(data.task_counts(bob).total_tasks, 0);
        assert_eq!(data.task_counts(admin).pending_tasks, 1);
    }

    #[test]
    fn backward_status_change_rejected_at_store() {
        let mut data = Dataset::default();
        let now = Utc::now();
        let caller = Caller {
            user_id: Uuid::new_v4(),
            role: Role::Regular,
        };
        let task = data.insert_task(caller, insert(caller.user_id), now).unwrap();
        let skip = TaskChange::Status {
            from: TaskStatus::Pending,
            to: TaskStatus::Completed,
        };
        assert!(matches!(
            data.update_task(caller, task.id, &skip),
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(
            data.select_task(caller, task.id).unwrap().status,
            TaskStatus::Pending
        );
    }
}
