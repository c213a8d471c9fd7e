//! Route protection.
//!
//! Every navigation starts in [`GuardState::Checking`] and settles once as
//! either `Denied` (with a redirect) or `Authorized`. [`Navigator`] tags each
//! evaluation with an epoch; a result whose epoch is no longer current is
//! dropped, so a slow check for an old route never overwrites a newer one.
//! Session changes bump the epoch and put the navigator back to `Checking`.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RoutesConfig;
use crate::error::{Error, Result};
use crate::profile::{Profile, ProfileResolver, Role};
use crate::session::{Session, SessionStore, Subscription};
use crate::task::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Landing,
    SignUp,
    Login,
    ForgotPassword,
    UpdatePassword,
    Dashboard,
    AllTasks,
    TasksByStatus(TaskStatus),
    TaskDetails(Uuid),
    Settings,
    AdminUsersTasks,
    AdminTaskSummary,
    AdminReports,
    AdminUsers,
    AdminAnnouncement,
}

impl Route {
    pub fn access(&self) -> Access {
        match self {
            Route::Landing
            | Route::SignUp
            | Route::Login
            | Route::ForgotPassword => Access::Public,
            Route::UpdatePassword
            | Route::Dashboard
            | Route::AllTasks
            | Route::TasksByStatus(_)
            | Route::TaskDetails(_)
            | Route::Settings => Access::Authenticated,
            Route::AdminUsersTasks
            | Route::AdminTaskSummary
            | Route::AdminReports
            | Route::AdminUsers
            | Route::AdminAnnouncement => Access::Admin,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::SignUp => "/signup".to_string(),
            Route::Login => "/login".to_string(),
            Route::ForgotPassword => "/forgot-password".to_string(),
            Route::UpdatePassword => "/update-password".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::AllTasks => "/tasks/all".to_string(),
            Route::TasksByStatus(status) => format!("/tasks/{status}"),
            Route::TaskDetails(id) => format!("/task/{id}"),
            Route::Settings => "/settings".to_string(),
            Route::AdminUsersTasks => "/admin/users-tasks".to_string(),
            Route::AdminTaskSummary => "/admin/task-summary".to_string(),
            Route::AdminReports => "/admin/reports".to_string(),
            Route::AdminUsers => "/admin/users".to_string(),
            Route::AdminAnnouncement => "/admin/announcement".to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for Route {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let path = s.trim().trim_end_matches('/');
        let route = match path {
            "" => Route::Landing,
            "/signup" => Route::SignUp,
            "/login" => Route::Login,
            "/forgot-password" => Route::ForgotPassword,
            "/update-password" => Route::UpdatePassword,
            "/dashboard" => Route::Dashboard,
            "/tasks/all" => Route::AllTasks,
            "/settings" => Route::Settings,
            "/admin/users-tasks" => Route::AdminUsersTasks,
            "/admin/task-summary" => Route::AdminTaskSummary,
            "/admin/reports" => Route::AdminReports,
            "/admin/users" => Route::AdminUsers,
            "/admin/announcement" => Route::AdminAnnouncement,
            other => {
                if let Some(status) = other.strip_prefix("/tasks/") {
                    Route::TasksByStatus(status.parse()?)
                } else if let Some(id) = other.strip_prefix("/task/") {
                    let id = Uuid::parse_str(id)
                        .map_err(|_| Error::InvalidArgument(format!("invalid task id '{id}'")))?;
                    Route::TaskDetails(id)
                } else {
                    return Err(Error::InvalidArgument(format!("unknown route '{s}'")));
                }
            }
        };
        Ok(route)
    }
}

/// The signed-in identity a page runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub session: Session,
    /// Resolved only on admin routes.
    pub profile: Option<Profile>,
    admin: bool,
}

impl Viewer {
    pub fn new(session: Session, profile: Option<Profile>, admin: bool) -> Self {
        Self {
            session,
            profile,
            admin,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.session.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.session.email.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Public(Option<Session>),
    Viewer(Viewer),
}

impl Grant {
    pub fn viewer(&self) -> Option<&Viewer> {
        match self {
            Grant::Public(_) => None,
            Grant::Viewer(viewer) => Some(viewer),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Grant::Public(session) => session.as_ref(),
            Grant::Viewer(viewer) => Some(&viewer.session),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Unauthenticated,
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub to: String,
    /// Replace the history entry instead of pushing one.
    pub replace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// A transient message shown alongside a redirect or a failed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Destructive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub reason: DenyReason,
    pub redirect: Redirect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

impl Denial {
    /// The error a non-interactive caller reports for this denial.
    pub fn to_error(&self) -> Error {
        match self.reason {
            DenyReason::Unauthenticated => Error::Unauthenticated,
            DenyReason::Unauthorized => Error::Unauthorized(
                self.notice
                    .as_ref()
                    .map(|notice| notice.description.clone())
                    .unwrap_or_else(|| "insufficient role".to_string()),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Denied(Denial),
    Authorized(Grant),
}

impl GuardState {
    pub fn name(&self) -> &'static str {
        match self {
            GuardState::Checking => "checking",
            GuardState::Denied(_) => "denied",
            GuardState::Authorized(_) => "authorized",
        }
    }
}

/// Decides whether a route may be shown for the current session.
#[derive(Clone)]
pub struct RouteGuard {
    sessions: SessionStore,
    profiles: ProfileResolver,
    login: String,
    landing: String,
    admin_roles: Vec<Role>,
}

impl RouteGuard {
    pub fn new(sessions: SessionStore, profiles: ProfileResolver, routes: &RoutesConfig) -> Self {
        Self {
            sessions,
            profiles,
            login: routes.login.clone(),
            landing: routes.landing.clone(),
            admin_roles: routes.admin_roles.clone(),
        }
    }

    /// Evaluate a route. Never returns `Checking`.
    pub async fn evaluate(&self, route: &Route) -> GuardState {
        let session = self
            .sessions
            .current_session()
            .await
            .filter(|session| !session.is_expired(Utc::now()));

        let access = route.access();
        if access == Access::Public {
            return GuardState::Authorized(Grant::Public(session));
        }

        let Some(session) = session else {
            debug!(route = %route, "no session; redirecting to login");
            return GuardState::Denied(Denial {
                reason: DenyReason::Unauthenticated,
                redirect: Redirect {
                    to: self.login.clone(),
                    replace: true,
                },
                notice: None,
            });
        };

        if access == Access::Authenticated {
            return GuardState::Authorized(Grant::Viewer(Viewer::new(session, None, false)));
        }

        match self.profiles.resolve_profile(session.user_id).await {
            Ok(profile) if self.admin_roles.contains(&profile.role) => {
                debug!(route = %route, user = %session.user_id, "admin access granted");
                GuardState::Authorized(Grant::Viewer(Viewer::new(session, Some(profile), true)))
            }
            Ok(profile) => {
                warn!(route = %route, user = %session.user_id, role = %profile.role, "admin access denied");
                self.deny_role(Notice::destructive(
                    "Access Denied",
                    "You do not have permission to view this page.",
                ))
            }
            Err(err) => {
                warn!(route = %route, user = %session.user_id, error = %err, "role lookup failed");
                self.deny_role(Notice::destructive(
                    "Access Denied",
                    "Could not retrieve user role.",
                ))
            }
        }
    }

    fn deny_role(&self, notice: Notice) -> GuardState {
        GuardState::Denied(Denial {
            reason: DenyReason::Unauthorized,
            redirect: Redirect {
                to: self.landing.clone(),
                replace: true,
            },
            notice: Some(notice),
        })
    }
}

/// Identifies one navigation. Results are only applied while it is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavTicket {
    pub epoch: u64,
    pub route: Route,
}

/// What a page produced for the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<T> {
    Loading,
    Redirected(Denial),
    Content(T),
}

struct Slot {
    epoch: u64,
    route: Option<Route>,
    state: GuardState,
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds the guard state for the active navigation.
pub struct Navigator {
    guard: RouteGuard,
    slot: Arc<Mutex<Slot>>,
    _subscription: Subscription,
}

impl Navigator {
    pub fn new(guard: RouteGuard, sessions: &SessionStore) -> Self {
        let slot = Arc::new(Mutex::new(Slot {
            epoch: 0,
            route: None,
            state: GuardState::Checking,
        }));
        let weak = Arc::downgrade(&slot);
        let subscription = sessions.on_session_change(move |event| {
            if let Some(slot) = weak.upgrade() {
                let mut slot = lock_slot(&slot);
                slot.epoch += 1;
                slot.state = GuardState::Checking;
                debug!(event = event.name(), epoch = slot.epoch, "session changed; re-checking");
            }
        });
        Self {
            guard,
            slot,
            _subscription: subscription,
        }
    }

    /// Start a navigation: new epoch, state back to `Checking`.
    pub fn begin(&self, route: Route) -> NavTicket {
        let mut slot = lock_slot(&self.slot);
        slot.epoch += 1;
        slot.route = Some(route.clone());
        slot.state = GuardState::Checking;
        debug!(route = %route, epoch = slot.epoch, "navigation started");
        NavTicket {
            epoch: slot.epoch,
            route,
        }
    }

    /// Apply an evaluation result. Returns `false` when the ticket is stale
    /// or the navigation already settled.
    pub fn settle(&self, ticket: &NavTicket, state: GuardState) -> bool {
        let mut slot = lock_slot(&self.slot);
        if slot.epoch != ticket.epoch {
            debug!(route = %ticket.route, epoch = ticket.epoch, current = slot.epoch, "discarding stale guard result");
            return false;
        }
        if !matches!(slot.state, GuardState::Checking) || matches!(state, GuardState::Checking) {
            return false;
        }
        debug!(route = %ticket.route, state = state.name(), "navigation settled");
        slot.state = state;
        true
    }

    pub async fn navigate(&self, route: Route) -> GuardState {
        let ticket = self.begin(route);
        let state = self.guard.evaluate(&ticket.route).await;
        self.settle(&ticket, state);
        self.current()
    }

    /// Re-run the guard for the current route, e.g. after a session change.
    pub async fn refresh(&self) -> GuardState {
        match self.current_route() {
            Some(route) => self.navigate(route).await,
            None => GuardState::Checking,
        }
    }

    pub fn current(&self) -> GuardState {
        lock_slot(&self.slot).state.clone()
    }

    pub fn current_route(&self) -> Option<Route> {
        lock_slot(&self.slot).route.clone()
    }

    pub fn epoch(&self) -> u64 {
        lock_slot(&self.slot).epoch
    }

    /// Run `page` only when the current navigation is authorized.
    pub fn render<T>(&self, page: impl FnOnce(&Grant) -> T) -> Rendered<T> {
        match self.current() {
            GuardState::Checking => Rendered::Loading,
            GuardState::Denied(denial) => Rendered::Redirected(denial),
            GuardState::Authorized(grant) => Rendered::Content(page(&grant)),
        }
    }
}
