//! Application context.
//!
//! [`App`] owns the session store, the guard-driven navigator and the task
//! service over one backend. Pages run through [`App::show`], which only
//! invokes them once the navigation has settled as authorized.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::guard::{Grant, GuardState, Navigator, Rendered, Route, RouteGuard, Viewer};
use crate::profile::ProfileResolver;
use crate::session::SessionStore;
use crate::task::TaskService;

pub struct App {
    backend: Arc<dyn Backend>,
    config: Config,
    sessions: SessionStore,
    profiles: ProfileResolver,
    navigator: Navigator,
    tasks: TaskService,
}

impl App {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        let sessions = SessionStore::new(Arc::clone(&backend));
        let profiles = ProfileResolver::new(Arc::clone(&backend));
        let guard = RouteGuard::new(sessions.clone(), profiles.clone(), &config.routes);
        let navigator = Navigator::new(guard, &sessions);
        let tasks = TaskService::new(Arc::clone(&backend), config.tasks.clone());
        Self {
            backend,
            config,
            sessions,
            profiles,
            navigator,
            tasks,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn profiles(&self) -> &ProfileResolver {
        &self.profiles
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    /// Navigate to `route` and run `page` if access is granted.
    pub async fn show<T, F, Fut>(&self, route: Route, page: F) -> Result<Rendered<T>>
    where
        F: FnOnce(Grant) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let state = self.navigator.navigate(route).await;
        debug!(state = state.name(), "rendering page");
        match self.navigator.render(Grant::clone) {
            Rendered::Loading => Ok(Rendered::Loading),
            Rendered::Redirected(denial) => Ok(Rendered::Redirected(denial)),
            Rendered::Content(grant) => Ok(Rendered::Content(page(grant).await?)),
        }
    }

    /// Navigate and return the signed-in viewer, turning denials into errors.
    pub async fn enter(&self, route: Route) -> Result<Viewer> {
        match self.navigator.navigate(route).await {
            GuardState::Authorized(Grant::Viewer(viewer)) => Ok(viewer),
            GuardState::Authorized(Grant::Public(_)) => Err(Error::InvalidArgument(
                "route does not carry a signed-in viewer".to_string(),
            )),
            GuardState::Denied(denial) => Err(denial.to_error()),
            GuardState::Checking => Err(Error::RemoteFailure(
                "navigation was superseded before it settled".to_string(),
            )),
        }
    }
}
