use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use taskdesk::app::App;
use taskdesk::backend::{Backend, MemoryBackend};
use taskdesk::config::Config;
use taskdesk::guard::{DenyReason, Grant, GuardState, Rendered, Route};
use taskdesk::profile::Role;
use taskdesk::Error;

fn app_with(backend: &Arc<MemoryBackend>) -> App {
    let backend: Arc<dyn Backend> = backend.clone();
    App::new(backend, Config::default())
}

fn denial(state: GuardState) -> taskdesk::guard::Denial {
    match state {
        GuardState::Denied(denial) => denial,
        other => panic!("expected denial, got {other:?}"),
    }
}

#[tokio::test]
async fn signed_out_viewer_is_sent_to_login_without_rendering() {
    let backend = Arc::new(MemoryBackend::new());
    let app = app_with(&backend);
    let invoked = Arc::new(AtomicBool::new(false));

    let seen = Arc::clone(&invoked);
    let rendered = app
        .show(Route::Dashboard, |_grant| async move {
            seen.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

    match rendered {
        Rendered::Redirected(denial) => {
            assert_eq!(denial.reason, DenyReason::Unauthenticated);
            assert_eq!(denial.redirect.to, "/login");
            assert!(denial.redirect.replace);
            assert!(denial.notice.is_none());
        }
        other => panic!("expected redirect, got {other:?}"),
    }
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn public_routes_render_without_a_session() {
    let backend = Arc::new(MemoryBackend::new());
    let app = app_with(&backend);

    let rendered = app
        .show(Route::Login, |grant| async move { Ok(grant) })
        .await
        .unwrap();
    assert_eq!(rendered, Rendered::Content(Grant::Public(None)));
}

#[tokio::test]
async fn regular_user_is_turned_away_from_admin_routes() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend
        .create_user("rita@example.com", "secret1", "Rita", Role::Regular)
        .unwrap();
    backend.sign_in_as(user).unwrap();
    let app = app_with(&backend);

    let denial = denial(app.navigator().navigate(Route::AdminTaskSummary).await);
    assert_eq!(denial.reason, DenyReason::Unauthorized);
    assert_eq!(denial.redirect.to, "/dashboard");
    let notice = denial.notice.expect("notice");
    assert_eq!(notice.title, "Access Denied");
    assert_eq!(notice.description, "You do not have permission to view this page.");

    let err = app.enter(Route::AdminUsers).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn admin_reaches_admin_routes_with_profile() {
    let backend = Arc::new(MemoryBackend::new());
    let admin = backend
        .create_user("ada@example.com", "secret1", "Ada", Role::Admin)
        .unwrap();
    backend.sign_in_as(admin).unwrap();
    let app = app_with(&backend);

    let viewer = app.enter(Route::AdminReports).await.unwrap();
    assert!(viewer.is_admin());
    assert_eq!(viewer.profile.as_ref().map(|p| p.role), Some(Role::Admin));
}

#[tokio::test]
async fn role_lookup_failure_denies_admin_route() {
    let backend = Arc::new(MemoryBackend::new());
    let admin = backend
        .create_user("ada@example.com", "secret1", "Ada", Role::Admin)
        .unwrap();
    backend.sign_in_as(admin).unwrap();
    backend.fail_profile_lookups(true);
    let app = app_with(&backend);

    let denial = denial(app.navigator().navigate(Route::AdminUsers).await);
    assert_eq!(denial.reason, DenyReason::Unauthorized);
    assert_eq!(
        denial.notice.map(|n| n.description),
        Some("Could not retrieve user role.".to_string())
    );

    // Authenticated routes never look at the profile.
    assert!(matches!(
        app.navigator().navigate(Route::Dashboard).await,
        GuardState::Authorized(_)
    ));
}

#[tokio::test]
async fn missing_profile_row_denies_admin_route() {
    let backend = Arc::new(MemoryBackend::new());
    let admin = backend
        .create_user("ada@example.com", "secret1", "Ada", Role::Admin)
        .unwrap();
    backend.remove_profile(admin);
    backend.sign_in_as(admin).unwrap();
    let app = app_with(&backend);

    let denial = denial(app.navigator().navigate(Route::AdminAnnouncement).await);
    assert_eq!(denial.reason, DenyReason::Unauthorized);
}

#[tokio::test]
async fn session_lookup_failure_counts_as_signed_out() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend
        .create_user("rita@example.com", "secret1", "Rita", Role::Regular)
        .unwrap();
    backend.sign_in_as(user).unwrap();
    backend.fail_session_lookups(true);
    let app = app_with(&backend);

    let denial = denial(app.navigator().navigate(Route::AllTasks).await);
    assert_eq!(denial.reason, DenyReason::Unauthenticated);
    assert!(matches!(
        app.enter(Route::Settings).await,
        Err(Error::Unauthenticated)
    ));
}

#[tokio::test]
async fn expired_session_is_treated_as_absent() {
    let backend = Arc::new(MemoryBackend::with_session_ttl(Duration::seconds(-1)));
    let user = backend
        .create_user("rita@example.com", "secret1", "Rita", Role::Regular)
        .unwrap();
    backend.sign_in_as(user).unwrap();
    let app = app_with(&backend);

    let denial = denial(app.navigator().navigate(Route::Dashboard).await);
    assert_eq!(denial.reason, DenyReason::Unauthenticated);
}

#[tokio::test]
async fn stale_results_are_discarded() {
    let backend = Arc::new(MemoryBackend::new());
    let app = app_with(&backend);
    let navigator = app.navigator();

    let first = navigator.begin(Route::Dashboard);
    let second = navigator.begin(Route::Login);
    assert!(!navigator.settle(&first, GuardState::Authorized(Grant::Public(None))));
    assert_eq!(navigator.current(), GuardState::Checking);

    assert!(navigator.settle(&second, GuardState::Authorized(Grant::Public(None))));
    // A settled navigation does not move again without a new begin.
    assert!(!navigator.settle(&second, GuardState::Checking));
    assert!(matches!(navigator.current(), GuardState::Authorized(_)));
}

#[tokio::test]
async fn session_change_resets_to_checking() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend
        .create_user("rita@example.com", "secret1", "Rita", Role::Regular)
        .unwrap();
    backend.sign_in_as(user).unwrap();
    let app = app_with(&backend);

    assert!(matches!(
        app.navigator().navigate(Route::Dashboard).await,
        GuardState::Authorized(_)
    ));
    let epoch = app.navigator().epoch();
    assert!(matches!(app.navigator().render(|_| ()), Rendered::Content(())));

    backend.sign_out().await.unwrap();
    assert_eq!(app.navigator().current(), GuardState::Checking);
    assert!(app.navigator().epoch() > epoch);
    assert_eq!(app.navigator().render(|_| ()), Rendered::Loading);

    let denial = denial(app.navigator().refresh().await);
    assert_eq!(denial.redirect.to, "/login");
}

#[tokio::test]
async fn dropping_the_app_unsubscribes() {
    let backend = Arc::new(MemoryBackend::new());
    let app = app_with(&backend);
    assert_eq!(backend.listener_count(), 1);
    drop(app);
    assert_eq!(backend.listener_count(), 0);
}

#[tokio::test]
async fn configured_routes_drive_redirects() {
    let backend = Arc::new(MemoryBackend::new());
    let mut config = Config::default();
    config.routes.login = "/signin".to_string();
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    let app = App::new(dyn_backend, config);

    let denial = denial(app.navigator().navigate(Route::Dashboard).await);
    assert_eq!(denial.redirect.to, "/signin");
}
