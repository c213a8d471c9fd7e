//! Account and session commands: signup, login, logout, whoami, refresh,
//! password, open.

use serde::Serialize;
use uuid::Uuid;

use super::Context;
use crate::backend::{SignUpRequest, MIN_PASSWORD_LEN};
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::guard::{Denial, Grant, Rendered, Route};
use crate::output::{emit_success, HumanOutput};
use crate::session::Session;

pub struct SignupOptions {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub department: Option<String>,
}

pub struct LoginOptions {
    pub email: String,
    pub password: String,
}

pub struct PasswordOptions {
    pub new_password: String,
    pub confirm: String,
}

#[derive(Serialize)]
struct SessionReport {
    user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    expires_at: chrono::DateTime<chrono::Utc>,
    landing: String,
}

impl SessionReport {
    fn new(session: &Session, landing: &str) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email.clone(),
            expires_at: session.expires_at,
            landing: landing.to_string(),
        }
    }
}

fn session_output(header: &str, report: &SessionReport) -> HumanOutput {
    let mut human = HumanOutput::new(header);
    if let Some(email) = &report.email {
        human.push_summary("email", email.clone());
    }
    human.push_summary("user", report.user_id.to_string());
    human.push_summary("expires", report.expires_at.to_rfc3339());
    human.push_next_step("taskdesk dashboard");
    human
}

pub async fn run_signup(ctx: &mut Context, options: SignupOptions) -> Result<()> {
    let session = ctx
        .app
        .backend()
        .sign_up(SignUpRequest {
            email: options.email,
            password: options.password,
            first_name: options.first_name,
            department: options.department,
        })
        .await?;

    let report = SessionReport::new(&session, &ctx.app.config().routes.landing);
    ctx.event(EventKind::SignedIn, Some(session.user_id), &report)?;
    let human = session_output("Account created", &report);
    emit_success(ctx.output, "signup", &report, Some(&human))
}

pub async fn run_login(ctx: &mut Context, options: LoginOptions) -> Result<()> {
    let session = ctx
        .app
        .backend()
        .sign_in(&options.email, &options.password)
        .await?;

    let report = SessionReport::new(&session, &ctx.app.config().routes.landing);
    ctx.event(EventKind::SignedIn, Some(session.user_id), &report)?;
    let human = session_output("Signed in", &report);
    emit_success(ctx.output, "login", &report, Some(&human))
}

pub async fn run_logout(ctx: &mut Context) -> Result<()> {
    let previous = ctx.app.sessions().current_session().await;
    ctx.app.backend().sign_out().await?;

    #[derive(Serialize)]
    struct LogoutReport {
        signed_out: bool,
        redirect: String,
    }

    let report = LogoutReport {
        signed_out: previous.is_some(),
        redirect: ctx.app.config().routes.login.clone(),
    };
    ctx.event(
        EventKind::SignedOut,
        previous.as_ref().map(|session| session.user_id),
        &report,
    )?;
    let header = if report.signed_out {
        "Signed out"
    } else {
        "No active session"
    };
    let human = HumanOutput::new(header);
    emit_success(ctx.output, "logout", &report, Some(&human))
}

pub async fn run_whoami(ctx: &mut Context) -> Result<()> {
    let viewer = ctx.enter(Route::Settings).await?;
    let profile = ctx.app.profiles().resolve_profile(viewer.user_id()).await.ok();

    #[derive(Serialize)]
    struct WhoamiReport {
        user_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        first_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        department: Option<String>,
        expires_at: chrono::DateTime<chrono::Utc>,
    }

    let report = WhoamiReport {
        user_id: viewer.user_id(),
        email: viewer.email().map(str::to_string),
        first_name: profile.as_ref().and_then(|p| p.first_name.clone()),
        role: profile.as_ref().map(|p| p.role.to_string()),
        department: profile.as_ref().and_then(|p| p.department.clone()),
        expires_at: viewer.session.expires_at,
    };

    let mut human = HumanOutput::new(format!(
        "Signed in as {}",
        report.email.as_deref().unwrap_or("(no email)")
    ));
    human.push_summary("user", report.user_id.to_string());
    if let Some(role) = &report.role {
        human.push_summary("role", role.clone());
    } else {
        human.push_warning("profile could not be loaded");
    }
    if let Some(department) = &report.department {
        human.push_summary("department", department.clone());
    }
    emit_success(ctx.output, "whoami", &report, Some(&human))
}

pub async fn run_refresh(ctx: &mut Context) -> Result<()> {
    let session = ctx.app.backend().refresh_session().await?;
    let report = SessionReport::new(&session, &ctx.app.config().routes.landing);
    ctx.event(EventKind::SessionRefreshed, Some(session.user_id), &report)?;
    let human = session_output("Session refreshed", &report);
    emit_success(ctx.output, "refresh", &report, Some(&human))
}

pub async fn run_password(ctx: &mut Context, options: PasswordOptions) -> Result<()> {
    let viewer = ctx.enter(Route::UpdatePassword).await?;
    if options.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::InvalidArgument(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if options.new_password != options.confirm {
        return Err(Error::InvalidArgument("passwords do not match".to_string()));
    }
    ctx.app
        .backend()
        .update_password(&options.new_password)
        .await?;

    #[derive(Serialize)]
    struct PasswordReport {
        user_id: Uuid,
        updated: bool,
    }

    let report = PasswordReport {
        user_id: viewer.user_id(),
        updated: true,
    };
    ctx.event(EventKind::PasswordUpdated, Some(viewer.user_id()), &report)?;
    let human = HumanOutput::new("Password updated");
    emit_success(ctx.output, "password", &report, Some(&human))
}

/// Report the guard's decision for an arbitrary route.
pub async fn run_open(ctx: &mut Context, path: &str) -> Result<()> {
    let route: Route = path.parse()?;
    let rendered = ctx
        .app
        .show(route.clone(), |grant| async move { Ok(grant) })
        .await?;

    #[derive(Serialize)]
    struct OpenReport {
        route: String,
        access: crate::guard::Access,
        state: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        denial: Option<Denial>,
    }

    let mut report = OpenReport {
        route: route.path(),
        access: route.access(),
        state: "checking",
        user_id: None,
        denial: None,
    };
    let mut human;
    match rendered {
        Rendered::Content(grant) => {
            report.state = "authorized";
            report.user_id = grant.session().map(|session| session.user_id);
            human = HumanOutput::new(format!("{} is open", route.path()));
            if let Grant::Viewer(viewer) = &grant {
                human.push_summary("user", viewer.user_id().to_string());
            }
        }
        Rendered::Redirected(denial) => {
            report.state = "denied";
            human = HumanOutput::new(format!(
                "{} is not available; redirecting to {}",
                route.path(),
                denial.redirect.to
            ));
            if let Some(notice) = &denial.notice {
                human.push_warning(format!("{}: {}", notice.title, notice.description));
            }
            ctx.event(
                EventKind::AccessDenied,
                None,
                serde_json::json!({ "route": route.path(), "denial": &denial }),
            )?;
            report.denial = Some(denial);
        }
        Rendered::Loading => {
            human = HumanOutput::new(format!("{} is still loading", route.path()));
        }
    }
    emit_success(ctx.output, "open", &report, Some(&human))
}
