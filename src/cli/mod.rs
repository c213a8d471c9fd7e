//! Command-line interface for taskdesk
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule. Every command
//! navigates to a route first; pages run only when the guard authorizes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::app::App;
use crate::backend::{Backend, LocalBackend};
use crate::config::{config_path, Config};
use crate::error::{Error, Result};
use crate::events::{Event, EventDestination, EventKind, EventSink};
use crate::guard::{GuardState, Route, Viewer};
use crate::output::OutputOptions;

mod admin;
mod auth;
mod dashboard;
mod provision;
mod report;
mod task;

/// taskdesk - task tracking with role-gated views
///
/// Sign in, track tasks through pending, in-progress and completed, and
/// (as an administrator) review everyone's work.
#[derive(Parser, Debug)]
#[command(name = "taskdesk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory for the local store and session
    #[arg(long, global = true, env = "TASKDESK_HOME")]
    pub home: Option<PathBuf>,

    /// Config file (defaults to <home>/taskdesk.toml)
    #[arg(long, global = true, env = "TASKDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write JSONL events to a file, or "-" for stdout
    #[arg(long, global = true, env = "TASKDESK_EVENTS")]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        email: String,

        #[arg(long, env = "TASKDESK_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        department: Option<String>,
    },

    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "TASKDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Exchange the current session for a fresh one
    Refresh,

    /// Change the password of the signed-in user
    Password {
        /// New password (at least 6 characters)
        #[arg(long = "new", env = "TASKDESK_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,

        /// Repeat the new password
        #[arg(long)]
        confirm: String,
    },

    /// Check whether a route is reachable with the current session
    Open {
        /// Route path, e.g. /dashboard or /admin/task-summary
        path: String,
    },

    /// Task counts, latest tasks and announcements
    Dashboard,

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Generate a report of your own tasks
    Report {
        /// week (Friday to Thursday) or month
        #[arg(long, default_value = "week")]
        period: String,

        /// Write the report to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Administrator views
    #[command(subcommand)]
    Admin(AdminCommands),

    /// Provision accounts in the local store
    #[command(subcommand)]
    Provision(ProvisionCommands),
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task (starts as pending)
    Create {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// low, medium or high
        #[arg(long)]
        priority: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        remarks: Option<String>,

        /// Assign to another user (administrators only)
        #[arg(long)]
        owner: Option<String>,
    },

    /// List your tasks, newest first
    List {
        /// pending, in-progress or completed
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        /// Only tasks created on this day (YYYY-MM-DD, local time)
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one task with its owner
    Show { id: String },

    /// Move a pending task to in-progress
    Start { id: String },

    /// Move an in-progress task to completed
    Complete { id: String },

    /// Move a task to an explicit status
    Advance {
        id: String,

        #[arg(long)]
        to: String,
    },

    /// Edit task fields
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        #[arg(long)]
        clear_due: bool,
    },

    /// Set or clear remarks
    Remarks {
        id: String,

        #[arg(required_unless_present = "clear")]
        text: Option<String>,

        #[arg(long)]
        clear: bool,
    },

    /// Permanently delete a task
    Delete {
        id: String,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Tasks across all users
    Tasks {
        /// Owner user id or email
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Task counts by status across all users
    Summary,

    /// Department report (Monday-start week or month)
    Report {
        #[arg(long, default_value = "week")]
        period: String,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List user profiles
    Users,

    /// Show or update the dashboard announcement
    Announce {
        /// New announcement text (10 to 500 characters)
        content: Option<String>,

        /// Hide the announcement without changing its text
        #[arg(long, conflicts_with = "show")]
        hide: bool,

        /// Make the announcement visible
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProvisionCommands {
    /// Create an account with a role
    User {
        #[arg(long)]
        email: String,

        #[arg(long, env = "TASKDESK_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        department: Option<String>,

        /// Admin or Regular
        #[arg(long, default_value = "Regular")]
        role: String,
    },

    /// Change the role of an existing account
    Role {
        #[arg(long)]
        email: String,

        #[arg(long)]
        role: String,
    },
}

/// Everything a command needs: the app, its local store, output and events.
pub(crate) struct Context {
    pub(crate) app: App,
    pub(crate) local: Arc<LocalBackend>,
    pub(crate) output: OutputOptions,
    events: Option<EventSink>,
}

impl Context {
    fn open(cli: &Cli) -> Result<Self> {
        let home = resolve_home(cli.home.clone())?;
        let path = config_path(cli.config.as_deref(), &home);
        let config = Config::load_or_default(&path)?;
        debug!(home = %home.display(), config = %path.display(), "opening local store");

        let local = Arc::new(LocalBackend::open(&home, &config)?);
        let backend: Arc<dyn Backend> = local.clone();
        let events = match EventDestination::parse(cli.events.as_deref()) {
            Some(destination) => Some(destination.open()?),
            None => None,
        };
        let events_to_stdout = matches!(
            EventDestination::parse(cli.events.as_deref()),
            Some(EventDestination::Stdout)
        );

        Ok(Self {
            app: App::new(backend, config),
            local,
            output: OutputOptions {
                json: cli.json && !events_to_stdout,
                quiet: cli.quiet,
            },
            events,
        })
    }

    pub(crate) fn event<T: Serialize>(
        &mut self,
        kind: EventKind,
        user_id: Option<Uuid>,
        data: T,
    ) -> Result<()> {
        if let Some(sink) = self.events.as_mut() {
            sink.emit(&Event::new(kind, user_id).with_data(data)?)?;
        }
        Ok(())
    }

    /// Navigate to `route` and require a signed-in viewer.
    pub(crate) async fn enter(&mut self, route: Route) -> Result<Viewer> {
        match self.app.enter(route.clone()).await {
            Ok(viewer) => Ok(viewer),
            Err(err) => {
                if let GuardState::Denied(denial) = self.app.navigator().current() {
                    self.event(
                        EventKind::AccessDenied,
                        None,
                        serde_json::json!({ "route": route.path(), "denial": denial }),
                    )?;
                }
                Err(err)
            }
        }
    }
}

fn resolve_home(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(home) = explicit {
        return Ok(home);
    }
    ProjectDirs::from("dev", "taskdesk", "taskdesk")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            Error::InvalidConfig("could not determine a data directory; pass --home".to_string())
        })
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidArgument(format!("invalid date '{raw}': expected YYYY-MM-DD")))
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| Error::InvalidArgument(format!("invalid id '{raw}'")))
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.dispatch())
    }

    async fn dispatch(self) -> Result<()> {
        let mut ctx = Context::open(&self)?;
        match self.command {
            Commands::Signup {
                email,
                password,
                first_name,
                department,
            } => {
                auth::run_signup(
                    &mut ctx,
                    auth::SignupOptions {
                        email,
                        password,
                        first_name,
                        department,
                    },
                )
                .await
            }
            Commands::Login { email, password } => {
                auth::run_login(&mut ctx, auth::LoginOptions { email, password }).await
            }
            Commands::Logout => auth::run_logout(&mut ctx).await,
            Commands::Whoami => auth::run_whoami(&mut ctx).await,
            Commands::Refresh => auth::run_refresh(&mut ctx).await,
            Commands::Password {
                new_password,
                confirm,
            } => {
                auth::run_password(
                    &mut ctx,
                    auth::PasswordOptions {
                        new_password,
                        confirm,
                    },
                )
                .await
            }
            Commands::Open { path } => auth::run_open(&mut ctx, &path).await,
            Commands::Dashboard => dashboard::run(&mut ctx).await,
            Commands::Task(cmd) => task::run(&mut ctx, cmd).await,
            Commands::Report { period, out } => {
                report::run_personal(&mut ctx, report::ReportOptions { period, out }).await
            }
            Commands::Admin(cmd) => admin::run(&mut ctx, cmd).await,
            Commands::Provision(cmd) => provision::run(&mut ctx, cmd),
        }
    }
}
