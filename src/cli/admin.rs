//! taskdesk admin subcommands
//!
//! Every command here navigates to an admin route first, so regular users
//! are turned away before anything is loaded.

use std::path::PathBuf;

use serde::Serialize;

use super::task::resolve_owner;
use super::{parse_date, today, AdminCommands, Context};
use crate::announcement::{Announcement, AnnouncementDraft};
use crate::dashboard::task_summary;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::filter::{compose_zoned, Choice, FilterSet};
use crate::guard::Route;
use crate::output::{emit_success, HumanOutput};
use crate::report::{department_report, department_scope};
use crate::task::{AssignedTask, Priority, TaskStatus};

pub async fn run(ctx: &mut Context, command: AdminCommands) -> Result<()> {
    match command {
        AdminCommands::Tasks {
            user,
            department,
            status,
            priority,
            date,
        } => {
            run_tasks(
                ctx,
                TasksOptions {
                    user,
                    department,
                    status,
                    priority,
                    date,
                },
            )
            .await
        }
        AdminCommands::Summary => run_summary(ctx).await,
        AdminCommands::Report {
            period,
            department,
            out,
        } => run_report(ctx, &period, department.as_deref(), out).await,
        AdminCommands::Users => run_users(ctx).await,
        AdminCommands::Announce {
            content,
            hide,
            show,
        } => run_announce(ctx, content, hide, show).await,
    }
}

pub struct TasksOptions {
    pub user: Option<String>,
    pub department: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub date: Option<String>,
}

fn assigned_line(row: &AssignedTask) -> String {
    format!(
        "{} [{}] ({}) {} - {} / {}",
        row.task.id,
        row.task.status,
        row.task.priority,
        row.task.title,
        row.first_name.as_deref().unwrap_or("User"),
        row.department.as_deref().unwrap_or("-"),
    )
}

async fn run_tasks(ctx: &mut Context, options: TasksOptions) -> Result<()> {
    ctx.enter(Route::AdminUsersTasks).await?;

    let user = match options.user.as_deref() {
        Some(raw) => Some(resolve_owner(ctx, raw)?),
        None => None,
    };
    let filters = FilterSet {
        date: options.date.as_deref().map(parse_date).transpose()?,
        priority: Choice::from(
            options
                .priority
                .as_deref()
                .map(str::parse::<Priority>)
                .transpose()?,
        ),
        status: Choice::from(
            options
                .status
                .as_deref()
                .map(str::parse::<TaskStatus>)
                .transpose()?,
        ),
        user: Choice::from(user),
    };
    let scope = department_scope(&ctx.app, options.department.as_deref()).await?;
    let zone = ctx.app.config().filters.zone()?;
    let query = compose_zoned(&filters, &scope, zone)?;
    let rows = ctx.app.backend().tasks_with_profiles(&query).await?;

    let mut human = HumanOutput::new(format!("Users' Tasks ({})", rows.len()));
    if let Some(department) = &options.department {
        human.push_summary("department", department.clone());
    }
    for row in &rows {
        human.push_detail(assigned_line(row));
    }

    #[derive(Serialize)]
    struct TasksReport<'a> {
        filters: &'a FilterSet,
        #[serde(skip_serializing_if = "Option::is_none")]
        department: Option<&'a str>,
        count: usize,
        tasks: &'a [AssignedTask],
    }

    let report = TasksReport {
        filters: &filters,
        department: options.department.as_deref(),
        count: rows.len(),
        tasks: &rows,
    };
    emit_success(ctx.output, "admin tasks", &report, Some(&human))
}

async fn run_summary(ctx: &mut Context) -> Result<()> {
    ctx.enter(Route::AdminTaskSummary).await?;
    let counts = task_summary(&ctx.app).await?;

    let mut human = HumanOutput::new("Task Summary");
    human.push_summary("total", counts.total_tasks.to_string());
    human.push_summary("pending", counts.pending_tasks.to_string());
    human.push_summary("in progress", counts.in_progress_tasks.to_string());
    human.push_summary("completed", counts.completed_tasks.to_string());
    emit_success(ctx.output, "admin summary", &counts, Some(&human))
}

async fn run_report(
    ctx: &mut Context,
    period: &str,
    department: Option<&str>,
    out: Option<PathBuf>,
) -> Result<()> {
    let period = period.parse()?;
    let viewer = ctx.enter(Route::AdminReports).await?;
    let report = department_report(&ctx.app, period, department, today()).await?;
    super::report::deliver(ctx, &viewer, "admin report", &report, out.as_deref())
}

async fn run_users(ctx: &mut Context) -> Result<()> {
    ctx.enter(Route::AdminUsers).await?;
    let profiles = ctx.app.backend().select_profiles().await?;

    let mut human = HumanOutput::new(format!("Users ({})", profiles.len()));
    for profile in &profiles {
        human.push_detail(format!(
            "{} {} [{}] {}",
            profile.id,
            profile.display_name(),
            profile.role,
            profile.department.as_deref().unwrap_or("-"),
        ));
    }
    emit_success(ctx.output, "admin users", &profiles, Some(&human))
}

fn announcement_output(header: &str, announcement: Option<&Announcement>) -> HumanOutput {
    let mut human = HumanOutput::new(header);
    match announcement {
        Some(announcement) => {
            human.push_summary(
                "visible",
                if announcement.is_visible { "yes" } else { "no" },
            );
            human.push_summary("updated", announcement.updated_at.to_rfc3339());
            human.push_detail(announcement.content.clone());
        }
        None => human.push_next_step("taskdesk admin announce \"<text>\""),
    }
    human
}

async fn run_announce(
    ctx: &mut Context,
    content: Option<String>,
    hide: bool,
    show: bool,
) -> Result<()> {
    let viewer = ctx.enter(Route::AdminAnnouncement).await?;
    let current = ctx.app.backend().select_announcement().await?;

    let draft = match (content, hide, show) {
        (None, false, false) => {
            let human = announcement_output("Announcement", current.as_ref());
            return emit_success(ctx.output, "admin announce", &current, Some(&human));
        }
        (Some(content), hide, _) => AnnouncementDraft::new(&content, !hide)?,
        (None, hide, _) => {
            let existing = current
                .as_ref()
                .ok_or_else(|| Error::not_found("announcement", "current"))?;
            AnnouncementDraft::new(&existing.content, !hide)?
        }
    };

    let saved = ctx.app.backend().upsert_announcement(draft).await?;
    ctx.event(EventKind::AnnouncementSaved, Some(viewer.user_id()), &saved)?;
    let human = announcement_output("Announcement saved", Some(&saved));
    emit_success(ctx.output, "admin announce", &saved, Some(&human))
}
