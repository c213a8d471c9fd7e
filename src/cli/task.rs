//! taskdesk task subcommands

use serde::Serialize;
use uuid::Uuid;

use super::{parse_date, parse_id, Context, TaskCommands};
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::filter::{compose_zoned, Choice, FilterSet, Scope};
use crate::guard::{Route, Viewer};
use crate::output::{emit_success, HumanOutput};
use crate::task::{NewTask, Priority, Task, TaskPatch, TaskStatus};

pub async fn run(ctx: &mut Context, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Create {
            title,
            description,
            priority,
            due,
            remarks,
            owner,
        } => {
            run_create(
                ctx,
                CreateOptions {
                    title,
                    description,
                    priority,
                    due,
                    remarks,
                    owner,
                },
            )
            .await
        }
        TaskCommands::List {
            status,
            priority,
            date,
            limit,
        } => {
            run_list(
                ctx,
                ListOptions {
                    status,
                    priority,
                    date,
                    limit,
                },
            )
            .await
        }
        TaskCommands::Show { id } => run_show(ctx, &id).await,
        TaskCommands::Start { id } => run_advance(ctx, &id, TaskStatus::InProgress).await,
        TaskCommands::Complete { id } => run_advance(ctx, &id, TaskStatus::Completed).await,
        TaskCommands::Advance { id, to } => run_advance(ctx, &id, to.parse()?).await,
        TaskCommands::Edit {
            id,
            title,
            description,
            clear_description,
            priority,
            due,
            clear_due,
        } => {
            let patch = TaskPatch {
                title,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
                due_date: if clear_due {
                    Some(None)
                } else {
                    due.as_deref().map(parse_date).transpose()?.map(Some)
                },
                remarks: None,
            };
            run_edit(ctx, &id, patch, "task edit").await
        }
        TaskCommands::Remarks { id, text, clear } => {
            let patch = TaskPatch {
                remarks: Some(if clear { None } else { text }),
                ..TaskPatch::default()
            };
            run_edit(ctx, &id, patch, "task remarks").await
        }
        TaskCommands::Delete { id, yes } => run_delete(ctx, &id, yes).await,
    }
}

pub struct CreateOptions {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due: Option<String>,
    pub remarks: Option<String>,
    pub owner: Option<String>,
}

pub struct ListOptions {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub date: Option<String>,
    pub limit: Option<usize>,
}

fn task_line(task: &Task) -> String {
    let due = task
        .due_date
        .map(|date| format!(" due {date}"))
        .unwrap_or_default();
    format!(
        "{} [{}] ({}) {}{}",
        task.id, task.status, task.priority, task.title, due
    )
}

fn task_output(header: &str, task: &Task) -> HumanOutput {
    let mut human = HumanOutput::new(format!("{header}: {}", task.title));
    human.push_summary("id", task.id.to_string());
    human.push_summary("status", task.status.to_string());
    human.push_summary("priority", task.priority.to_string());
    if let Some(due) = task.due_date {
        human.push_summary("due", due.to_string());
    }
    if let Some(description) = &task.description {
        human.push_detail(description.clone());
    }
    if let Some(remarks) = &task.remarks {
        human.push_detail(format!("Remarks: {remarks}"));
    }
    match task.status.next() {
        Some(TaskStatus::InProgress) => human.push_next_step(format!("taskdesk task start {}", task.id)),
        Some(TaskStatus::Completed) => {
            human.push_next_step(format!("taskdesk task complete {}", task.id))
        }
        _ => {}
    }
    human
}

/// Resolve an owner given as a user id or an email.
pub(crate) fn resolve_owner(ctx: &Context, raw: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(raw.trim()) {
        return Ok(id);
    }
    let email = raw.trim().to_ascii_lowercase();
    ctx.local
        .user_id_for_email(&email)?
        .ok_or_else(|| Error::not_found("user", email))
}

async fn run_create(ctx: &mut Context, options: CreateOptions) -> Result<()> {
    // Assigning to someone else goes through the admin area.
    let route = if options.owner.is_some() {
        Route::AdminUsersTasks
    } else {
        Route::AllTasks
    };
    let viewer = ctx.enter(route).await?;
    let owner = match options.owner.as_deref() {
        Some(raw) => Some(resolve_owner(ctx, raw)?),
        None => None,
    };

    let fields = NewTask {
        title: options.title,
        description: options.description,
        priority: options.priority.as_deref().map(str::parse::<Priority>).transpose()?,
        due_date: options.due.as_deref().map(parse_date).transpose()?,
        remarks: options.remarks,
        owner,
    };
    let task = ctx.app.tasks().create_task(&viewer, fields).await?;
    ctx.event(EventKind::TaskCreated, Some(viewer.user_id()), &task)?;

    let human = task_output("Task created", &task);
    emit_success(ctx.output, "task create", &task, Some(&human))
}

async fn run_list(ctx: &mut Context, options: ListOptions) -> Result<()> {
    let status = options
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()?;
    let route = match status {
        Some(status) => Route::TasksByStatus(status),
        None => Route::AllTasks,
    };
    let viewer = ctx.enter(route).await?;

    let filters = FilterSet {
        date: options.date.as_deref().map(parse_date).transpose()?,
        priority: Choice::from(
            options
                .priority
                .as_deref()
                .map(str::parse::<Priority>)
                .transpose()?,
        ),
        status: Choice::from(status),
        user: Choice::All,
    };
    let zone = ctx.app.config().filters.zone()?;
    let mut query = compose_zoned(&filters, &Scope::Own(viewer.user_id()), zone)?;
    if let Some(limit) = options.limit {
        query = query.with_limit(limit);
    }
    let tasks = ctx.app.tasks().list_tasks(&query).await?;

    let header = match status {
        Some(status) => status.list_title().to_string(),
        None => "All Tasks".to_string(),
    };
    let mut human = HumanOutput::new(format!("{header} ({})", tasks.len()));
    for task in &tasks {
        human.push_detail(task_line(task));
    }
    if tasks.is_empty() {
        human.push_next_step("taskdesk task create \"<title>\"");
    }

    #[derive(Serialize)]
    struct ListReport<'a> {
        filters: &'a FilterSet,
        count: usize,
        tasks: &'a [Task],
    }

    let report = ListReport {
        filters: &filters,
        count: tasks.len(),
        tasks: &tasks,
    };
    emit_success(ctx.output, "task list", &report, Some(&human))
}

async fn run_show(ctx: &mut Context, raw_id: &str) -> Result<()> {
    let id = parse_id(raw_id)?;
    ctx.enter(Route::TaskDetails(id)).await?;
    let details = ctx.app.tasks().task_details(id).await?;

    let mut human = task_output("Task", &details.task);
    if let Some(name) = &details.first_name {
        human.push_summary("owner", name.clone());
    }
    if let Some(department) = &details.department {
        human.push_summary("department", department.clone());
    }
    human.push_summary("created", details.task.created_at.to_rfc3339());
    emit_success(ctx.output, "task show", &details, Some(&human))
}

async fn load(ctx: &mut Context, raw_id: &str) -> Result<(Viewer, Task)> {
    let id = parse_id(raw_id)?;
    let viewer = ctx.enter(Route::TaskDetails(id)).await?;
    let task = ctx.app.tasks().get_task(id).await?;
    Ok((viewer, task))
}

async fn run_advance(ctx: &mut Context, raw_id: &str, target: TaskStatus) -> Result<()> {
    let (viewer, task) = load(ctx, raw_id).await?;
    let updated = ctx.app.tasks().advance_status(&task, target).await?;

    #[derive(Serialize)]
    struct StatusChange<'a> {
        from: TaskStatus,
        to: TaskStatus,
        task: &'a Task,
    }

    ctx.event(
        EventKind::TaskStatusChanged,
        Some(viewer.user_id()),
        StatusChange {
            from: task.status,
            to: updated.status,
            task: &updated,
        },
    )?;
    let human = task_output(&format!("Task moved to {}", updated.status), &updated);
    let command = match target {
        TaskStatus::InProgress => "task start",
        TaskStatus::Completed => "task complete",
        TaskStatus::Pending => "task advance",
    };
    emit_success(ctx.output, command, &updated, Some(&human))
}

async fn run_edit(ctx: &mut Context, raw_id: &str, patch: TaskPatch, command: &str) -> Result<()> {
    let (viewer, task) = load(ctx, raw_id).await?;
    let updated = ctx.app.tasks().update_fields(&task, patch.clone()).await?;
    ctx.event(
        EventKind::TaskEdited,
        Some(viewer.user_id()),
        serde_json::json!({ "task_id": updated.id, "changes": patch }),
    )?;
    let human = task_output("Task updated", &updated);
    emit_success(ctx.output, command, &updated, Some(&human))
}

async fn run_delete(ctx: &mut Context, raw_id: &str, confirmed: bool) -> Result<()> {
    let (viewer, task) = load(ctx, raw_id).await?;
    let pending = ctx.app.tasks().request_delete(task.id);
    if !confirmed {
        let prompt = pending.prompt();
        pending.cancel();
        return Err(Error::ConfirmationRequired(format!(
            "Are you absolutely sure? {prompt}"
        )));
    }
    let deleted = pending.confirm().await?;
    ctx.event(
        EventKind::TaskDeleted,
        Some(viewer.user_id()),
        serde_json::json!({ "task_id": deleted, "title": task.title }),
    )?;

    #[derive(Serialize)]
    struct DeleteReport {
        id: Uuid,
        deleted: bool,
    }

    let mut human = HumanOutput::new(format!("Task deleted: {}", task.title));
    human.push_summary("id", deleted.to_string());
    emit_success(
        ctx.output,
        "task delete",
        &DeleteReport { id: deleted, deleted: true },
        Some(&human),
    )
}
