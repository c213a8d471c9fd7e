//! taskdesk dashboard

use super::{today, Context};
use crate::dashboard::load_dashboard;
use crate::error::Result;
use crate::guard::Route;
use crate::output::{emit_success, HumanOutput};

pub async fn run(ctx: &mut Context) -> Result<()> {
    let viewer = ctx.enter(Route::Dashboard).await?;
    let view = load_dashboard(&ctx.app, &viewer, today()).await?;

    let mut human = HumanOutput::new(format!("Welcome back, {}", view.greeting_name));
    if let Some(announcement) = &view.announcement {
        human.push_warning(format!("Announcement: {announcement}"));
    }
    human.push_summary("total", view.counts.total_tasks.to_string());
    human.push_summary("pending", view.counts.pending_tasks.to_string());
    human.push_summary("in progress", view.counts.in_progress_tasks.to_string());
    human.push_summary("completed", view.counts.completed_tasks.to_string());
    human.push_summary("next data purge", view.next_purge.to_string());
    for task in &view.latest {
        human.push_detail(format!("{} [{}] {}", task.id, task.status, task.title));
    }
    if view.latest.is_empty() {
        human.push_next_step("taskdesk task create \"<title>\"");
    }
    if view.has_more {
        human.push_next_step("taskdesk task list");
    }

    emit_success(ctx.output, "dashboard", &view, Some(&human))
}
