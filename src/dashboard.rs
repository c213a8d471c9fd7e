//! Dashboard and summary views.

use chrono::{Datelike, Months, NaiveDate, Weekday};
use serde::Serialize;
use tracing::warn;

use crate::app::App;
use crate::error::Result;
use crate::filter::{compose, FilterSet, Scope};
use crate::guard::Viewer;
use crate::task::{Task, TaskCounts};

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub greeting_name: String,
    pub counts: TaskCounts,
    pub latest: Vec<Task>,
    /// More tasks exist than `latest` shows.
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announcement: Option<String>,
    /// Next scheduled purge of old task data.
    pub next_purge: NaiveDate,
}

pub async fn load_dashboard(app: &App, viewer: &Viewer, today: NaiveDate) -> Result<DashboardView> {
    let query = compose(&FilterSet::default(), &Scope::Own(viewer.user_id()))?;
    let tasks = app.tasks().list_tasks(&query).await?;
    let counts = TaskCounts::tally(&tasks);
    let limit = app.config().tasks.latest_limit;
    let has_more = tasks.len() > limit;
    let latest = tasks.into_iter().take(limit).collect();

    let greeting_name = match app.profiles().resolve_profile(viewer.user_id()).await {
        Ok(profile) => profile.display_name().to_string(),
        Err(_) => "User".to_string(),
    };

    let announcement = match app.backend().select_announcement().await {
        Ok(announcement) => announcement
            .as_ref()
            .and_then(|announcement| announcement.banner())
            .map(str::to_string),
        Err(err) => {
            warn!(error = %err, "announcement unavailable");
            None
        }
    };

    Ok(DashboardView {
        greeting_name,
        counts,
        latest,
        has_more,
        announcement,
        next_purge: next_purge_date(today),
    })
}

/// Counts across every user visible to the caller.
pub async fn task_summary(app: &App) -> Result<TaskCounts> {
    app.backend().all_task_counts().await
}

/// First Saturday of the month containing `day`.
pub fn first_saturday(day: NaiveDate) -> NaiveDate {
    let first = day.with_day(1).unwrap_or(day);
    let offset = (7 + Weekday::Sat.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + chrono::Duration::days(i64::from(offset))
}

/// The purge day on or after `today`: this month's first Saturday, or next month's.
pub fn next_purge_date(today: NaiveDate) -> NaiveDate {
    let this_month = first_saturday(today);
    if today <= this_month {
        return this_month;
    }
    match today.with_day(1).and_then(|first| first.checked_add_months(Months::new(1))) {
        Some(next_month) => first_saturday(next_month),
        None => this_month,
    }
}
