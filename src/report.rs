//! Weekly and monthly task reports.
//!
//! Reports are plain tables: a title, a date range, column names and string
//! rows. The CLI writes them as JSON or aligned text.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Local, Months, NaiveDate, Utc, Weekday};
use serde::Serialize;
use tracing::debug;

use crate::app::App;
use crate::config::DayZone;
use crate::error::{Error, Result};
use crate::filter::{compose_zoned, day_bounds, FilterSet, Predicate, Scope};
use crate::task::{AssignedTask, Task};

pub const PERSONAL_COLUMNS: [&str; 6] = [
    "Title",
    "Description",
    "Status",
    "Priority",
    "Due Date",
    "Created At",
];

pub const DEPARTMENT_COLUMNS: [&str; 6] = [
    "User",
    "Department",
    "Title",
    "Status",
    "Priority",
    "Due Date",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    Month,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Week => f.write_str("week"),
            Period::Month => f.write_str("month"),
        }
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" | "weekly" => Ok(Period::Week),
            "month" | "monthly" => Ok(Period::Month),
            other => Err(Error::InvalidArgument(format!(
                "invalid period '{other}': expected week or month"
            ))),
        }
    }
}

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// The week (starting on `week_start`) or month containing `today`.
pub fn period_range(period: Period, today: NaiveDate, week_start: Weekday) -> DateRange {
    match period {
        Period::Week => {
            let back = (7 + today.weekday().num_days_from_monday()
                - week_start.num_days_from_monday())
                % 7;
            let start = today - Duration::days(i64::from(back));
            DateRange {
                start,
                end: start + Duration::days(6),
            }
        }
        Period::Month => {
            let start = today.with_day(1).unwrap_or(today);
            let end = start
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .unwrap_or(start);
            DateRange { start, end }
        }
    }
}

fn range_instants(range: DateRange, zone: DayZone) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (start, end) = match zone {
        DayZone::Local => (day_bounds(range.start, &Local)?.0, day_bounds(range.end, &Local)?.1),
        DayZone::Fixed(offset) => (
            day_bounds(range.start, &offset)?.0,
            day_bounds(range.end, &offset)?.1,
        ),
    };
    Ok((start, end))
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub period: Period,
    pub range: DateRange,
    pub generated_at: DateTime<Utc>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Report {
    /// Suggested file stem, e.g. `Task_Report_20240603_141500`.
    pub fn file_stem(&self) -> String {
        format!(
            "Task_Report_{}",
            self.generated_at
                .with_timezone(&Local)
                .format("%Y%m%d_%H%M%S")
        )
    }

    pub fn to_text(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (index, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(index) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        let format_row = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut lines = vec![
            self.title.clone(),
            format!("Period: {} to {}", self.range.start, self.range.end),
            String::new(),
            format_row(&self.columns),
            widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("  "),
        ];
        if self.rows.is_empty() {
            lines.push("No tasks in this period.".to_string());
        }
        for row in &self.rows {
            lines.push(format_row(row));
        }
        lines.join("\n")
    }
}

fn or_dash(value: Option<&str>) -> String {
    value
        .filter(|value| !value.trim().is_empty())
        .unwrap_or("-")
        .to_string()
}

fn due(task: &Task) -> String {
    task.due_date
        .map(|date| date.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn personal_row(task: &Task) -> Vec<String> {
    vec![
        task.title.clone(),
        or_dash(task.description.as_deref()),
        task.status.to_string(),
        task.priority.to_string(),
        due(task),
        task.created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
    ]
}

fn department_row(row: &AssignedTask) -> Vec<String> {
    vec![
        or_dash(row.first_name.as_deref()),
        or_dash(row.department.as_deref()),
        row.task.title.clone(),
        row.task.status.to_string(),
        row.task.priority.to_string(),
        due(&row.task),
    ]
}

/// All users, or the members of one department (matched case-insensitively).
pub async fn department_scope(app: &App, department: Option<&str>) -> Result<Scope> {
    let Some(department) = department else {
        return Ok(Scope::AllUsers);
    };
    let members = app
        .backend()
        .select_profiles()
        .await?
        .into_iter()
        .filter(|profile| {
            profile
                .department
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case(department))
        })
        .map(|profile| profile.id)
        .collect();
    Ok(Scope::Members(members))
}

/// The caller's own tasks created in the period.
pub async fn personal_report(app: &App, period: Period, today: NaiveDate) -> Result<Report> {
    let config = app.config();
    let range = period_range(period, today, config.reports.personal_week_start()?);
    let (start, end) = range_instants(range, config.filters.zone()?)?;
    let tasks = app.backend().my_tasks_for_report(start, end).await?;
    debug!(rows = tasks.len(), %period, "personal report");
    Ok(Report {
        title: format!("My Tasks Report ({period})"),
        period,
        range,
        generated_at: Utc::now(),
        columns: PERSONAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: tasks.iter().map(personal_row).collect(),
    })
}

/// Tasks created in the period across users, optionally one department.
pub async fn department_report(
    app: &App,
    period: Period,
    department: Option<&str>,
    today: NaiveDate,
) -> Result<Report> {
    let config = app.config();
    let range = period_range(period, today, config.reports.admin_week_start()?);
    let zone = config.filters.zone()?;
    let (start, end) = range_instants(range, zone)?;

    let scope = department_scope(app, department).await?;
    let query = compose_zoned(&FilterSet::default(), &scope, zone)?
        .and(Predicate::CreatedBetween { start, end });
    let rows = app.backend().tasks_with_profiles(&query).await?;
    debug!(rows = rows.len(), %period, department, "department report");

    let title = match department {
        Some(department) => format!("Task Report: {department} ({period})"),
        None => format!("Task Report: all departments ({period})"),
    };
    Ok(Report {
        title,
        period,
        range,
        generated_at: Utc::now(),
        columns: DEPARTMENT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: rows.iter().map(department_row).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn monday_week_contains_today() {
        // 2024-06-05 is a Wednesday.
        let range = period_range(Period::Week, date(2024, 6, 5), Weekday::Mon);
        assert_eq!(range.start, date(2024, 6, 3));
        assert_eq!(range.end, date(2024, 6, 9));
    }

    #[test]
    fn friday_week_runs_to_thursday() {
        let range = period_range(Period::Week, date(2024, 6, 5), Weekday::Fri);
        assert_eq!(range.start, date(2024, 5, 31));
        assert_eq!(range.end, date(2024, 6, 6));

        let on_friday = period_range(Period::Week, date(2024, 6, 7), Weekday::Fri);
        assert_eq!(on_friday.start, date(2024, 6, 7));
    }

    #[test]
    fn month_range_handles_leap_february() {
        let range = period_range(Period::Month, date(2024, 2, 14), Weekday::Mon);
        assert_eq!(range.start, date(2024, 2, 1));
        assert_eq!(range.end, date(2024, 2, 29));
    }

    #[test]
    fn text_table_aligns_columns() {
        let report = Report {
            title: "My Tasks Report (week)".to_string(),
            period: Period::Week,
            range: DateRange {
                start: date(2024, 6, 3),
                end: date(2024, 6, 9),
            },
            generated_at: Utc::now(),
            columns: vec!["Title".to_string(), "Status".to_string()],
            rows: vec![vec!["Write the quarterly plan".to_string(), "pending".to_string()]],
        };
        let text = report.to_text();
        assert!(text.contains("Title                     Status"));
        assert!(text.contains("Write the quarterly plan  pending"));
        assert!(report.file_stem().starts_with("Task_Report_"));
    }
}
