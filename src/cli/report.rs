//! taskdesk report

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{today, Context};
use crate::error::Result;
use crate::events::EventKind;
use crate::guard::{Route, Viewer};
use crate::lock::write_atomic;
use crate::output::{emit_success, HumanOutput};
use crate::report::{personal_report, Report};

pub struct ReportOptions {
    pub period: String,
    pub out: Option<PathBuf>,
}

#[derive(Serialize)]
struct ReportResult<'a> {
    #[serde(flatten)]
    report: &'a Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<PathBuf>,
}

/// Resolve the output file. A directory gets the report's default file name.
fn target_path(out: &Path, report: &Report) -> PathBuf {
    if out.is_dir() {
        out.join(format!("{}.txt", report.file_stem()))
    } else {
        out.to_path_buf()
    }
}

fn write_report(path: &Path, report: &Report) -> Result<()> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let mut bytes = if is_json {
        serde_json::to_vec_pretty(report)?
    } else {
        report.to_text().into_bytes()
    };
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Write the report if asked, record the event, and print it.
pub(crate) fn deliver(
    ctx: &mut Context,
    viewer: &Viewer,
    command: &str,
    report: &Report,
    out: Option<&Path>,
) -> Result<()> {
    let written_to = match out {
        Some(out) => {
            let path = target_path(out, report);
            write_report(&path, report)?;
            Some(path)
        }
        None => None,
    };

    ctx.event(
        EventKind::ReportGenerated,
        Some(viewer.user_id()),
        serde_json::json!({
            "title": &report.title,
            "period": report.period,
            "range": report.range,
            "rows": report.rows.len(),
            "path": &written_to,
        }),
    )?;

    let mut human = HumanOutput::new(report.title.clone());
    human.push_summary("from", report.range.start.to_string());
    human.push_summary("to", report.range.end.to_string());
    human.push_summary("rows", report.rows.len().to_string());
    match &written_to {
        Some(path) => human.push_summary("written to", path.display().to_string()),
        None => {
            for line in report.to_text().lines().skip(3) {
                human.push_detail(line.to_string());
            }
        }
    }

    let result = ReportResult { report, written_to };
    emit_success(ctx.output, command, &result, Some(&human))
}

pub async fn run_personal(ctx: &mut Context, options: ReportOptions) -> Result<()> {
    let period = options.period.parse()?;
    let viewer = ctx.enter(Route::Dashboard).await?;
    let report = personal_report(&ctx.app, period, today()).await?;
    deliver(ctx, &viewer, "report", &report, options.out.as_deref())
}
