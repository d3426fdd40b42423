//! Apply command handler.

use std::fmt::Write as _;

use tabled::Tabled;

use vrouter_core::{CommandPayload, CommandRunner, PassReport, Reconciler, RenderReport};

use crate::cli::{ApplyArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
pub(super) struct RenderRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Changed")]
    changed: String,
    #[tabled(rename = "Published")]
    published: usize,
    #[tabled(rename = "Action")]
    action: String,
}

impl From<&RenderReport> for RenderRow {
    fn from(r: &RenderReport) -> Self {
        Self {
            target: r.target.to_string(),
            mode: r.mode.to_string(),
            changed: yes_no(r.changed),
            published: r.published.len(),
            action: r.action.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

pub(super) fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.into()
}

fn detail(report: &PassReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Resource:  {}", report.resource);
    let _ = writeln!(out, "Changed:   {}", yes_no(report.changed));
    let _ = writeln!(out, "Version:   {}", report.version);
    let _ = writeln!(out, "Conflicts: {}", report.conflicts.len());
    if !report.renders.is_empty() {
        let rows: Vec<RenderRow> = report.renders.iter().map(RenderRow::from).collect();
        out.push('\n');
        out.push_str(&output::render_table(&rows));
    }
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle<R: CommandRunner>(
    reconciler: &Reconciler<R>,
    args: ApplyArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let document = util::read_json(args.file.as_deref())?;
    let payload =
        CommandPayload::from_document(document, args.resource.map(util::resource_type))?;
    let resource = payload.resource;

    let report = reconciler.apply(payload).await?;

    let color = output::should_color(&global.color);
    if !global.quiet {
        for conflict in &report.conflicts {
            eprintln!(
                "{} {} {}: {}",
                output::warning("conflict", color),
                resource,
                conflict.key,
                conflict.reason
            );
        }
    }

    let out = output::render_single(&global.output, &report, detail, |r| {
        r.version.to_string()
    })?;
    output::print_output(&out, global.quiet);

    if report.conflicts.is_empty() {
        Ok(())
    } else {
        Err(CliError::Conflicts {
            resource: resource.to_string(),
            count: report.conflicts.len(),
        })
    }
}
