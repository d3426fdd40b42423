//! Render command handler.

use tabled::Tabled;

use vrouter_core::{CommandRunner, Reconciler, RenderOptions, TargetOutcome};

use crate::cli::{GlobalOpts, RenderArgs};
use crate::error::CliError;
use crate::output;

use super::apply::yes_no;
use super::util;

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Changed")]
    changed: String,
    #[tabled(rename = "Published")]
    published: usize,
    #[tabled(rename = "Result")]
    result: String,
}

impl From<&TargetOutcome> for OutcomeRow {
    fn from(o: &TargetOutcome) -> Self {
        let (changed, published, result) = match (&o.report, &o.error) {
            (_, Some(error)) => ("-".into(), 0, format!("failed: {error}")),
            (Some(report), None) => (
                yes_no(report.changed),
                report.published.len(),
                report.action.clone().unwrap_or_else(|| "ok".into()),
            ),
            (None, None) => ("-".into(), 0, "-".into()),
        };
        Self {
            target: o.target.to_string(),
            changed,
            published,
            result,
        }
    }
}

pub async fn handle<R: CommandRunner>(
    reconciler: &Reconciler<R>,
    args: RenderArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let owns_vips = reconciler.owns_vips()?;
    let options = if args.force {
        RenderOptions::forced(owns_vips)
    } else {
        RenderOptions::incremental(owns_vips)
    };

    let outcomes = if args.targets.is_empty() {
        reconciler.converge_all(options).await
    } else {
        let mut outcomes = Vec::with_capacity(args.targets.len());
        for target in args.targets.into_iter().map(util::render_target) {
            let outcome = match reconciler.converge(target, options).await {
                Ok(report) => TargetOutcome {
                    target,
                    report: Some(report),
                    error: None,
                },
                Err(e) => TargetOutcome {
                    target,
                    report: None,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    };

    let out = output::render_list(&global.output, &outcomes, |o| OutcomeRow::from(o), |o| {
        o.target.to_string()
    })?;
    output::print_output(&out, global.quiet);

    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| o.error.is_some())
        .map(|o| o.target.to_string())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::RenderFailed {
            count: failed.len(),
            targets: failed.join(", "),
        })
    }
}
