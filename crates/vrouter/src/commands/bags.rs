//! Bag inspection: `show` and `list`.

use serde::Serialize;
use strum::IntoEnumIterator;
use tabled::Tabled;

use vrouter_core::{CommandRunner, DataBag, Reconciler, ResourceType};

use crate::cli::{GlobalOpts, ShowArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Show ────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Entry")]
    entry: String,
}

fn detail(bag: &DataBag) -> String {
    let header = format!(
        "{} (version {}, {} entries)",
        bag.id,
        bag.version,
        bag.len()
    );
    if bag.is_empty() {
        return header;
    }
    let rows: Vec<EntryRow> = bag
        .entries
        .iter()
        .map(|(key, value)| EntryRow {
            key: key.clone(),
            entry: value.to_string(),
        })
        .collect();
    format!("{header}\n{}", output::render_table(&rows))
}

pub fn show<R: CommandRunner>(
    reconciler: &Reconciler<R>,
    args: &ShowArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let bag = reconciler.store().load(util::resource_type(args.resource))?;
    let out = output::render_single(&global.output, &bag, detail, |b| {
        b.keys().cloned().collect::<Vec<_>>().join("\n")
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── List ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct BagSummary {
    resource: ResourceType,
    entries: usize,
    version: u64,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Entries")]
    entries: usize,
    #[tabled(rename = "Version")]
    version: u64,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&BagSummary> for SummaryRow {
    fn from(s: &BagSummary) -> Self {
        Self {
            resource: s.resource.to_string(),
            entries: s.entries,
            version: s.version,
            updated: s.updated_at.map_or_else(
                || "-".into(),
                |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
        }
    }
}

pub fn list<R: CommandRunner>(
    reconciler: &Reconciler<R>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut summaries = Vec::new();
    for resource in ResourceType::iter() {
        let bag = reconciler.store().load(resource)?;
        summaries.push(BagSummary {
            resource,
            entries: bag.len(),
            version: bag.version,
            updated_at: bag.updated_at,
        });
    }
    let out = output::render_list(&global.output, &summaries, |s| SummaryRow::from(s), |s| {
        format!("{}\t{}", s.resource, s.version)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
