//! Read-only checks of published artifacts against the bags.

use std::collections::HashSet;

use serde::Serialize;
use tabled::Tabled;

use vrouter_core::{CommandRunner, DhcpEntry, Reconciler, ResourceType};

use crate::cli::{GlobalOpts, VerifyArgs, VerifyCommand};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, Serialize, Tabled)]
struct MissingReservation {
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Host")]
    host: String,
}

pub fn handle<R: CommandRunner>(
    reconciler: &Reconciler<R>,
    args: &VerifyArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        VerifyCommand::Dhcp => dhcp(reconciler, global),
    }
}

/// Every active reservation in the bag must appear as a `mac,ip` line in
/// the published DHCP hosts file.
fn dhcp<R: CommandRunner>(reconciler: &Reconciler<R>, global: &GlobalOpts) -> Result<(), CliError> {
    let path = &reconciler.config().artifacts.dhcp_hosts;
    let published = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let present: HashSet<(String, String)> = published
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(',');
            Some((fields.next()?.to_owned(), fields.next()?.to_owned()))
        })
        .collect();

    let bag = reconciler.store().load(ResourceType::DhcpEntries)?;
    let mut missing = Vec::new();
    let mut checked = 0;
    for (_, entry) in bag.typed::<DhcpEntry>()? {
        let (Some(ip), Some(mac), true) = (entry.ipv4_address, &entry.mac_address, entry.add) else {
            continue;
        };
        checked += 1;
        if !present.contains(&(mac.to_string(), ip.to_string())) {
            missing.push(MissingReservation {
                ip: ip.to_string(),
                mac: mac.to_string(),
                host: entry.host_name.clone().unwrap_or_else(|| "-".into()),
            });
        }
    }

    if missing.is_empty() {
        if !global.quiet {
            let color = output::should_color(&global.color);
            eprintln!(
                "{} {} reservation(s) present in {}",
                output::success("ok", color),
                checked,
                path.display()
            );
        }
        return Ok(());
    }

    if !global.quiet {
        let color = output::should_color(&global.color);
        eprintln!(
            "{} {} of {checked} reservation(s) not in {}",
            output::danger("missing", color),
            missing.len(),
            path.display()
        );
    }
    let out = output::render_list(&global.output, &missing, MissingReservation::clone, |m| {
        m.ip.clone()
    })?;
    output::print_output(&out, global.quiet);
    Err(CliError::MissingEntries {
        count: missing.len(),
        artifact: path.display().to_string(),
        target: "dhcp".into(),
    })
}
