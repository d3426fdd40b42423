use std::fs;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::Shell;

// cli.rs only needs clap and clap_complete, both build-dependencies.
#[path = "src/cli.rs"]
mod cli;

fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir: PathBuf = std::env::var_os("OUT_DIR")
        .expect("OUT_DIR is set by cargo")
        .into();
    let mut cmd = cli::Cli::command();

    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("create man directory");
    write_manpages(&cmd, "vrouter", &man_dir);

    let completion_dir = out_dir.join("completions");
    fs::create_dir_all(&completion_dir).expect("create completions directory");
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        clap_complete::generate_to(shell, &mut cmd, "vrouter", &completion_dir)
            .unwrap_or_else(|e| panic!("{shell} completions: {e}"));
    }
}

/// `vrouter.1`, `vrouter-redundancy.1`, `vrouter-redundancy-promote.1`, ...
fn write_manpages(cmd: &clap::Command, page: &str, dir: &Path) {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd.clone().name(page.to_owned()))
        .render(&mut buf)
        .unwrap_or_else(|e| panic!("render {page}.1: {e}"));
    let path = dir.join(format!("{page}.1"));
    fs::write(&path, buf).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));

    for sub in cmd.get_subcommands().filter(|sub| !sub.is_hide_set()) {
        write_manpages(sub, &format!("{page}-{}", sub.get_name()), dir);
    }
}
