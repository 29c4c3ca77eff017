//! Build script for switchbridge
//!
//! Renders roff man pages from the clap definitions in `src/cli.rs`:
//! `switchbridge.1` plus `switchbridge-<subcommand>.1` for each subcommand.
//! Pages are written to `$OUT_DIR/man` on release builds, or on any build
//! with `SWITCHBRIDGE_GEN_MANPAGES` set (`cargo xtask man` does this).

use clap::CommandFactory;
use clap_mangen::Man;
use std::env;
use std::fs::File;
use std::io::Error;
use std::path::{Path, PathBuf};

include!("src/cli.rs");

const GEN_ENV: &str = "SWITCHBRIDGE_GEN_MANPAGES";

fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed={}", GEN_ENV);

    let release = env::var("PROFILE").is_ok_and(|profile| profile == "release");
    if !release && env::var_os(GEN_ENV).is_none() {
        return Ok(());
    }

    let out_dir = env::var_os("OUT_DIR").map_or_else(|| PathBuf::from("target"), PathBuf::from);
    let man_dir = out_dir.join("man");
    std::fs::create_dir_all(&man_dir)?;

    let cli = Cli::command();
    render(&man_dir, "switchbridge", cli.clone())?;

    let pages = cli
        .get_subcommands()
        .filter(|sub| sub.get_name() != "help")
        .map(|sub| render(&man_dir, &format!("switchbridge-{}", sub.get_name()), sub.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    println!(
        "cargo:warning={} man pages generated in: {}",
        pages.len() + 1,
        man_dir.display()
    );

    Ok(())
}

/// Write one page as `<dir>/<name>.1`
fn render(dir: &Path, name: &str, cmd: clap::Command) -> Result<PathBuf, Error> {
    let path = dir.join(format!("{}.1", name));
    Man::new(cmd).render(&mut File::create(&path)?)?;
    Ok(path)
}
