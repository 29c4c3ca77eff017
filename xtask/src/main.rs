//! Development tasks for switchbridge
//!
//! Usage:
//!   cargo xtask install              Install release binary to /usr/local/bin (requires sudo)
//!   cargo xtask uninstall            Remove binary from /usr/local/bin (requires sudo)
//!   cargo xtask dist [--target T]    Build release binary for distribution
//!   cargo xtask man                  Generate man pages

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const INSTALL_PATH: &str = "/usr/local/bin/switchbridge";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() {
        print_help();
        return ExitCode::SUCCESS;
    }

    // --target <triple> for cross builds (e.g. aarch64-linux-android)
    let target = args
        .iter()
        .position(|a| a == "--target")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str);

    let result = match args[0].as_str() {
        "install" => install(),
        "uninstall" => uninstall(),
        "dist" => dist(target),
        "man" => man(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    eprintln!(
        r#"
switchbridge development tasks

Usage: cargo xtask <COMMAND> [OPTIONS]

Commands:
  install    Build release binary and install to /usr/local/bin (requires sudo)
  uninstall  Remove switchbridge from /usr/local/bin (requires sudo)
  dist       Build optimized release binary for distribution
  man        Generate man pages into target/man

Options:
  --target <TRIPLE>  Cross-compile (dist only), e.g. aarch64-linux-android

Examples:
  cargo xtask install
  cargo xtask dist --target aarch64-linux-android
  cargo xtask uninstall
"#
    );
}

/// Get the project root directory
fn project_root() -> anyhow::Result<PathBuf> {
    let dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => env::current_dir()?,
    };

    // xtask is in a subdirectory, go up one level
    Ok(dir.parent().unwrap_or(&dir).to_path_buf())
}

fn cargo_build(root: &Path, target: Option<&str>) -> anyhow::Result<PathBuf> {
    let mut args = vec!["build", "--release"];
    if let Some(target) = target {
        args.push("--target");
        args.push(target);
    }

    let status = Command::new("cargo")
        .args(&args)
        .current_dir(root)
        .status()?;

    if !status.success() {
        anyhow::bail!("Build failed");
    }

    let binary = match target {
        Some(target) => root.join("target").join(target).join("release/switchbridge"),
        None => root.join("target/release/switchbridge"),
    };
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }
    Ok(binary)
}

/// Build release binary and install to /usr/local/bin
fn install() -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Building release binary...");
    let binary = cargo_build(&root, None)?;

    println!("==> Installing to {}...", INSTALL_PATH);

    let status = Command::new("sudo")
        .arg("install")
        .arg("-Dm755")
        .arg(&binary)
        .arg(INSTALL_PATH)
        .status()?;

    if !status.success() {
        anyhow::bail!("Install failed (sudo required)");
    }

    println!("==> Installed successfully!");
    println!();
    println!("Installed: {}", INSTALL_PATH);

    // Show version
    let _ = Command::new(INSTALL_PATH).arg("--version").status();

    Ok(())
}

/// Remove switchbridge from /usr/local/bin
fn uninstall() -> anyhow::Result<()> {
    println!("==> Removing {}...", INSTALL_PATH);

    let status = Command::new("sudo")
        .args(["rm", "-f", INSTALL_PATH])
        .status()?;

    if !status.success() {
        anyhow::bail!("Uninstall failed (sudo required)");
    }

    println!("==> Uninstalled successfully!");
    Ok(())
}

/// Build optimized release binary for distribution
fn dist(target: Option<&str>) -> anyhow::Result<()> {
    let root = project_root()?;

    match target {
        Some(target) => println!("==> Building distribution binary for {}...", target),
        None => println!("==> Building distribution binary..."),
    }

    let binary = cargo_build(&root, target)?;
    println!("==> Built: {:?}", binary);

    // Show binary info
    let _ = Command::new("ls").arg("-lh").arg(&binary).status();

    Ok(())
}

/// Generate man pages (build.rs renders them when asked via the environment)
fn man() -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Generating man pages...");
    let status = Command::new("cargo")
        .args(["build"])
        .env("SWITCHBRIDGE_GEN_MANPAGES", "1")
        .current_dir(&root)
        .status()?;

    if !status.success() {
        anyhow::bail!("Build failed");
    }

    println!("==> Man pages written under target/debug/build/switchbridge-*/out/man");
    Ok(())
}
