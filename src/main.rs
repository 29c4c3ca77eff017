//! switchbridge - hardware switch to action bridge
//!
//! Run with `switchbridge` or `switchbridge daemon` to start the daemon.
//! Use `switchbridge check` to diagnose root and device access.
//! Use `switchbridge devices` to find the switch's input node.

use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use switchbridge::bridge::event::{decode_all, InputEvent, SwitchFilter};
use switchbridge::config::{self, Config, RelayMode};
use switchbridge::{daemon, Cli, Commands, OutputFormat, RelayArg};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("switchbridge={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(device) = cli.device {
        config.device.path = device;
    }
    if let Some(relay) = cli.relay {
        config.relay.mode = match relay {
            RelayArg::Auto => RelayMode::Auto,
            RelayArg::Always => RelayMode::Always,
            RelayArg::Never => RelayMode::Never,
        };
    }

    // Run the appropriate command
    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = daemon::Daemon::new(config);
            daemon.run().await?;
        }

        Commands::Check => {
            run_check(&config, cli.config.as_deref())?;
        }

        Commands::Devices => {
            run_devices(&config)?;
        }

        Commands::Decode { file, all, format } => {
            decode_file(&config, &file, all, format)?;
        }

        Commands::Config => {
            show_config(&config, cli.config.as_deref())?;
        }

        Commands::Status { follow, format } => {
            run_status(&config, follow, format).await?;
        }
    }

    Ok(())
}

/// Run the check command
#[cfg(any(target_os = "linux", target_os = "android"))]
fn run_check(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    let shell = std::sync::Arc::new(switchbridge::RootShell::new(&config.shell));
    let config_path = path.map(Path::to_path_buf).or_else(Config::default_path);
    if !switchbridge::check::run_checks(config, config_path.as_deref(), shell) {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn run_check(_config: &Config, _path: Option<&Path>) -> anyhow::Result<()> {
    anyhow::bail!("switchbridge check is only supported on Linux and Android")
}

/// List switch-capable input devices
#[cfg(any(target_os = "linux", target_os = "android"))]
fn run_devices(config: &Config) -> anyhow::Result<()> {
    let scan = switchbridge::devices::find_switch_devices()?;

    if scan.switches.is_empty() {
        println!("No switch devices found.");
    }

    for device in &scan.switches {
        let marker = if device.path == config.device.path {
            " (configured)"
        } else {
            ""
        };
        let codes = device
            .switches
            .iter()
            .map(|code| format!("0x{:02x}", code))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{}{}", device.path.display(), marker);
        println!("  name:     {}", device.name);
        println!("  switches: {}", codes);
        if device.supports(config.device.event_code) {
            println!("  \x1b[32m✓\x1b[0m reports code 0x{:02x}", config.device.event_code);
        }
    }

    if !scan.denied.is_empty() {
        println!(
            "\n{} device(s) could not be opened; run 'switchbridge check' or retry as root.",
            scan.denied.len()
        );
    }

    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn run_devices(_config: &Config) -> anyhow::Result<()> {
    anyhow::bail!("switchbridge devices is only supported on Linux and Android")
}

/// One decoded record as printed by `decode --format json`
#[derive(Serialize)]
struct DecodedRecord {
    #[serde(flatten)]
    event: InputEvent,
    time: Option<String>,
    /// Switch state, for records matching the configured switch
    switch: Option<bool>,
}

fn format_timestamp(event: &InputEvent) -> Option<String> {
    let nanos = u32::try_from(event.microseconds).ok()?.checked_mul(1000)?;
    chrono::DateTime::<chrono::Utc>::from_timestamp(i64::try_from(event.seconds).ok()?, nanos)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
}

/// Decode a capture of raw input event records
fn decode_file(
    config: &Config,
    path: &Path,
    all: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)?;
    let (events, trailing) = decode_all(&bytes);
    let filter = SwitchFilter {
        event_type: config.device.event_type,
        event_code: config.device.event_code,
    };

    for event in &events {
        let switched = filter.apply(event);
        if switched.is_none() && !all {
            continue;
        }

        let record = DecodedRecord {
            event: *event,
            time: format_timestamp(event),
            switch: switched.map(|s| s.is_on),
        };

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&record)?),
            OutputFormat::Text => {
                let time = record
                    .time
                    .clone()
                    .unwrap_or_else(|| format!("{}.{:06}", event.seconds, event.microseconds));
                let state = match record.switch {
                    Some(true) => "  switch on",
                    Some(false) => "  switch off",
                    None => "",
                };
                println!(
                    "{}  type 0x{:02x}  code 0x{:02x}  value {}{}",
                    time, event.kind, event.code, event.value, state
                );
            }
        }
    }

    if trailing > 0 {
        tracing::warn!(
            "Ignored {} trailing bytes (not a whole {}-byte record)",
            trailing,
            switchbridge::bridge::event::INPUT_EVENT_SIZE
        );
    }

    Ok(())
}

/// Run the status command - show current daemon state
async fn run_status(config: &Config, follow: bool, format: OutputFormat) -> anyhow::Result<()> {
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: state_file is not configured.");
        eprintln!();
        eprintln!("To enable status monitoring, add to your config.toml:");
        eprintln!();
        eprintln!("  state_file = \"auto\"");
        std::process::exit(1);
    };

    let print_state = |state: &str| match format {
        OutputFormat::Json => println!("{}", format_state_json(state)),
        OutputFormat::Text => println!("{}", state),
    };

    let read_state = |path: &PathBuf| {
        std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "stopped".to_string())
    };

    let state = read_state(&state_path);
    print_state(&state);

    if !follow {
        return Ok(());
    }

    // Follow mode: watch for changes using inotify
    use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
    use std::sync::mpsc::{channel, RecvTimeoutError};
    use std::time::Duration;

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    // Watch the state file's parent directory (file may not exist yet)
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
    }

    let mut last_state = state;

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_event)) => {
                let new_state = read_state(&state_path);
                if new_state != last_state {
                    print_state(&new_state);
                    last_state = new_state;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {:?}", e);
            }
            Err(RecvTimeoutError::Timeout) => {
                // Check if file was deleted (daemon stopped)
                if !state_path.exists() && last_state != "stopped" {
                    print_state("stopped");
                    last_state = "stopped".to_string();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                break;
            }
        }
    }

    Ok(())
}

/// Format state as JSON for status bar consumption
fn format_state_json(state: &str) -> String {
    let (text, class, tooltip) = match state {
        "on" => ("ON", "on", "Switch is on"),
        "off" => ("OFF", "off", "Switch is off"),
        "ready" => ("--", "ready", "switchbridge ready, waiting for the switch"),
        "stopped" => ("", "stopped", "switchbridge not running"),
        _ => ("?", "unknown", "Unknown state"),
    };

    serde_json::json!({ "text": text, "class": class, "tooltip": tooltip }).to_string()
}

/// Show current configuration
fn show_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");

    print!("{}", toml::to_string_pretty(config)?);

    if let Some(resolved) = config.resolve_state_file() {
        println!("\n# state_file resolves to: {:?}", resolved);
    }
    println!("# relay files: {:?}", config.relay_dir());

    println!("\n---");
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(Config::default_path)
        .unwrap_or_else(|| PathBuf::from("(not found)"));
    println!("Config file: {:?}", config_path);

    Ok(())
}
