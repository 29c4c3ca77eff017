// Command-line interface definitions for switchbridge
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "switchbridge")]
#[command(author, version, about = "Bridge a hardware switch input device to actions")]
#[command(long_about = "
switchbridge watches the raw input device of a hardware switch (such as the
one-key low power slider found on some phones) and turns each transition
into an action: battery saver, airplane mode, radios, do not disturb, or any
shell command.

SETUP:
  1. Grant root access when your su manager asks
  2. Run: switchbridge devices (to find the switch's input node)
  3. Set [device] path in ~/.config/switchbridge/config.toml
  4. Run: switchbridge check (to verify access)
  5. Run: switchbridge (to start the daemon)

On systems where apps cannot open input devices even after the permission
patch, switchbridge reads through a root relay (see [relay] in the config).
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the switch's input device (e.g., /dev/input/event4)
    #[arg(long, value_name = "PATH")]
    pub device: Option<std::path::PathBuf>,

    /// Override when to read through the root relay
    #[arg(long, value_enum, value_name = "MODE")]
    pub relay: Option<RelayArg>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Check root access, device permissions and required tools
    Check,

    /// List input devices that report switch events
    Devices,

    /// Decode a capture of raw input event records
    Decode {
        /// File containing back-to-back 24-byte records
        file: std::path::PathBuf,

        /// Show every record, not just the configured switch
        #[arg(long)]
        all: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show current configuration
    Config,

    /// Show daemon status (for status bar integration)
    Status {
        /// Continuously output status changes
        #[arg(long)]
        follow: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RelayArg {
    /// Relay only when the device cannot be opened directly
    Auto,
    /// Always read through the relay
    Always,
    /// Never relay
    Never,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
