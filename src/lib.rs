//! switchbridge: hardware switch to action bridge
//!
//! This library provides the core functionality for:
//! - Keeping a persistent privileged shell and knowing when its commands finish
//! - Making the switch's input device readable (chmod + live SELinux policy patch)
//! - Relaying device records through a root-maintained mirror file when the
//!   sandbox forbids opening the device at all
//! - Watching the device for writes and decoding the 24-byte input event records
//! - Delivering on/off transitions to a single replaceable handler
//!
//! # Architecture
//!
//! ```text
//!                       ┌──────────────────────────────┐
//!                       │            Daemon            │
//!                       └──────────────────────────────┘
//!                          │                       ▲
//!                          │ open                  │ SwitchEvent (mpsc)
//!                          ▼                       │
//!                 ┌──────────────────────────────────────────┐
//!                 │               SwitchBridge               │
//!                 │  DeviceAccess ─▶ DeviceStream ─▶ Filter  │
//!                 │        │              ▲          │       │
//!                 │        │        EventWatcher     ▼       │
//!                 │        │         (notify)  CallbackSlot  │
//!                 │        │              ▲                  │
//!                 │        │           Relay (optional)      │
//!                 └────────┼──────────────┼──────────────────┘
//!                          ▼              ▼
//!                 ┌──────────────────────────────┐
//!                 │   RootShell (persistent su)  │ ◀── Action::apply
//!                 └──────────────────────────────┘
//! ```

pub mod action;
pub mod bridge;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod check;
pub mod cli;
pub mod config;
pub mod daemon;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod devices;
pub mod error;
pub mod shell;

pub use action::Action;
pub use bridge::event::{InputEvent, SwitchEvent};
pub use bridge::{SwitchBridge, SwitchHandler};
pub use cli::{Cli, Commands, OutputFormat, RelayArg};
pub use config::Config;
pub use error::{BridgeError, Result, ShellError};
pub use shell::{PrivilegedShell, RootShell};
