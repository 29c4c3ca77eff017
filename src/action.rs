//! Actions the switch can toggle
//!
//! A closed set selected by `[action] type` in the config. Every action is
//! a one-shot privileged command sent to the persistent shell without
//! waiting for it.

use crate::shell::PrivilegedShell;
use serde::{Deserialize, Serialize};

/// What a switch transition does
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Do nothing (the state file is still updated)
    #[default]
    Nothing,
    /// Battery saver
    PowerSaver,
    /// Airplane mode
    Aeroplane,
    MobileData,
    Wifi,
    Bluetooth,
    Nfc,
    /// Do not disturb (total silence while on)
    DoNotDisturb,
    /// Arbitrary commands for the two switch positions
    Command { on: String, off: String },
}

impl Action {
    /// Shell commands implementing the given switch state
    pub fn commands(&self, on: bool) -> Vec<String> {
        let flag = if on { 1 } else { 0 };
        let svc = if on { "enable" } else { "disable" };

        match self {
            Action::Nothing => vec![],
            Action::PowerSaver => vec![format!("settings put global low_power {}", flag)],
            Action::Aeroplane => vec![
                format!("settings put global airplane_mode_on {}", flag),
                format!(
                    "am broadcast -a android.intent.action.AIRPLANE_MODE --ez state {}",
                    on
                ),
            ],
            Action::MobileData => vec![format!("svc data {}", svc)],
            Action::Wifi => vec![format!("svc wifi {}", svc)],
            Action::Bluetooth => vec![format!("svc bluetooth {}", svc)],
            Action::Nfc => vec![format!("svc nfc {}", svc)],
            Action::DoNotDisturb => vec![format!(
                "cmd notification set_dnd {}",
                if on { "on" } else { "off" }
            )],
            Action::Command { on: on_cmd, off } => {
                let command = if on { on_cmd } else { off };
                if command.trim().is_empty() {
                    vec![]
                } else {
                    vec![command.clone()]
                }
            }
        }
    }

    /// Apply the action for the given switch state
    pub fn apply(&self, shell: &dyn PrivilegedShell, on: bool) {
        for command in self.commands(on) {
            if let Err(e) = shell.run_detached(&command) {
                tracing::warn!("{} failed: {}", self.name(), e);
                return;
            }
        }
    }

    /// Human-readable name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Action::Nothing => "nothing",
            Action::PowerSaver => "power saver",
            Action::Aeroplane => "aeroplane mode",
            Action::MobileData => "mobile data",
            Action::Wifi => "wifi",
            Action::Bluetooth => "bluetooth",
            Action::Nfc => "nfc",
            Action::DoNotDisturb => "do not disturb",
            Action::Command { .. } => "custom command",
        }
    }
}
