//! Daemon module - main event loop orchestration
//!
//! Opens the switch bridge, forwards switch transitions from the watcher
//! thread into the async loop, and applies the configured action.

use crate::bridge::event::SwitchEvent;
use crate::bridge::{SwitchBridge, SwitchHandler};
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::shell::{PrivilegedShell, RootShell};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

/// Capacity of the switch event queue between the watcher and the loop
const EVENT_QUEUE: usize = 16;

/// Write state to file for external integrations (e.g., status bars)
fn write_state_file(path: &PathBuf, state: &str) {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

/// Remove state file on shutdown
fn cleanup_state_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove state file: {}", e);
        }
    }
}

/// Main daemon that ties the bridge to the configured action
pub struct Daemon {
    config: Config,
    shell: Arc<dyn PrivilegedShell>,
    state_file_path: Option<PathBuf>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let shell: Arc<dyn PrivilegedShell> = Arc::new(RootShell::new(&config.shell));
        Self::with_shell(config, shell)
    }

    /// Create a daemon on an existing privileged shell
    pub fn with_shell(config: Config, shell: Arc<dyn PrivilegedShell>) -> Self {
        let state_file_path = config.resolve_state_file();
        Self {
            config,
            shell,
            state_file_path,
        }
    }

    fn update_state(&self, state_name: &str) {
        if let Some(ref path) = self.state_file_path {
            write_state_file(path, state_name);
        }
    }

    /// React to one switch transition
    fn handle_switch(&self, event: SwitchEvent) {
        let state = if event.is_on { "on" } else { "off" };
        tracing::info!("Switch {}, applying {}", state, self.config.action.name());
        self.config.action.apply(self.shell.as_ref(), event.is_on);
        self.update_state(state);
    }

    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting switchbridge daemon");

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            BridgeError::Config(format!("Failed to set up SIGTERM handler: {}", e))
        })?;

        tracing::info!("Device: {:?}", self.config.device.path);
        tracing::info!("Action: {}", self.config.action.name());
        if let Some(ref path) = self.state_file_path {
            tracing::info!("State file: {:?}", path);
        }

        let retry = Duration::from_secs(self.config.daemon.retry_secs.max(1));

        // Open the bridge, retrying until it works or we are told to stop
        let bridge = loop {
            let config = self.config.clone();
            let shell = Arc::clone(&self.shell);
            let attempt = tokio::task::spawn_blocking(move || SwitchBridge::open(&config, shell));

            tokio::select! {
                res = attempt => match res {
                    Ok(Ok(bridge)) => break Some(bridge),
                    Ok(Err(e)) => tracing::warn!("Failed to open switch bridge: {}", e),
                    Err(e) => tracing::error!("Bridge setup task failed: {}", e),
                },
                _ = tokio::signal::ctrl_c() => break None,
                _ = sigterm.recv() => break None,
            }

            tracing::info!("Retrying in {}s", retry.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(retry) => {}
                _ = tokio::signal::ctrl_c() => break None,
                _ = sigterm.recv() => break None,
            }
        };

        let Some(bridge) = bridge else {
            tracing::info!("Shutting down before the bridge was opened");
            return Ok(());
        };

        let (tx, mut rx) = mpsc::channel::<SwitchEvent>(EVENT_QUEUE);
        let handler: SwitchHandler = Arc::new(move |event: SwitchEvent| {
            if let Err(e) = tx.try_send(event) {
                tracing::warn!("Dropping switch event: {}", e);
            }
        });
        bridge.set_switch_handler(Some(handler));

        if bridge.is_relayed() {
            tracing::info!("Reading through relay mirror {:?}", bridge.source_path());
        }
        self.update_state("ready");

        let mut recheck =
            tokio::time::interval(Duration::from_secs(self.config.daemon.recheck_secs.max(1)));
        // The first tick completes immediately; access was just checked
        recheck.tick().await;

        // Main event loop
        loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    tokio::task::block_in_place(|| self.handle_switch(event));
                }

                _ = recheck.tick() => {
                    if !tokio::task::block_in_place(|| bridge.ensure_ready()) {
                        tracing::warn!("Device access check failed");
                    }
                }

                // Handle graceful shutdown (SIGINT from Ctrl+C)
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                // Handle graceful shutdown (SIGTERM from service manager)
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // Stops the watcher and any relay daemon
        bridge.set_switch_handler(None);
        tokio::task::block_in_place(|| drop(bridge));

        // Remove state file on shutdown
        if let Some(ref path) = self.state_file_path {
            cleanup_state_file(path);
        }

        tracing::info!("Daemon stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::shell::fake::RecordingShell;

    fn daemon_in(dir: &tempfile::TempDir, action: Action) -> (Daemon, Arc<RecordingShell>) {
        let config = Config {
            action,
            state_file: Some(dir.path().join("state").to_string_lossy().to_string()),
            ..Config::default()
        };
        let shell = Arc::new(RecordingShell::new(true, true));
        (Daemon::with_shell(config, shell.clone()), shell)
    }

    #[test]
    fn test_state_file_lifecycle() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state");

        write_state_file(&path, "ready");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ready");
        write_state_file(&path, "on");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "on");

        cleanup_state_file(&path);
        assert!(!path.exists());
        // Removing twice is harmless
        cleanup_state_file(&path);
    }

    #[test]
    fn test_handle_switch_applies_action_and_records_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let (daemon, shell) = daemon_in(&dir, Action::Wifi);

        daemon.handle_switch(SwitchEvent { is_on: true });
        assert_eq!(shell.commands(), vec!["svc wifi enable".to_string()]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("state")).unwrap(),
            "on"
        );

        daemon.handle_switch(SwitchEvent { is_on: false });
        assert_eq!(shell.commands()[1], "svc wifi disable");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("state")).unwrap(),
            "off"
        );
    }

    #[test]
    fn test_nothing_action_only_records_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let (daemon, shell) = daemon_in(&dir, Action::Nothing);

        daemon.handle_switch(SwitchEvent { is_on: true });
        assert!(shell.commands().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("state")).unwrap(),
            "on"
        );
    }
}
