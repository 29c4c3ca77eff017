//! Device access bootstrap
//!
//! Prepares the switch's character device for an unprivileged reader:
//! - Make the device node readable by all (`chmod a+r`)
//! - Patch the SELinux policy so the caller's domain may search the device
//!   directory and getattr/read/open the character device
//!
//! All other input devices stay unreadable without root.

use crate::config::PolicyConfig;
use crate::error::BridgeError;
use crate::shell::{quote, PrivilegedShell};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Makes the device node readable for the current process
pub struct DeviceAccess {
    device: PathBuf,
    policy: PolicyConfig,
    shell: Arc<dyn PrivilegedShell>,
}

impl DeviceAccess {
    pub fn new(device: &Path, policy: &PolicyConfig, shell: Arc<dyn PrivilegedShell>) -> Self {
        Self {
            device: device.to_path_buf(),
            policy: policy.clone(),
            shell,
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Check or establish device access, returning whether it is usable.
    ///
    /// Safe to call repeatedly; a visible device node returns immediately
    /// without touching the privileged shell.
    pub fn ensure_ready(&self) -> bool {
        match self.prepare() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Device not ready: {}", e);
                false
            }
        }
    }

    /// Typed form of [`ensure_ready`](Self::ensure_ready)
    pub fn prepare(&self) -> Result<(), BridgeError> {
        // Visible does not mean readable, but once chmod has succeeded it is
        if self.device.exists() {
            return Ok(());
        }

        if !self.shell.is_available() {
            return Err(BridgeError::RootUnavailable);
        }

        let chmod = self.shell.run_sync(&self.chmod_command());
        let patched = match self.policy_command() {
            Some(command) => self.shell.run_sync(&command),
            None => true,
        };

        if chmod && patched {
            tracing::info!("Device {:?} prepared for reading", self.device);
            Ok(())
        } else {
            tracing::debug!("chmod ok: {}, policy ok: {}", chmod, patched);
            Err(BridgeError::PermissionPatchFailed(self.device.clone()))
        }
    }

    /// Command widening read permission on the device node
    pub fn chmod_command(&self) -> String {
        format!("chmod a+r {}", quote(&self.device.to_string_lossy()))
    }

    /// Live policy patch command, or None when patching is disabled
    pub fn policy_command(&self) -> Option<String> {
        if !self.policy.enabled {
            return None;
        }
        let statements = policy_statements(&self.policy.domain, &self.policy.device_type)
            .iter()
            .map(|s| quote(s))
            .collect::<Vec<_>>()
            .join(" ");
        Some(format!("{} {}", self.policy.command, statements))
    }
}

/// Policy statements granting `domain` read access to devices of `device_type`
pub fn policy_statements(domain: &str, device_type: &str) -> Vec<String> {
    vec![
        // directory rule
        format!("allow {} {} dir search", domain, device_type),
        // character device rule
        format!(
            "allow {} {} chr_file {{ getattr read open }}",
            domain, device_type
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::fake::RecordingShell;
    use std::sync::atomic::Ordering;

    fn access(device: &Path, shell: Arc<RecordingShell>) -> DeviceAccess {
        DeviceAccess::new(device, &PolicyConfig::default(), shell)
    }

    #[test]
    fn test_visible_device_skips_shell() {
        let device = tempfile::NamedTempFile::new().unwrap();
        let shell = Arc::new(RecordingShell::new(false, false));
        assert!(access(device.path(), shell.clone()).ensure_ready());
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn test_invisible_device_without_root() {
        let shell = Arc::new(RecordingShell::new(false, true));
        let access = access(Path::new("/nonexistent/event4"), shell.clone());
        assert!(!access.ensure_ready());
        assert!(matches!(access.prepare(), Err(BridgeError::RootUnavailable)));
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn test_invisible_device_is_patched() {
        let shell = Arc::new(RecordingShell::new(true, true));
        let access = access(Path::new("/nonexistent/event4"), shell.clone());
        assert!(access.ensure_ready());

        let commands = shell.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], "chmod a+r '/nonexistent/event4'");
        assert_eq!(
            commands[1],
            "supolicy --live 'allow appdomain input_device dir search' \
             'allow appdomain input_device chr_file { getattr read open }'"
        );
    }

    #[test]
    fn test_failed_patch() {
        let shell = Arc::new(RecordingShell::new(true, false));
        let access = access(Path::new("/nonexistent/event4"), shell.clone());
        assert!(matches!(
            access.prepare(),
            Err(BridgeError::PermissionPatchFailed(_))
        ));

        // Both steps are attempted, then it succeeds once root cooperates
        shell.succeed.store(true, Ordering::SeqCst);
        assert!(access.ensure_ready());
    }

    #[test]
    fn test_policy_disabled() {
        let shell = Arc::new(RecordingShell::new(true, true));
        let policy = PolicyConfig {
            enabled: false,
            ..PolicyConfig::default()
        };
        let access = DeviceAccess::new(Path::new("/nonexistent/event4"), &policy, shell.clone());
        assert!(access.policy_command().is_none());
        assert!(access.ensure_ready());
        assert_eq!(shell.commands().len(), 1);
    }
}
