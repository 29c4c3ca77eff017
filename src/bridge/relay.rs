//! Relay for sandboxed readers
//!
//! Newer Android releases stop app processes from opening the input device
//! even after its mode and policy are widened. To work around this, a root
//! watch daemon (`inotifyd` by default) runs a tiny script on every change
//! to the device; the script copies one 24-byte record from the device and
//! appends it to a mirror file that we *can* open. The bridge then watches
//! and reads the mirror exactly as it would the device.

use super::event::INPUT_EVENT_SIZE;
use crate::config::RelayConfig;
use crate::error::BridgeError;
use crate::shell::{quote, PrivilegedShell};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;

/// File name prefix of mirror files
pub const MIRROR_PREFIX: &str = "sb-mirror-";
/// File name prefix of relay scripts (also used to find stale daemons)
pub const SCRIPT_PREFIX: &str = "sb-relay-";

/// A running relay: mirror file, script, and the daemon invoking it.
/// Both files are removed when the relay is dropped.
pub struct Relay {
    mirror: TempPath,
    script: TempPath,
    shell: Arc<dyn PrivilegedShell>,
}

impl Relay {
    /// Install the relay script and start the watch daemon.
    /// Returns once the daemon is confirmed running.
    pub fn start(
        device: &Path,
        config: &RelayConfig,
        cache_dir: &Path,
        shell: Arc<dyn PrivilegedShell>,
    ) -> Result<Self, BridgeError> {
        std::fs::create_dir_all(cache_dir)?;
        clear_stale(cache_dir);
        // Daemons from a previous run in this cache dir append to files we just removed
        let stale = cache_dir.join(SCRIPT_PREFIX);
        shell.run_sync(&format!("pkill -f {} || true", quote(&stale.to_string_lossy())));

        let (mirror, script) = stage_files(device, cache_dir)?;
        let relay = Self {
            mirror,
            script,
            shell,
        };

        let install = format!(
            "chmod 755 {} && chmod 666 {}",
            quote(&relay.script.to_string_lossy()),
            quote(&relay.mirror.to_string_lossy())
        );
        if !relay.shell.run_sync(&install) {
            return Err(BridgeError::ShimStartFailed(
                "could not install relay script".to_string(),
            ));
        }

        if !relay.shell.run_sync(&relay.launch_command(&config.watcher, device)) {
            return Err(BridgeError::ShimStartFailed(format!(
                "'{}' did not start",
                config.watcher
            )));
        }

        tracing::info!(
            "Relaying {:?} through {:?} via {}",
            device,
            relay.mirror,
            config.watcher
        );
        Ok(relay)
    }

    /// Path of the mirror file to watch and read
    pub fn mirror(&self) -> &Path {
        &self.mirror
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Launch the watch daemon in the background and check it is still alive
    fn launch_command(&self, watcher: &str, device: &Path) -> String {
        // inotifyd mask "c": content modified, so our own reads don't retrigger
        format!(
            "{} {} {} >/dev/null 2>&1 & sleep 0.2; kill -0 $!",
            watcher,
            quote(&self.script.to_string_lossy()),
            quote(&format!("{}:c", device.display()))
        )
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        let stop = format!("pkill -f {}", quote(&self.script.to_string_lossy()));
        if let Err(e) = self.shell.run_detached(&stop) {
            tracing::debug!("Failed to stop relay daemon: {}", e);
        }
    }
}

/// Create the mirror and the script in `cache_dir`.
/// Either file is deleted again if a later step fails.
fn stage_files(device: &Path, cache_dir: &Path) -> std::io::Result<(TempPath, TempPath)> {
    let mirror = tempfile::Builder::new()
        .prefix(MIRROR_PREFIX)
        .tempfile_in(cache_dir)?
        .into_temp_path();

    let mut script = tempfile::Builder::new()
        .prefix(SCRIPT_PREFIX)
        .suffix(".sh")
        .tempfile_in(cache_dir)?;
    script.write_all(relay_script(device, &mirror).as_bytes())?;
    script.flush()?;

    // Closed here: the watch daemon cannot exec a file still open for writing
    Ok((mirror, script.into_temp_path()))
}

/// Script body copying exactly one record from `device` onto `mirror`
pub fn relay_script(device: &Path, mirror: &Path) -> String {
    format!(
        "#!{}\ndd if={} bs={} count=1 2>/dev/null >> {}\n",
        script_interpreter(),
        quote(&device.to_string_lossy()),
        INPUT_EVENT_SIZE,
        quote(&mirror.to_string_lossy())
    )
}

fn script_interpreter() -> &'static str {
    if Path::new("/system/bin/sh").exists() {
        "/system/bin/sh"
    } else {
        "/bin/sh"
    }
}

/// Remove mirror and script files left behind by earlier runs
fn clear_stale(cache_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(MIRROR_PREFIX) || name.starts_with(SCRIPT_PREFIX) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => tracing::debug!("Removed stale relay file {}", name),
                Err(e) => tracing::warn!("Failed to remove stale relay file {}: {}", name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::fake::RecordingShell;

    #[test]
    fn test_relay_script_copies_one_record() {
        let script = relay_script(Path::new("/dev/input/event4"), Path::new("/cache/m"));
        assert!(script.starts_with("#!/"));
        assert!(script.contains("dd if='/dev/input/event4' bs=24 count=1"));
        assert!(script.trim_end().ends_with(">> '/cache/m'"));
    }

    #[test]
    fn test_start_installs_and_launches() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("sb-mirror-old"), b"stale").unwrap();
        std::fs::write(dir.path().join("sb-relay-old.sh"), b"stale").unwrap();
        std::fs::write(dir.path().join("unrelated"), b"keep").unwrap();

        let shell = Arc::new(RecordingShell::new(true, true));
        let relay = Relay::start(
            Path::new("/dev/input/event4"),
            &RelayConfig::default(),
            dir.path(),
            shell.clone(),
        )
        .unwrap();

        assert!(!dir.path().join("sb-mirror-old").exists());
        assert!(!dir.path().join("sb-relay-old.sh").exists());
        assert!(dir.path().join("unrelated").exists());

        assert!(relay.mirror().exists());
        assert_eq!(std::fs::metadata(relay.mirror()).unwrap().len(), 0);
        let body = std::fs::read_to_string(relay.script()).unwrap();
        assert!(body.contains(&relay.mirror().to_string_lossy().to_string()));

        let commands = shell.commands();
        let stale = dir.path().join(SCRIPT_PREFIX);
        assert_eq!(
            commands[0],
            format!("pkill -f {} || true", quote(&stale.to_string_lossy()))
        );
        assert!(commands[1].starts_with("chmod 755 "));
        assert!(commands[2].starts_with("inotifyd "));
        assert!(commands[2].contains("'/dev/input/event4:c'"));
        assert!(commands[2].ends_with("kill -0 $!"));

        let (mirror, script) = (relay.mirror().to_path_buf(), relay.script().to_path_buf());
        drop(relay);
        assert!(!mirror.exists());
        assert!(!script.exists());
        assert!(shell.commands().last().unwrap().starts_with("pkill -f "));
    }

    fn leftovers(dir: &Path) -> Vec<std::fs::DirEntry> {
        std::fs::read_dir(dir).unwrap().flatten().collect()
    }

    #[test]
    fn test_start_fails_when_install_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let shell = Arc::new(RecordingShell::new(true, true).fail_on("chmod "));
        let result = Relay::start(
            Path::new("/dev/input/event4"),
            &RelayConfig::default(),
            dir.path(),
            shell.clone(),
        );
        assert!(matches!(result, Err(BridgeError::ShimStartFailed(_))));
        assert!(!shell.commands().iter().any(|c| c.starts_with("inotifyd ")));
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_start_fails_when_daemon_does_not_start() {
        let dir = tempfile::TempDir::new().unwrap();
        let shell = Arc::new(RecordingShell::new(true, true).fail_on("inotifyd "));
        let result = Relay::start(
            Path::new("/dev/input/event4"),
            &RelayConfig::default(),
            dir.path(),
            shell.clone(),
        );
        match result {
            Err(BridgeError::ShimStartFailed(reason)) => assert!(reason.contains("inotifyd")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("relay started although the daemon did not"),
        }

        // The install ran, then the half-started relay was torn down
        let commands = shell.commands();
        assert!(commands.iter().any(|c| c.starts_with("chmod 755 ")));
        let teardown = commands.last().unwrap();
        assert!(teardown.starts_with("pkill -f "));
        assert!(teardown.contains(SCRIPT_PREFIX));
        assert!(!teardown.ends_with("|| true"));
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_staged_files_are_removed_unless_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mirror, script) = stage_files(Path::new("/dev/input/event4"), dir.path()).unwrap();
        assert!(mirror.exists());
        assert!(std::fs::read_to_string(&script)
            .unwrap()
            .contains(&mirror.to_string_lossy().to_string()));

        // An early return after staging drops both paths
        drop(script);
        drop(mirror);
        assert!(leftovers(dir.path()).is_empty());
    }
}
