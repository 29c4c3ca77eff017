//! Setup diagnostics for `switchbridge check`

use crate::bridge::access::DeviceAccess;
use crate::bridge::stream::{DeviceStream, SourceKind};
use crate::config::{Config, RelayMode, DEFAULT_CONFIG};
use crate::shell::PrivilegedShell;
use nix::unistd::{access, geteuid, AccessFlags};
use std::path::Path;
use std::sync::Arc;

/// Print a success message
pub fn print_success(msg: &str) {
    println!("  \x1b[32m✓\x1b[0m {}", msg);
}

/// Print a failure message
pub fn print_failure(msg: &str) {
    println!("  \x1b[31m✗\x1b[0m {}", msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("  \x1b[34mℹ\x1b[0m {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("  \x1b[33m⚠\x1b[0m {}", msg);
}

fn write_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
}

/// First word of a command line (the program to look up on PATH)
fn program_of(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

/// Run all checks, returning whether the bridge should work.
/// A missing config file at `config_path` is created from the template.
pub fn run_checks(
    config: &Config,
    config_path: Option<&Path>,
    shell: Arc<dyn PrivilegedShell>,
) -> bool {
    let mut all_ok = true;
    let device = config.device.path.as_path();

    println!("switchbridge check\n");

    println!("Config:");
    match config_path {
        Some(path) if path.exists() => print_success(&format!("Config file: {:?}", path)),
        Some(path) => match write_default_config(path) {
            Ok(()) => print_success(&format!("Created default config: {:?}", path)),
            Err(e) => print_warning(&format!("Could not create {:?}: {}", path, e)),
        },
        None => print_warning("No config directory available, using defaults"),
    }

    println!("\nProcess:");
    if geteuid().is_root() {
        print_info("Running as root");
    } else {
        print_info(&format!("Running as uid {}", geteuid()));
    }

    println!("\nTools:");
    let mut tools = vec![config.shell.program.as_str(), "pkill"];
    if config.policy.enabled {
        tools.push(program_of(&config.policy.command));
    }
    if config.relay.mode != RelayMode::Never {
        tools.push(config.relay.watcher.as_str());
    }
    for tool in tools {
        match which::which(tool) {
            Ok(path) => print_success(&format!("{} ({})", tool, path.display())),
            Err(_) => {
                print_warning(&format!("{} not found on PATH", tool));
            }
        }
    }

    println!("\nPrivileged shell:");
    if shell.is_available() {
        print_success(&format!("'{}' is available", config.shell.program));
    } else {
        print_failure(&format!("'{}' is not available", config.shell.program));
        print_info("Grant root access to switchbridge in your su manager");
        all_ok = false;
    }

    println!("\nDevice {}:", device.display());
    if device.exists() {
        print_success("Device node is visible");
    } else {
        print_warning("Device node is not visible to this process");
    }

    let bootstrap = DeviceAccess::new(device, &config.policy, Arc::clone(&shell));
    match bootstrap.prepare() {
        Ok(()) => print_success("Access bootstrap succeeded"),
        Err(e) => {
            print_failure(&format!("Access bootstrap failed: {}", e));
            all_ok = false;
        }
    }

    if access(device, AccessFlags::R_OK).is_ok() {
        print_success("Device is readable");
    } else {
        print_warning("Device is not readable");
    }

    match DeviceStream::open(device) {
        Ok(stream) => {
            let kind = match stream.kind() {
                SourceKind::Device => "character device",
                SourceKind::Mirror => "regular file",
            };
            print_success(&format!("Opened directly ({})", kind));
        }
        Err(e) => match config.relay.mode {
            RelayMode::Never => {
                print_failure(&format!("{}", e));
                print_info("Set [relay] mode = \"auto\" to read through the relay");
                all_ok = false;
            }
            RelayMode::Auto | RelayMode::Always => {
                print_warning(&format!("{}", e));
                print_info(&format!(
                    "Will relay through {} in {:?}",
                    config.relay.watcher,
                    config.relay_dir()
                ));
            }
        },
    }

    println!("\n---");
    if all_ok {
        println!("✓ All checks passed! Run 'switchbridge' to start.");
    } else {
        println!("✗ Some checks failed. Please fix the issues above.");
    }

    all_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::fake::RecordingShell;

    #[test]
    fn test_program_of() {
        assert_eq!(program_of("supolicy --live"), "supolicy");
        assert_eq!(program_of("magiskpolicy"), "magiskpolicy");
        assert_eq!(program_of(""), "");
    }

    #[test]
    fn test_write_default_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("switchbridge").join("config.toml");
        write_default_config(&path).unwrap();
        let written: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.device.path, Config::default().device.path);
    }

    #[test]
    fn test_checks_pass_for_readable_file() {
        let device = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.device.path = device.path().to_path_buf();

        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let shell = Arc::new(RecordingShell::new(true, true));
        assert!(run_checks(&config, Some(&config_path), shell.clone()));
        assert!(config_path.exists());
        // A visible device never needs the shell
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn test_checks_fail_without_root() {
        let mut config = Config::default();
        config.device.path = "/nonexistent/event4".into();
        config.relay.mode = RelayMode::Never;

        let shell = Arc::new(RecordingShell::new(false, false));
        assert!(!run_checks(&config, None, shell));
    }
}
