//! Discovery of switch-capable input devices
//!
//! Used by `switchbridge devices` to help find the right `[device] path`.

use crate::error::BridgeError;
use evdev::{Device, SwitchType};
use std::path::{Path, PathBuf};

/// An input device node that reports switch events
#[derive(Debug, Clone)]
pub struct SwitchDevice {
    pub path: PathBuf,
    pub name: String,
    /// Switch codes the device supports
    pub switches: Vec<u16>,
}

impl SwitchDevice {
    pub fn supports(&self, code: u16) -> bool {
        self.switches.contains(&code)
    }
}

/// Result of probing /dev/input
#[derive(Debug, Default)]
pub struct DeviceScan {
    pub switches: Vec<SwitchDevice>,
    /// Event nodes that could not be opened without more privileges
    pub denied: Vec<PathBuf>,
}

/// Find all /dev/input/event* nodes with switch capability
pub fn find_switch_devices() -> Result<DeviceScan, BridgeError> {
    scan_dir(Path::new("/dev/input"))
}

fn scan_dir(dir: &Path) -> Result<DeviceScan, BridgeError> {
    let mut scan = DeviceScan::default();

    let input_dir = std::fs::read_dir(dir).map_err(|e| BridgeError::DeviceUnopenable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut paths: Vec<PathBuf> = input_dir
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_event_node(path))
        .collect();
    paths.sort();

    for path in paths {
        match Device::open(&path) {
            Ok(device) => {
                let switches: Vec<u16> = device
                    .supported_switches()
                    .map(|set| set.iter().map(|sw: SwitchType| sw.0).collect())
                    .unwrap_or_default();

                if switches.is_empty() {
                    tracing::trace!("{:?} has no switches", path);
                    continue;
                }

                let name = device.name().unwrap_or("unknown").to_string();
                tracing::debug!("Found switch device: {:?} ({})", path, name);
                scan.switches.push(SwitchDevice {
                    path,
                    name,
                    switches,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                scan.denied.push(path);
            }
            Err(e) => {
                // Other errors (device busy, etc.) - just skip
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(scan)
}

fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("event"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_event_node() {
        assert!(is_event_node(Path::new("/dev/input/event4")));
        assert!(!is_event_node(Path::new("/dev/input/mice")));
        assert!(!is_event_node(Path::new("/dev/input/by-path")));
    }

    #[test]
    fn test_scan_skips_non_devices() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("event0"), b"not a device").unwrap();
        std::fs::write(dir.path().join("mouse0"), b"").unwrap();

        let scan = scan_dir(dir.path()).unwrap();
        assert!(scan.switches.is_empty());
        assert!(scan.denied.is_empty());
    }

    #[test]
    fn test_scan_missing_dir() {
        assert!(matches!(
            scan_dir(Path::new("/nonexistent/input")),
            Err(BridgeError::DeviceUnopenable { .. })
        ));
    }

    #[test]
    fn test_supports() {
        let device = SwitchDevice {
            path: PathBuf::from("/dev/input/event4"),
            name: "tri-state-key".to_string(),
            switches: vec![0x13],
        };
        assert!(device.supports(0x13));
        assert!(!device.supports(0x05));
    }
}
