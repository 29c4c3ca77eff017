//! Device event bridge
//!
//! Turns raw input event records from the switch's character device into
//! boolean switch-state notifications:
//!
//! ```text
//!   DeviceAccess ──▶ DeviceStream (device or relay mirror)
//!                          │
//!   EventWatcher (write) ──┘──▶ read 24 bytes ──▶ SwitchFilter ──▶ CallbackSlot
//! ```
//!
//! The bridge lives until dropped. Dropping it stops the watcher, stops the
//! relay daemon (if any) and removes the relay files.

pub mod access;
pub mod event;
pub mod relay;
pub mod stream;
pub mod watch;

use crate::config::{Config, RelayMode};
use crate::error::BridgeError;
use crate::shell::PrivilegedShell;
use access::DeviceAccess;
use event::{SwitchEvent, SwitchFilter};
use relay::Relay;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use stream::DeviceStream;
use watch::EventWatcher;

/// Handler receiving switch state transitions
pub type SwitchHandler = Arc<dyn Fn(SwitchEvent) + Send + Sync>;

/// Single replaceable handler; the latest assignment wins
#[derive(Default)]
pub struct CallbackSlot {
    handler: RwLock<Option<SwitchHandler>>,
}

impl CallbackSlot {
    pub fn set(&self, handler: Option<SwitchHandler>) {
        match self.handler.write() {
            Ok(mut slot) => *slot = handler,
            Err(poisoned) => *poisoned.into_inner() = handler,
        }
    }

    pub fn is_set(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<SwitchHandler> {
        match self.handler.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Deliver to the handler current at the start of this call.
    /// Returns whether a handler was attached.
    pub fn dispatch(&self, event: SwitchEvent) -> bool {
        // Called outside the lock so the handler may reassign the slot
        match self.current() {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

/// State shared between the bridge owner and the watcher thread
pub struct BridgeCore {
    access: DeviceAccess,
    stream: Mutex<DeviceStream>,
    filter: SwitchFilter,
    slot: CallbackSlot,
}

impl BridgeCore {
    pub fn new(access: DeviceAccess, stream: DeviceStream, filter: SwitchFilter) -> Self {
        Self {
            access,
            stream: Mutex::new(stream),
            filter,
            slot: CallbackSlot::default(),
        }
    }

    /// One read-decode-dispatch cycle, run for every write notification.
    /// Returns the switch event if one was decoded.
    pub fn process_last_event(&self) -> Option<SwitchEvent> {
        let read = match self.stream.lock() {
            Ok(mut stream) => stream.read_event(),
            Err(poisoned) => poisoned.into_inner().read_event(),
        };

        let event = match read {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Failed to read switch event: {}", e);
                // Permissions may have been revoked since startup
                self.access.ensure_ready();
                return None;
            }
        };

        let switched = self.filter.apply(&event)?;
        tracing::info!("Switch event: value {}", event.value);
        if !self.slot.dispatch(switched) {
            tracing::debug!("No switch handler attached, dropping event");
        }
        Some(switched)
    }

    pub fn access(&self) -> &DeviceAccess {
        &self.access
    }

    pub fn slot(&self) -> &CallbackSlot {
        &self.slot
    }
}

/// The bridge root: owns the stream, watcher, and relay for its lifetime
pub struct SwitchBridge {
    core: Arc<BridgeCore>,
    // Field order matters: the watcher stops before the relay is torn down
    watcher: EventWatcher,
    relay: Option<Relay>,
}

impl SwitchBridge {
    /// Bootstrap access, open the device (directly or through the relay),
    /// and start watching it
    pub fn open(config: &Config, shell: Arc<dyn PrivilegedShell>) -> Result<Self, BridgeError> {
        let device = config.device.path.as_path();
        let access = DeviceAccess::new(device, &config.policy, shell.clone());
        if !access.ensure_ready() {
            tracing::warn!("Continuing without confirmed access to {:?}", device);
        }

        let (stream, relay) = match config.relay.mode {
            RelayMode::Never => (DeviceStream::open(device)?, None),
            RelayMode::Always => Self::open_relayed(config, shell)?,
            RelayMode::Auto => match DeviceStream::open(device) {
                Ok(stream) => (stream, None),
                Err(e) => {
                    tracing::info!("{}; falling back to relay", e);
                    Self::open_relayed(config, shell)?
                }
            },
        };

        let filter = SwitchFilter {
            event_type: config.device.event_type,
            event_code: config.device.event_code,
        };
        let source = stream.path().to_path_buf();
        let core = Arc::new(BridgeCore::new(access, stream, filter));

        let watched = Arc::clone(&core);
        let watcher = EventWatcher::start(&source, move || {
            watched.process_last_event();
        })?;

        tracing::info!("Listening for switch events on {:?}", source);

        Ok(Self {
            core,
            watcher,
            relay,
        })
    }

    fn open_relayed(
        config: &Config,
        shell: Arc<dyn PrivilegedShell>,
    ) -> Result<(DeviceStream, Option<Relay>), BridgeError> {
        let relay = Relay::start(&config.device.path, &config.relay, &config.relay_dir(), shell)?;
        let stream = DeviceStream::open(relay.mirror())?;
        Ok((stream, Some(relay)))
    }

    /// Check or re-establish device access; see [`DeviceAccess::ensure_ready`]
    pub fn ensure_ready(&self) -> bool {
        self.core.access().ensure_ready()
    }

    /// Attach, replace or (with None) detach the switch handler
    pub fn set_switch_handler(&self, handler: Option<SwitchHandler>) {
        self.core.slot().set(handler);
    }

    /// Path actually being watched and read
    pub fn source_path(&self) -> &Path {
        self.watcher.path()
    }

    pub fn is_relayed(&self) -> bool {
        self.relay.is_some()
    }
}
