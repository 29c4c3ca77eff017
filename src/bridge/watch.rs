//! Change notifications on the event source
//!
//! Registers a `notify` watcher on the device (or mirror) path. Every write
//! notification runs the supplied cycle synchronously on the notifier's
//! thread; no queue sits in between, so each cycle reads whatever is at the
//! end of the stream when it runs.

use crate::error::BridgeError;
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// A registered watch; dropping it stops notifications
pub struct EventWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl EventWatcher {
    /// Watch `path` and run `on_write` for every write notification
    pub fn start<F>(path: &Path, on_write: F) -> Result<Self, BridgeError>
    where
        F: Fn() + Send + 'static,
    {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_write(&event) => on_write(),
                Ok(event) => tracing::trace!("Ignoring {:?}", event.kind),
                Err(e) => tracing::warn!("Watch error: {}", e),
            },
            NotifyConfig::default(),
        )?;

        watcher.watch(path, RecursiveMode::NonRecursive)?;
        tracing::debug!("Watching {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether a notification means new data was written
fn is_write(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}
