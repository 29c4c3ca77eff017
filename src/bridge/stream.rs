//! Open handle to the event source
//!
//! The source is either the real character device or the relay mirror file.
//! After each record is read the stream is moved to the current end of data,
//! so trailing EV_SYN records (or records appended while we were busy) are
//! skipped and the next notification starts clean.

use super::event::{InputEvent, INPUT_EVENT_SIZE};
use crate::error::BridgeError;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::os::fd::AsFd;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

/// What kind of file the stream reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The input device node itself
    Device,
    /// A regular file the relay appends records to
    Mirror,
}

/// An open event source
#[derive(Debug)]
pub struct DeviceStream {
    file: File,
    path: PathBuf,
    kind: SourceKind,
}

impl DeviceStream {
    /// Open a device node or mirror file for reading
    pub fn open(path: &Path) -> Result<Self, BridgeError> {
        let file = File::open(path).map_err(|e| BridgeError::DeviceUnopenable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let kind = if file.metadata()?.file_type().is_char_device() {
            SourceKind::Device
        } else {
            SourceKind::Mirror
        };

        tracing::debug!("Opened {:?} as {:?}", path, kind);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            kind,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Read one record, then skip whatever follows it.
    ///
    /// Fewer than 24 bytes is a `ShortRead`; the stream is still moved to
    /// the end so the next read is aligned with fresh data.
    pub fn read_event(&mut self) -> Result<InputEvent, BridgeError> {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        let filled = read_full(&mut self.file, &mut buf);
        self.skip_to_end();

        let filled = filled?;
        InputEvent::from_bytes(&buf[..filled])
    }

    fn skip_to_end(&mut self) {
        let result = match self.kind {
            SourceKind::Mirror => self.file.seek(SeekFrom::End(0)).map(|_| ()),
            SourceKind::Device => drain_readable(&mut self.file),
        };
        if let Err(e) = result {
            tracing::debug!("Failed to skip to end of {:?}: {}", self.path, e);
        }
    }
}

/// Read until the buffer is full, EOF, or an error; return bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, BridgeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if filled > 0 => {
                tracing::debug!("Read stopped after {} bytes: {}", filled, e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Whether `source` has data queued right now
fn has_queued<F: AsFd>(source: &F) -> std::io::Result<bool> {
    let mut fds = [PollFd::new(source.as_fd(), PollFlags::POLLIN)];
    // Zero timeout: only report what is already queued
    let ready = poll(&mut fds, PollTimeout::ZERO)?;
    let readable = fds[0]
        .revents()
        .is_some_and(|revents| revents.contains(PollFlags::POLLIN));
    Ok(ready > 0 && readable)
}

/// Read and discard everything the device has queued, without blocking
fn drain_readable<F: Read + AsFd>(source: &mut F) -> std::io::Result<()> {
    let mut scratch = [0u8; INPUT_EVENT_SIZE * 16];
    while has_queued(&*source)? {
        if source.read(&mut scratch)? == 0 {
            break;
        }
    }
    Ok(())
}
