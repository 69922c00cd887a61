//! Snapshots of the application state.
//!
//! The state is written to `<path>.tmp` first, synced and then renamed over
//! `<path>`, so readers see either the old or the new snapshot.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::app::ShutterApp;
use crate::utilities::encoding::{self, EncodingError};

/// Default minimum time between two snapshots.
pub const DEFAULT_PERSIST_MIN_DURATION: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("no snapshot path configured")]
    NoPath,
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Where and how often the application state is written. Not part of the snapshot.
#[derive(Clone, Debug)]
pub struct Persister {
    path: PathBuf,
    min_duration: Duration,
    last_saved: Instant,
}

impl Persister {
    pub fn new<P: Into<PathBuf>>(path: P, min_duration: Duration) -> Self {
        Persister {
            path: path.into(),
            min_duration,
            last_saved: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A zero minimum duration persists on every commit.
    fn is_due(&self) -> bool {
        self.min_duration.is_zero() || self.last_saved.elapsed() > self.min_duration
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Writes `bytes` to `path` via a freshly created, owner-only temp file.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    match std::fs::remove_file(&tmp) {
        Ok(()) => log::warn!("Removed stale snapshot file {}", tmp.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl ShutterApp {
    /// Loads the state from `path`, or starts empty if there is no snapshot yet.
    pub fn load_from_file<P: Into<PathBuf>>(path: P, min_duration: Duration) -> Result<Self> {
        let path = path.into();
        let mut app = match std::fs::read(&path) {
            Ok(bytes) => {
                let app = Self::from_snapshot_bytes(&bytes)?;
                log::info!(
                    "Loaded shutter app from {} at height {}",
                    path.display(),
                    app.last_block_height
                );
                app
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No snapshot at {}, starting with empty state", path.display());
                ShutterApp::new()
            }
            Err(err) => return Err(err.into()),
        };
        // the freshly loaded state is not written again right away
        app.persister = Some(Persister::new(path, min_duration));
        Ok(app)
    }

    pub fn to_snapshot_bytes(&self) -> Result<Vec<u8>> {
        Ok(encoding::encode(self)?)
    }

    pub fn from_snapshot_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(encoding::decode(bytes)?)
    }

    pub fn persist_to_disk(&mut self) -> Result<()> {
        let bytes = self.to_snapshot_bytes()?;
        let persister = self.persister.as_mut().ok_or(PersistenceError::NoPath)?;
        log::info!("Persisting state at height {}", self.last_block_height);
        persister.last_saved = Instant::now();
        write_atomically(&persister.path, &bytes)
    }

    /// Persists if a path is configured and the minimum duration has passed.
    pub fn maybe_persist(&mut self) -> Result<bool> {
        match &self.persister {
            Some(persister) if persister.is_due() => {
                self.persist_to_disk()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
