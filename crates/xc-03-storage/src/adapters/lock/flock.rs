//! Advisory `fs2` lock on the node's data directory.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::errors::StorageError;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Cannot open lock file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    /// `holder` is the pid recorded by the owning node, when readable.
    #[error("Data directory {} is held by node process {}", .path.display(), .holder.map_or_else(|| "?".to_string(), |p| p.to_string()))]
    Held { holder: Option<u32>, path: PathBuf },

    #[error("Cannot record pid in lock file: {0}")]
    Record(io::Error),
}

impl From<LockError> for StorageError {
    fn from(err: LockError) -> Self {
        StorageError::DatabaseLocked(err.to_string())
    }
}

/// One node per data directory; the lock lives as long as this value.
pub struct DatabaseLock {
    file: File,
    path: PathBuf,
}

impl DatabaseLock {
    pub const FILE_NAME: &'static str = "xc-node.lock";

    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        let path = data_dir.join(Self::FILE_NAME);
        let open_err = |source| LockError::Open {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(data_dir).map_err(open_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(open_err)?;

        if file.try_lock_exclusive().is_err() {
            let mut recorded = String::new();
            let holder = file
                .read_to_string(&mut recorded)
                .ok()
                .and_then(|_| recorded.trim().parse().ok());
            warn!(path = %path.display(), ?holder, "Data directory already locked");
            return Err(LockError::Held { holder, path });
        }

        file.set_len(0).map_err(LockError::Record)?;
        file.seek(SeekFrom::Start(0)).map_err(LockError::Record)?;
        write!(file, "{}", std::process::id()).map_err(LockError::Record)?;
        file.sync_data().map_err(LockError::Record)?;
        debug!(path = %path.display(), "Data directory locked");

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        #[allow(clippy::incompatible_msrv)]
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}
