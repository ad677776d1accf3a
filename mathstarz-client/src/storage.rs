//! File-backed progress storage: one JSON document per user.
//!
//! Writes go to a temporary file that is renamed over the old record, so a
//! crash mid-write leaves the previous snapshot intact.
use mathstarz_game::{ProgressRecord, ProgressStorage, UserId};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt progress record at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileProgressStorage {
    dir: PathBuf,
}

impl FileProgressStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn record_path(&self, user_id: UserId) -> PathBuf {
        self.dir.join(format!("progress_{user_id}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl ProgressStorage for FileProgressStorage {
    type Error = StorageError;

    fn save_progress(&self, record: &ProgressRecord) -> Result<(), Self::Error> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.record_path(record.user_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(record).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        {
            let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
            file.write_all(&json).map_err(io_error(&tmp))?;
            file.sync_all().map_err(io_error(&tmp))?;
        }
        fs::rename(&tmp, &path).map_err(io_error(&path))?;
        log::trace!("Wrote {}", path.display());
        Ok(())
    }

    fn load_progress(&self, user_id: UserId) -> Result<Option<ProgressRecord>, Self::Error> {
        let path = self.record_path(user_id);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| StorageError::Json { path, source })
    }
}
