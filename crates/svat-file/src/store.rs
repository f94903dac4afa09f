//! JSON file key-value slot.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use svat_core::Result;
use svat_core::error::{Error, StorageError};
use svat_core::traits::KeyValueStore;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn map_io(operation: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |err| StorageError::new(operation, err.to_string()).into()
}

/// On-disk layout of the slot file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SlotFile {
    #[serde(default)]
    entries: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// A [`KeyValueStore`] persisted as a single JSON file.
///
/// Writes replace the file atomically (write to a sibling temp file, then
/// rename) under an exclusive advisory lock on `<file>.lock`, so concurrent
/// processes never observe a torn file. On Unix the file is created with
/// mode `0600`.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the slot was last written, if ever.
    pub fn updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        let _lock = self.lock(false)?;
        Ok(self.read()?.updated_at)
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Take the advisory lock; released when the returned file is dropped.
    fn lock(&self, exclusive: bool) -> Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(map_io("create directory"))?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(map_io("open lock"))?;

        if exclusive {
            lock_file.lock_exclusive().map_err(map_io("lock"))?;
        } else {
            lock_file.lock_shared().map_err(map_io("lock"))?;
        }
        Ok(lock_file)
    }

    fn read(&self) -> Result<SlotFile> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SlotFile::default()),
            Err(e) => return Err(map_io("read")(e)),
        };

        match serde_json::from_str(&json) {
            Ok(slot) => Ok(slot),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt credential file");
                Ok(SlotFile::default())
            }
        }
    }

    fn write(&self, slot: &SlotFile) -> Result<()> {
        let json = serde_json::to_string_pretty(slot)
            .map_err(|e| StorageError::new("serialize", e.to_string()))?;

        let temp = self.temp_path();
        let mut file = create_private(&temp).map_err(map_io("write"))?;
        file.write_all(json.as_bytes()).map_err(map_io("write"))?;
        file.sync_data().map_err(map_io("write"))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(map_io("rename"))?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let lock = self.lock(true)?;
        let mut slot = self.read()?;
        apply(&mut slot.entries);
        slot.updated_at = Some(Utc::now());
        self.write(&slot)?;
        lock.unlock().map_err(map_io("unlock"))?;
        Ok(())
    }
}

fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _lock = self.lock(false)?;
        Ok(self.read()?.entries.remove(key))
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })?;
        debug!("Slot written");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self, key: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
