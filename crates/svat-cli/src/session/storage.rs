//! Location of the persisted credential slot.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use svat_file::FileStore;

const CREDENTIALS_FILE: &str = "credentials.json";

/// Path of the credential file under the platform data directory.
pub fn credentials_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "svat").context("Could not determine data directory")?;

    let data_dir = dirs.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data directory")?;

    Ok(data_dir.join(CREDENTIALS_FILE))
}

/// Open the credential slot shared by every command.
pub fn open_slot() -> Result<FileStore> {
    Ok(FileStore::new(credentials_path()?))
}
