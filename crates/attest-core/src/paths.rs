use directories::BaseDirs;
use std::path::{Path, PathBuf};

use crate::error::{AttestError, Result};

pub const KEYS_DIR_ENV: &str = "ATTEST_KEYS_DIR";
pub const DEFAULT_DIR_NAME: &str = ".attest";
pub const SETTINGS_FILE: &str = "settings.json";
pub const PUBLIC_KEY_SUFFIX: &str = ".public";

/// `$ATTEST_KEYS_DIR`, else `~/.attest`.
pub fn default_keys_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(KEYS_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let dirs = BaseDirs::new()
        .ok_or_else(|| AttestError::Config("cannot determine home directory".into()))?;
    Ok(dirs.home_dir().join(DEFAULT_DIR_NAME))
}

pub fn settings_path(keys_dir: &Path) -> PathBuf {
    keys_dir.join(SETTINGS_FILE)
}
