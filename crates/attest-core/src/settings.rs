use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::crypto::KdfParams;
use crate::error::{AttestError, Result};
use crate::paths::settings_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfProfile {
    Interactive,
    Moderate,
    #[default]
    Sensitive,
    Custom { ops: u64, mem: u64 },
}

impl KdfProfile {
    pub fn params(&self) -> Result<KdfParams> {
        let params = match *self {
            KdfProfile::Interactive => KdfParams::INTERACTIVE,
            KdfProfile::Moderate => KdfParams::MODERATE,
            KdfProfile::Sensitive => KdfParams::SENSITIVE,
            KdfProfile::Custom { ops, mem } => KdfParams { ops, mem },
        };
        params
            .validate()
            .map_err(|e| AttestError::Config(format!("kdf: {e}")))?;
        Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_key: String,
    pub kdf: KdfProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_key: "default".into(),
            kdf: KdfProfile::default(),
        }
    }
}

impl Settings {
    /// Settings from `<keys_dir>/settings.json`; a missing file means
    /// defaults.
    pub fn load(keys_dir: &Path) -> Result<Self> {
        let path = settings_path(keys_dir);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let settings: Settings = serde_json::from_slice(&data)
            .map_err(|e| AttestError::Config(format!("{}: {e}", path.display())))?;
        if settings.default_key.is_empty() {
            return Err(AttestError::Config("default_key must not be empty".into()));
        }
        settings.kdf.params()?;
        Ok(settings)
    }
}
