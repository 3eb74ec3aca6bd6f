//! On-disk key pairs.
//!
//! A key named `name` lives in the keys directory as two base64url text
//! files: the encrypted secret key at `<dir>/<name>` and the public key at
//! `<dir>/<name>.public`. Keys are never overwritten in place except by a
//! password change, which swaps in a complete new file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::crypto::PublicKey;
use crate::encoding::CompactEncoding;
use crate::error::{AttestError, Result};
use crate::paths::PUBLIC_KEY_SUFFIX;
use crate::text;
use crate::vault::{EncryptedKeyBlob, GeneratedKey};

const DIR_MODE: u32 = 0o700;
const SECRET_MODE: u32 = 0o400;
const PUBLIC_MODE: u32 = 0o600;

fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.ends_with(PUBLIC_KEY_SUFFIX);
    if bad {
        return Err(AttestError::InvalidKey(format!("invalid key name {name:?}")));
    }
    Ok(())
}

fn public_path_for(secret_path: &Path) -> PathBuf {
    let mut os = secret_path.as_os_str().to_owned();
    os.push(PUBLIC_KEY_SUFFIX);
    PathBuf::from(os)
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AttestError::KeyNotFound(path.to_path_buf()),
        _ => e.into(),
    })
}

fn read_public(path: &Path) -> Result<PublicKey> {
    PublicKey::from_base64(&read_text(path)?)
        .map_err(|e| AttestError::InvalidKey(format!("{}: {e}", path.display())))
}

/// Exclusive create; `mode` applies on unix only.
fn write_new(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    let mut file = options.open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => AttestError::KeyExists(path.to_path_buf()),
        _ => e.into(),
    })?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn secret_key_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn public_key_path(&self, name: &str) -> PathBuf {
        public_path_for(&self.secret_key_path(name))
    }

    fn ensure_dir(&self) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(&self.dir)?;
        debug!(dir = %self.dir.display(), mode = format_args!("{DIR_MODE:o}"), "keys directory ready");
        Ok(())
    }

    /// Write a freshly generated key pair. Fails with `KeyExists` rather
    /// than replace anything already on disk.
    pub fn create(&self, name: &str, key: &GeneratedKey) -> Result<PathBuf> {
        validate_name(name)?;
        self.ensure_dir()?;
        let secret_path = self.secret_key_path(name);
        let public_path = self.public_key_path(name);
        if public_path.exists() {
            return Err(AttestError::KeyExists(public_path));
        }

        write_new(
            &secret_path,
            &text::encode(key.encrypted_secret_key.to_bytes()),
            SECRET_MODE,
        )?;
        if let Err(e) = write_new(&public_path, &key.public_key.to_base64(), PUBLIC_MODE) {
            // Leave no half-written pair behind.
            if let Err(cleanup) = fs::remove_file(&secret_path) {
                warn!(path = %secret_path.display(), error = %cleanup, "cannot remove partial key");
            }
            return Err(e);
        }
        info!(name, public_key = %key.public_key, dir = %self.dir.display(), "key pair written");
        Ok(secret_path)
    }

    pub fn load_secret(&self, name: &str) -> Result<EncryptedKeyBlob> {
        load_secret_file(&self.secret_key_path(name))
    }

    pub fn load_public(&self, name: &str) -> Result<PublicKey> {
        read_public(&self.public_key_path(name))
    }

    /// Atomically swap the encrypted secret for `name`. The public key file
    /// is untouched; the caller is responsible for the blob holding the same
    /// key.
    pub fn replace_secret(&self, name: &str, blob: &EncryptedKeyBlob) -> Result<()> {
        validate_name(name)?;
        let path = self.secret_key_path(name);
        if !path.exists() {
            return Err(AttestError::KeyNotFound(path));
        }
        let mut staging = NamedTempFile::new_in(&self.dir)?;
        staging.write_all(text::encode(blob.to_bytes()).as_bytes())?;
        staging.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(staging.path(), fs::Permissions::from_mode(SECRET_MODE))?;
        }
        staging.persist(&path).map_err(|e| AttestError::Io(e.error))?;
        info!(name, "secret key replaced");
        Ok(())
    }

    /// Every `*.public` key in the directory, sorted by name. Unreadable
    /// entries are skipped.
    pub fn known_keys(&self) -> Result<Vec<(String, PublicKey)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(PUBLIC_KEY_SUFFIX))
            else {
                continue;
            };
            match read_public(&entry.path()) {
                Ok(key) => keys.push((name.to_string(), key)),
                Err(e) => debug!(path = %entry.path().display(), error = %e, "skipping key file"),
            }
        }
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(keys)
    }
}

pub fn load_secret_file(path: &Path) -> Result<EncryptedKeyBlob> {
    let bytes = text::decode(&read_text(path)?)?;
    EncryptedKeyBlob::from_bytes(&bytes)
}

/// Which key a command operates on: a name inside a keys directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLocation {
    pub dir: PathBuf,
    pub name: String,
}

impl KeyLocation {
    /// `-i` argument: a bare name (`release`), a public key file name
    /// (`release.public`), or a path to either. A directory component
    /// replaces `default_dir`.
    pub fn parse(arg: Option<&str>, default_dir: &Path, default_name: &str) -> Result<Self> {
        let Some(arg) = arg else {
            return Ok(Self {
                dir: default_dir.to_path_buf(),
                name: default_name.to_string(),
            });
        };
        let path = Path::new(arg);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AttestError::InvalidKey(format!("invalid key path {arg:?}")))?;
        let name = file_name
            .strip_suffix(PUBLIC_KEY_SUFFIX)
            .unwrap_or(file_name)
            .to_string();
        validate_name(&name)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => default_dir.to_path_buf(),
        };
        Ok(Self { dir, name })
    }

    pub fn store(&self) -> KeyStore {
        KeyStore::new(&self.dir)
    }
}

/// Where the verifier's public key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Literal(PublicKey),
    /// A `.public` file, or a secret key path whose `.public` sibling is read.
    File(PathBuf),
    /// Every `*.public` key in the directory; the one the response claims
    /// is chosen.
    Directory(PathBuf),
}

impl KeySource {
    pub fn parse(arg: &str) -> Result<Self> {
        let path = Path::new(arg);
        if path.is_dir() {
            return Ok(KeySource::Directory(path.to_path_buf()));
        }
        if path.exists() {
            return Ok(KeySource::File(path.to_path_buf()));
        }
        PublicKey::from_base64(arg).map(KeySource::Literal).map_err(|_| {
            AttestError::InvalidKey(format!("{arg:?} is neither a public key nor a key file"))
        })
    }

    /// Reduce to a single key. `claimed` is the key the response says it was
    /// signed with; it only selects among a directory's keys and is still
    /// checked by the verifier.
    pub fn resolve_for(&self, claimed: &PublicKey) -> Result<PublicKey> {
        match self {
            KeySource::Literal(key) => Ok(*key),
            KeySource::File(path) => {
                let is_public = path
                    .to_str()
                    .is_some_and(|p| p.ends_with(PUBLIC_KEY_SUFFIX));
                if is_public {
                    read_public(path)
                } else {
                    read_public(&public_path_for(path))
                }
            }
            KeySource::Directory(dir) => {
                let keys = KeyStore::new(dir).known_keys()?;
                if keys.is_empty() {
                    return Err(AttestError::KeyNotFound(dir.clone()));
                }
                keys.into_iter()
                    .map(|(_, key)| key)
                    .find(|key| key == claimed)
                    .ok_or(AttestError::KeyMismatch)
            }
        }
    }
}
