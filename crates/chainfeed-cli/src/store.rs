//! Local key store and persisted client settings.
//!
//! Keys live as one JSON file per name in the store directory:
//! `{ "address": "<hex>", "secret": "<hex>" }`. Settings that must survive
//! between runs (the program id) live in `config.json` next to them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chainfeed_core::{Address, Keypair, ProgramId};
use serde::{Deserialize, Serialize};
use tracing::info;

const SETTINGS_FILE: &str = "config.json";

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    address: Address,
    secret: String,
}

/// Settings persisted in `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Feed program the client's feed lives under.
    #[serde(default)]
    pub program: Option<ProgramId>,
}

/// Named keypairs stored as files in one directory.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (creating if needed) the store at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create store directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Whether a key called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.key_path(name).exists()
    }

    /// Load the key called `name`.
    pub fn load(&self, name: &str) -> Result<Keypair> {
        let path = self.key_path(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read key {}", path.display()))?;
        let file: KeyFile = serde_json::from_str(&json)
            .with_context(|| format!("malformed key file {}", path.display()))?;

        let mut secret = [0u8; 32];
        hex::decode_to_slice(&file.secret, &mut secret)
            .with_context(|| format!("malformed secret in {}", path.display()))?;
        let keypair = Keypair::from_secret_bytes(&secret);
        if keypair.address() != file.address {
            bail!(
                "key file {} names {} but its secret belongs to {}",
                path.display(),
                file.address,
                keypair.address()
            );
        }
        Ok(keypair)
    }

    /// Save `keypair` as `name`, replacing any existing key.
    pub fn save(&self, name: &str, keypair: &Keypair) -> Result<()> {
        let file = KeyFile {
            address: keypair.address(),
            secret: hex::encode(keypair.secret_bytes()),
        };
        let path = self.key_path(name);
        write_private(&path, &serde_json::to_string_pretty(&file)?)
            .with_context(|| format!("failed to write key {}", path.display()))
    }

    /// Load `name`, generating and saving a fresh key if it does not exist.
    pub fn ensure_exists(&self, name: &str) -> Result<Keypair> {
        if self.contains(name) {
            return self.load(name);
        }
        let keypair = Keypair::generate();
        self.save(name, &keypair)?;
        info!(name, address = %keypair.address().short(), "generated key");
        Ok(keypair)
    }

    /// Read `config.json`, or defaults if it does not exist yet.
    pub fn settings(&self) -> Result<Settings> {
        let path = self.dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("malformed {}", path.display()))
    }

    /// Write `config.json`.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let path = self.dir.join(SETTINGS_FILE);
        fs::write(&path, serde_json::to_string_pretty(settings)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        let key = Keypair::generate();
        store.save("user", &key).unwrap();
        assert_eq!(store.load("user").unwrap().address(), key.address());
    }

    #[test]
    fn ensure_exists_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path().join("nested")).unwrap();
        assert!(!store.contains("payer"));
        let first = store.ensure_exists("payer").unwrap();
        let second = store.ensure_exists("payer").unwrap();
        assert_eq!(first.address(), second.address());
    }

    #[test]
    fn missing_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        assert!(store.load("nobody").is_err());
    }

    #[test]
    fn mismatched_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        let file = KeyFile {
            address: Keypair::generate().address(),
            secret: hex::encode(Keypair::generate().secret_bytes()),
        };
        fs::write(store.key_path("bad"), serde_json::to_string(&file).unwrap()).unwrap();
        assert!(store.load("bad").is_err());
    }

    #[test]
    fn settings_default_then_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        assert_eq!(store.settings().unwrap(), Settings::default());

        let settings = Settings {
            program: Some(Keypair::generate().address()),
        };
        store.save_settings(&settings).unwrap();
        assert_eq!(store.settings().unwrap(), settings);
    }

    #[cfg(unix)]
    #[test]
    fn key_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        store.save("user", &Keypair::generate()).unwrap();
        let mode = fs::metadata(store.key_path("user")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
