//! Step-group storage - named snapshots of a step list
//!
//! Groups live in a flat key/value namespace, one serialized group per key.
//! Values are independent JSON strings, so one bad entry never hides the rest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tapcycle_core::{Error, Result, Step};

/// Flat string key/value storage
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&mut self, key: &str, value: String) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    /// Every key, in any order
    fn keys(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// One JSON document mapping key to value, rewritten whole on every change
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub const FILE_NAME: &'static str = "step_groups.json";

    /// Store under `$HOME/.tapcycle`
    pub fn new() -> Result<Self> {
        let home = std::env::var("HOME").map_err(|_| Error::storage("HOME not set"))?;
        Self::with_dir(PathBuf::from(home).join(".tapcycle"))
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::FILE_NAME)
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        let path = self.path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            Error::storage(format!("{} is not a valid store: {}", path.display(), e))
        })
    }

    /// Temp file plus rename, so readers never see a half-written document
    fn write(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let path = self.path();
        let tmp = self.dir.join(format!(".{}.tmp", Self::FILE_NAME));
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, entries)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(key))
    }

    fn put(&mut self, key: &str, value: String) -> Result<()> {
        let mut entries = self.read()?;
        entries.insert(key.to_string(), value);
        self.write(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut entries = self.read()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.read()?.into_keys().collect())
    }
}

/// A named, ordered step list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepGroup {
    pub name: String,
    pub steps: Vec<Step>,
}

pub struct StepGroupStore<S = FileStore> {
    backend: S,
}

impl StepGroupStore<FileStore> {
    /// File-backed store in the default location
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(FileStore::new()?))
    }

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(FileStore::with_dir(dir)?))
    }
}

impl<S: KeyValueStore> StepGroupStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Overwrites any group with the same name
    pub fn save(&mut self, name: &str, steps: &[Step]) -> Result<()> {
        let group = StepGroup {
            name: name.to_string(),
            steps: steps.to_vec(),
        };
        let value = serde_json::to_string(&group)?;
        self.backend.put(name, value)?;
        tracing::debug!(name, steps = steps.len(), "group saved");
        Ok(())
    }

    /// Absent, unreadable and corrupt groups all come back as `None`
    pub fn load(&self, name: &str) -> Option<StepGroup> {
        let raw = match self.backend.get(name) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(name, error = %e, "store unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(group) => Some(group),
            Err(e) => {
                tracing::warn!(name, error = %e, "corrupt group ignored");
                None
            }
        }
    }

    pub fn list_names(&self) -> Result<Vec<String>> {
        let mut names = self.backend.keys()?;
        names.sort();
        Ok(names)
    }

    /// No-op if absent
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.backend.remove(name)
    }

    /// Returns false (and changes nothing) if `old` does not load
    pub fn rename(&mut self, old: &str, new: &str) -> Result<bool> {
        let Some(group) = self.load(old) else {
            return Ok(false);
        };
        if old == new {
            return Ok(true);
        }
        self.save(new, &group.steps)?;
        self.backend.remove(old)?;
        tracing::debug!(old, new, "group renamed");
        Ok(true)
    }
}
