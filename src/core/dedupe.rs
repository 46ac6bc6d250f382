//! Per-target record of listing ids that have already been observed.
//!
//! The in-memory set is authoritative for the life of the process. Durable
//! state is rewritten wholesale on every flush through an atomic replace, so
//! a crash mid-write leaves the previous file intact.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::PathBuf;

use tempfile::NamedTempFile;

use crate::utils::error::{AppError, Result};

/// Durable backing for the dedupe store, keyed by a target's store key.
#[cfg_attr(test, mockall::automock)]
pub trait SeenStorage: Send + Sync {
    /// `Ok(None)` when nothing has been persisted for `key` yet.
    fn load(&self, key: &str) -> Result<Option<Vec<String>>>;

    /// Replaces the durable record for `key` with `ids`, oldest first.
    fn save(&self, key: &str, ids: &[String]) -> Result<()>;
}

/// File name (without extension) that holds the ids for `key`. Distinct keys
/// may share a stem, so configuration rejects such pairs up front.
pub fn state_file_stem(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// One JSON array of ids per target under a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", state_file_stem(key)))
    }

    fn persistence_error(key: &str, message: impl std::fmt::Display) -> AppError {
        AppError::Persistence {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

impl SeenStorage for JsonFileStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<String>>> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::persistence_error(key, e)),
        };

        let ids: Vec<String> = serde_json::from_str(&contents)
            .map_err(|e| Self::persistence_error(key, format!("corrupt state file {}: {}", path.display(), e)))?;
        Ok(Some(ids))
    }

    fn save(&self, key: &str, ids: &[String]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::persistence_error(key, e))?;

        let tmp = NamedTempFile::new_in(&self.dir).map_err(|e| Self::persistence_error(key, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, ids)?;
            writer.flush().map_err(|e| Self::persistence_error(key, e))?;
        }
        tmp.as_file().sync_all().map_err(|e| Self::persistence_error(key, e))?;

        tmp.persist(self.path_for(key))
            .map_err(|e| Self::persistence_error(key, e.error))?;
        Ok(())
    }
}

/// Insertion-ordered id set. Order is the only pruning signal.
#[derive(Debug, Default)]
struct SeenSet {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenSet {
    fn from_ids(ids: Vec<String>) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(id);
        }
        set
    }

    fn insert(&mut self, id: String) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.insert(id.clone());
        self.order.push_back(id);
        true
    }

    fn prune(&mut self, max_size: usize) -> usize {
        let mut removed = 0;
        while self.order.len() > max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
                removed += 1;
            }
        }
        removed
    }
}

pub struct DedupeStore {
    storage: Box<dyn SeenStorage>,
    sets: HashMap<String, SeenSet>,
}

impl DedupeStore {
    pub fn new(storage: Box<dyn SeenStorage>) -> Self {
        Self {
            storage,
            sets: HashMap::new(),
        }
    }

    /// Loads the durable record for `key` on first use and reports whether the
    /// target starts empty (first-run). Unreadable state counts as empty.
    pub fn load(&mut self, key: &str) -> bool {
        if let Some(set) = self.sets.get(key) {
            return set.order.is_empty();
        }

        let set = match self.storage.load(key) {
            Ok(Some(ids)) => SeenSet::from_ids(ids),
            Ok(None) => SeenSet::default(),
            Err(e) => {
                tracing::error!(store = %key, "Failed to load seen listings, starting empty: {}", e);
                SeenSet::default()
            }
        };

        tracing::info!(store = %key, count = set.order.len(), "Loaded previously seen listings");
        let empty = set.order.is_empty();
        self.sets.insert(key.to_string(), set);
        empty
    }

    pub fn has(&self, key: &str, id: &str) -> bool {
        self.sets.get(key).is_some_and(|set| set.members.contains(id))
    }

    /// Idempotent. Returns `true` when `id` was not present before.
    pub fn record(&mut self, key: &str, id: &str) -> bool {
        self.sets.entry(key.to_string()).or_default().insert(id.to_string())
    }

    /// Drops the oldest-inserted ids until at most `max_size` remain.
    pub fn prune(&mut self, key: &str, max_size: usize) -> usize {
        let removed = self.sets.get_mut(key).map_or(0, |set| set.prune(max_size));
        if removed > 0 {
            tracing::debug!(store = %key, removed, "Pruned oldest seen listings");
        }
        removed
    }

    /// Persists the current contents for `key`. Failure leaves memory intact.
    pub fn flush(&self, key: &str) -> Result<()> {
        let ids: Vec<String> = self
            .sets
            .get(key)
            .map(|set| set.order.iter().cloned().collect())
            .unwrap_or_default();
        self.storage.save(key, &ids)
    }

    pub fn len(&self, key: &str) -> usize {
        self.sets.get(key).map_or(0, |set| set.order.len())
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }
}
