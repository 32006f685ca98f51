//! Mirror ledger: idempotency tracking for created mirrors.
//!
//! Persists a flat JSON object `{"<repo name>": true, …}` at a configured
//! path. Writes use an atomic `.tmp` + rename so a crash mid-write leaves the
//! previous document intact.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, LedgerError};

/// On-disk and in-memory representation: repository name → presence flag.
///
/// Present entries are always `true`; absence means "not yet known to be
/// mirrored".
pub type MirrorRecord = BTreeMap<String, bool>;

/// The set of repositories already mirrored (or confirmed to exist) on the
/// destination, bound to its storage path.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    entries: MirrorRecord,
}

impl Ledger {
    /// An empty ledger that will persist to `path`. Nothing is read or written.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: MirrorRecord::new(),
        }
    }

    /// Hydrate from `path`.
    ///
    /// Never fails: a missing document yields an empty ledger, and an
    /// unreadable or corrupt one yields an empty ledger plus a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read(&path) {
            Ok(Some(entries)) => {
                tracing::info!(
                    "loaded {} mirrored repos from {}",
                    entries.len(),
                    path.display()
                );
                entries
            }
            Ok(None) => {
                tracing::info!(
                    "no ledger found at {}; starting with an empty list",
                    path.display()
                );
                MirrorRecord::new()
            }
            Err(err) => {
                tracing::warn!("ignoring unusable ledger at {}: {err}", path.display());
                MirrorRecord::new()
            }
        };
        Self { path, entries }
    }

    /// Strict read of the document at `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist. Entries whose flag is
    /// `false` are dropped.
    pub fn read(path: &Path) -> Result<Option<MirrorRecord>, LedgerError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(path, err)),
        };
        let mut entries: MirrorRecord = serde_json::from_str(&contents)?;
        entries.retain(|_, present| *present);
        Ok(Some(entries))
    }

    /// `true` iff `name` is recorded as mirrored.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.get(name).copied().unwrap_or(false)
    }

    /// Record `name` as mirrored and rewrite the whole document.
    ///
    /// Idempotent. A persistence failure is logged and otherwise ignored: the
    /// in-memory state keeps the mutation. Returns `true` if `name` was not
    /// already present.
    pub fn mark_mirrored(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        let inserted = self.entries.insert(name.clone(), true).is_none();
        match self.save() {
            Ok(()) => tracing::debug!("saved {} mirrored repos", self.entries.len()),
            Err(err) => tracing::error!("failed to persist ledger after marking {name}: {err}"),
        }
        inserted
    }

    /// Total number of mirrored entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Mirrored names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Storage path this ledger persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole ledger atomically.
    ///
    /// Writes to `<path>.tmp` then renames to `<path>`, creating the parent
    /// directory if needed.
    pub fn save(&self) -> Result<(), LedgerError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
