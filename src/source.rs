//! Transaction source access: local files or `http(s)://` documents, decoded as Latin-1.
//!
//! Also hosts the process-lifetime cache of prepared loads.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{DashboardError, Result};

/// Identifier of a transaction source. Used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    Path(PathBuf),
    Url(String),
}

impl SourceId {
    /// Classify a user-supplied location as a URL or a filesystem path.
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            SourceId::Url(trimmed.to_string())
        } else {
            SourceId::Path(PathBuf::from(trimmed))
        }
    }

    /// Read the whole document and decode it as Latin-1.
    pub fn read_text(&self) -> Result<String> {
        let bytes = self.read_bytes()?;
        debug!(source = %self, bytes = bytes.len(), "Read transaction source");
        Ok(decode_latin1(&bytes))
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            SourceId::Path(path) => std::fs::read(path).map_err(|e| self.unavailable(e)),
            SourceId::Url(url) => {
                let response = reqwest::blocking::get(url)
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| self.unavailable(e))?;
                let body = response.bytes().map_err(|e| self.unavailable(e))?;
                Ok(body.to_vec())
            }
        }
    }

    fn unavailable(&self, reason: impl fmt::Display) -> DashboardError {
        DashboardError::SourceUnavailable {
            source_id: self.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Path(path) => write!(f, "{}", path.display()),
            SourceId::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Decode ISO-8859-1 bytes. Every byte maps to the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Read-through cache of loaded values keyed by source.
///
/// Entries are inserted only after the loader has fully succeeded and are
/// never mutated afterwards. Two callers racing on the same key may both run
/// the loader; the first insert wins and both observe a complete value.
#[derive(Debug)]
pub struct SourceCache<T> {
    entries: Mutex<HashMap<SourceId, Arc<T>>>,
}

impl<T> Default for SourceCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> SourceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `id`, running `load` on a miss.
    ///
    /// A failed load leaves the cache untouched.
    pub fn get_or_load<F>(&self, id: &SourceId, load: F) -> Result<Arc<T>>
    where
        F: FnOnce(&SourceId) -> Result<T>,
    {
        if let Some(hit) = self.lookup(id) {
            debug!(source = %id, "Source cache hit");
            return Ok(hit);
        }

        let loaded = Arc::new(load(id)?);

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(id.clone()).or_insert(loaded);
        Ok(Arc::clone(entry))
    }

    /// Whether a completed entry exists for `id`.
    pub fn contains(&self, id: &SourceId) -> bool {
        self.lookup(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, id: &SourceId) -> Option<Arc<T>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }
}
