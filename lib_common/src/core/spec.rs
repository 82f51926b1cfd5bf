//! The ideal-timing specification table.
//!
//! A [`SpecTable`] maps topic -> event name -> [`SpecEntry`]. It is read from
//! a JSON document at startup and replaceable only as a whole: there is no
//! partial-update API, so an analyzer snapshot can never observe a mixture of
//! an old and a new table. Replacement persists the new table back to the
//! same document.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Target timing and allowed absolute deviation for one `(topic, event)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecEntry {
    /// Target timing offset (ms).
    pub t_ms: f64,
    /// Allowed absolute deviation (ms); the boundary itself is in-spec.
    pub tolerance_ms: f64,
}

/// Topic -> event name -> entry. Lookups for an absent topic or event return
/// nothing rather than failing.
pub type SpecTable = HashMap<String, HashMap<String, SpecEntry>>;

/// Owner of the current [`SpecTable`] and its backing document.
pub struct SpecStore {
    path: PathBuf,
    table: Mutex<SpecTable>,
}

impl SpecStore {
    /// Loads the table from `path`. A missing document yields an empty table
    /// (every lookup misses); an unreadable or malformed document is an
    /// error, since silently dropping a configured spec would disable
    /// analysis without anyone noticing.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let table = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("malformed spec table in {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "spec table not found, starting empty");
                SpecTable::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading spec table {}", path.display()))
            }
        };
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// A read-only snapshot of the current table.
    pub fn snapshot(&self) -> SpecTable {
        self.table.lock().expect("SpecStore lock poisoned").clone()
    }

    /// The entry for `(topic, event)`, if one is configured.
    pub fn entry(&self, topic: &str, event: &str) -> Option<SpecEntry> {
        self.table
            .lock()
            .expect("SpecStore lock poisoned")
            .get(topic)
            .and_then(|events| events.get(event))
            .copied()
    }

    /// Atomic whole-table swap, persisted back to the backing document.
    /// Replacement always supplies the complete table; there is no merge.
    pub fn replace(&self, new_table: SpecTable) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(&new_table)
            .context("serializing spec table")?;
        {
            let mut table = self.table.lock().expect("SpecStore lock poisoned");
            *table = new_table;
        }
        fs::write(&self.path, text)
            .with_context(|| format!("persisting spec table to {}", self.path.display()))?;
        Ok(())
    }
}
