//! Documentation index manifests and the work items derived from them
//!
//! A manifest is the `index.json` of one documentation set:
//!
//! ```json
//! { "entries": [ { "name": "Vec", "path": "std/vec/struct.vec", "type": "Structs" } ] }
//! ```

use serde::Deserialize;
use std::collections::HashSet;

/// Parsed documentation index
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

/// One manifest entry
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// One page to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Page path relative to the target, without fragment
    pub path: String,
    /// Display name from the manifest
    pub name: String,
    /// Type tag from the manifest
    pub kind: String,
}

impl Manifest {
    /// Parses a manifest from raw JSON bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Derives the work items of this manifest
    ///
    /// Entries pointing at an anchor of a page share that page, so the
    /// `#fragment` is dropped and only the first entry per path is kept.
    /// Entries with an empty path are skipped. Manifest order is preserved.
    pub fn work_items(&self) -> Vec<WorkItem> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for entry in &self.entries {
            let path = entry
                .path
                .split('#')
                .next()
                .unwrap_or_default()
                .trim()
                .trim_start_matches('/');

            if path.is_empty() || !seen.insert(path.to_string()) {
                continue;
            }

            items.push(WorkItem {
                path: path.to_string(),
                name: entry.name.clone(),
                kind: entry.kind.clone(),
            });
        }

        items
    }
}
