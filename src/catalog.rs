//! Profile catalog index
//!
//! Maps device display names to profile descriptor files, loading each
//! descriptor lazily on first lookup. The index is an explicit object owned
//! by whoever runs detections; there are no module-level globals. Load
//! failures degrade to an empty catalog - zero profiles is a valid, if
//! unhelpful, state that callers must handle.

use crate::models::{DeviceStatus, ProfileDescriptor};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// One line of `index.json`: where to find a profile, plus enough metadata
/// to order the catalog without loading every descriptor
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub manufacturer: String,
    pub path: String,
    pub status: DeviceStatus,
    #[serde(default)]
    pub verified: bool,
}

impl IndexEntry {
    fn is_generic(&self) -> bool {
        self.name.to_lowercase().contains("generic")
    }

    fn manufacturer_unknown(&self) -> bool {
        let m = self.manufacturer.trim();
        m.is_empty() || m.eq_ignore_ascii_case("unknown")
    }

    /// Stable catalog order: manufacturer then name, generic profiles last
    /// within their manufacturer, unknown manufacturers last overall
    fn sort_key(&self) -> (bool, String, bool, String) {
        (
            self.manufacturer_unknown(),
            self.manufacturer.to_lowercase(),
            self.is_generic(),
            self.name.to_lowercase(),
        )
    }
}

/// Name -> descriptor index over a catalog directory.
///
/// Safe for concurrent reads after construction; descriptor loads race at
/// most once per profile and are idempotent.
pub struct CatalogIndex {
    dir: Option<PathBuf>,
    entries: Vec<IndexEntry>,
    by_name: HashMap<String, usize>,
    cache: RwLock<HashMap<String, Arc<ProfileDescriptor>>>,
}

fn name_positions(entries: &[IndexEntry]) -> HashMap<String, usize> {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.name.clone(), i))
        .collect()
}

impl CatalogIndex {
    /// Build the index from `<dir>/index.json`. Missing or malformed
    /// catalog data yields an empty index, never an error.
    pub fn load(dir: &Path) -> Self {
        let index_path = dir.join("index.json");
        let entries = match std::fs::read_to_string(&index_path) {
            Ok(raw) => match serde_json::from_str::<Vec<IndexEntry>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Malformed catalog index {}: {}", index_path.display(), e);
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!("Cannot read catalog index {}: {}", index_path.display(), e);
                Vec::new()
            }
        };

        let mut entries = entries;
        entries.sort_by_key(|e| e.sort_key());
        tracing::debug!("Catalog loaded: {} profiles", entries.len());
        Self {
            dir: Some(dir.to_path_buf()),
            by_name: name_positions(&entries),
            entries,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// In-memory index over already-built descriptors (tests, embedding)
    pub fn from_descriptors(descriptors: Vec<ProfileDescriptor>) -> Self {
        let mut entries: Vec<IndexEntry> = descriptors
            .iter()
            .map(|d| IndexEntry {
                name: d.name.clone(),
                manufacturer: d.manufacturer.clone(),
                path: String::new(),
                status: d.status,
                verified: d.status == DeviceStatus::Verified,
            })
            .collect();
        entries.sort_by_key(|e| e.sort_key());

        let cache = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), Arc::new(d)))
            .collect();

        Self {
            dir: None,
            by_name: name_positions(&entries),
            entries,
            cache: RwLock::new(cache),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// O(1) lookup by display name; loads and caches the descriptor file
    /// on first use
    pub fn lookup(&self, name: &str) -> Option<Arc<ProfileDescriptor>> {
        if let Some(hit) = self.cache.read().ok()?.get(name) {
            return Some(Arc::clone(hit));
        }
        let entry = &self.entries[*self.by_name.get(name)?];
        let descriptor = self.load_descriptor(entry)?;
        self.cache
            .write()
            .ok()?
            .insert(name.to_string(), Arc::clone(&descriptor));
        Some(descriptor)
    }

    /// All descriptors in stable catalog order. Profiles whose descriptor
    /// file fails to load are skipped with a warning.
    pub fn list_all(&self) -> Vec<Arc<ProfileDescriptor>> {
        self.entries
            .iter()
            .filter_map(|e| self.lookup(&e.name))
            .collect()
    }

    /// Drop every cached descriptor. Testing hook; there is no TTL.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.write() {
            // In-memory catalogs have no files to reload from
            if self.dir.is_some() {
                cache.clear();
            }
        }
    }

    fn load_descriptor(&self, entry: &IndexEntry) -> Option<Arc<ProfileDescriptor>> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(&entry.path);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Cannot read profile {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<ProfileDescriptor>(&raw) {
            Ok(mut descriptor) => {
                // The index owns the display name; descriptor files may omit it
                if descriptor.name.is_empty() {
                    descriptor.name = entry.name.clone();
                }
                Some(Arc::new(descriptor))
            }
            Err(e) => {
                tracing::warn!("Malformed profile {}: {}", path.display(), e);
                None
            }
        }
    }
}
