//! A persistable `path -> FileInfo` map with atomic backup-then-rename
//! writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::GeoDatasetError;
use crate::fileinfo::{FileInfo, SerializableFileInfo};

/// Entries persist across process restarts only if [`InfoCache::save`]
/// completes. Mutated only by the discovery path; guarded by a single
/// mutex serializing all reads and writes.
pub struct InfoCache {
    entries: Mutex<HashMap<PathBuf, FileInfo>>,
}

impl InfoCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, path: &Path) -> Option<FileInfo> {
        self.entries.lock().unwrap().get(path).cloned()
    }

    pub fn put(&self, path: PathBuf, info: FileInfo) {
        self.entries.lock().unwrap().insert(path, info);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load `path` if it exists. A missing file leaves the cache empty
    /// (not an error); a file that fails to parse is downgraded to a
    /// `log::warn!` and the cache is reset to empty rather than left
    /// partially populated or left to propagate a panic.
    pub fn load(&self, path: &Path) {
        if !path.exists() {
            return;
        }

        let result = std::fs::read_to_string(path).map_err(GeoDatasetError::from).and_then(|text| {
            serde_json::from_str::<Vec<SerializableFileInfo>>(&text).map_err(GeoDatasetError::from)
        });

        match result {
            Ok(records) => {
                let mut map = HashMap::with_capacity(records.len());
                for record in records {
                    match FileInfo::from_serializable(record) {
                        Ok(info) => {
                            map.insert(info.path.clone(), info);
                        }
                        Err(e) => {
                            log::warn!("skipping corrupt info-cache record in {}: {e}", path.display());
                        }
                    }
                }
                *self.entries.lock().unwrap() = map;
            }
            Err(e) => {
                log::warn!("failed to load info cache from {}: {e}; continuing with an empty cache", path.display());
                self.entries.lock().unwrap().clear();
            }
        }
    }

    /// Write to `<path>.backup`, then atomically rename onto `path`, so a
    /// crash mid-write never leaves `path` partially overwritten.
    pub fn save(&self, path: &Path) -> Result<(), GeoDatasetError> {
        let records: Vec<SerializableFileInfo> = {
            let guard = self.entries.lock().unwrap();
            guard.values().map(FileInfo::to_serializable).collect()
        };

        let backup_path = backup_path_for(path);
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(&backup_path, json)?;
        std::fs::rename(&backup_path, path)?;
        Ok(())
    }
}

impl Default for InfoCache {
    fn default() -> Self {
        Self::new()
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".backup");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileinfo::FileInfo;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir::TempDir::new("geodataset-cache").unwrap();
        let path = dir.path().join("cache.json");
        let cache = InfoCache::new();
        cache.load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempdir::TempDir::new("geodataset-cache").unwrap();
        let path = dir.path().join("cache.json");

        let cache = InfoCache::new();
        let fi = FileInfo::new(PathBuf::from("/data/a.csv"), (Some(dt(2020, 1, 1)), Some(dt(2020, 1, 2))), HashMap::new());
        cache.put(fi.path.clone(), fi.clone());
        cache.save(&path).unwrap();
        assert!(path.exists());
        assert!(!backup_path_for(&path).exists());

        let cache2 = InfoCache::new();
        cache2.load(&path);
        assert_eq!(cache2.get(&fi.path), Some(fi));
    }

    #[test]
    fn corrupt_cache_downgrades_to_empty() {
        let dir = tempdir::TempDir::new("geodataset-cache").unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not valid json").unwrap();

        let cache = InfoCache::new();
        cache.load(&path);
        assert!(cache.is_empty());
    }
}
