//! Ancestor snapshots, keyed by event UID.
//!
//! After every successful write the serialized event is recorded here so the
//! next sync has a common ancestor for the three-way merge. An entry without a
//! local file means the user deleted the event.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constants::APP_NAME;
use crate::error::{FeedSyncError, FeedSyncResult};

/// Storage for the last written version of each event.
pub trait AncestorCache {
    fn get(&self, uid: &str) -> FeedSyncResult<Option<String>>;
    fn set(&mut self, uid: &str, ics: &str) -> FeedSyncResult<()>;
    fn delete(&mut self, uid: &str) -> FeedSyncResult<()>;

    fn contains(&self, uid: &str) -> FeedSyncResult<bool> {
        Ok(self.get(uid)?.is_some())
    }
}

/// One JSON object per project at `$XDG_CACHE_HOME/feedsync/<project>.json`.
pub struct JsonCache {
    path: PathBuf,
    data: BTreeMap<String, String>,
}

impl JsonCache {
    pub fn cache_dir() -> FeedSyncResult<PathBuf> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| FeedSyncError::Cache("Could not determine cache directory".into()))?
            .join(APP_NAME);
        Ok(dir)
    }

    /// Open the cache of `project` in the user's cache directory.
    pub fn open(project: &str) -> FeedSyncResult<Self> {
        Self::open_in(&Self::cache_dir()?, project)
    }

    /// Open the cache of `project` inside `dir`.
    pub fn open_in(dir: &Path, project: &str) -> FeedSyncResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{project}.json"));

        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                FeedSyncError::Cache(format!("Could not read {}: {e}", path.display()))
            })?
        } else {
            BTreeMap::new()
        };

        Ok(JsonCache { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Forget every snapshot of this project.
    pub fn clear(&mut self) -> FeedSyncResult<()> {
        self.data.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn save(&self) -> FeedSyncResult<()> {
        let content = serde_json::to_string(&self.data)
            .map_err(|e| FeedSyncError::Serialization(e.to_string()))?;

        let temp = self.path.with_extension("json.tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

impl AncestorCache for JsonCache {
    fn get(&self, uid: &str) -> FeedSyncResult<Option<String>> {
        Ok(self.data.get(uid).cloned())
    }

    fn set(&mut self, uid: &str, ics: &str) -> FeedSyncResult<()> {
        let previous = self.data.insert(uid.to_string(), ics.to_string());
        if let Err(e) = self.save() {
            // Keep memory in line with disk
            match previous {
                Some(previous) => self.data.insert(uid.to_string(), previous),
                None => self.data.remove(uid),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&mut self, uid: &str) -> FeedSyncResult<()> {
        if self.data.remove(uid).is_some() {
            self.save()?;
        }
        Ok(())
    }
}

/// Cache kept in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    data: BTreeMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }
}

impl AncestorCache for MemoryCache {
    fn get(&self, uid: &str) -> FeedSyncResult<Option<String>> {
        Ok(self.data.get(uid).cloned())
    }

    fn set(&mut self, uid: &str, ics: &str) -> FeedSyncResult<()> {
        self.data.insert(uid.to_string(), ics.to_string());
        Ok(())
    }

    fn delete(&mut self, uid: &str) -> FeedSyncResult<()> {
        self.data.remove(uid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn entries_persist_across_opens() {
        let dir = TempDir::new().unwrap();

        let mut cache = JsonCache::open_in(dir.path(), "work").unwrap();
        assert!(cache.is_empty());
        cache.set("a", "BEGIN:VCALENDAR").unwrap();
        cache.set("b", "other").unwrap();
        cache.delete("b").unwrap();

        let reopened = JsonCache::open_in(dir.path(), "work").unwrap();
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("BEGIN:VCALENDAR"));
        assert!(!reopened.contains("b").unwrap());
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn projects_are_separate() {
        let dir = TempDir::new().unwrap();

        let mut work = JsonCache::open_in(dir.path(), "work").unwrap();
        work.set("a", "x").unwrap();

        let home = JsonCache::open_in(dir.path(), "home").unwrap();
        assert!(home.get("a").unwrap().is_none());
    }

    #[test]
    fn clear_removes_file() {
        let dir = TempDir::new().unwrap();

        let mut cache = JsonCache::open_in(dir.path(), "work").unwrap();
        cache.set("a", "x").unwrap();
        assert!(cache.path().exists());

        cache.clear().unwrap();
        assert!(!cache.path().exists());
        assert!(cache.get("a").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_a_cache_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("work.json"), "not json").unwrap();

        assert!(matches!(
            JsonCache::open_in(dir.path(), "work"),
            Err(FeedSyncError::Cache(_))
        ));
    }
}
