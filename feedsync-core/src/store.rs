//! Local per-event storage in a Radicale calendar folder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::CALENDAR_PROPS_FILE;
use crate::error::{FeedSyncError, FeedSyncResult};
use crate::event::Event;
use crate::ics::parse_event;

/// Where the local copy of each event lives.
pub trait EventStore {
    /// The stored ICS text of `uid`, if the user has not deleted it.
    fn read_raw(&self, uid: &str) -> FeedSyncResult<Option<String>>;
    fn write(&mut self, uid: &str, ics: &str) -> FeedSyncResult<()>;
    fn delete(&mut self, uid: &str) -> FeedSyncResult<()>;

    fn read(&self, uid: &str) -> FeedSyncResult<Option<Event>> {
        self.read_raw(uid)?
            .map(|content| parse_event(&content))
            .transpose()
    }
}

/// A Radicale calendar collection: one `<uid>.ics` file per event.
#[derive(Debug, Clone)]
pub struct CalendarFolder {
    path: PathBuf,
}

impl CalendarFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CalendarFolder { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn event_path(&self, uid: &str) -> PathBuf {
        self.path.join(format!("{}.ics", file_stem(uid)))
    }
}

/// Distinct UIDs always get distinct file names.
fn file_stem(uid: &str) -> String {
    let mut stem = String::with_capacity(uid.len());
    for c in uid.chars() {
        match c {
            '%' => stem.push_str("%25"),
            '/' => stem.push_str("%2F"),
            '\\' => stem.push_str("%5C"),
            _ => stem.push(c),
        }
    }
    stem
}

impl EventStore for CalendarFolder {
    fn read_raw(&self, uid: &str) -> FeedSyncResult<Option<String>> {
        let path = self.event_path(uid);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn write(&mut self, uid: &str, ics: &str) -> FeedSyncResult<()> {
        std::fs::create_dir_all(&self.path)?;

        let path = self.event_path(uid);
        let temp = path.with_extension("ics.tmp");
        std::fs::write(&temp, ics)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }

    fn delete(&mut self, uid: &str) -> FeedSyncResult<()> {
        let path = self.event_path(uid);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Store kept in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    files: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl EventStore for MemoryStore {
    fn read_raw(&self, uid: &str) -> FeedSyncResult<Option<String>> {
        Ok(self.files.get(uid).cloned())
    }

    fn write(&mut self, uid: &str, ics: &str) -> FeedSyncResult<()> {
        self.files.insert(uid.to_string(), ics.to_string());
        Ok(())
    }

    fn delete(&mut self, uid: &str) -> FeedSyncResult<()> {
        self.files.remove(uid);
        Ok(())
    }
}

/// Radicale collection metadata (`.Radicale.props`).
#[derive(Debug, Serialize, Deserialize)]
struct CalendarProps {
    #[serde(rename = "C:supported-calendar-component-set", default)]
    components: Option<String>,
    #[serde(rename = "D:displayname", default)]
    display_name: Option<String>,
    #[serde(default)]
    tag: Option<String>,
}

/// Find the calendar in `user_dir` whose display name is `name`.
pub fn find_calendar(user_dir: &Path, name: &str) -> FeedSyncResult<Option<CalendarFolder>> {
    let Ok(entries) = std::fs::read_dir(user_dir) else {
        return Ok(None);
    };

    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        if !path.is_dir() {
            continue;
        }
        let props_path = path.join(CALENDAR_PROPS_FILE);
        let Ok(content) = std::fs::read_to_string(&props_path) else {
            continue;
        };
        match serde_json::from_str::<CalendarProps>(&content) {
            Ok(props) if props.display_name.as_deref() == Some(name) => {
                return Ok(Some(CalendarFolder::new(path)));
            }
            Ok(_) => {}
            Err(e) => warn!(path = %props_path.display(), error = %e, "unreadable calendar properties"),
        }
    }

    Ok(None)
}

/// Create a new event calendar named `name` in `user_dir`.
pub fn create_calendar(user_dir: &Path, name: &str) -> FeedSyncResult<CalendarFolder> {
    let path = user_dir.join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&path)?;

    let props = CalendarProps {
        components: Some("VEVENT".to_string()),
        display_name: Some(name.to_string()),
        tag: Some("VCALENDAR".to_string()),
    };
    let content =
        serde_json::to_string(&props).map_err(|e| FeedSyncError::Serialization(e.to_string()))?;
    std::fs::write(path.join(CALENDAR_PROPS_FILE), content)?;

    info!(calendar = name, path = %path.display(), "created calendar");
    Ok(CalendarFolder::new(path))
}

/// How a project's calendar folder is chosen (`cal_id` in the config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarSelector {
    /// Find by display name.
    Auto,
    /// Find by display name, create when missing.
    AutoCreate,
    /// Folder name inside the user directory.
    Id(String),
}

impl FromStr for CalendarSelector {
    type Err = FeedSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(FeedSyncError::Config("empty cal_id".into())),
            "auto" => Ok(CalendarSelector::Auto),
            "auto,create" => Ok(CalendarSelector::AutoCreate),
            id => Ok(CalendarSelector::Id(id.to_string())),
        }
    }
}

impl CalendarSelector {
    pub fn locate(&self, user_dir: &Path, name: &str) -> FeedSyncResult<CalendarFolder> {
        match self {
            CalendarSelector::Auto => find_calendar(user_dir, name)?.ok_or_else(|| {
                FeedSyncError::CalendarNotFound(format!(
                    "{name} (use cal_id = \"auto,create\" to create it, or give the calendar id)"
                ))
            }),
            CalendarSelector::AutoCreate => match find_calendar(user_dir, name)? {
                Some(folder) => Ok(folder),
                None => create_calendar(user_dir, name),
            },
            CalendarSelector::Id(id) => Ok(CalendarFolder::new(user_dir.join(id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_then_find_calendar() {
        let dir = TempDir::new().unwrap();

        assert!(find_calendar(dir.path(), "Work").unwrap().is_none());
        let created = create_calendar(dir.path(), "Work").unwrap();

        let found = find_calendar(dir.path(), "Work").unwrap().expect("Should find");
        assert_eq!(found.path(), created.path());
        assert!(find_calendar(dir.path(), "Home").unwrap().is_none());

        let props = std::fs::read_to_string(created.path().join(CALENDAR_PROPS_FILE)).unwrap();
        let props: serde_json::Value = serde_json::from_str(&props).unwrap();
        assert_eq!(props["D:displayname"], "Work");
        assert_eq!(props["C:supported-calendar-component-set"], "VEVENT");
        assert_eq!(props["tag"], "VCALENDAR");
    }

    #[test]
    fn selector_locates_folders() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            CalendarSelector::Auto.locate(dir.path(), "Work"),
            Err(FeedSyncError::CalendarNotFound(_))
        ));

        let created = CalendarSelector::AutoCreate.locate(dir.path(), "Work").unwrap();
        let again = CalendarSelector::AutoCreate.locate(dir.path(), "Work").unwrap();
        assert_eq!(created.path(), again.path());
        assert_eq!(
            CalendarSelector::Auto.locate(dir.path(), "Work").unwrap().path(),
            created.path()
        );

        let by_id = CalendarSelector::Id("abc".into()).locate(dir.path(), "Work").unwrap();
        assert_eq!(by_id.path(), dir.path().join("abc"));
    }

    #[test]
    fn selector_parsing() {
        assert_eq!("auto".parse::<CalendarSelector>().unwrap(), CalendarSelector::Auto);
        assert_eq!(
            "auto,create".parse::<CalendarSelector>().unwrap(),
            CalendarSelector::AutoCreate
        );
        assert_eq!(
            "f3a1".parse::<CalendarSelector>().unwrap(),
            CalendarSelector::Id("f3a1".into())
        );
        assert!("  ".parse::<CalendarSelector>().is_err());
    }

    #[test]
    fn folder_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let mut folder = CalendarFolder::new(dir.path().join("cal"));

        assert!(folder.read_raw("a/b").unwrap().is_none());
        folder.write("a/b", "content").unwrap();
        assert!(folder.event_path("a/b").ends_with("a%2Fb.ics"));
        assert_eq!(folder.read_raw("a/b").unwrap().as_deref(), Some("content"));

        folder.delete("a/b").unwrap();
        assert!(folder.read_raw("a/b").unwrap().is_none());
    }

    #[test]
    fn similar_uids_get_separate_files() {
        let dir = TempDir::new().unwrap();
        let mut folder = CalendarFolder::new(dir.path());

        folder.write("a/b", "slash").unwrap();
        folder.write("a_b", "underscore").unwrap();
        folder.write("a%2Fb", "escaped").unwrap();

        assert_eq!(folder.read_raw("a/b").unwrap().as_deref(), Some("slash"));
        assert_eq!(folder.read_raw("a_b").unwrap().as_deref(), Some("underscore"));
        assert_eq!(folder.read_raw("a%2Fb").unwrap().as_deref(), Some("escaped"));
    }
}
