use feedsync_core::cache::{AncestorCache, JsonCache};
use feedsync_core::config::FeedSyncConfig;
use feedsync_core::ics::{generate_ics, parse_feed};
use feedsync_core::store::{CalendarSelector, EventStore};
use feedsync_core::sync::{SyncStats, sync_feed};
use feedsync_core::PropertyValue;
use tempfile::TempDir;

fn feed(events: &[(&str, &str)]) -> String {
    let mut ics = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n");
    for (uid, summary) in events {
        ics.push_str(&format!(
            "BEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:{summary}\r\nDTSTART:20240301T100000Z\r\nEND:VEVENT\r\n"
        ));
    }
    ics.push_str("END:VCALENDAR\r\n");
    ics
}

#[test]
fn feed_round_trips_through_folder_and_cache() {
    let root = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();

    let config = FeedSyncConfig::from_toml(&format!(
        r#"
user = "alice"
collection_root = "{}"

[projects.work]
url = "https://example.org/work.ics"
cal_id = "auto,create"
strategy = "merge,upstream"

[[projects.work.filter]]
operator = "match"
value = "Lunch"
"#,
        root.path().display()
    ))
    .unwrap();

    let (project_config, project) = config.project("work").unwrap();
    let mut folder = project_config
        .calendar()
        .unwrap()
        .locate(&config.user_dir(), &project.name)
        .unwrap();
    let mut cache = JsonCache::open_in(cache_dir.path(), &project.name).unwrap();

    // First pass: everything new, lunch filtered
    let events = parse_feed(&feed(&[
        ("standup@x", "Standup"),
        ("lunch@x", "Lunch break"),
        ("review@x", "Review"),
    ]))
    .unwrap();
    let stats = sync_feed(&project, &mut folder, &mut cache, events);
    assert_eq!(
        stats,
        SyncStats {
            created: 2,
            filtered: 1,
            ..SyncStats::default()
        }
    );
    assert!(folder.event_path("standup@x").exists());
    assert!(!folder.event_path("lunch@x").exists());

    // The calendar is found again by name
    let again = CalendarSelector::Auto
        .locate(&config.user_dir(), "work")
        .unwrap();
    assert_eq!(again.path(), folder.path());

    // User edits one event and deletes the other
    let mut standup = folder.read("standup@x").unwrap().unwrap();
    standup.set("LOCATION", "Room 4");
    folder
        .write("standup@x", &generate_ics(&standup).unwrap())
        .unwrap();
    folder.delete("review@x").unwrap();

    // Upstream renames the standup
    let events = parse_feed(&feed(&[
        ("standup@x", "Daily standup"),
        ("review@x", "Review"),
    ]))
    .unwrap();
    let mut cache = JsonCache::open_in(cache_dir.path(), &project.name).unwrap();
    let stats = sync_feed(&project, &mut folder, &mut cache, events);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.failed, 0);

    let merged = folder.read("standup@x").unwrap().unwrap();
    assert_eq!(merged.summary(), Some("Daily standup"));
    assert_eq!(merged.get("LOCATION"), Some(&PropertyValue::from("Room 4")));
    assert!(!folder.event_path("review@x").exists());

    // Store and cache agree on what was written
    let stored = std::fs::read_to_string(folder.event_path("standup@x")).unwrap();
    assert_eq!(cache.get("standup@x").unwrap().as_deref(), Some(stored.as_str()));

    // A deleted event stays deleted
    let events = parse_feed(&feed(&[("review@x", "Review")])).unwrap();
    let stats = sync_feed(&project, &mut folder, &mut cache, events);
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.created, 0);
    assert!(!folder.event_path("review@x").exists());
}
