//! Syncing a fetched feed into a project's calendar.

use std::fmt;

use tracing::{debug, info, warn};

use crate::cache::AncestorCache;
use crate::error::{FeedSyncError, FeedSyncResult};
use crate::event::{Event, PropertyValue, UID};
use crate::filter::{FilterRule, filter_event};
use crate::ics::{generate_ics, parse_event};
use crate::merge::{MergeOutcome, resolve};
use crate::store::EventStore;
use crate::strategy::Strategy;

/// A configured feed with its merge policy and filter rules.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub strategy: Strategy,
    pub filters: Vec<FilterRule>,
    /// Replace feed UIDs by one built from `DTSTART` and `SUMMARY`.
    pub fix_uid: bool,
}

impl Project {
    /// Fails with [`FeedSyncError::UnknownStrategy`] before any event is touched.
    pub fn new(
        name: impl Into<String>,
        strategy: &str,
        filters: Vec<FilterRule>,
    ) -> FeedSyncResult<Self> {
        Ok(Project {
            name: name.into(),
            strategy: strategy.parse()?,
            filters,
            fix_uid: false,
        })
    }

    pub fn with_fix_uid(mut self, fix_uid: bool) -> Self {
        self.fix_uid = fix_uid;
        self
    }

    /// Problems with the filter rules, as `(rule index, error)`.
    pub fn check_filters(&self) -> Vec<(usize, FeedSyncError)> {
        self.filters
            .iter()
            .enumerate()
            .filter_map(|(i, rule)| rule.compile().err().map(|e| (i, e)))
            .collect()
    }
}

/// What happened to one upstream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Filtered,
    Created,
    Updated,
    Unchanged,
    /// Deleted by the user; left deleted.
    Deleted,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub filtered: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl SyncStats {
    pub fn record(&mut self, action: EventAction) {
        match action {
            EventAction::Filtered => self.filtered += 1,
            EventAction::Created => self.created += 1,
            EventAction::Updated => self.updated += 1,
            EventAction::Unchanged => self.unchanged += 1,
            EventAction::Deleted => self.deleted += 1,
        }
    }

    pub fn add(&mut self, other: &SyncStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.filtered += other.filtered;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} filtered, {} deleted locally, {} failed",
            self.created, self.updated, self.unchanged, self.filtered, self.deleted, self.failed
        )
    }
}

/// Filter, merge and persist one upstream event.
pub fn sync_event(
    project: &Project,
    store: &mut dyn EventStore,
    cache: &mut dyn AncestorCache,
    mut upstream: Event,
) -> FeedSyncResult<EventAction> {
    if project.fix_uid {
        let uid = stable_uid(&upstream)?;
        upstream.set(UID, uid);
    }

    let uid = upstream
        .uid()
        .map(str::to_string)
        .ok_or_else(|| FeedSyncError::IcsParse(format!("event without UID: {upstream}")))?;

    let Some(upstream) = filter_event(upstream, &project.filters)? else {
        debug!(uid, "filtered out");
        return Ok(EventAction::Filtered);
    };

    let base = cache.get(&uid)?.map(|ics| parse_event(&ics)).transpose()?;
    let local = store.read(&uid)?;

    match resolve(project.strategy, base.as_ref(), local.as_ref(), upstream)? {
        MergeOutcome::Write(event) => {
            let action = if local.is_some() {
                EventAction::Updated
            } else {
                EventAction::Created
            };
            commit(store, cache, &uid, event)?;
            debug!(uid, ?action, "written");
            Ok(action)
        }
        MergeOutcome::NoChange => {
            // Adopt the local copy as ancestor so a later deletion is recognised
            if base.is_none() {
                if let Some(local) = &local {
                    cache.set(&uid, &generate_ics(local)?)?;
                }
            }
            debug!(uid, "unchanged");
            Ok(EventAction::Unchanged)
        }
        MergeOutcome::Delete => {
            debug!(uid, "deleted locally, not re-created");
            Ok(EventAction::Deleted)
        }
    }
}

/// A UID that survives feeds which regenerate theirs on every download:
/// the `DTSTART` value followed by the summary, with characters outside
/// `[a-zA-Z0-9_-]` replaced by `_` and cut to 55 characters.
pub fn stable_uid(event: &Event) -> FeedSyncResult<String> {
    let start = match event.get("DTSTART") {
        Some(PropertyValue::DateTime(time)) => time.to_ics_string(),
        Some(PropertyValue::Raw(raw)) => raw.value.clone(),
        _ => {
            return Err(FeedSyncError::IcsParse(format!(
                "cannot fix UID of event without DTSTART: {event}"
            )));
        }
    };

    let summary: String = event
        .summary()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(55)
        .collect();

    Ok(start + &summary)
}

/// Persist `event` to the store and record it as the new ancestor.
///
/// The store is restored to its previous content if the cache cannot be
/// updated, so the two never disagree.
pub fn commit(
    store: &mut dyn EventStore,
    cache: &mut dyn AncestorCache,
    uid: &str,
    mut event: Event,
) -> FeedSyncResult<()> {
    strip_carriage_returns(&mut event);
    let ics = generate_ics(&event)?;

    let previous = store.read_raw(uid)?;
    store.write(uid, &ics)?;

    if let Err(e) = cache.set(uid, &ics) {
        let rollback = match previous {
            Some(previous) => store.write(uid, &previous),
            None => store.delete(uid),
        };
        if let Err(rollback_err) = rollback {
            warn!(uid, error = %rollback_err, "could not restore local copy");
        }
        return Err(e);
    }

    Ok(())
}

/// Radicale refuses text values containing `\r`.
fn strip_carriage_returns(event: &mut Event) {
    for (_, value) in event.iter_mut() {
        strip_value(value);
    }
}

fn strip_value(value: &mut PropertyValue) {
    match value {
        PropertyValue::Text(text) => text.retain(|c| c != '\r'),
        PropertyValue::Categories(items) => {
            for item in items {
                item.retain(|c| c != '\r');
            }
        }
        PropertyValue::Raw(raw) => raw.value.retain(|c| c != '\r'),
        PropertyValue::List(values) => values.iter_mut().for_each(strip_value),
        PropertyValue::DateTime(_) | PropertyValue::Address(_) => {}
    }
}

/// Sync every event of a feed. Failures are logged and counted per event.
pub fn sync_feed(
    project: &Project,
    store: &mut dyn EventStore,
    cache: &mut dyn AncestorCache,
    events: Vec<Event>,
) -> SyncStats {
    let mut stats = SyncStats::default();

    for event in events {
        let uid = event.uid().unwrap_or_default().to_string();
        match sync_event(project, store, cache, event) {
            Ok(action) => stats.record(action),
            Err(e) => {
                warn!(project = %project.name, uid, error = %e, "event not synced");
                stats.failed += 1;
            }
        }
    }

    info!(project = %project.name, %stats, "sync finished");
    stats
}
