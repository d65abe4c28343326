//! Three-way reconciliation of base, local and upstream event versions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{FeedSyncError, FeedSyncResult};
use crate::event::{Event, EventTime, LAST_MODIFIED, PropertyValue};
use crate::strategy::{Side, Strategy};

/// What the caller should do with the stored copy of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Persist this event (and record it as the new ancestor).
    Write(Event),
    /// The stored copy already matches the result.
    NoChange,
    /// The user deleted the local copy; do not re-create it.
    Delete,
}

/// Decide the stored version of an event from its three snapshots.
///
/// `base` is the ancestor from the cache, `local` the copy from the store.
/// Neither is modified.
pub fn resolve(
    strategy: Strategy,
    base: Option<&Event>,
    local: Option<&Event>,
    upstream: Event,
) -> FeedSyncResult<MergeOutcome> {
    resolve_at(strategy, base, local, upstream, Utc::now())
}

/// [`resolve`] with an explicit clock for the `LAST-MODIFIED` stamp.
pub fn resolve_at(
    strategy: Strategy,
    base: Option<&Event>,
    local: Option<&Event>,
    upstream: Event,
    now: DateTime<Utc>,
) -> FeedSyncResult<MergeOutcome> {
    let (base, local) = match (base, local) {
        (None, None) => return Ok(MergeOutcome::Write(upstream)),
        (Some(_), None) => return Ok(MergeOutcome::Delete),
        // No merge base: upstream is authoritative
        (None, Some(local)) => return Ok(write_unless_unchanged(local, upstream)),
        (Some(base), Some(local)) => (base, local),
    };

    let outcome = match strategy {
        Strategy::Our => MergeOutcome::NoChange,
        Strategy::Upstream => write_unless_unchanged(local, upstream),
        Strategy::Newer => {
            if is_newer(&upstream, local) {
                write_unless_unchanged(local, upstream)
            } else {
                MergeOutcome::NoChange
            }
        }
        Strategy::MergeFavorUpstream | Strategy::MergeFavorLocal => {
            let merged = merge_events_at(base, local, &upstream, strategy.preference(), now)?;
            // LAST-MODIFIED is restamped on every merge
            if merged.eq_ignoring(local, &[LAST_MODIFIED]) {
                MergeOutcome::NoChange
            } else {
                MergeOutcome::Write(merged)
            }
        }
    };

    Ok(outcome)
}

fn write_unless_unchanged(local: &Event, candidate: Event) -> MergeOutcome {
    if candidate == *local {
        MergeOutcome::NoChange
    } else {
        MergeOutcome::Write(candidate)
    }
}

/// Whether `candidate` was modified strictly later than `current`.
/// A missing `LAST-MODIFIED` counts as older than any timestamp.
fn is_newer(candidate: &Event, current: &Event) -> bool {
    match (candidate.last_modified(), current.last_modified()) {
        (Some(candidate), Some(current)) => candidate > current,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Property-by-property three-way merge.
///
/// Genuine conflicts are settled by `preference`; without one they fail with
/// [`FeedSyncError::UnresolvedConflict`].
pub fn merge_events(
    base: &Event,
    local: &Event,
    upstream: &Event,
    preference: Option<Side>,
) -> FeedSyncResult<Event> {
    merge_events_at(base, local, upstream, preference, Utc::now())
}

pub fn merge_events_at(
    base: &Event,
    local: &Event,
    upstream: &Event,
    preference: Option<Side>,
    now: DateTime<Utc>,
) -> FeedSyncResult<Event> {
    let keys: BTreeSet<&str> = base
        .keys()
        .chain(local.keys())
        .chain(upstream.keys())
        .collect();

    let mut merged = Event::new();

    for key in keys {
        if key == LAST_MODIFIED {
            merged.set(LAST_MODIFIED, EventTime::DateTimeUtc(now));
            continue;
        }

        if let Some(value) = merge_property(key, base, local, upstream, preference)? {
            merged.set(key, value.clone());
        }
    }

    Ok(merged)
}

fn merge_property<'a>(
    key: &str,
    base: &'a Event,
    local: &'a Event,
    upstream: &'a Event,
    preference: Option<Side>,
) -> FeedSyncResult<Option<&'a PropertyValue>> {
    let b = base.get(key);
    let l = local.get(key);
    let u = upstream.get(key);

    if l == u && u == b {
        return Ok(b);
    }
    // Same edit (or same deletion) on both sides
    if l == u {
        return Ok(l);
    }
    // Only upstream changed; absent upstream means deleted upstream
    if l == b {
        return Ok(u);
    }
    // Only local changed; absent local means deleted locally
    if u == b {
        return Ok(l);
    }
    // Deleted on one side, changed on the other: keep the change
    if l.is_none() {
        return Ok(u);
    }
    if u.is_none() {
        return Ok(l);
    }

    match preference {
        Some(Side::Upstream) => {
            debug!(property = key, "conflict resolved in favour of upstream");
            Ok(u)
        }
        Some(Side::Local) => {
            debug!(property = key, "conflict resolved in favour of local");
            Ok(l)
        }
        None => Err(FeedSyncError::UnresolvedConflict {
            property: key.to_string(),
            uid: base.uid().unwrap_or_default().to_string(),
        }),
    }
}
