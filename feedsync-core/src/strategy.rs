//! Merge strategy selection.

use std::fmt;
use std::str::FromStr;

use crate::error::FeedSyncError;

/// How a fetched event is reconciled with the local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Keep the local copy, discard upstream.
    Our,
    /// Always take the fetched version.
    Upstream,
    /// Take whichever side has the later `LAST-MODIFIED`; ties keep local.
    Newer,
    /// Three-way merge, conflicts resolved in favour of upstream.
    MergeFavorUpstream,
    /// Three-way merge, conflicts resolved in favour of local.
    MergeFavorLocal,
}

/// Which side wins a genuine per-property conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Upstream,
}

impl Strategy {
    /// Conflict preference for the merge strategies, `None` for the others.
    pub fn preference(&self) -> Option<Side> {
        match self {
            Strategy::MergeFavorUpstream => Some(Side::Upstream),
            Strategy::MergeFavorLocal => Some(Side::Local),
            Strategy::Our | Strategy::Upstream | Strategy::Newer => None,
        }
    }
}

impl FromStr for Strategy {
    type Err = FeedSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "our" => Ok(Strategy::Our),
            "upstream" => Ok(Strategy::Upstream),
            "newer" => Ok(Strategy::Newer),
            "merge,upstream" | "merge_favor_upstream" => Ok(Strategy::MergeFavorUpstream),
            "merge,our" | "merge_favor_local" => Ok(Strategy::MergeFavorLocal),
            _ => Err(FeedSyncError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Our => "our",
            Strategy::Upstream => "upstream",
            Strategy::Newer => "newer",
            Strategy::MergeFavorUpstream => "merge,upstream",
            Strategy::MergeFavorLocal => "merge,our",
        };
        write!(f, "{name}")
    }
}
