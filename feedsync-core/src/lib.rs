//! Core of feedsync: keeps a local Radicale calendar in sync with a remote ICS feed.
//!
//! - `event`, `filter`, `strategy` and `merge` hold the reconciliation engine.
//! - `ics`, `cache` and `store` read and persist events.
//! - `sync` drives one feed through filter, merge and commit.

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod filter;
pub mod ics;
pub mod merge;
pub mod store;
pub mod strategy;
pub mod sync;

pub use error::{FeedSyncError, FeedSyncResult};
pub use event::{Event, PropertyValue};
pub use merge::{MergeOutcome, resolve};
pub use strategy::Strategy;
