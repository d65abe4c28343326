//! Shared constants.

/// Directory name under the user's config and cache directories.
pub const APP_NAME: &str = "feedsync";

/// Where Radicale keeps its collections, relative to the home directory.
pub const DEFAULT_COLLECTION_ROOT: &str = "~/collections/collection-root";

/// Radicale's per-collection metadata file.
pub const CALENDAR_PROPS_FILE: &str = ".Radicale.props";

/// Timeout for downloading a feed.
pub const FETCH_TIMEOUT_SECS: u64 = 10;
