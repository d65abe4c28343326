use anyhow::Result;
use feedsync_core::cache::JsonCache;
use feedsync_core::config::FeedSyncConfig;

pub fn run(config: &FeedSyncConfig, name: &str) -> Result<()> {
    config.project(name)?;

    let mut cache = JsonCache::open(name)?;
    let count = cache.len();
    cache.clear()?;

    println!("Forgot {count} ancestor(s) of {name}");
    println!("The next sync treats every fetched event as authoritative.");

    Ok(())
}
