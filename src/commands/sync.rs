use anyhow::{Context, Result};
use feedsync_core::cache::JsonCache;
use feedsync_core::config::FeedSyncConfig;
use feedsync_core::ics::parse_feed;
use feedsync_core::sync::{SyncStats, sync_feed};
use reqwest::Client;
use tracing::{error, info};

use crate::fetch;

pub async fn run(config: &FeedSyncConfig, only: Option<&str>) -> Result<()> {
    let names: Vec<&str> = match only {
        Some(name) => {
            config.project(name)?;
            vec![name]
        }
        None => config.projects.keys().map(String::as_str).collect(),
    };

    if names.is_empty() {
        anyhow::bail!(
            "No projects configured.\n\n\
            Add one to your config file:\n  \
            [projects.work]\n  \
            url = \"https://example.org/work.ics\"\n  \
            cal_id = \"auto,create\"\n  \
            strategy = \"merge,upstream\""
        );
    }

    let client = fetch::client()?;
    let mut total = SyncStats::default();
    let mut failed = Vec::new();

    for name in names {
        info!(project = name, "syncing");
        match sync_project(config, &client, name).await {
            Ok(stats) => {
                println!("{name}: {stats}");
                total.add(&stats);
            }
            Err(e) => {
                error!(project = name, error = format!("{e:#}"), "project failed");
                println!("{name}: failed ({e:#})");
                failed.push(name);
            }
        }
    }

    println!("\nTotal: {total}");

    if !failed.is_empty() {
        anyhow::bail!("{} project(s) failed: {}", failed.len(), failed.join(", "));
    }

    Ok(())
}

async fn sync_project(config: &FeedSyncConfig, client: &Client, name: &str) -> Result<SyncStats> {
    let (project_config, project) = config.project(name)?;
    let selector = project_config.calendar()?;

    let body = fetch::fetch_feed(client, &project_config.url).await?;
    let events = parse_feed(&body).with_context(|| format!("Could not parse {}", project_config.url))?;

    let mut folder = selector.locate(&config.user_dir(), name)?;
    let mut cache = JsonCache::open(name)?;

    Ok(sync_feed(&project, &mut folder, &mut cache, events))
}
