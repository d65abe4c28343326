use anyhow::Result;
use feedsync_core::config::FeedSyncConfig;

pub fn run(config: &FeedSyncConfig) -> Result<()> {
    let mut problems = 0;

    println!("Calendars in {}", config.user_dir().display());

    for (name, project_config) in &config.projects {
        let mut errors = Vec::new();

        if let Err(e) = reqwest::Url::parse(&project_config.url) {
            errors.push(format!("url '{}': {e}", project_config.url));
        }
        if let Err(e) = project_config.calendar() {
            errors.push(e.to_string());
        }
        match project_config.project(name) {
            Ok(project) => {
                for (i, e) in project.check_filters() {
                    errors.push(format!("filter #{}: {e}", i + 1));
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        if errors.is_empty() {
            println!("  {name}: ok");
        } else {
            println!("  {name}:");
            for error in &errors {
                println!("    {error}");
            }
            problems += errors.len();
        }
    }

    if problems > 0 {
        anyhow::bail!("{problems} problem(s) found");
    }

    Ok(())
}
