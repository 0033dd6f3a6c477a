use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use article_tracker::{
    ArticleTracker, Config, DiscoveryMethod, RetryPolicy, RetryingStore, SaveStatus, SqliteStore,
    Title, TracingDiagnostics,
};

const USAGE: &str = "usage: article-tracker <command>

commands:
  open <title|url> [method]   record an article open (method defaults to link)
  save <title|url>            save an article for offline reading
  unsave <title|url>          remove an article from the saved list
  status <title|url> <status> set the download status of a saved article
  remove <title|url>          remove an article from history
  history                     list history, most recent first
  saved                       list saved articles
  clear-history               remove every history entry
  import <json>               import a JSON export into the database";

fn parse_title(config: &Config, raw: &str) -> Result<Title> {
    let title = if raw.starts_with("http://") || raw.starts_with("https://") {
        Title::from_url(raw)?
    } else {
        Title::new(&config.default_site, raw)?
    };
    Ok(title)
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing {}\n\n{}", what, USAGE))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("article_tracker=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };

    // Load configuration
    let config = Config::load()?;

    // Initialize storage
    let sqlite = SqliteStore::new(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path))?;
    sqlite.migrate().await?;

    if command == "import" {
        let path = arg(&args, 1, "JSON path")?;
        sqlite.import_from_json(path).await?;
        return Ok(());
    }

    let store = Arc::new(RetryingStore::new(sqlite, RetryPolicy::from(&config.retry)));
    let tracker = ArticleTracker::initialize(&config, store, Arc::new(TracingDiagnostics)).await;

    match command {
        "open" => {
            let title = parse_title(&config, arg(&args, 1, "title")?)?;
            let method = match args.get(2) {
                Some(raw) => DiscoveryMethod::from_key(raw)
                    .ok_or_else(|| anyhow!("unknown discovery method {:?}", raw))?,
                None => DiscoveryMethod::Link,
            };
            let intent = tracker.open_article(title, method);
            println!("{}", intent.title.url());
        }
        "save" => {
            let title = parse_title(&config, arg(&args, 1, "title")?)?;
            if !tracker.save_page(title.clone()) {
                info!("{} is already saved", title);
            }
        }
        "unsave" => {
            let title = parse_title(&config, arg(&args, 1, "title")?)?;
            if !tracker.unsave_page(&title) {
                info!("{} was not saved", title);
            }
        }
        "status" => {
            let title = parse_title(&config, arg(&args, 1, "title")?)?;
            let raw = arg(&args, 2, "status")?;
            let status =
                SaveStatus::from_key(raw).ok_or_else(|| anyhow!("unknown status {:?}", raw))?;
            tracker.update_save_status(&title, status)?;
        }
        "remove" => {
            let title = parse_title(&config, arg(&args, 1, "title")?)?;
            if !tracker.remove_from_history(&title) {
                info!("{} is not in history", title);
            }
        }
        "history" => {
            for entry in &tracker.history_entries() {
                println!(
                    "{}  {:<8}  {}",
                    entry.visited_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.discovery_method.key(),
                    entry.title
                );
            }
        }
        "saved" => {
            for entry in &tracker.saved_entries() {
                println!(
                    "{}  {:<11}  {}",
                    entry.saved_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.status.key(),
                    entry.title
                );
            }
        }
        "clear-history" => tracker.clear_history(),
        other => bail!("unknown command {:?}\n\n{}", other, USAGE),
    }

    tracker.shutdown().await;
    Ok(())
}
