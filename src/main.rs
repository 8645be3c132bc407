use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use homefeed::config::Config;
use homefeed::feed::{HomeFeed, LoadOutcome, LoadStatus, PageOutcome, ToggleOutcome};
use homefeed::model::{ProductId, SectionId};
use homefeed::source::HttpSource;
use homefeed::storage::{Database, DatabaseError, FavoriteStore, MemoryFavoriteStore};
use homefeed::util::strip_control_chars;

/// Get the config directory path (~/.config/homefeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("homefeed"))
}

/// `SECTION:PRODUCT` pair for `--toggle`.
#[derive(Debug, Clone, Copy)]
struct ToggleTarget {
    section_id: SectionId,
    product_id: ProductId,
}

fn parse_toggle(value: &str) -> Result<ToggleTarget, String> {
    let (section, product) = value
        .split_once(':')
        .ok_or_else(|| format!("expected SECTION:PRODUCT, got '{value}'"))?;
    Ok(ToggleTarget {
        section_id: section
            .trim()
            .parse()
            .map_err(|e| format!("invalid section id '{section}': {e}"))?,
        product_id: product
            .trim()
            .parse()
            .map_err(|e| format!("invalid product id '{product}': {e}"))?,
    })
}

#[derive(Parser, Debug)]
#[command(name = "homefeed", about = "Home feed loader with lazy sections and offline favorites")]
struct Args {
    /// Config file (default: ~/.config/homefeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// API root, overrides base_url from the config file
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Number of section pages to load (default: until exhausted)
    #[arg(long, value_name = "N")]
    pages: Option<usize>,

    /// Comma-separated section ids to treat as visible (default: all loaded sections)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    visible: Vec<SectionId>,

    /// Toggle one favorite after loading
    #[arg(long, value_name = "SECTION:PRODUCT", value_parser = parse_toggle)]
    toggle: Option<ToggleTarget>,

    /// Keep favorites in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Reset favorites database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Print favorited product ids and exit
    #[arg(long, conflicts_with = "ephemeral")]
    list_favorites: bool,
}

async fn open_database(db_path: &Path) -> Result<Database> {
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of homefeed appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

async fn load_pages(feed: &HomeFeed, max_pages: Option<usize>) {
    let mut loaded = 0;
    while max_pages.map_or(true, |max| loaded < max) {
        match feed.load_next_page().await {
            Ok(PageOutcome::Loaded { exhausted, .. }) => {
                loaded += 1;
                if exhausted {
                    break;
                }
            }
            Ok(_) => break,
            Err(e) => {
                eprintln!("Warning: failed to load sections: {e}");
                break;
            }
        }
    }
}

fn print_feed(feed: &HomeFeed) {
    for section in feed.feed().iter() {
        println!(
            "[{}] {} ({})",
            section.id,
            strip_control_chars(&section.title),
            section.kind
        );
        let items = feed.items_for(section.id);
        match items.status {
            LoadStatus::Loaded if items.items.is_empty() => println!("    (no products)"),
            LoadStatus::Loaded => {
                for product in items.items.iter() {
                    println!(
                        "  {} {:>10}  {}  {}{}",
                        if product.favorite { "♥" } else { "♡" },
                        product.id,
                        strip_control_chars(&product.name),
                        product.price_label(),
                        if product.sold_out { "  [sold out]" } else { "" }
                    );
                }
            }
            LoadStatus::Failed => println!(
                "    (failed: {})",
                feed.last_error(section.id).unwrap_or_default()
            ),
            LoadStatus::NotLoaded | LoadStatus::Loading => println!("    (not loaded)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // user-only access to the favorites database directory
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let base_url = args.base_url.clone().unwrap_or_else(|| config.base_url.clone());
    let client = reqwest::Client::builder()
        .user_agent(concat!("homefeed/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let source = Arc::new(
        HttpSource::new(client, &base_url, config.request_timeout())
            .with_context(|| format!("Invalid base URL '{base_url}'"))?,
    );

    let store: Arc<dyn FavoriteStore> = if args.ephemeral {
        Arc::new(MemoryFavoriteStore::new())
    } else {
        let db_path = config
            .database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("favorites.db"));
        if args.reset_db && db_path.exists() {
            std::fs::remove_file(&db_path).context("Failed to delete database")?;
            println!("Database reset.");
        }
        let db = open_database(&db_path).await?;

        if args.list_favorites {
            let ids = db
                .favorite_product_ids()
                .await
                .context("Failed to read favorites")?;
            for id in &ids {
                println!("{id}");
            }
            tracing::info!(count = ids.len(), "Listed favorites");
            return Ok(());
        }
        Arc::new(db)
    };

    let feed = HomeFeed::builder(source.clone(), source, store)
        .max_concurrent_loads(config.max_concurrent_loads)
        .build();

    load_pages(&feed, args.pages).await;
    if let Some(error) = feed.refresh_error() {
        tracing::warn!(error = %error, "Feed is incomplete");
    }

    let visible: Vec<SectionId> = if args.visible.is_empty() {
        feed.feed().iter().map(|s| s.id).collect()
    } else {
        args.visible.clone()
    };
    for (section_id, outcome) in feed.notify_visible(visible).await {
        if let LoadOutcome::Failed(error) = outcome {
            eprintln!("Warning: section {section_id} failed to load: {error}");
        }
    }

    if let Some(target) = args.toggle {
        feed.load_section(target.section_id).await;
        match feed.toggle_favorite(target.product_id, target.section_id).await {
            ToggleOutcome::Persisted { favorite } => println!(
                "Product {} is {}",
                target.product_id,
                if favorite { "now a favorite" } else { "no longer a favorite" }
            ),
            ToggleOutcome::RolledBack { error, .. } => {
                eprintln!("Failed to save favorite for {}: {error}", target.product_id)
            }
            ToggleOutcome::NotFound => eprintln!(
                "Product {} not found in section {}",
                target.product_id, target.section_id
            ),
            ToggleOutcome::Superseded | ToggleOutcome::Stale => {}
        }
    }

    print_feed(&feed);
    feed.close();
    Ok(())
}
