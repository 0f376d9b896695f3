//! TimeGuard CLI
//!
//! Commands for working with an exported `chrome.storage.local` snapshot:
//! - stats: Show time spent per site, paginated like the popup
//! - block / unblock / toggle: Edit the blocked list
//! - rules: Print the dynamic rule set the extension would install
//! - check: Show whether a URL would be redirected
//! - replay: Run a recorded browser event log against the snapshot

mod store_file;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand};

use tg_core::clock::{Clock, ManualClock, SystemClock};
use tg_core::intercept::Verdict;
use tg_core::replay::{parse_event_log, replay};
use tg_core::sim::SimBrowser;
use tg_core::stats::SiteStats;
use tg_core::{build_rule_set, format_clock, format_spent, Background, BlockedDomains, Config, MemoryStore};
use tg_core::{Storage, SitesPerPage};

type CliBackground = Background<Rc<MemoryStore>, Rc<SimBrowser>, Rc<SimBrowser>>;

#[derive(Parser)]
#[command(name = "tg-cli")]
#[command(about = "TimeGuard storage inspection and editing tool")]
struct Cli {
    /// Storage export (JSON object of chrome.storage.local)
    #[arg(short, long, global = true, default_value = "timeguard-storage.json")]
    store: PathBuf,

    /// Config file (JSON, camelCase keys)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show time spent per site, most first
    Stats {
        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Rows per page: a positive number or "all" (defaults to the stored preference)
        #[arg(long)]
        per_page: Option<String>,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a domain to the blocked list
    Block {
        /// Domain or URL
        domain: String,
    },

    /// Remove a domain (and any parent entry covering it) from the blocked list
    Unblock {
        /// Domain or URL
        domain: String,
    },

    /// Flip a domain's blocked state
    Toggle {
        /// Domain or URL
        domain: String,
    },

    /// List blocked domains
    Blocked,

    /// Clear all tracked time; the blocked list is kept
    Reset,

    /// Print the dynamic redirect rules for the blocked list
    Rules,

    /// Show whether a URL would be redirected to the interstitial page
    Check {
        /// URL to check
        url: String,
    },

    /// Set the stored stats page size
    PerPage {
        /// A positive number or "all"
        value: String,
    },

    /// Replay a JSON-lines browser event log against the snapshot
    Replay {
        /// Event log file
        events: PathBuf,

        /// Write the resulting storage back to the store file
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    logger(cli.verbose).init();

    let result = load_config(cli.config.as_deref()).and_then(|config| {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
        runtime.block_on(run(cli.command, &cli.store, config))
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Level from `RUST_LOG`; `--verbose` forces debug.
fn logger(verbose: bool) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    Config::from_json_str(&text).map_err(|e| format!("Invalid config '{}': {}", path.display(), e))
}

async fn run(command: Commands, store_path: &Path, config: Config) -> Result<(), String> {
    let store = Rc::new(store_file::load(store_path)?);
    let clock = ManualClock::new(SystemClock.now_ms());
    let sim = Rc::new(SimBrowser::new());
    let bg: CliBackground = Background::new(config, store.clone(), sim.clone(), sim, Box::new(clock.clone()));

    let dirty = match command {
        Commands::Stats { page, per_page, json } => {
            cmd_stats(&bg, page, per_page.as_deref(), json).await?;
            false
        }
        Commands::Block { domain } => cmd_block(&bg, &domain).await?,
        Commands::Unblock { domain } => cmd_unblock(&bg, &domain).await?,
        Commands::Toggle { domain } => cmd_toggle(&bg, &domain).await?,
        Commands::Blocked => {
            cmd_blocked(bg.storage()).await?;
            false
        }
        Commands::Reset => {
            bg.storage().reset_sites().await.map_err(|e| e.to_string())?;
            println!("Cleared all tracked time");
            true
        }
        Commands::Rules => {
            cmd_rules(&bg).await?;
            false
        }
        Commands::Check { url } => {
            cmd_check(&bg, &url).await?;
            false
        }
        Commands::PerPage { value } => {
            let per_page = parse_per_page(&value)?;
            bg.storage().set_sites_per_page(per_page).await.map_err(|e| e.to_string())?;
            println!("Sites per page set to {}", value);
            true
        }
        Commands::Replay { events, save } => {
            cmd_replay(&bg, &clock, &events).await?;
            save
        }
    };

    if dirty {
        store_file::save(store_path, &store)?;
    }
    Ok(())
}

fn parse_per_page(value: &str) -> Result<SitesPerPage, String> {
    SitesPerPage::try_from(serde_json::Value::from(value))
}

// =============================================================================
// Commands
// =============================================================================

async fn cmd_stats(bg: &CliBackground, page: u32, per_page: Option<&str>, json: bool) -> Result<(), String> {
    let per_page = match per_page {
        Some(value) => parse_per_page(value)?,
        None => bg
            .storage()
            .sites_per_page(bg.config().sites_per_page)
            .await
            .map_err(|e| e.to_string())?,
    };
    let sites = bg.storage().sites().await.map_err(|e| e.to_string())?;
    let stats = SiteStats::ranked(&sites, None);
    let page = stats.page(page, per_page);

    if json {
        let text = serde_json::to_string_pretty(&page).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    if stats.is_empty() {
        println!("No time tracked yet");
        return Ok(());
    }

    println!(
        "Page {}/{} ({} sites, {} total)",
        page.page,
        page.total_pages,
        page.total_sites,
        format_clock(stats.total_time())
    );
    println!();
    for entry in page.sites {
        println!(
            "  {:<32} {:>10}  {:>5.1}%  {}",
            entry.domain,
            format_clock(entry.time),
            entry.share,
            format_spent(entry.time)
        );
    }
    Ok(())
}

async fn cmd_block(bg: &CliBackground, domain: &str) -> Result<bool, String> {
    let added = bg.block_domain(domain).await.map_err(|e| e.to_string())?;
    if added {
        println!("Blocked {}", domain);
    } else {
        println!("{} is already blocked", domain);
    }
    Ok(added)
}

async fn cmd_unblock(bg: &CliBackground, domain: &str) -> Result<bool, String> {
    let before = bg.storage().blocked().await.map_err(|e| e.to_string())?;
    bg.unblock_and_open(domain, None, None).await.map_err(|e| e.to_string())?;
    let after = bg.storage().blocked().await.map_err(|e| e.to_string())?;

    let removed: Vec<&String> = before.iter().filter(|d| !after.contains(d)).collect();
    if removed.is_empty() {
        println!("{} was not blocked", domain);
        return Ok(false);
    }
    for entry in removed {
        println!("Unblocked {}", entry);
    }
    Ok(true)
}

async fn cmd_toggle(bg: &CliBackground, domain: &str) -> Result<bool, String> {
    let (domain, blocked) = bg.toggle_block(domain).await.map_err(|e| e.to_string())?;
    println!("{} is now {}", domain, if blocked { "blocked" } else { "unblocked" });
    Ok(true)
}

async fn cmd_blocked(storage: &Storage<Rc<MemoryStore>>) -> Result<(), String> {
    let blocked = storage.blocked().await.map_err(|e| e.to_string())?;
    if blocked.is_empty() {
        println!("No blocked domains");
    }
    for domain in blocked {
        println!("{}", domain);
    }
    Ok(())
}

async fn cmd_rules(bg: &CliBackground) -> Result<(), String> {
    let blocked = bg.storage().blocked().await.map_err(|e| e.to_string())?;
    let rules = build_rule_set(&blocked, bg.config());
    let text = serde_json::to_string_pretty(&rules).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

async fn cmd_check(bg: &CliBackground, url: &str) -> Result<(), String> {
    let blocked = bg.storage().blocked().await.map_err(|e| e.to_string())?;
    let domains = BlockedDomains::from_list(&blocked);
    match Verdict::of(url, &domains, bg.config()) {
        Verdict::Allow => println!("allow     {}", url),
        Verdict::Redirect { domain, interstitial_url } => {
            let entry = domains.blocking_entry(&domain).unwrap_or(&domain);
            println!("redirect  {} (blocked by {})", url, entry);
            println!("       -> {}", interstitial_url);
        }
    }
    Ok(())
}

async fn cmd_replay(bg: &CliBackground, clock: &ManualClock, path: &Path) -> Result<(), String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let events = parse_event_log(&text).map_err(|e| format!("{}: {}", path.display(), e))?;

    bg.rebuild_rules().await.map_err(|e| e.to_string())?;
    let summary = replay(bg, clock, &events).await;

    println!("Replayed {} events", summary.events);
    println!("  Ticks:     {}", summary.ticks);
    println!("  Failures:  {}", summary.failures);
    println!("  Redirects: {}", bg.interceptor().remembered_count());
    println!();
    cmd_stats(bg, 1, Some("all"), false).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn background(snapshot: serde_json::Value) -> (Rc<MemoryStore>, CliBackground) {
        let store = Rc::new(MemoryStore::from_snapshot(snapshot));
        let sim = Rc::new(SimBrowser::new());
        let bg = Background::new(
            Config::default(),
            store.clone(),
            sim.clone(),
            sim,
            Box::new(ManualClock::new(0)),
        );
        (store, bg)
    }

    #[test]
    fn test_parse_per_page() {
        assert_eq!(parse_per_page("all"), Ok(SitesPerPage::All));
        assert_eq!(parse_per_page("25"), Ok(SitesPerPage::Count(25)));
        assert!(parse_per_page("0").is_err());
        assert!(parse_per_page("many").is_err());
    }

    #[test]
    fn test_logger_level() {
        std::env::set_var("RUST_LOG", "trace");
        assert_eq!(logger(false).build().filter(), log::LevelFilter::Trace);
        assert_eq!(logger(true).build().filter(), log::LevelFilter::Debug);
        std::env::remove_var("RUST_LOG");
    }

    #[test]
    fn test_load_config_default() {
        assert_eq!(load_config(None), Ok(Config::default()));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unblock_removes_parent_entry() {
        let (store, bg) = background(serde_json::json!({"blocked": ["foo.com", "bar.com"]}));
        assert!(cmd_unblock(&bg, "m.foo.com").await.unwrap());
        assert_eq!(store.get_value("blocked"), Some(serde_json::json!(["bar.com"])));
        assert!(!cmd_unblock(&bg, "baz.com").await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_block_then_toggle() {
        let (store, bg) = background(serde_json::json!({}));
        assert!(cmd_block(&bg, "https://www.Foo.com/x").await.unwrap());
        assert!(!cmd_block(&bg, "foo.com").await.unwrap());
        assert_eq!(store.get_value("blocked"), Some(serde_json::json!(["foo.com"])));

        cmd_toggle(&bg, "foo.com").await.unwrap();
        assert_eq!(store.get_value("blocked"), Some(serde_json::json!([])));
    }
}
