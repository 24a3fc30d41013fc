//! postreap CLI
//!
//! Harvests post links for hashtags from the command line, or serves the
//! job API for other tools to drive.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use serde_json::Value;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use postreap_browser::{find_chromium, harvest, HarvestRequest};
use postreap_core::{save_all, Credentials, DateFilter, PostExport, ReapConfig, SaveFormat};
use postreap_runtime::{BrowserHarvester, JobRunner, JobStore};

#[derive(Parser)]
#[command(name = "postreap")]
#[command(author, version, about = "postreap: hashtag post-link harvester", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "POSTREAP_CONFIG")]
    config: Option<PathBuf>,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest post links once and save them
    Run {
        /// Hashtags to search for (default: the configured current set)
        hashtags: Vec<String>,

        /// Use a named hashtag set instead
        #[arg(short, long, conflicts_with = "hashtags")]
        set: Option<String>,

        /// Number of unique posts to collect
        #[arg(short, long)]
        target: Option<usize>,

        /// Show the browser window
        #[arg(long)]
        headful: bool,

        /// past_24h, past_week, past_month or any_time
        #[arg(long)]
        date_filter: Option<DateFilter>,

        /// csv, json or both
        #[arg(long)]
        format: Option<SaveFormat>,

        /// Directory for output files
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Open each post to record its permalink
        #[arg(long)]
        resolve_permalinks: bool,

        /// Account email (or set LINKEDIN_EMAIL env var)
        #[arg(long, env = "LINKEDIN_EMAIL")]
        email: Option<String>,

        /// Account password (or set LINKEDIN_PASSWORD env var)
        #[arg(long, env = "LINKEDIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Serve the scrape job API
    Serve {
        /// Bind address (default from config)
        #[arg(long)]
        host: Option<String>,

        /// Port (default from config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Account email (or set LINKEDIN_EMAIL env var)
        #[arg(long, env = "LINKEDIN_EMAIL")]
        email: Option<String>,

        /// Account password (or set LINKEDIN_PASSWORD env var)
        #[arg(long, env = "LINKEDIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Query a running server
    Status {
        /// Keyword to check; omit for server health
        keyword: Option<String>,

        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        server: String,
    },

    /// List configured hashtag sets
    Sets,

    /// Check that a Chromium browser can be found
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            hashtags,
            set,
            target,
            headful,
            date_filter,
            format,
            output,
            resolve_permalinks,
            email,
            password,
        } => {
            if let Some(filter) = date_filter {
                config.scrape.date_filter = filter;
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            if let Some(dir) = output {
                config.output.dir = dir;
            }
            config.scrape.resolve_permalinks |= resolve_permalinks;

            let hashtags = pick_hashtags(&config, hashtags, set.as_deref())?;
            let target = target.unwrap_or(config.scrape.target_posts);
            let credentials = credentials(email, password)?;

            run_once(&config, &credentials, hashtags, target, !headful).await?;
        }
        Commands::Serve {
            host,
            port,
            email,
            password,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let credentials = credentials(email, password)?;
            serve(config, credentials).await?;
        }
        Commands::Status { keyword, server } => {
            check_status(&server, keyword.as_deref()).await?;
        }
        Commands::Sets => {
            list_sets(&config);
        }
        Commands::Check => match find_chromium() {
            Some(path) => println!("✅ Chromium found at {}", path.display()),
            None => {
                println!("❌ No Chromium executable found");
                println!("   Install Chrome or Chromium, or set CHROME_EXECUTABLE");
            }
        },
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<ReapConfig> {
    let config = match path {
        Some(path) => ReapConfig::load(path)?,
        None => ReapConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn credentials(email: Option<String>, password: Option<String>) -> Result<Credentials> {
    let email = email.ok_or_else(|| {
        anyhow::anyhow!("Account email required. Set LINKEDIN_EMAIL or use --email")
    })?;
    let password = password.ok_or_else(|| {
        anyhow::anyhow!("Account password required. Set LINKEDIN_PASSWORD or use --password")
    })?;
    Ok(Credentials::new(&email, &password))
}

fn pick_hashtags(config: &ReapConfig, explicit: Vec<String>, set: Option<&str>) -> Result<Vec<String>> {
    if !explicit.is_empty() {
        return Ok(explicit);
    }
    let name = set.unwrap_or(&config.hashtags.current);
    config
        .hashtags
        .get(name)
        .map(<[String]>::to_vec)
        .with_context(|| format!("Unknown hashtag set: {}", name))
}

async fn run_once(
    config: &ReapConfig,
    credentials: &Credentials,
    hashtags: Vec<String>,
    target: usize,
    headless: bool,
) -> Result<()> {
    println!("🔎 postreap - hashtag post-link harvester\n");
    println!("🏷️  Hashtags: {}", hashtags.join(", "));
    println!("🎯 Target: {} posts | Date filter: {}", target, config.scrape.date_filter.label());
    println!("🖥️  Headless: {}\n", headless);

    let request = HarvestRequest::new(hashtags, target).headless(headless);
    let report = harvest(config, credentials, &request).await?;

    let export = PostExport::new(
        report.collection.links.clone(),
        report.collection_method(),
        &config.scrape.user_agent,
        report.filters_applied(config.scrape.date_filter),
        chrono::Local::now(),
    );
    let paths = save_all(&config.output, None, &export)?;

    let links = report.collection.links.len();
    if links == 0 {
        println!("⚠️  No posts collected");
        return Ok(());
    }

    println!("\n✅ Collected {} post links ({:?})", links, report.collection.stop);
    if let Some(csv) = &paths.csv {
        println!("📄 CSV saved to: {}", csv.display());
    }
    if let Some(json) = &paths.json {
        println!("📄 JSON saved to: {}", json.display());
    }

    println!("\n{}", "=".repeat(60));
    for (i, link) in export.links().iter().take(5).enumerate() {
        println!("{}. {}", i + 1, link);
    }
    if links > 5 {
        println!("... and {} more", links - 5);
    }

    Ok(())
}

async fn serve(config: ReapConfig, credentials: Credentials) -> Result<()> {
    let config = Arc::new(config);
    let harvester = Arc::new(BrowserHarvester::new(Arc::clone(&config), credentials));
    let runner = JobRunner::new(JobStore::new(), harvester, Arc::clone(&config));

    println!(
        "🚀 Serving on http://{}:{}",
        config.server.host, config.server.port
    );
    postreap_api::serve(&config.server, runner).await?;
    Ok(())
}

/// `/status/<keyword>` or `/health` under `server`, with the keyword percent-encoded
fn status_url(server: &str, keyword: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(server).with_context(|| format!("Invalid server URL: {}", server))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Server URL cannot take a path: {}", server))?;
        segments.pop_if_empty();
        match keyword {
            Some(keyword) => segments.push("status").push(keyword),
            None => segments.push("health"),
        };
    }
    Ok(url)
}

async fn check_status(server: &str, keyword: Option<&str>) -> Result<()> {
    let url = status_url(server, keyword)?;

    let client = reqwest::Client::new();
    let body: Value = match client.get(url).send().await {
        Ok(response) => response.json().await?,
        Err(e) => {
            println!("❌ Could not reach server at {}: {}", server, e);
            return Ok(());
        }
    };

    match keyword {
        Some(_) => {
            println!("🏷️  Keyword: {}", body["keyword"].as_str().unwrap_or("?"));
            println!("📊 Status: {}", body["status"].as_str().unwrap_or("?"));
        }
        None => {
            println!("✅ Server {}", body["status"].as_str().unwrap_or("unknown"));
            println!("   Active jobs: {}", body["active_scraping_tasks"]);
            println!("   Stored results: {}", body["total_results"]);
        }
    }

    Ok(())
}

fn list_sets(config: &ReapConfig) {
    for (name, tags) in &config.hashtags.sets {
        let marker = if *name == config.hashtags.current { "*" } else { " " };
        println!("{} {} ({})", marker, name, tags.join(", "));
    }
}
