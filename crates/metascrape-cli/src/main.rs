use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use metascrape_client::{AdapterRegistry, Site};
use metascrape_core::config::ScraperConfig;

#[derive(Parser)]
#[command(name = "metascrape", version, about = "Game metadata scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one record and print it as JSON
    Get {
        /// Page or API URI of the item
        uri: String,

        /// Site adapter to use (detected from the URI host if omitted)
        #[arg(short, long)]
        site: Option<Site>,

        /// Proxy for every site (http, https, socks5 or socks5h)
        #[arg(short, long, env = "METASCRAPE_PROXY")]
        proxy: Option<String>,

        /// Directory for files downloaded by the browser
        #[arg(long, env = "METASCRAPE_DOWNLOAD_DIR")]
        download_dir: Option<PathBuf>,

        /// Show the browser window during captures
        #[arg(long, default_value_t = false)]
        headed: bool,
    },

    /// List the supported sites
    Sites,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("metascrape=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Get {
            uri,
            site,
            proxy,
            download_dir,
            headed,
        } => {
            let mut config = ScraperConfig::from_env().context("Invalid configuration")?;
            if let Some(proxy) = proxy {
                config.set_proxy(&proxy).context("Invalid --proxy")?;
            }
            if let Some(dir) = download_dir {
                config.capture.download_dir = dir;
            }
            if headed {
                config.capture.headless = false;
            }
            cmd_get(&config, &uri, site).await?;
        }
        Commands::Sites => cmd_sites(),
    }

    Ok(())
}

async fn cmd_get(config: &ScraperConfig, uri: &str, site: Option<Site>) -> Result<()> {
    let site = match site {
        Some(site) => site,
        None => Site::detect(uri).with_context(|| format!("Cannot tell which site serves {uri}"))?,
    };

    let registry = AdapterRegistry::from_config(config).context("Failed to build site adapters")?;

    tracing::info!(%site, %uri, "Extracting");
    let extraction = registry
        .get_item(site, uri)
        .await
        .with_context(|| format!("Failed to fetch {uri}"))?;

    for failure in &extraction.failures {
        eprintln!("warning: {}: {}", failure.field, failure.error);
    }
    if !extraction.is_complete() {
        tracing::info!(
            failed = extraction.failures.len(),
            "Some fields could not be extracted"
        );
    }

    println!("{}", serde_json::to_string_pretty(&extraction.record)?);

    Ok(())
}

fn cmd_sites() {
    let config = ScraperConfig::default();
    for site in Site::ALL {
        println!("{:<8} {}", site.as_str(), site.config(&config).domain);
    }
}
