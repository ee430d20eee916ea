use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand, ValueHint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use calorie_tracker_api::cache::SnapshotCache;
use calorie_tracker_api::config::Config;
use calorie_tracker_api::dashboard::basal_metabolic_rate;
use calorie_tracker_api::models::Collection;
use calorie_tracker_api::{Locale, Period, StateStore, TrackerClient};

#[derive(Parser, Debug)]
#[command(author, version, about = "Calorie tracker dashboard CLI", long_about = None)]
struct Cli {
    /// Backend base URL (overrides TRACKER_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Directory for the session snapshot cache (overrides TRACKER_CACHE_DIR)
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    cache_dir: Option<PathBuf>,

    /// Label language: en or de (overrides TRACKER_LOCALE)
    #[arg(long, global = true)]
    locale: Option<Locale>,

    #[arg(long, global = true, env = "TRACKER_EMAIL")]
    email: Option<String>,

    #[arg(long, global = true, env = "TRACKER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Existing bearer token; skips the login call
    #[arg(long, global = true, env = "TRACKER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the dashboard for a period as JSON
    Dashboard {
        /// day, week, month or year
        #[arg(short, long, default_value = "week")]
        period: Period,
    },
    /// Print collection sizes and the profile
    Summary,
    /// Remove the cached snapshot
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    // Loads .env first so clap sees credentials defined there.
    let mut config = Config::load();
    let cli = Cli::parse();

    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    if let Some(locale) = cli.locale {
        config.locale = locale;
    }

    let period = match cli.command {
        Command::ClearCache => {
            config.cache().clear()?;
            info!("snapshot cache cleared");
            return Ok(());
        }
        Command::Dashboard { period } => Some(period),
        Command::Summary => None,
    };

    let client = connect(&cli, &config).await?;
    let mut store = StateStore::new(client, config.cache()).with_locale(config.locale);

    if let Err(err) = store.initialize().await {
        if err.is_auth_expired() {
            bail!("Session expired or credentials rejected; sign in again");
        }
        return Err(anyhow!(err).context("failed to load tracking data"));
    }

    match period {
        Some(period) => {
            let result = store.dashboard(period.as_str());
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        None => {
            for collection in Collection::ALL {
                println!(
                    "{:<18}{}",
                    collection.as_str(),
                    store.collection_len(collection)
                );
            }
            let profile = store.profile();
            println!("{:<18}{:.0} kcal", "daily_bmr", basal_metabolic_rate(profile));
            println!("{}", serde_json::to_string_pretty(profile)?);
        }
    }

    Ok(())
}

async fn connect(cli: &Cli, config: &Config) -> Result<TrackerClient> {
    if let Some(token) = &cli.token {
        return Ok(TrackerClient::with_token(&config.api_url, token.clone()));
    }

    match (&cli.email, &cli.password) {
        (Some(email), Some(password)) => {
            Ok(TrackerClient::login(&config.api_url, email, password).await?)
        }
        _ if config.has_persistent_cache() => {
            warn!("no credentials given; only a cached snapshot can be used");
            Ok(TrackerClient::new(&config.api_url))
        }
        _ => bail!(
            "no credentials given; set TRACKER_EMAIL and TRACKER_PASSWORD, TRACKER_TOKEN, \
             or a cache directory holding a previous session"
        ),
    }
}
