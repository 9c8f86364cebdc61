use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use remembot::admission::AdmissionLimits;
use remembot::config::{Config, DEFAULT_GEMINI_MODEL};
use remembot::delivery::DeliveryJob;
use remembot::error::Result;
use remembot::scheduler::{seconds, Scheduler};
use remembot::services::gemini::GeminiClient;
use remembot::services::telegram::TelegramChannel;
use remembot::store::ReminderStore;

#[derive(Parser, Debug)]
#[command(name = "remembot")]
#[command(about = "Remembot reminder delivery daemon")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("REMEMBOT_GIT_SHA"), ")"))]
struct Cli {
    #[arg(long, env = "REMEMBOT_DB", default_value_t = remembot::runtime_paths::default_db_path())]
    db: String,

    #[arg(long, env = "REMEMBOT_TELEGRAM_TOKEN")]
    telegram_token: String,

    #[arg(long, env = "REMEMBOT_GEMINI_API_KEY")]
    gemini_api_key: String,

    #[arg(long, env = "REMEMBOT_GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    gemini_model: String,

    /// Delivery poll period in seconds.
    #[arg(long, env = "REMEMBOT_POLL_INTERVAL", default_value_t = 10)]
    poll_interval: u64,

    #[arg(long, env = "REMEMBOT_MAX_ACTIVE", default_value_t = 200)]
    max_active: i64,

    #[arg(long, env = "REMEMBOT_MAX_PER_MINUTE", default_value_t = 20)]
    max_per_minute: i64,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            telegram_token: self.telegram_token,
            gemini_api_key: self.gemini_api_key,
            gemini_model: self.gemini_model,
            database_path: self.db,
            poll_interval_secs: self.poll_interval,
            limits: AdmissionLimits {
                max_active: self.max_active,
                max_per_minute: self.max_per_minute,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    remembot::logging::init_tracing("remembot");

    let config = Cli::parse().into_config();
    config.validate()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("REMEMBOT_GIT_SHA"),
        db = %config.database_path,
        poll_interval = config.poll_interval_secs,
        "starting remembot"
    );

    let store = Arc::new(ReminderStore::new(&config.database_path).await?);
    let channel = Arc::new(TelegramChannel::new(&config.telegram_token));
    let flavor = Arc::new(GeminiClient::new(
        &config.gemini_api_key,
        &config.gemini_model,
    ));

    let job = Arc::new(DeliveryJob::new(
        store,
        channel,
        flavor,
        seconds(config.poll_interval_secs),
    ));

    let mut scheduler = Scheduler::new();
    scheduler.register_job(job);
    scheduler.start();
    tracing::info!("delivery loop running, press ctrl-c to stop");

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }

    tracing::info!("shutting down");
    scheduler.stop(Duration::from_secs(5)).await;
    Ok(())
}
