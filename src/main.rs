use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use klaviyo_archiver::config;
use klaviyo_archiver::db;
use klaviyo_archiver::klaviyo::KlaviyoClient;
use klaviyo_archiver::pipeline;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one Klaviyo newsletter import and print the result as JSON"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/archive.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let max_age = i64::try_from(cfg.app.stale_run_max_age_secs).unwrap_or(i64::MAX);
    let reaped = db::reap_stale_runs(&pool, max_age).await?;
    if reaped > 0 {
        warn!(reaped, "reaped stale RUNNING import rows");
    }

    let client = KlaviyoClient::new(
        cfg.klaviyo.api_key.clone(),
        cfg.klaviyo.revision.clone(),
        Duration::from_secs(cfg.app.request_timeout_secs),
    );

    let report = pipeline::run_import(&pool, &client).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
