use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

use klaviyo_archiver::config;
use klaviyo_archiver::db;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "List archived newsletters as JSON, newest first"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Case-insensitive substring match over subject and preview text
    #[arg(long, short)]
    query: Option<String>,
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

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/archive.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let items = db::list_newsletters(&pool, args.query.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&json!({ "items": items }))?);
    Ok(())
}
