use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::model::{ImportRun, NewsletterRecord, NewsletterUpsert, RunStatus, UpsertOutcome};

pub type Pool = SqlitePool;

/// Fixed page size for the query surface.
pub const LIST_PAGE_SIZE: i64 = 200;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Idempotent write keyed on the unique message id: insert on first sight,
/// overwrite the mutable fields afterwards. Tags are initialized empty on
/// creation and never touched on update.
#[instrument(skip_all, fields(message_id = %rec.message_id))]
pub async fn upsert_newsletter(pool: &Pool, rec: &NewsletterUpsert) -> Result<UpsertOutcome> {
    let mut tx = pool.begin().await?;
    let existing =
        sqlx::query_scalar::<_, i64>("SELECT id FROM newsletters WHERE message_id = ?")
            .bind(&rec.message_id)
            .fetch_optional(&mut *tx)
            .await?;

    let outcome = if let Some(id) = existing {
        sqlx::query(
            "UPDATE newsletters SET campaign_id = ?, subject = ?, from_email = ?, preview_text = ?, \
             sent_at = ?, html = ?, text = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&rec.campaign_id)
        .bind(&rec.subject)
        .bind(&rec.from_email)
        .bind(&rec.preview_text)
        .bind(rec.sent_at)
        .bind(&rec.html)
        .bind(&rec.text)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        UpsertOutcome::Updated
    } else {
        sqlx::query(
            "INSERT INTO newsletters (campaign_id, message_id, subject, from_email, preview_text, \
             sent_at, html, text, tags) VALUES (?, ?, ?, ?, ?, ?, ?, ?, '[]')",
        )
        .bind(&rec.campaign_id)
        .bind(&rec.message_id)
        .bind(&rec.subject)
        .bind(&rec.from_email)
        .bind(&rec.preview_text)
        .bind(rec.sent_at)
        .bind(&rec.html)
        .bind(&rec.text)
        .execute(&mut *tx)
        .await?;
        UpsertOutcome::Created
    };
    tx.commit().await?;
    Ok(outcome)
}

/// List archived newsletters, newest first, optionally filtered by a
/// case-insensitive substring over subject and preview text. Capped at
/// [`LIST_PAGE_SIZE`] rows.
#[instrument(skip_all)]
pub async fn list_newsletters(pool: &Pool, query: Option<&str>) -> Result<Vec<NewsletterRecord>> {
    let rows = match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => {
            let q = escape_like(q);
            sqlx::query(
                "SELECT id, campaign_id, message_id, subject, from_email, preview_text, sent_at, \
                 html, text, tags, created_at, updated_at FROM newsletters \
                 WHERE lower(subject) LIKE '%' || lower(?) || '%' ESCAPE '\\' \
                    OR lower(COALESCE(preview_text, '')) LIKE '%' || lower(?) || '%' ESCAPE '\\' \
                 ORDER BY sent_at DESC LIMIT ?",
            )
            .bind(&q)
            .bind(&q)
            .bind(LIST_PAGE_SIZE)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT id, campaign_id, message_id, subject, from_email, preview_text, sent_at, \
                 html, text, tags, created_at, updated_at FROM newsletters \
                 ORDER BY sent_at DESC LIMIT ?",
            )
            .bind(LIST_PAGE_SIZE)
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter()
        .map(|row| {
            let tags_raw: String = row.get("tags");
            Ok(NewsletterRecord {
                id: row.get("id"),
                campaign_id: row.get("campaign_id"),
                message_id: row.get("message_id"),
                subject: row.get("subject"),
                from_email: row.get("from_email"),
                preview_text: row.get("preview_text"),
                sent_at: row.get("sent_at"),
                html: row.get("html"),
                text: row.get("text"),
                tags: serde_json::from_str(&tags_raw).unwrap_or_default(),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
        })
        .collect()
}

/// Escape LIKE metacharacters so the user query matches as a literal
/// substring, not as a pattern.
fn escape_like(q: &str) -> String {
    q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[instrument(skip_all)]
pub async fn open_import_run(pool: &Pool) -> Result<i64> {
    let row = sqlx::query("INSERT INTO import_runs (status) VALUES (?) RETURNING id")
        .bind(RunStatus::Running.as_str())
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn finish_import_run(
    pool: &Pool,
    run_id: i64,
    status: RunStatus,
    note: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE import_runs SET status = ?, note = ?, finished_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(note)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn running_import_exists(pool: &Pool) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM import_runs WHERE status = 'RUNNING'")
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Mark RUNNING rows older than `max_age_secs` as interrupted. A crashed
/// process leaves its ledger row open; this runs at startup so a stuck row
/// cannot block future imports forever.
#[instrument(skip_all)]
pub async fn reap_stale_runs(pool: &Pool, max_age_secs: i64) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE import_runs SET status = 'ERROR', note = 'interrupted: stale RUNNING row reaped', \
         finished_at = CURRENT_TIMESTAMP \
         WHERE status = 'RUNNING' AND datetime(started_at) <= datetime('now', '-' || ? || ' seconds')",
    )
    .bind(max_age_secs)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn get_import_run(pool: &Pool, run_id: i64) -> Result<ImportRun> {
    let row = sqlx::query(
        "SELECT id, status, note, started_at, finished_at FROM import_runs WHERE id = ?",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(anyhow!("import run {} not found", run_id));
    };

    let status_raw: String = row.get("status");
    let status = RunStatus::parse_status(&status_raw)
        .ok_or_else(|| anyhow!("import run {} has unknown status {}", run_id, status_raw))?;

    Ok(ImportRun {
        id: row.get("id"),
        status,
        note: row.get("note"),
        started_at: row.get("started_at"),
        finished_at: row.get::<Option<DateTime<Utc>>, _>("finished_at"),
    })
}

pub async fn list_import_runs(pool: &Pool) -> Result<Vec<ImportRun>> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM import_runs ORDER BY id ASC")
        .fetch_all(pool)
        .await?;
    let mut runs = Vec::with_capacity(ids.len());
    for id in ids {
        runs.push(get_import_run(pool, id).await?);
    }
    Ok(runs)
}
