//! The import pipeline: page → campaign → message, with per-message
//! failure isolation and one ledger row per invocation.
use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::campaigns;
use crate::db::{self, Pool};
use crate::klaviyo::model::Campaign;
use crate::klaviyo::KlaviyoApi;
use crate::messages;
use crate::model::{ImportReport, NewsletterUpsert, RunStatus, SyncStats, UpsertOutcome};
use crate::render;

/// Per-message result folded into the run counters. Skips are control
/// outcomes, not errors; only `Err` marks an actual failure.
#[derive(Debug)]
enum MessageOutcome {
    Upserted(UpsertOutcome),
    SkippedNoTemplate,
    SkippedNotSent,
}

#[derive(Debug, Default)]
struct RunCounters {
    added: u64,
    updated: u64,
    stats: SyncStats,
}

/// Execute one full import and return a JSON-shaped report.
///
/// The ledger row is opened before any remote call and always reaches a
/// terminal state: SUCCESS with the final counters, or ERROR with the cause.
/// Only ledger-write failures escape as `Err`.
#[instrument(skip_all)]
pub async fn run_import(pool: &Pool, api: &dyn KlaviyoApi) -> Result<ImportReport> {
    if db::running_import_exists(pool).await? {
        let msg = "an import run is already in progress".to_string();
        warn!("{msg}");
        return Ok(ImportReport {
            ok: false,
            added: 0,
            updated: 0,
            stats: None,
            error: Some(msg),
        });
    }

    let run_id = db::open_import_run(pool).await?;
    let mut counters = RunCounters::default();

    match sync_all(pool, api, &mut counters).await {
        Ok(()) => {
            let note = success_note(&counters);
            db::finish_import_run(pool, run_id, RunStatus::Success, &note).await?;
            info!(
                run_id,
                added = counters.added,
                updated = counters.updated,
                "import finished"
            );
            Ok(ImportReport {
                ok: true,
                added: counters.added,
                updated: counters.updated,
                stats: Some(counters.stats),
                error: None,
            })
        }
        Err(err) => {
            let msg = format!("{err:#}");
            db::finish_import_run(pool, run_id, RunStatus::Error, &msg).await?;
            error!(run_id, error = %msg, "import failed");
            Ok(ImportReport {
                ok: false,
                added: counters.added,
                updated: counters.updated,
                stats: Some(counters.stats),
                error: Some(msg),
            })
        }
    }
}

/// Sequential depth-first walk over all pages, campaigns, and messages.
/// Errors returned from here are run-fatal; per-message errors are absorbed
/// inside the message loop.
async fn sync_all(pool: &Pool, api: &dyn KlaviyoApi, counters: &mut RunCounters) -> Result<()> {
    let mut cursor: Option<String> = None;
    loop {
        let page = campaigns::list_sent_campaigns(api, cursor.as_deref()).await?;
        counters.stats.total_campaigns += page.campaigns.len() as u64;

        for campaign in &page.campaigns {
            if !campaign.attributes.is_sent() {
                counters.stats.skipped_not_sent += 1;
                continue;
            }
            counters.stats.eligible_sent += 1;

            let message_ids = messages::fetch_message_ids(api, &campaign.id)
                .await
                .with_context(|| format!("failed to list messages of campaign {}", campaign.id))?;
            counters.stats.total_messages += message_ids.len() as u64;

            for message_id in &message_ids {
                match import_message(pool, api, campaign, message_id).await {
                    Ok(MessageOutcome::Upserted(UpsertOutcome::Created)) => counters.added += 1,
                    Ok(MessageOutcome::Upserted(UpsertOutcome::Updated)) => counters.updated += 1,
                    Ok(MessageOutcome::SkippedNoTemplate) => {
                        counters.stats.skipped_no_template += 1;
                        info!(message_id, "no resolvable template, skipping");
                    }
                    Ok(MessageOutcome::SkippedNotSent) => {
                        counters.stats.skipped_not_sent += 1;
                        info!(message_id, "no send timestamp, skipping");
                    }
                    // One bad message never aborts campaigns or pages in flight.
                    Err(err) => {
                        warn!(
                            ?err,
                            message_id,
                            campaign_id = %campaign.id,
                            "message import failed, continuing with next message"
                        );
                    }
                }
            }
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(())
}

/// Resolve, render, sanitize, and upsert one message. Everything in here is
/// inside the per-message isolation boundary.
async fn import_message(
    pool: &Pool,
    api: &dyn KlaviyoApi,
    campaign: &Campaign,
    message_id: &str,
) -> Result<MessageOutcome> {
    let detail = messages::fetch_message_detail(api, message_id)
        .await
        .context("failed to fetch message detail")?;

    let Some(template_id) = messages::resolve_template_id(api, &detail, message_id).await else {
        return Ok(MessageOutcome::SkippedNoTemplate);
    };

    let meta = messages::extract_meta(&detail, campaign);
    let Some(sent_at) = meta.sent_at else {
        return Ok(MessageOutcome::SkippedNotSent);
    };

    let rendered = render::render_template(api, &template_id)
        .await
        .with_context(|| format!("failed to render template {template_id}"))?;
    let html = render::sanitize_html(&rendered.html);

    let outcome = db::upsert_newsletter(
        pool,
        &NewsletterUpsert {
            campaign_id: campaign.id.clone(),
            message_id: message_id.to_string(),
            subject: meta.subject,
            from_email: meta.from_email,
            preview_text: meta.preview_text,
            sent_at,
            html,
            text: rendered.text,
        },
    )
    .await
    .context("failed to persist newsletter")?;

    Ok(MessageOutcome::Upserted(outcome))
}

fn success_note(counters: &RunCounters) -> String {
    format!(
        "added={}, updated={}, total_campaigns={}, eligible_sent={}, messages={}, skipped_not_sent={}, skipped_no_template={}",
        counters.added,
        counters.updated,
        counters.stats.total_campaigns,
        counters.stats.eligible_sent,
        counters.stats.total_messages,
        counters.stats.skipped_not_sent,
        counters.stats.skipped_no_template,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_note_encodes_counters() {
        let counters = RunCounters {
            added: 3,
            updated: 2,
            stats: SyncStats {
                total_campaigns: 5,
                eligible_sent: 4,
                total_messages: 7,
                skipped_not_sent: 1,
                skipped_no_template: 1,
            },
        };
        let note = success_note(&counters);
        assert!(note.contains("added=3"));
        assert!(note.contains("updated=2"));
        assert!(note.contains("skipped_no_template=1"));
    }
}
