use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one import-run ledger row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Error => "ERROR",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(RunStatus::Running),
            "SUCCESS" => Some(RunStatus::Success),
            "ERROR" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// Outcome of an idempotent write keyed on message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// One materialized record per sent campaign message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterRecord {
    pub id: i64,
    pub campaign_id: String,
    pub message_id: String,
    pub subject: String,
    pub from_email: Option<String>,
    pub preview_text: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub html: String,
    pub text: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable fields written on every upsert. Tags stay untouched after creation.
#[derive(Debug, Clone)]
pub struct NewsletterUpsert {
    pub campaign_id: String,
    pub message_id: String,
    pub subject: String,
    pub from_email: Option<String>,
    pub preview_text: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub html: String,
    pub text: Option<String>,
}

/// One audit row per pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: i64,
    pub status: RunStatus,
    pub note: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Diagnostics accumulated over one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStats {
    pub total_campaigns: u64,
    pub eligible_sent: u64,
    pub total_messages: u64,
    pub skipped_not_sent: u64,
    pub skipped_no_template: u64,
}

/// JSON-shaped result returned to whoever triggered the import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub ok: bool,
    pub added: u64,
    pub updated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SyncStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
