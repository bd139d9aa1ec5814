//! Message fetching, template resolution, and metadata extraction.
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::klaviyo::model::{
    Campaign, MessageDetailResponse, MessageListResponse, TemplateLookupResponse,
};
use crate::klaviyo::{KlaviyoApi, KlaviyoError};

/// List the message ids belonging to a campaign.
pub async fn fetch_message_ids(
    api: &dyn KlaviyoApi,
    campaign_id: &str,
) -> Result<Vec<String>, KlaviyoError> {
    let body = api
        .get(&format!("/api/campaigns/{campaign_id}/campaign-messages"))
        .await?;
    let resp: MessageListResponse = serde_json::from_value(body).unwrap_or_default();
    Ok(resp.data.into_iter().map(|m| m.id).collect())
}

/// Fetch one message with its template relationship expanded.
pub async fn fetch_message_detail(
    api: &dyn KlaviyoApi,
    message_id: &str,
) -> Result<MessageDetailResponse, KlaviyoError> {
    let body = api
        .get(&format!("/api/campaign-messages/{message_id}?include=template"))
        .await?;
    Ok(serde_json::from_value(body).unwrap_or_default())
}

/// Resolve the template to render for a message, first match wins:
/// 1. the expanded template relationship reference,
/// 2. a template object in the expansion's included list,
/// 3. the dedicated per-message template endpoint.
///
/// A failure of the last lookup is treated as absence, not as an error; the
/// caller skips the message.
pub async fn resolve_template_id(
    api: &dyn KlaviyoApi,
    detail: &MessageDetailResponse,
    message_id: &str,
) -> Option<String> {
    if let Some(id) = detail
        .data
        .relationships
        .template
        .as_ref()
        .and_then(|rel| rel.data.as_ref())
        .map(|r| r.id.clone())
    {
        return Some(id);
    }

    if let Some(id) = detail
        .included
        .iter()
        .find(|obj| obj.kind == "template")
        .map(|obj| obj.id.clone())
    {
        return Some(id);
    }

    match api
        .get(&format!("/api/campaign-messages/{message_id}/template"))
        .await
    {
        Ok(body) => {
            let resp: TemplateLookupResponse = serde_json::from_value(body).unwrap_or_default();
            resp.data.map(|r| r.id)
        }
        Err(err) => {
            debug!(%err, message_id, "template lookup endpoint failed, treating as unresolved");
            None
        }
    }
}

/// Flattened message metadata with the campaign as fallback source.
#[derive(Debug, Clone)]
pub struct MessageMeta {
    pub subject: String,
    pub from_email: Option<String>,
    pub preview_text: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Extract subject, sender, preview, and send time from a message detail,
/// falling back to campaign-level values where the message lacks them.
///
/// `sent_at` stays `None` when no timestamp is present anywhere; the caller
/// must then skip the message, this is the authoritative "was it sent" check.
pub fn extract_meta(detail: &MessageDetailResponse, campaign: &Campaign) -> MessageMeta {
    let content = detail
        .data
        .attributes
        .definition
        .as_ref()
        .and_then(|d| d.content.as_ref());

    let subject = content
        .and_then(|c| c.subject.clone())
        .or_else(|| campaign.attributes.name.clone())
        .unwrap_or_else(|| "Newsletter".to_string());

    let sent_at = detail
        .data
        .attributes
        .send_times
        .first()
        .and_then(|t| t.datetime.as_deref())
        .and_then(parse_timestamp)
        .or_else(|| {
            campaign
                .attributes
                .send_time
                .as_deref()
                .and_then(parse_timestamp)
        });

    MessageMeta {
        subject,
        from_email: detail.data.attributes.from_email.clone(),
        preview_text: content.and_then(|c| c.preview_text.clone()),
        sent_at,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn campaign(name: Option<&str>, send_time: Option<&str>) -> Campaign {
        serde_json::from_value(json!({
            "id": "c1",
            "attributes": { "status": "Sent", "name": name, "send_time": send_time }
        }))
        .unwrap()
    }

    fn detail(value: serde_json::Value) -> MessageDetailResponse {
        serde_json::from_value(value).unwrap_or_default()
    }

    #[test]
    fn meta_prefers_message_level_fields() {
        let detail = detail(json!({
            "data": {
                "attributes": {
                    "from_email": "news@example.com",
                    "definition": { "content": {
                        "subject": "Weekly digest",
                        "preview_text": "What happened this week"
                    }},
                    "send_times": [{ "datetime": "2024-05-01T10:00:00+00:00" }]
                }
            }
        }));
        let meta = extract_meta(&detail, &campaign(Some("Campaign name"), None));
        assert_eq!(meta.subject, "Weekly digest");
        assert_eq!(meta.from_email.as_deref(), Some("news@example.com"));
        assert_eq!(meta.preview_text.as_deref(), Some("What happened this week"));
        assert_eq!(
            meta.sent_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn meta_falls_back_to_campaign_fields() {
        let detail = detail(json!({ "data": { "attributes": {} } }));
        let meta = extract_meta(
            &detail,
            &campaign(Some("May launch"), Some("2024-05-02T08:30:00+00:00")),
        );
        assert_eq!(meta.subject, "May launch");
        assert_eq!(
            meta.sent_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn meta_defaults_subject_and_leaves_sent_at_empty() {
        let detail = detail(json!({ "data": { "attributes": {} } }));
        let meta = extract_meta(&detail, &campaign(None, None));
        assert_eq!(meta.subject, "Newsletter");
        assert!(meta.sent_at.is_none());
    }

    #[test]
    fn meta_ignores_unparseable_timestamps() {
        let detail = detail(json!({
            "data": { "attributes": { "send_times": [{ "datetime": "yesterday-ish" }] } }
        }));
        let meta = extract_meta(&detail, &campaign(None, None));
        assert!(meta.sent_at.is_none());
    }

    #[test]
    fn template_relationship_is_read_from_detail() {
        let parsed = detail(json!({
            "data": { "relationships": { "template": { "data": { "id": "tpl-1" } } } },
            "included": [{ "type": "template", "id": "tpl-other" }]
        }));
        let rel_id = parsed
            .data
            .relationships
            .template
            .as_ref()
            .and_then(|rel| rel.data.as_ref())
            .map(|r| r.id.clone());
        assert_eq!(rel_id.as_deref(), Some("tpl-1"));
    }

    #[test]
    fn included_template_is_found_by_type() {
        let parsed = detail(json!({
            "data": {},
            "included": [
                { "type": "image", "id": "img-1" },
                { "type": "template", "id": "tpl-2" }
            ]
        }));
        let incl_id = parsed
            .included
            .iter()
            .find(|obj| obj.kind == "template")
            .map(|obj| obj.id.clone());
        assert_eq!(incl_id.as_deref(), Some("tpl-2"));
    }
}
