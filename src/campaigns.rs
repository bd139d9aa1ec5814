//! Campaign listing with a filter-degradation chain.
//!
//! Some Klaviyo tenants/revisions reject the combined filter expression, so
//! each page is requested with progressively weaker server-side filters and
//! re-filtered client-side. The weaker the filter, the more the client-side
//! reduction has to do.
use reqwest::Url;
use thiserror::Error;
use tracing::warn;

use crate::klaviyo::model::{Campaign, CampaignListResponse};
use crate::klaviyo::{KlaviyoApi, KlaviyoError};

pub const FILTER_SENT_EMAIL: &str = "and(equals(messages.channel,'email'),equals(status,'sent'))";
pub const FILTER_EMAIL: &str = "equals(messages.channel,'email')";

/// Ordered left-to-right; the first transport success short-circuits.
const FILTER_STRATEGIES: [Option<&str>; 3] = [Some(FILTER_SENT_EMAIL), Some(FILTER_EMAIL), None];

#[derive(Debug, Error)]
#[error("all campaign listing strategies failed for cursor {cursor:?}: {last}")]
pub struct ExhaustedFallbacks {
    pub cursor: Option<String>,
    #[source]
    pub last: KlaviyoError,
}

#[derive(Debug, Clone)]
pub struct CampaignPage {
    pub campaigns: Vec<Campaign>,
    pub next_cursor: Option<String>,
}

/// Fetch one page of campaigns that are plausibly sent email campaigns.
///
/// The client-side reduction over-includes on purpose (status "sent" OR
/// channel "email"): the message-level send-time check downstream is the
/// authoritative gate, this is only a pre-filter.
pub async fn list_sent_campaigns(
    api: &dyn KlaviyoApi,
    cursor: Option<&str>,
) -> Result<CampaignPage, ExhaustedFallbacks> {
    let mut last: Option<KlaviyoError> = None;
    for filter in FILTER_STRATEGIES {
        let path = campaigns_path(filter, cursor);
        match api.get(&path).await {
            Ok(body) => {
                let resp: CampaignListResponse =
                    serde_json::from_value(body).unwrap_or_default();
                let next_cursor = resp.links.next.as_deref().and_then(next_cursor_of);
                let campaigns = resp
                    .data
                    .into_iter()
                    .filter(|c| c.attributes.is_sent() || c.attributes.is_email())
                    .collect();
                return Ok(CampaignPage {
                    campaigns,
                    next_cursor,
                });
            }
            Err(err) => {
                warn!(%err, path, "campaign listing strategy failed, degrading filter");
                last = Some(err);
            }
        }
    }
    Err(ExhaustedFallbacks {
        cursor: cursor.map(str::to_owned),
        last: last.expect("at least one listing strategy was attempted"),
    })
}

/// Build the listing path with properly encoded filter and cursor params.
pub fn campaigns_path(filter: Option<&str>, cursor: Option<&str>) -> String {
    let mut url = Url::parse("https://base.invalid/api/campaigns").expect("valid static URL");
    {
        let mut query = url.query_pairs_mut();
        if let Some(filter) = filter {
            query.append_pair("filter", filter);
        }
        if let Some(cursor) = cursor {
            query.append_pair("page[cursor]", cursor);
        }
    }
    match url.query() {
        Some(query) if !query.is_empty() => format!("/api/campaigns?{query}"),
        _ => "/api/campaigns".to_string(),
    }
}

/// Extract `page[cursor]` from a full `links.next` URL.
fn next_cursor_of(next_link: &str) -> Option<String> {
    let url = Url::parse(next_link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "page[cursor]")
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaigns_path_without_params() {
        assert_eq!(campaigns_path(None, None), "/api/campaigns");
    }

    #[test]
    fn campaigns_path_encodes_filter() {
        let path = campaigns_path(Some(FILTER_EMAIL), None);
        assert!(path.starts_with("/api/campaigns?filter="));
        assert!(!path.contains('('));

        let url = Url::parse(&format!("https://base.invalid{path}")).unwrap();
        let (_, filter) = url.query_pairs().find(|(k, _)| k == "filter").unwrap();
        assert_eq!(filter, FILTER_EMAIL);
    }

    #[test]
    fn campaigns_path_appends_cursor() {
        let path = campaigns_path(Some(FILTER_SENT_EMAIL), Some("abc=="));
        let url = Url::parse(&format!("https://base.invalid{path}")).unwrap();
        let (_, cursor) = url.query_pairs().find(|(k, _)| k == "page[cursor]").unwrap();
        assert_eq!(cursor, "abc==");
    }

    #[test]
    fn next_cursor_extracted_from_link() {
        let link = "https://a.klaviyo.com/api/campaigns?filter=x&page%5Bcursor%5D=next-page";
        assert_eq!(next_cursor_of(link).as_deref(), Some("next-page"));
    }

    #[test]
    fn next_cursor_absent_when_link_has_none() {
        assert_eq!(next_cursor_of("https://a.klaviyo.com/api/campaigns"), None);
        assert_eq!(next_cursor_of("not a url"), None);
    }
}
