//! Wire types for the Klaviyo JSON:API payloads we consume.
//!
//! Every remote field is optional or defaulted: the pipeline must survive
//! partially-populated objects, so deserialization never fails on absence.
//! List payloads are parsed item by item; one malformed object must not cost
//! the rest of the page or its pagination cursor.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Keep the list items that parse, drop the ones that don't.
fn lenient_items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Like `lenient_items` for a single optional object reference.
fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignListResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    pub data: Vec<Campaign>,
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(default)]
    pub attributes: CampaignAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignAttributes {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub send_time: Option<String>,
}

impl CampaignAttributes {
    pub fn is_sent(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("sent"))
    }

    pub fn is_email(&self) -> bool {
        self.channel
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("email"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageListResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    pub data: Vec<MessageRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDetailResponse {
    #[serde(default)]
    pub data: MessageDetail,
    #[serde(default, deserialize_with = "lenient_items")]
    pub included: Vec<IncludedObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDetail {
    #[serde(default)]
    pub attributes: MessageAttributes,
    #[serde(default)]
    pub relationships: Relationships,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageAttributes {
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub definition: Option<Definition>,
    #[serde(default)]
    pub send_times: Vec<SendTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub preview_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendTime {
    #[serde(default)]
    pub datetime: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationships {
    #[serde(default)]
    pub template: Option<Relationship>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationship {
    #[serde(default, deserialize_with = "lenient_option")]
    pub data: Option<ResourceRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncludedObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateLookupResponse {
    #[serde(default, deserialize_with = "lenient_option")]
    pub data: Option<ResourceRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderResponse {
    #[serde(default)]
    pub data: RenderData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderData {
    #[serde(default)]
    pub attributes: RenderAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderAttributes {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn campaign_list_keeps_parseable_items_and_links() {
        let resp: CampaignListResponse = serde_json::from_value(json!({
            "data": [
                { "attributes": { "status": "Sent", "channel": "email" } },
                { "id": "c-good", "attributes": { "status": "Sent", "channel": "email" } }
            ],
            "links": { "next": "https://a.klaviyo.com/api/campaigns?page%5Bcursor%5D=p2" }
        }))
        .unwrap();
        assert_eq!(resp.data.len(), 1);
        assert_eq!(resp.data[0].id, "c-good");
        assert!(resp.links.next.is_some());
    }

    #[test]
    fn message_list_drops_idless_entries() {
        let resp: MessageListResponse = serde_json::from_value(json!({
            "data": [{ "no_id": true }, { "id": "m1" }]
        }))
        .unwrap();
        assert_eq!(resp.data.len(), 1);
        assert_eq!(resp.data[0].id, "m1");
    }

    #[test]
    fn detail_survives_malformed_included_and_relationship() {
        let resp: MessageDetailResponse = serde_json::from_value(json!({
            "data": {
                "attributes": {},
                "relationships": { "template": { "data": { "not_an_id": 1 } } }
            },
            "included": [
                { "type": "template" },
                { "type": "template", "id": "tpl-1" }
            ]
        }))
        .unwrap();
        let rel = resp.data.relationships.template.unwrap();
        assert!(rel.data.is_none());
        assert_eq!(resp.included.len(), 1);
        assert_eq!(resp.included[0].id, "tpl-1");
    }

    #[test]
    fn template_lookup_tolerates_idless_ref() {
        let resp: TemplateLookupResponse =
            serde_json::from_value(json!({ "data": { "type": "template" } })).unwrap();
        assert!(resp.data.is_none());
    }
}
