//! Server-side template rendering and HTML sanitization.
use serde_json::{json, Value};

use crate::klaviyo::model::RenderResponse;
use crate::klaviyo::{KlaviyoApi, KlaviyoError};

#[derive(Debug, Clone)]
pub struct Rendered {
    pub html: String,
    pub text: Option<String>,
}

/// The archive stores a generic copy, so the render context is always empty:
/// no recipient-specific substitution ever reaches persistence.
pub fn build_render_request(template_id: &str) -> Value {
    json!({
        "data": {
            "type": "template",
            "id": template_id,
            "attributes": { "context": {} }
        }
    })
}

pub async fn render_template(
    api: &dyn KlaviyoApi,
    template_id: &str,
) -> Result<Rendered, KlaviyoError> {
    let body = build_render_request(template_id);
    let resp = api.post("/api/template-render", &body).await?;
    let parsed: RenderResponse = serde_json::from_value(resp).unwrap_or_default();
    Ok(Rendered {
        html: parsed.data.attributes.html.unwrap_or_default(),
        text: parsed.data.attributes.text,
    })
}

/// Strip unsafe markup before persistence. Raw HTML is never stored.
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}
