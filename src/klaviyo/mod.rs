use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub mod model;

const KLAVIYO_API_BASE: &str = "https://a.klaviyo.com/";

/// Responses can carry large HTML payloads; keep error bodies readable.
const BODY_EXCERPT_LEN: usize = 300;

#[derive(Debug, Error)]
pub enum KlaviyoError {
    #[error("klaviyo {path} -> {status}: {body}")]
    Api {
        status: StatusCode,
        path: String,
        body: String,
    },
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid request path: {path}")]
    BadPath { path: String },
}

/// Seam over the remote API so the pipeline can run against a fake in tests.
#[async_trait]
pub trait KlaviyoApi: Send + Sync + Any {
    async fn get(&self, path: &str) -> Result<Value, KlaviyoError>;

    async fn post(&self, path: &str, body: &Value) -> Result<Value, KlaviyoError>;
}

#[derive(Clone)]
pub struct KlaviyoClient {
    http: Client,
    base_url: Url,
    api_key: String,
    revision: String,
}

impl fmt::Debug for KlaviyoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KlaviyoClient")
            .field("base_url", &self.base_url)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl KlaviyoClient {
    pub fn new(api_key: String, revision: String, timeout: Duration) -> Self {
        let base_url = Url::parse(KLAVIYO_API_BASE).expect("valid default Klaviyo URL");
        Self::with_base_url(api_key, revision, timeout, base_url)
    }

    pub fn with_base_url(
        api_key: String,
        revision: String,
        timeout: Duration,
        base_url: Url,
    ) -> Self {
        let http = Client::builder()
            .user_agent("klaviyo-archiver/0.1")
            .timeout(timeout)
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            revision,
        }
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, KlaviyoError> {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|_| KlaviyoError::BadPath {
                path: path.to_string(),
            })?;
        let mut builder = self
            .http
            .request(method, endpoint)
            .header("Authorization", format!("Klaviyo-API-Key {}", self.api_key))
            .header("revision", &self.revision)
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.header("Content-Type", "application/json").json(body);
        }
        builder.build().map_err(|source| KlaviyoError::Transport {
            path: path.to_string(),
            source,
        })
    }

    async fn execute(&self, request: reqwest::Request, path: &str) -> Result<Value, KlaviyoError> {
        debug!(method = %request.method(), url = %request.url(), "klaviyo request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|source| KlaviyoError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = excerpt(&res.text().await.unwrap_or_default());
            warn!(%status, path, body, "klaviyo API error");
            return Err(KlaviyoError::Api {
                status,
                path: path.to_string(),
                body,
            });
        }

        res.json::<Value>()
            .await
            .map_err(|source| KlaviyoError::Transport {
                path: path.to_string(),
                source,
            })
    }
}

#[async_trait]
impl KlaviyoApi for KlaviyoClient {
    async fn get(&self, path: &str) -> Result<Value, KlaviyoError> {
        let request = self.build_request(Method::GET, path, None)?;
        self.execute(request, path).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, KlaviyoError> {
        let request = self.build_request(Method::POST, path, Some(body))?;
        self.execute(request, path).await
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LEN {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
