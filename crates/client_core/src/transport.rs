//! JSON over HTTP.
//!
//! Non-2xx responses are not errors at this layer: the status band decides how
//! the body is decoded, so the client hands back the status with the body.

use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBand {
    Success,
    Redirection,
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    pub status_code: u16,
    pub value: Value,
}

impl JsonResponse {
    pub fn band(&self) -> StatusBand {
        match self.status_code {
            300..=399 => StatusBand::Redirection,
            400..=u16::MAX => StatusBand::Failure,
            _ => StatusBand::Success,
        }
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, base_url: &str, path: &str) -> Result<JsonResponse, TransportError>;

    async fn post(
        &self,
        base_url: &str,
        path: &str,
        body: &Value,
    ) -> Result<JsonResponse, TransportError>;
}

#[derive(Clone)]
pub struct ReqwestClient {
    http: Client,
}

impl ReqwestClient {
    /// Redirects are never followed: a 3xx body is a dialog redirection the
    /// caller decodes.
    pub fn new() -> Result<Self, TransportError> {
        let http = Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|err| TransportError::Setup {
                message: err.to_string(),
            })?;
        Ok(Self { http })
    }

    /// The caller's client must not follow redirects either.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, base_url: &str, path: &str) -> Result<JsonResponse, TransportError> {
        let url = endpoint(base_url, path)?;
        info!(%url, "GET");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| request_failed(&url, err))?;
        read_json(&url, response).await
    }

    async fn post(
        &self,
        base_url: &str,
        path: &str,
        body: &Value,
    ) -> Result<JsonResponse, TransportError> {
        let url = endpoint(base_url, path)?;
        info!(%url, "POST");
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|err| request_failed(&url, err))?;
        read_json(&url, response).await
    }
}

/// Joins `path` below `base_url`, keeping any path prefix the base carries.
pub fn endpoint(base_url: &str, path: &str) -> Result<Url, TransportError> {
    let invalid = |err: url::ParseError| TransportError::InvalidUrl {
        url: format!("{base_url} + {path}"),
        message: err.to_string(),
    };
    let base = if base_url.ends_with('/') {
        Url::parse(base_url)
    } else {
        Url::parse(&format!("{base_url}/"))
    }
    .map_err(invalid)?;
    base.join(path.trim_start_matches('/')).map_err(invalid)
}

fn request_failed(url: &Url, err: reqwest::Error) -> TransportError {
    TransportError::Request {
        url: url.to_string(),
        message: err.to_string(),
    }
}

async fn read_json(url: &Url, response: reqwest::Response) -> Result<JsonResponse, TransportError> {
    let status_code = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|err| request_failed(url, err))?;
    debug!(%url, status_code, bytes = text.len(), "response received");

    let value = if text.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(&text) {
            Ok(value) => value,
            // Error pages are often plain text; keep them for the failure path.
            Err(_) if status_code >= 400 => Value::String(text),
            Err(err) => {
                return Err(TransportError::InvalidBody {
                    url: url.to_string(),
                    message: err.to_string(),
                })
            }
        }
    };
    Ok(JsonResponse { status_code, value })
}
