//! HTTP client for the Punster API.
//!
//! Every request is sent with a bearer token and `Accept: application/json`:
//! - `POST {base}/puns/create` with `{ "misbehavior": ... }` returns a [`Pun`]
//! - `POST {base}/puns/evaluate` with `{ "pun", "misbehavior", "channel" }`
//!   returns a [`DeliveryReport`]

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use super::traits::*;
use crate::types::{Channel, DeliveryReport, Misbehavior, Pun};

/// Punster API backend.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_token: String,
}

impl HttpBackend {
    /// Create a backend for the API at `base_url`.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self, PunsterError> {
        let base_url = base_url.into();
        reqwest::Url::parse(&base_url)
            .map_err(|e| PunsterError::Unavailable(format!("Invalid base URL '{}': {}", base_url, e)))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PunsterError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, PunsterError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(url = %self.url(path), "Sending Punster API request");

        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| PunsterError::Fetch(e.to_string()))?;

        decode(check_status(response).await?).await
    }
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

async fn check_status(response: Response) -> Result<Response, PunsterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        return Err(PunsterError::RateLimited);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PunsterError::Fetch(format!("HTTP {}: {}", status, body)))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PunsterError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PunsterError::Fetch(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| PunsterError::Malformed(e.to_string()))
}

#[derive(Serialize)]
struct CreateParams<'a> {
    misbehavior: &'a Misbehavior,
}

#[derive(Serialize)]
struct EvaluateParams<'a> {
    pun: &'a Pun,
    misbehavior: &'a Misbehavior,
    channel: &'a Channel,
}

#[async_trait]
impl PunCreationService for HttpBackend {
    async fn create_pun(&self, misbehavior: &Misbehavior) -> Result<Pun, PunsterError> {
        self.post("/puns/create", &CreateParams { misbehavior }).await
    }
}

#[async_trait]
impl PunEvaluationService for HttpBackend {
    async fn evaluate_pun(
        &self,
        pun: &Pun,
        misbehavior: &Misbehavior,
        channel: &Channel,
    ) -> Result<DeliveryReport, PunsterError> {
        self.post(
            "/puns/evaluate",
            &EvaluateParams {
                pun,
                misbehavior,
                channel,
            },
        )
        .await
    }
}
