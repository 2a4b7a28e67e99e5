// ── Webhook delivery ──
//
// JSON POST to an operator-supplied URL. One attempt per call; callers
// decide whether a failure matters.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::Error;

/// A single webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    url: Url,
}

impl WebhookClient {
    /// Build a client with its own connection pool.
    ///
    /// `bearer`, when present, is sent as `Authorization: Bearer <token>`
    /// and marked sensitive so it never shows up in debug output.
    pub fn new(url: &str, timeout: Duration, bearer: Option<&SecretString>) -> Result<Self, Error> {
        let url = Url::parse(url)?;

        let mut headers = HeaderMap::new();
        if let Some(token) = bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| Error::Probe {
                    target: url.to_string(),
                    message: format!("invalid bearer token: {e}"),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .user_agent(concat!("netpulse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, url })
    }

    /// Wrap an existing `reqwest::Client` (caller manages headers and timeouts).
    pub fn with_client(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn post<T: Serialize + Sync + ?Sized>(&self, payload: &T) -> Result<(), Error> {
        debug!("POST {}", self.url);
        let resp = self.http.post(self.url.clone()).json(payload).send().await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Webhook {
                status: status.as_u16(),
            })
        }
    }
}
