// REST client for the external L3 routing service.
//
// Wraps `reqwest::Client` with the retry discipline every caller shares:
// GETs fall back to a caller-supplied default after exhaustion, POSTs
// treat 400/409 as "already applied" because the service rejects
// duplicate configuration instead of acknowledging it.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::retry::RetryPolicy;

/// Outcome of an idempotent POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The service accepted the new configuration.
    Created,
    /// The service rejected it as a duplicate (HTTP 400/409); the
    /// configuration is already in place.
    AlreadyApplied,
}

/// HTTP client for the routing service's REST API.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct RoutingClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl RoutingClient {
    /// Create a client for the service at `base_url`.
    ///
    /// `timeout` applies per request, not per logical operation.
    pub fn new(base_url: Url, timeout: Duration, retry: RetryPolicy) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("flowgrid/0.1.0")
            .build()?;
        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    /// Create a client with a pre-built `reqwest::Client` (tests).
    pub fn with_client(http: reqwest::Client, base_url: Url, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url,
            retry,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET `path` and decode the JSON body, retrying per policy.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        self.retry
            .run("GET", || {
                let http = self.http.clone();
                let url = url.clone();
                async move {
                    debug!("GET {}", url);
                    let resp = http.get(url.clone()).send().await?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(Error::Status {
                            path: url.path().to_string(),
                            status: status.as_u16(),
                        });
                    }
                    let body = resp.text().await?;
                    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                        message: e.to_string(),
                        body,
                    })
                }
            })
            .await
    }

    /// GET `path`, substituting `default` if all attempts fail.
    ///
    /// Callers must treat the default and a genuinely empty response
    /// identically; from here they are indistinguishable.
    pub async fn get_json_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        match self.get_json(path).await {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, path, "GET failed; using default");
                default
            }
        }
    }

    /// POST a JSON `body` to `path`, retrying per policy.
    ///
    /// HTTP 400 and 409 are success (`Applied::AlreadyApplied`): the
    /// service signals duplicate configuration with those codes. Every
    /// other non-2xx and any transport failure is transient.
    pub async fn post_json(&self, path: &str, body: &impl Serialize) -> Result<Applied, Error> {
        let url = self.url(path)?;
        let payload = serde_json::to_value(body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;

        self.retry
            .run("POST", || {
                let http = self.http.clone();
                let url = url.clone();
                let payload = payload.clone();
                async move {
                    debug!("POST {}", url);
                    let resp = http.post(url.clone()).json(&payload).send().await?;
                    let status = resp.status();

                    if status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        info!(%url, body, "POST accepted");
                        return Ok(Applied::Created);
                    }

                    if status == reqwest::StatusCode::BAD_REQUEST
                        || status == reqwest::StatusCode::CONFLICT
                    {
                        info!(%url, status = status.as_u16(), "POST rejected as duplicate; already applied");
                        return Ok(Applied::AlreadyApplied);
                    }

                    Err(Error::Status {
                        path: url.path().to_string(),
                        status: status.as_u16(),
                    })
                }
            })
            .await
    }
}
