use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha1::{Digest, Sha1};
use tokio::sync::{Mutex, OnceCell};

use crate::error::OvhError;

/// Transport errors are retried this many times in total.
const MAX_ATTEMPTS: u32 = 3;
/// Exponential backoff cap between retries.
const MAX_BACKOFF_SECS: u64 = 10;
/// Default ceiling on signed requests per second.
pub const DEFAULT_MAX_RPS: u32 = 10;

/// Spaces signed requests so a burst of engine activity cannot trip the
/// upstream rate limit. Waiting happens under the lock, which also gives
/// concurrent callers a global ordering.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            min_interval: Duration::from_secs_f64(1.0 / f64::from(max_per_second.max(1))),
            last_call: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Pieces of the client that outlive any one credentials set: the pooled
/// HTTP client, the rate limiter and the cached server-time delta.
#[derive(Clone, Debug)]
pub struct SharedTransport {
    pub http: reqwest::Client,
    pub limiter: Arc<RateLimiter>,
    pub time_delta: Arc<OnceCell<i64>>,
}

impl SharedTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            limiter: Arc::new(RateLimiter::new(DEFAULT_MAX_RPS)),
            time_delta: Arc::new(OnceCell::new()),
        }
    }
}

/// Signed OVH API client. Cheap to construct; the expensive parts live in
/// [`SharedTransport`] so credentials can change between requests without
/// resetting the limiter or the clock-drift correction.
#[derive(Clone, Debug)]
pub struct OvhClient {
    transport: SharedTransport,
    base_url: String,
    app_key: String,
    app_secret: String,
    consumer_key: String,
}

/// Resolves an endpoint alias to its API base URL.
pub fn resolve_endpoint(endpoint: &str) -> Result<&'static str, OvhError> {
    match endpoint {
        "ovh-eu" => Ok("https://eu.api.ovh.com/1.0"),
        "ovh-ca" => Ok("https://ca.api.ovh.com/1.0"),
        "ovh-us" => Ok("https://api.us.ovhcloud.com/1.0"),
        other => Err(OvhError::UnknownEndpoint(other.to_string())),
    }
}

fn local_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64
}

/// Request signature: `$1$` + SHA-1 over the credential and request fields
/// joined with `+`.
fn sign(app_secret: &str, consumer_key: &str, method: &str, url: &str, body: &str, timestamp: i64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{app_secret}+{consumer_key}+{method}+{url}+{body}+{timestamp}"));
    format!("$1${}", hex::encode(hasher.finalize()))
}

impl OvhClient {
    pub fn new(
        transport: SharedTransport,
        endpoint: &str,
        app_key: &str,
        app_secret: &str,
        consumer_key: &str,
    ) -> Result<Self, OvhError> {
        if app_key.is_empty() || app_secret.is_empty() || consumer_key.is_empty() {
            return Err(OvhError::MissingCredentials);
        }
        let base_url = resolve_endpoint(endpoint)?.to_string();
        Ok(Self {
            transport,
            base_url,
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            consumer_key: consumer_key.to_string(),
        })
    }

    /// Server time minus local time, fetched once per process from the
    /// unsigned `/auth/time` endpoint.
    async fn time_delta(&self) -> i64 {
        let base = self.base_url.clone();
        let http = self.transport.http.clone();
        *self
            .transport
            .time_delta
            .get_or_init(|| async move {
                let url = format!("{base}/auth/time");
                match http.get(&url).send().await {
                    Ok(resp) => match resp.json::<i64>().await {
                        Ok(server_time) => {
                            let delta = server_time - local_epoch_secs();
                            tracing::debug!(delta, "synchronized clock with OVH API");
                            delta
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to parse OVH server time, assuming no drift");
                            0
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to fetch OVH server time, assuming no drift");
                        0
                    }
                }
            })
            .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, OvhError> {
        let url = format!("{}{}", self.base_url, path);
        let body_str = match &body {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.transport.limiter.acquire().await;

            let timestamp = local_epoch_secs() + self.time_delta().await;
            let signature = sign(
                &self.app_secret,
                &self.consumer_key,
                method.as_str(),
                &url,
                &body_str,
                timestamp,
            );

            let mut request = self
                .transport
                .http
                .request(method.clone(), &url)
                .header("X-Ovh-Application", &self.app_key)
                .header("X-Ovh-Timestamp", timestamp.to_string())
                .header("X-Ovh-Consumer", &self.consumer_key)
                .header("X-Ovh-Signature", &signature);
            if body.is_some() {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body_str.clone());
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(OvhError::NotFound);
                    }
                    let text = resp.text().await?;
                    if !status.is_success() {
                        let message = serde_json::from_str::<Value>(&text)
                            .ok()
                            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                            .unwrap_or(text);
                        return Err(OvhError::Api {
                            status: status.as_u16(),
                            message,
                        });
                    }
                    let value: Value = if text.trim().is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_str(&text)?
                    };
                    return Ok(serde_json::from_value(value)?);
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_ATTEMPTS => {
                    let backoff = Duration::from_secs(MAX_BACKOFF_SECS.min(2u64.pow(attempt)));
                    tracing::warn!(
                        error = %e,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        %url,
                        "transient OVH API failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(OvhError::Transport(e)),
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, OvhError> {
        self.call(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, OvhError> {
        self.call(Method::POST, path, Some(serde_json::to_value(body)?)).await
    }

    /// POST without a request body (cart assignment, reboot, ...).
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, OvhError> {
        self.call(Method::POST, path, None).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, OvhError> {
        self.call(Method::PUT, path, Some(serde_json::to_value(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, OvhError> {
        self.call(Method::DELETE, path, None).await
    }

    /// Quick credentials check against `/me`.
    pub async fn me(&self) -> Result<Value, OvhError> {
        self.get("/me").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(resolve_endpoint("ovh-eu").unwrap(), "https://eu.api.ovh.com/1.0");
        assert!(resolve_endpoint("ovh-moon").is_err());
    }

    #[test]
    fn test_signature_format() {
        let sig = sign("secret", "consumer", "GET", "https://eu.api.ovh.com/1.0/me", "", 1700000000);
        assert!(sig.starts_with("$1$"));
        // SHA-1 hex digest is 40 chars
        assert_eq!(sig.len(), 3 + 40);
        // deterministic
        let again = sign("secret", "consumer", "GET", "https://eu.api.ovh.com/1.0/me", "", 1700000000);
        assert_eq!(sig, again);
        // any input change alters the digest
        let other = sign("secret", "consumer", "POST", "https://eu.api.ovh.com/1.0/me", "", 1700000000);
        assert_ne!(sig, other);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let transport = SharedTransport::new(reqwest::Client::new());
        let err = OvhClient::new(transport, "ovh-eu", "", "s", "c").unwrap_err();
        assert!(matches!(err, OvhError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_rate_limiter_spacing() {
        let limiter = RateLimiter::new(100);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // three calls at 100/s should take at least ~20ms
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
