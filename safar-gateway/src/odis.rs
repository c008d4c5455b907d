use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, StatusCode};
use safar_core::retry::{parse_retry_after, RetryPolicy};
use safar_core::search::{FlightSearchResult, HotelSearchCriteria, HotelSearchResult, SearchCriteria};
use safar_core::supplier::{GatewayError, SearchGateway};
use safar_shared::Masked;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const TOKEN_PATH: &str = "/oauth/token";
const FLIGHT_SEARCH_PATH: &str = "/flights/search";
const HOTEL_SEARCH_PATH: &str = "/hotels/search";

/// Refresh this long before the provider says the token expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct AccessToken {
    value: Masked<String>,
    refresh_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

/// Client for the ODIS flight/hotel aggregator.
///
/// Owns token acquisition (OAuth2 password grant, cached until shortly before
/// expiry) and rate-limit backoff. Rate limiting is retried per the
/// `RetryPolicy`; every other upstream failure is returned on the spot with
/// the provider's status and body.
pub struct OdisClient {
    http: Client,
    base_url: String,
    username: String,
    password: Masked<String>,
    retry: RetryPolicy,
    token: RwLock<Option<AccessToken>>,
}

impl OdisClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        if base_url.trim().is_empty() {
            return Err(GatewayError::Config("ODIS base url is empty".to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("safar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: Masked::new(password.to_string()),
            retry,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange credentials for a fresh bearer token and cache it.
    pub async fn authenticate(&self) -> Result<String, GatewayError> {
        let mut slot = self.token.write().await;
        let token = self.fetch_token().await?;
        let value = token.value.expose().clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<AccessToken, GatewayError> {
        let url = self.url(TOKEN_PATH);
        let body = self
            .execute("token", || {
                self.http.post(&url).form(&[
                    ("grant_type", "password"),
                    ("username", self.username.as_str()),
                    ("password", self.password.expose().as_str()),
                ])
            })
            .await?;

        let token: TokenResponse = decode(&body)?;
        info!("ODIS token acquired, expires in {}s", token.expires_in);

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        Ok(AccessToken {
            value: Masked::new(token.access_token),
            refresh_at: Instant::now() + lifetime,
        })
    }

    /// Cached token, fetched on first use and when it is about to expire.
    async fn bearer(&self) -> Result<String, GatewayError> {
        {
            let slot = self.token.read().await;
            if let Some(token) = slot.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.value.expose().clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.expose().clone());
        }
        let token = self.fetch_token().await?;
        let value = token.value.expose().clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// Send a request built by `build`, retrying only on 429. Returns the
    /// response body of the first 2xx.
    async fn execute<F>(&self, label: &str, build: F) -> Result<String, GatewayError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 1u32;
        loop {
            let response = build()
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
            let status = response.status();
            debug!("ODIS {} attempt {} -> {}", label, attempt, status);

            if status.is_success() {
                return response
                    .text()
                    .await
                    .map_err(|e| GatewayError::Transport(e.to_string()));
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let hint = parse_retry_after(
                    response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok()),
                );
                let body = response.text().await.unwrap_or_default();
                match self.retry.next_delay(attempt, hint) {
                    Some(delay) => {
                        warn!(
                            "ODIS {} rate limited (attempt {}/{}), retrying in {:?}",
                            label, attempt, self.retry.max_attempts, delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    None => {
                        warn!("ODIS {} still rate limited after {} attempts", label, attempt);
                        return Err(GatewayError::RateLimited { attempts: attempt, body });
                    }
                }
            }

            let body = response.text().await.unwrap_or_default();
            warn!("ODIS {} failed with {}: {}", label, status, body);
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
    }

    /// Authenticated JSON POST. A 401 drops the cached token and retries once
    /// with a new one.
    async fn post_json<B, R>(&self, label: &str, path: &str, payload: &B) -> Result<R, GatewayError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        let mut reauthenticated = false;
        loop {
            let token = self.bearer().await?;
            let result = self
                .execute(label, || self.http.post(&url).bearer_auth(&token).json(payload))
                .await;

            match result {
                Err(GatewayError::Upstream { status: 401, .. }) if !reauthenticated => {
                    info!("ODIS rejected cached token, re-authenticating");
                    self.invalidate_token().await;
                    reauthenticated = true;
                }
                Err(e) => return Err(e),
                Ok(body) => return decode(&body),
            }
        }
    }
}

fn decode<R: DeserializeOwned>(body: &str) -> Result<R, GatewayError> {
    serde_json::from_str(body).map_err(|e| {
        let excerpt: String = body.chars().take(200).collect();
        GatewayError::Decode(format!("{} in {}", e, excerpt))
    })
}

#[async_trait]
impl SearchGateway for OdisClient {
    async fn search_flights(&self, criteria: &SearchCriteria) -> Result<FlightSearchResult, GatewayError> {
        let result: FlightSearchResult = self.post_json("flight search", FLIGHT_SEARCH_PATH, criteria).await?;
        info!(
            "ODIS flight search {} returned {} itineraries",
            result.s_id,
            result.itineraries.len()
        );
        Ok(result)
    }

    async fn search_hotels(&self, criteria: &HotelSearchCriteria) -> Result<HotelSearchResult, GatewayError> {
        let result: HotelSearchResult = self.post_json("hotel search", HOTEL_SEARCH_PATH, criteria).await?;
        info!("ODIS hotel search {} returned {} hotels", result.s_id, result.hotels.len());
        Ok(result)
    }
}
