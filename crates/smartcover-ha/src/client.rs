// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SmartCover.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use crate::errors::{HaError, HaResult};
use crate::types::{HaEntityState, HaStateUpdate};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Base URL used inside an HA add-on container
pub const SUPERVISOR_URL: &str = "http://supervisor/core";

/// Home Assistant REST API client
#[derive(Debug, Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HomeAssistantClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> HaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HaError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Client for the Supervisor API, the standard setup inside an HA add-on
    pub fn from_supervisor() -> HaResult<Self> {
        let token = std::env::var("SUPERVISOR_TOKEN").map_err(|_| {
            HaError::ConfigError(
                "SUPERVISOR_TOKEN environment variable not set. Are you running as an HA add-on?"
                    .to_owned(),
            )
        })?;

        info!("Initializing HA client using Supervisor API");
        Self::new(SUPERVISOR_URL, token)
    }

    /// Client from configuration values, falling back to `HA_BASE_URL` / `HA_TOKEN`
    pub fn from_config(ha_base_url: Option<String>, ha_token: Option<String>) -> HaResult<Self> {
        let base_url = ha_base_url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| std::env::var("HA_BASE_URL").ok())
            .unwrap_or_else(|| "http://localhost:8123".to_owned());

        let token = ha_token
            .filter(|token| !token.trim().is_empty())
            .or_else(|| std::env::var("HA_TOKEN").ok())
            .ok_or_else(|| {
                HaError::ConfigError(
                    "HA token not found in config or HA_TOKEN environment variable".to_owned(),
                )
            })?;

        info!("Initializing HA client from configuration: {}", base_url);
        Self::new(base_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Get the state of a specific entity
    pub async fn get_state(&self, entity_id: &str) -> HaResult<HaEntityState> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        debug!("🔍 [HA QUERY] Getting state for entity: {}", entity_id);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let state = response.json::<HaEntityState>().await?;
                debug!("✅ [HA RESULT] Entity: {} = '{}'", entity_id, state.state);
                trace!("   Attributes: {:?}", state.attributes);
                Ok(state)
            }
            StatusCode::NOT_FOUND => {
                debug!("❌ [HA ERROR] Entity not found: {}", entity_id);
                Err(HaError::EntityNotFound(entity_id.to_owned()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA ERROR] Authentication failed for entity: {}", entity_id);
                Err(HaError::AuthenticationFailed)
            }
            status => Err(api_error(status, response).await),
        }
    }

    /// Call a service given as "domain.service"
    pub async fn call_service(&self, service: &str, data: Value) -> HaResult<()> {
        self.post_service(service, &data, false).await.map(|_| ())
    }

    /// Call a service that returns data (`?return_response`).
    ///
    /// Returns the `service_response` object when HA wraps it, otherwise the whole body.
    pub async fn call_service_with_response(&self, service: &str, data: Value) -> HaResult<Value> {
        let body = self.post_service(service, &data, true).await?;
        Ok(match body {
            Value::Object(mut map) if map.contains_key("service_response") => map
                .remove("service_response")
                .unwrap_or(Value::Null),
            other => other,
        })
    }

    async fn post_service(&self, service: &str, data: &Value, return_response: bool) -> HaResult<Value> {
        let Some((domain, name)) = service.split_once('.').filter(|(d, n)| {
            !d.is_empty() && !n.is_empty() && !n.contains('.')
        }) else {
            error!("❌ [HA ERROR] Invalid service format: {}", service);
            return Err(HaError::ServiceCallFailed {
                service: service.to_owned(),
                reason: "Invalid service format, expected 'domain.service'".to_owned(),
            });
        };

        let mut url = format!("{}/api/services/{}/{}", self.base_url, domain, name);
        if return_response {
            url.push_str("?return_response");
        }
        debug!("📞 [HA SERVICE] Calling: {} {}", service, data);

        let response = self
            .retry_request(|| async {
                self.client
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(data)
                    .send()
                    .await
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                debug!("✅ [HA SERVICE] Success: {}", service);
                if return_response {
                    Ok(response.json::<Value>().await?)
                } else {
                    Ok(Value::Null)
                }
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA SERVICE] Authentication failed for: {}", service);
                Err(HaError::AuthenticationFailed)
            }
            status => {
                let reason = response.text().await.unwrap_or_default();
                error!("❌ [HA SERVICE] Failed: {} (status: {}): {}", service, status, reason);
                Err(HaError::ServiceCallFailed {
                    service: service.to_owned(),
                    reason: if reason.is_empty() {
                        status.to_string()
                    } else {
                        reason
                    },
                })
            }
        }
    }

    /// Create or update an entity state (`POST /api/states/<entity_id>`)
    pub async fn set_state(&self, entity_id: &str, state: &str, attributes: Value) -> HaResult<()> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let body = HaStateUpdate {
            state: state.to_owned(),
            attributes,
        };
        trace!("📤 [HA STATE] {} = {}", entity_id, state);

        let response = self
            .retry_request(|| async {
                self.client
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(&body)
                    .send()
                    .await
            })
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HaError::AuthenticationFailed),
            status => Err(api_error(status, response).await),
        }
    }

    /// Health check - ping HA API
    pub async fn ping(&self) -> HaResult<bool> {
        let url = format!("{}/api/", self.base_url);
        debug!("Performing health check");

        match self.client.get(&url).bearer_auth(&self.token).send().await {
            Ok(response) => {
                let is_ok = response.status().is_success();
                if !is_ok {
                    warn!("Health check failed: status {}", response.status());
                }
                Ok(is_ok)
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Home Assistant configuration (including timezone)
    pub async fn get_config(&self) -> HaResult<Value> {
        let url = format!("{}/api/config", self.base_url);
        debug!("Fetching Home Assistant configuration");

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<Value>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HaError::AuthenticationFailed),
            status => Err(api_error(status, response).await),
        }
    }

    /// Home Assistant timezone name (e.g. "Europe/Prague")
    pub async fn get_timezone(&self) -> HaResult<String> {
        let config = self.get_config().await?;

        config
            .get("time_zone")
            .and_then(Value::as_str)
            .map(|tz| {
                info!("🌍 Home Assistant timezone: {}", tz);
                tz.to_owned()
            })
            .ok_or_else(|| HaError::ConfigError("Timezone not found in HA config".to_owned()))
    }

    /// Retry a request with exponential backoff. Only transport errors are retried.
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> HaResult<Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("Request failed after {} attempts: {}", attempts, e);
                    return Err(HaError::HttpError(e));
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

async fn api_error(status: StatusCode, response: Response) -> HaError {
    let message = response.text().await.unwrap_or_default();
    error!("❌ [HA ERROR] Status {}: {}", status, message);
    HaError::ApiError {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_state_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states/cover.office")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "entity_id": "cover.office",
                    "state": "open",
                    "attributes": {"current_position": 60, "supported_features": 15},
                    "last_changed": "2025-07-01T10:00:00Z",
                    "last_updated": "2025-07-01T10:00:00Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let state = client.get_state("cover.office").await.unwrap();

        assert_eq!(state.state, "open");
        assert_eq!(state.attr_f64("current_position"), Some(60.0));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_state_not_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states/cover.missing")
            .with_status(404)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client.get_state("cover.missing").await;

        assert!(matches!(result, Err(HaError::EntityNotFound(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_state_unauthorized() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/sun.sun")
            .with_status(401)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "bad").unwrap();
        assert!(matches!(
            client.get_state("sun.sun").await,
            Err(HaError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn test_call_service_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/cover/set_cover_position")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::Json(json!({
                "entity_id": "cover.office",
                "position": 40
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        client
            .call_service(
                "cover.set_cover_position",
                json!({"entity_id": "cover.office", "position": 40}),
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_service_with_response_unwraps() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/weather/get_forecasts")
            .match_query(Matcher::Regex("return_response".to_owned()))
            .with_status(200)
            .with_body(
                json!({
                    "changed_states": [],
                    "service_response": {"weather.home": {"forecast": []}}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let response = client
            .call_service_with_response(
                "weather.get_forecasts",
                json!({"entity_id": "weather.home", "type": "daily"}),
            )
            .await
            .unwrap();

        assert!(response.get("weather.home").is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_service_failure_reports_reason() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/services/cover/open_cover")
            .with_status(500)
            .with_body("device offline")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let err = client
            .call_service("cover.open_cover", json!({"entity_id": "cover.x"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HaError::ServiceCallFailed { ref reason, .. } if reason == "device offline"
        ));
    }

    #[tokio::test]
    async fn test_call_service_invalid_format() {
        let client = HomeAssistantClient::new("http://localhost", "token").unwrap();
        for service in ["invalid", "a.b.c", ".open"] {
            let result = client.call_service(service, json!({})).await;
            assert!(matches!(result, Err(HaError::ServiceCallFailed { .. })), "{service}");
        }
    }

    #[tokio::test]
    async fn test_set_state_posts_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/states/sensor.smart_cover_south_sun_azimuth")
            .match_body(Matcher::Json(json!({
                "state": "181.2",
                "attributes": {"unit_of_measurement": "°"}
            })))
            .with_status(201)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        client
            .set_state(
                "sensor.smart_cover_south_sun_azimuth",
                "181.2",
                json!({"unit_of_measurement": "°"}),
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_timezone() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/config")
            .with_status(200)
            .with_body(json!({"time_zone": "Europe/Prague"}).to_string())
            .create_async()
            .await;

        let client = HomeAssistantClient::new(format!("{}/", server.url()), "t").unwrap();
        assert_eq!(client.get_timezone().await.unwrap(), "Europe/Prague");
    }

    #[tokio::test]
    async fn test_ping_unreachable_is_false() {
        let client = HomeAssistantClient::new("http://127.0.0.1:9", "t")
            .unwrap()
            .with_retry_config(1, Duration::from_millis(1));
        assert!(!client.ping().await.unwrap());
    }
}
