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

//! Mock Home Assistant fixtures for end-to-end refresh cycles.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{Value, json};
use smartcover_core::{Clock, ManualClock, Orchestrator};
use smartcover_ha::HomeAssistantClient;
use smartcover_types::{CoverConfig, InstanceConfig};
use std::sync::Arc;
use std::time::Duration;

/// Cover supporting open, close, stop and set position
pub const FEATURES_POSITION: u32 = 15;
/// Cover supporting open and close only
pub const FEATURES_BINARY: u32 = 3;

/// 2025-07-01 10:00 UTC, a summer morning before the forecast cutover
pub fn summer_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

/// A mocked Home Assistant instance.
///
/// Mocks live as long as this value.
pub struct MockHa {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl MockHa {
    pub async fn start() -> Self {
        Self {
            server: Server::new_async().await,
            mocks: Vec::new(),
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Client with a single attempt per request
    pub fn client(&self) -> Arc<HomeAssistantClient> {
        let client = HomeAssistantClient::new(self.server.url(), "test-token")
            .map(|c| c.with_retry_config(1, Duration::from_millis(1)));
        match client {
            Ok(client) => Arc::new(client),
            Err(e) => panic!("mock client: {e}"),
        }
    }

    fn keep(&mut self, mock: Mock) {
        self.mocks.push(mock);
    }

    /// Entity state served on `GET /api/states/<entity_id>`
    pub async fn entity(&mut self, entity_id: &str, state: &str, attributes: Value) {
        let body = json!({"entity_id": entity_id, "state": state, "attributes": attributes});
        let mock = self
            .server
            .mock("GET", format!("/api/states/{entity_id}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        self.keep(mock);
    }

    pub async fn missing_entity(&mut self, entity_id: &str) {
        let mock = self
            .server
            .mock("GET", format!("/api/states/{entity_id}").as_str())
            .with_status(404)
            .create_async()
            .await;
        self.keep(mock);
    }

    pub async fn sun(&mut self, elevation: f64, azimuth: f64) {
        let state = if elevation > 0.0 {
            "above_horizon"
        } else {
            "below_horizon"
        };
        self.entity(
            "sun.sun",
            state,
            json!({
                "elevation": elevation,
                "azimuth": azimuth,
                "next_setting": "2025-07-01T19:10:00+00:00"
            }),
        )
        .await;
    }

    /// Weather entity plus a daily forecast with `max_temp` for 2025-07-01
    pub async fn weather(&mut self, condition: &str, max_temp: f64) {
        self.entity(
            "weather.home",
            condition,
            json!({"temperature_unit": "°C"}),
        )
        .await;

        let body = json!({
            "changed_states": [],
            "service_response": {
                "weather.home": {
                    "forecast": [
                        {"datetime": "2025-07-01T00:00:00+00:00", "temperature": max_temp, "condition": condition},
                        {"datetime": "2025-07-02T00:00:00+00:00", "temperature": max_temp - 5.0, "condition": "cloudy"}
                    ]
                }
            }
        });
        let mock = self
            .server
            .mock("POST", "/api/services/weather/get_forecasts")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        self.keep(mock);
    }

    /// Weather entity present, forecast service failing
    pub async fn weather_forecast_failing(&mut self, condition: &str) {
        self.entity("weather.home", condition, json!({})).await;
        let mock = self
            .server
            .mock("POST", "/api/services/weather/get_forecasts")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("forecast integration offline")
            .create_async()
            .await;
        self.keep(mock);
    }

    pub async fn cover(&mut self, entity_id: &str, position: u8, features: u32) {
        let state = if position == 0 { "closed" } else { "open" };
        let attributes = if features & 4 == 0 {
            json!({"supported_features": features})
        } else {
            json!({"supported_features": features, "current_position": position})
        };
        self.entity(entity_id, state, attributes).await;
    }

    pub async fn window(&mut self, entity_id: &str, open: bool) {
        self.entity(entity_id, if open { "on" } else { "off" }, json!({}))
            .await;
    }

    /// Accept logbook entries
    pub async fn logbook(&mut self) {
        let mock = self
            .server
            .mock("POST", "/api/services/logbook/log")
            .with_status(200)
            .create_async()
            .await;
        self.keep(mock);
    }

    /// Expectation for a cover service call with the given JSON body
    pub async fn expect_service(&mut self, service: &str, body: Value, hits: usize) -> Mock {
        let path = format!("/api/services/{}", service.replacen('.', "/", 1));
        self.server
            .mock("POST", path.as_str())
            .match_body(Matcher::Json(body))
            .with_status(200)
            .with_body("[]")
            .expect(hits)
            .create_async()
            .await
    }

    /// Expectation for published entity states
    pub async fn expect_published(&mut self) -> Mock {
        self.server
            .mock(
                "POST",
                Matcher::Regex(r"^/api/states/(sensor|binary_sensor)\.smart_cover_".to_owned()),
            )
            .with_status(200)
            .with_body("{}")
            .expect_at_least(1)
            .create_async()
            .await
    }
}

/// Instance with default settings and one cover per `(entity_id, azimuth)`
pub fn instance(id: &str, covers: &[(&str, f64)]) -> InstanceConfig {
    let mut config = InstanceConfig::new(id);
    config.covers = covers
        .iter()
        .map(|(entity_id, azimuth)| CoverConfig::new(*entity_id, *azimuth))
        .collect();
    config
}

/// Orchestrator backed by the mock, with the clock frozen at `now`
pub fn orchestrator(ha: &MockHa, config: InstanceConfig, now: DateTime<Utc>) -> Orchestrator {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
    Orchestrator::new(
        config,
        smartcover_ha::data_sources(&ha.client()),
        clock,
        Tz::UTC,
    )
}
