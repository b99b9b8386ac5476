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

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use smartcover_core::commands::{SERVICE_CLOSE, SERVICE_OPEN, SERVICE_SET_POSITION};
use smartcover_core::{
    CoverController, LogbookEntry, LogbookSink, ServiceCallError, StatePublisher, SunDataSource,
    WindowSensorSource,
};
use smartcover_types::{CoverReading, CoverStateKind, POSITION_OPEN, SunPosition, WindowState};
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::HomeAssistantClient;
use crate::errors::HaResult;
use crate::types::HaEntityState;

/// Name shown on logbook entries
pub const LOGBOOK_NAME: &str = "Smart Cover Automation";
/// Logbook domain
pub const LOGBOOK_DOMAIN: &str = "smart_cover_automation";

/// `Ok(None)` for a missing entity, other errors unchanged
fn optional_state(result: HaResult<HaEntityState>) -> HaResult<Option<HaEntityState>> {
    match result {
        Ok(state) => Ok(Some(state)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

// ============= Sun =============

/// Reads elevation/azimuth from the `sun.sun` entity
pub struct HaSunAdapter {
    client: Arc<HomeAssistantClient>,
}

impl HaSunAdapter {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

/// Most recent sunset from the sun entity.
///
/// HA only exposes `next_setting`. While the sun is below the horizon the previous
/// sunset is one day earlier; above the horizon the last sunset is not needed.
pub fn last_sunset(state: &HaEntityState) -> Option<DateTime<Utc>> {
    if state.state != "below_horizon" {
        return None;
    }
    let next = DateTime::parse_from_rfc3339(state.attr_str("next_setting")?).ok()?;
    Some(next.with_timezone(&Utc) - Duration::days(1))
}

#[async_trait]
impl SunDataSource for HaSunAdapter {
    async fn read_sun(&self, entity_id: &str) -> Result<Option<SunPosition>> {
        let Some(state) = optional_state(self.client.get_state(entity_id).await)
            .with_context(|| format!("Failed to read sun entity: {entity_id}"))?
        else {
            return Ok(None);
        };

        let elevation = state
            .attr_f64("elevation")
            .with_context(|| format!("Sun elevation unavailable on {entity_id}"))?;
        let azimuth = state
            .attr_f64("azimuth")
            .with_context(|| format!("Sun azimuth unavailable on {entity_id}"))?;

        let mut sun = SunPosition::new(elevation, azimuth);
        if let Some(sunset) = last_sunset(&state) {
            sun = sun.with_last_sunset(sunset);
        }
        debug!("☀️ [SUN] elevation {:.1}°, azimuth {:.1}°", elevation, azimuth);
        Ok(Some(sun))
    }

    fn name(&self) -> &str {
        "Home Assistant sun"
    }
}

// ============= Covers =============

pub struct HaCoverAdapter {
    client: Arc<HomeAssistantClient>,
}

impl HaCoverAdapter {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }

    async fn call(&self, service: &str, entity_id: &str, data: Value) -> Result<(), ServiceCallError> {
        self.client
            .call_service(service, data)
            .await
            .map_err(|e| ServiceCallError::new(service, entity_id, e.to_string()))
    }
}

/// Parse a cover entity state
pub fn cover_reading(state: &HaEntityState) -> CoverReading {
    let position = state
        .attr_f64("current_position")
        .filter(|p| p.is_finite())
        .map(|p| p.round().clamp(0.0, f64::from(POSITION_OPEN)) as u8);
    let features = state
        .attr_f64("supported_features")
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map_or(0, |f| f as u32);
    CoverReading::new(CoverStateKind::from_state(&state.state), position, features)
}

#[async_trait]
impl CoverController for HaCoverAdapter {
    async fn get_cover_state(&self, entity_id: &str) -> Result<Option<CoverReading>> {
        let state = optional_state(self.client.get_state(entity_id).await)
            .with_context(|| format!("Failed to read cover: {entity_id}"))?;
        Ok(state.as_ref().map(cover_reading))
    }

    async fn set_cover_position(&self, entity_id: &str, target: u8) -> Result<u8, ServiceCallError> {
        self.call(
            SERVICE_SET_POSITION,
            entity_id,
            json!({"entity_id": entity_id, "position": target}),
        )
        .await?;
        Ok(target)
    }

    async fn open_cover(&self, entity_id: &str) -> Result<(), ServiceCallError> {
        self.call(SERVICE_OPEN, entity_id, json!({"entity_id": entity_id}))
            .await
    }

    async fn close_cover(&self, entity_id: &str) -> Result<(), ServiceCallError> {
        self.call(SERVICE_CLOSE, entity_id, json!({"entity_id": entity_id}))
            .await
    }

    fn name(&self) -> &str {
        "Home Assistant covers"
    }
}

// ============= Window sensors =============

pub struct HaWindowSensorAdapter {
    client: Arc<HomeAssistantClient>,
}

impl HaWindowSensorAdapter {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WindowSensorSource for HaWindowSensorAdapter {
    async fn get_window_state(&self, sensor_id: &str) -> Result<Option<WindowState>> {
        let state = optional_state(self.client.get_state(sensor_id).await)
            .with_context(|| format!("Failed to read window sensor: {sensor_id}"))?;
        Ok(state.and_then(|s| WindowState::from_state(&s.state)))
    }
}

// ============= Logbook =============

pub struct HaLogbookSink {
    client: Arc<HomeAssistantClient>,
}

impl HaLogbookSink {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogbookSink for HaLogbookSink {
    async fn record_event(&self, entry: &LogbookEntry) -> Result<()> {
        self.client
            .call_service(
                "logbook.log",
                json!({
                    "name": LOGBOOK_NAME,
                    "message": entry.message(),
                    "entity_id": entry.entity_id,
                    "domain": LOGBOOK_DOMAIN,
                }),
            )
            .await
            .context("Failed to write logbook entry")
    }
}

// ============= State publishing =============

pub struct HaStatePublisher {
    client: Arc<HomeAssistantClient>,
}

impl HaStatePublisher {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        info!("📤 Publishing SmartCover entities to {}", client.base_url());
        Self { client }
    }
}

#[async_trait]
impl StatePublisher for HaStatePublisher {
    async fn publish_state(&self, entity_id: &str, state: &str, attributes: Value) -> Result<()> {
        self.client
            .set_state(entity_id, state, attributes)
            .await
            .with_context(|| format!("Failed to publish {entity_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use smartcover_core::{MoveReason, MoveVerb};

    fn client(server: &Server) -> Arc<HomeAssistantClient> {
        Arc::new(HomeAssistantClient::new(server.url(), "t").unwrap())
    }

    fn entity(entity_id: &str, state: &str, attributes: Value) -> String {
        json!({"entity_id": entity_id, "state": state, "attributes": attributes}).to_string()
    }

    #[tokio::test]
    async fn test_sun_reading_and_last_sunset() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/sun.sun")
            .with_status(200)
            .with_body(entity(
                "sun.sun",
                "below_horizon",
                json!({
                    "elevation": -4.2,
                    "azimuth": "301.5",
                    "next_setting": "2025-07-02T19:10:00+00:00"
                }),
            ))
            .create_async()
            .await;

        let adapter = HaSunAdapter::new(client(&server));
        let sun = adapter.read_sun("sun.sun").await.unwrap().unwrap();
        assert_eq!(sun.elevation, -4.2);
        assert_eq!(sun.azimuth, 301.5);
        assert_eq!(
            sun.last_sunset.unwrap().to_rfc3339(),
            "2025-07-01T19:10:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_sun_missing_and_incomplete() {
        let mut server = Server::new_async().await;
        let _missing = server
            .mock("GET", "/api/states/sun.sun")
            .with_status(404)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/api/states/sun.other")
            .with_status(200)
            .with_body(entity("sun.other", "above_horizon", json!({"azimuth": 10})))
            .create_async()
            .await;

        let adapter = HaSunAdapter::new(client(&server));
        assert!(adapter.read_sun("sun.sun").await.unwrap().is_none());
        assert!(adapter.read_sun("sun.other").await.is_err());
    }

    #[tokio::test]
    async fn test_cover_state_parsing() {
        let mut server = Server::new_async().await;
        let _position = server
            .mock("GET", "/api/states/cover.office")
            .with_status(200)
            .with_body(entity(
                "cover.office",
                "open",
                json!({"current_position": 42, "supported_features": 15}),
            ))
            .create_async()
            .await;
        let _binary = server
            .mock("GET", "/api/states/cover.garage")
            .with_status(200)
            .with_body(entity("cover.garage", "closed", json!({"supported_features": 3})))
            .create_async()
            .await;

        let adapter = HaCoverAdapter::new(client(&server));
        let office = adapter.get_cover_state("cover.office").await.unwrap().unwrap();
        assert_eq!(office.position, Some(42));
        assert!(office.capabilities.set_position);

        let garage = adapter.get_cover_state("cover.garage").await.unwrap().unwrap();
        assert!(!garage.capabilities.set_position);
        assert_eq!(garage.normalized_position(), 0);
    }

    #[tokio::test]
    async fn test_cover_commands() {
        let mut server = Server::new_async().await;
        let set = server
            .mock("POST", "/api/services/cover/set_cover_position")
            .match_body(Matcher::Json(json!({"entity_id": "cover.office", "position": 25})))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let _close = server
            .mock("POST", "/api/services/cover/close_cover")
            .with_status(500)
            .with_body("timeout")
            .create_async()
            .await;

        let adapter = HaCoverAdapter::new(client(&server));
        assert_eq!(adapter.set_cover_position("cover.office", 25).await.unwrap(), 25);
        set.assert_async().await;

        let err = adapter.close_cover("cover.garage").await.unwrap_err();
        assert_eq!(err.service, SERVICE_CLOSE);
        assert_eq!(err.entity_id, "cover.garage");
    }

    #[tokio::test]
    async fn test_window_states() {
        let mut server = Server::new_async().await;
        let _open = server
            .mock("GET", "/api/states/binary_sensor.office_window")
            .with_status(200)
            .with_body(entity("binary_sensor.office_window", "on", json!({})))
            .create_async()
            .await;
        let _unknown = server
            .mock("GET", "/api/states/binary_sensor.flaky")
            .with_status(200)
            .with_body(entity("binary_sensor.flaky", "unavailable", json!({})))
            .create_async()
            .await;

        let adapter = HaWindowSensorAdapter::new(client(&server));
        assert_eq!(
            adapter.get_window_state("binary_sensor.office_window").await.unwrap(),
            Some(WindowState::Open)
        );
        assert_eq!(adapter.get_window_state("binary_sensor.flaky").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_logbook_entry_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/logbook/log")
            .match_body(Matcher::PartialJson(json!({
                "name": LOGBOOK_NAME,
                "entity_id": "cover.office",
                "message": "is closing to protect from heat (target position 0%)"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let sink = HaLogbookSink::new(client(&server));
        let entry =
            LogbookEntry::new("cover.office", MoveVerb::Closing, MoveReason::HeatProtection, 0);
        sink.record_event(&entry).await.unwrap();
        mock.assert_async().await;
    }
}
