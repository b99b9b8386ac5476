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

//! Weather forecast adapter (`weather.get_forecasts`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde_json::{Value, json};
use smartcover_core::WeatherDataSource;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::HomeAssistantClient;

/// Forecast temperature fields, in order of preference
pub const TEMPERATURE_FIELDS: [&str; 7] = [
    "native_temperature",
    "temperature",
    "temp_max",
    "temp_high",
    "temphigh",
    "high",
    "max_temp",
];

pub struct HaWeatherAdapter {
    client: Arc<HomeAssistantClient>,
}

impl HaWeatherAdapter {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

/// Calendar day of a forecast entry, from its `datetime` or `date` field
pub fn forecast_entry_date(entry: &Value) -> Option<NaiveDate> {
    let raw = entry
        .get("datetime")
        .or_else(|| entry.get("date"))
        .and_then(Value::as_str)?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

/// First numeric temperature field of a forecast entry
pub fn extract_max_temperature(entry: &Value) -> Option<f64> {
    for field in TEMPERATURE_FIELDS {
        match entry.get(field) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(other) => debug!("Field '{}' is not a number: {}", field, other),
            None => {}
        }
    }
    None
}

/// Forecast maximum for `day` from a `get_forecasts` response
pub fn find_day_temperature(response: &Value, entity_id: &str, day: NaiveDate) -> Option<f64> {
    let forecast = response
        .get(entity_id)
        .and_then(|entity| entity.get("forecast"))
        .and_then(Value::as_array)?;

    let entry = forecast
        .iter()
        .find(|entry| forecast_entry_date(entry) == Some(day))?;
    let temperature = extract_max_temperature(entry);
    if temperature.is_none() {
        let fields: Vec<&str> = entry
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        warn!("No temperature fields found in forecast. Available fields: {fields:?}");
    }
    temperature
}

pub fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

#[async_trait]
impl WeatherDataSource for HaWeatherAdapter {
    async fn max_forecast_temperature(
        &self,
        entity_id: &str,
        day: NaiveDate,
    ) -> Result<Option<f64>> {
        let state = self
            .client
            .get_state(entity_id)
            .await
            .with_context(|| format!("Failed to read weather entity: {entity_id}"))?;

        let response = self
            .client
            .call_service_with_response(
                "weather.get_forecasts",
                json!({"entity_id": entity_id, "type": "daily"}),
            )
            .await
            .with_context(|| format!("Failed to get forecast for {entity_id}"))?;

        let Some(temperature) = find_day_temperature(&response, entity_id, day) else {
            debug!("🌡️ [WEATHER] No forecast entry for {} in {}", day, entity_id);
            return Ok(None);
        };

        let celsius = if state.attr_str("temperature_unit") == Some("°F") {
            let celsius = fahrenheit_to_celsius(temperature);
            debug!("Converted forecast temperature {temperature}°F to {celsius:.1}°C");
            celsius
        } else {
            temperature
        };

        debug!("🌡️ [WEATHER] {} max for {}: {:.1}°C", entity_id, day, celsius);
        Ok(Some(celsius))
    }

    async fn condition(&self, entity_id: &str) -> Result<Option<String>> {
        match self.client.get_state(entity_id).await {
            Ok(state) if state.is_usable() => Ok(Some(state.state)),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read weather entity: {entity_id}")),
        }
    }

    fn name(&self) -> &str {
        "Home Assistant weather"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn weather_state(unit: &str) -> String {
        json!({
            "entity_id": "weather.home",
            "state": "sunny",
            "attributes": {"temperature_unit": unit}
        })
        .to_string()
    }

    fn forecast_body() -> String {
        json!({
            "changed_states": [],
            "service_response": {
                "weather.home": {
                    "forecast": [
                        {"datetime": "2025-07-01T10:00:00+00:00", "temperature": 31.5, "condition": "sunny"},
                        {"datetime": "2025-07-02T10:00:00+00:00", "temp_max": 86, "condition": "cloudy"}
                    ]
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_entry_date_formats() {
        assert_eq!(
            forecast_entry_date(&json!({"datetime": "2025-07-01T00:00:00+02:00"})),
            NaiveDate::from_ymd_opt(2025, 7, 1)
        );
        assert_eq!(
            forecast_entry_date(&json!({"date": "2025-07-03"})),
            NaiveDate::from_ymd_opt(2025, 7, 3)
        );
        assert_eq!(forecast_entry_date(&json!({"datetime": "soon"})), None);
    }

    #[test]
    fn test_temperature_field_preference() {
        let entry = json!({"temperature": 20.0, "native_temperature": 21.0});
        assert_eq!(extract_max_temperature(&entry), Some(21.0));

        let entry = json!({"temperature": "warm", "high": 25});
        assert_eq!(extract_max_temperature(&entry), Some(25.0));

        assert_eq!(extract_max_temperature(&json!({"low": 3})), None);
    }

    #[tokio::test]
    async fn test_forecast_for_requested_day() {
        let mut server = Server::new_async().await;
        let _state = server
            .mock("GET", "/api/states/weather.home")
            .with_status(200)
            .with_body(weather_state("°C"))
            .create_async()
            .await;
        let forecast = server
            .mock("POST", "/api/services/weather/get_forecasts")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({"entity_id": "weather.home", "type": "daily"})))
            .with_status(200)
            .with_body(forecast_body())
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "t").unwrap());
        let adapter = HaWeatherAdapter::new(client);

        let today = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(
            adapter.max_forecast_temperature("weather.home", today).await.unwrap(),
            Some(31.5)
        );

        let missing = NaiveDate::from_ymd_opt(2025, 7, 9).unwrap();
        assert_eq!(
            adapter.max_forecast_temperature("weather.home", missing).await.unwrap(),
            None
        );
        forecast.assert_async().await;
    }

    #[tokio::test]
    async fn test_fahrenheit_converted() {
        let mut server = Server::new_async().await;
        let _state = server
            .mock("GET", "/api/states/weather.home")
            .with_status(200)
            .with_body(weather_state("°F"))
            .create_async()
            .await;
        let _forecast = server
            .mock("POST", "/api/services/weather/get_forecasts")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(forecast_body())
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "t").unwrap());
        let adapter = HaWeatherAdapter::new(client);
        let tomorrow = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        let celsius = adapter
            .max_forecast_temperature("weather.home", tomorrow)
            .await
            .unwrap()
            .unwrap();
        assert!((celsius - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_condition_unavailable_is_none() {
        let mut server = Server::new_async().await;
        let _state = server
            .mock("GET", "/api/states/weather.home")
            .with_status(200)
            .with_body(json!({"entity_id": "weather.home", "state": "unavailable", "attributes": {}}).to_string())
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/api/states/weather.gone")
            .with_status(404)
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "t").unwrap());
        let adapter = HaWeatherAdapter::new(client);
        assert_eq!(adapter.condition("weather.home").await.unwrap(), None);
        assert_eq!(adapter.condition("weather.gone").await.unwrap(), None);
    }
}
