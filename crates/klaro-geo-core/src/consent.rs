// crates/klaro-geo-core/src/consent.rs

//! # Consent Events
//!
//! Thin adapter between the widget's consent changes and the page's
//! `dataLayer` / Google Consent Mode. The core only shapes the payloads;
//! delivering them is the job of a [`ConsentEventSink`].

use crate::error::Result;
use crate::location::DetectedLocation;
use crate::resolver::ResolvedConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const CONSENT_MODE_SETTINGS_KEY: &str = "consent_mode_settings";
pub const CONSENT_UPDATE_EVENT: &str = "klaro_geo_consent_update";

const SERVICE_SUFFIX: &str = "_service";

/// Consent Mode signal (`analytics_storage`, `ad_storage`, ...) → service
/// whose consent drives it, read from a resolved config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentModeMapping {
    signals: BTreeMap<String, String>,
}

impl ConsentModeMapping {
    /// Reads `consent_mode_settings`. Both `"ad_storage": "google-ads"` and
    /// `"ad_storage_service": "google-ads"` name the `ad_storage` signal;
    /// non-string and blank values are ignored.
    pub fn from_config(config: &Value) -> Self {
        let mut signals = BTreeMap::new();
        if let Some(settings) = config.get(CONSENT_MODE_SETTINGS_KEY).and_then(Value::as_object) {
            for (key, value) in settings {
                let Some(service) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    continue;
                };
                let signal = key.strip_suffix(SERVICE_SUFFIX).unwrap_or(key);
                signals.insert(signal.to_string(), service.to_string());
            }
        }
        Self { signals }
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn service_for(&self, signal: &str) -> Option<&str> {
        self.signals.get(signal).map(String::as_str)
    }

    /// Every mapped signal, granted iff its service is consented.
    pub fn update_for(&self, change: &ConsentChange) -> ConsentModeUpdate {
        let signals = self
            .signals
            .iter()
            .map(|(signal, service)| {
                let state = if change.is_granted(service) {
                    ConsentState::Granted
                } else {
                    ConsentState::Denied
                };
                (signal.clone(), state)
            })
            .collect();
        ConsentModeUpdate(signals)
    }
}

/// A consent decision emitted by the widget: service name → consented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentChange {
    pub consents: BTreeMap<String, bool>,
}

impl ConsentChange {
    pub fn is_granted(&self, service: &str) -> bool {
        self.consents.get(service).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentState {
    Granted,
    Denied,
}

/// Argument of `gtag('consent', 'update', ..)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConsentModeUpdate(pub BTreeMap<String, ConsentState>);

/// One `dataLayer.push(..)` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataLayerEvent {
    pub event: String,
    pub klaro_geo_template: Option<String>,
    pub klaro_geo_location: String,
    pub consents: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub consent_mode: BTreeMap<String, ConsentState>,
}

impl DataLayerEvent {
    pub fn consent_update(resolved: &ResolvedConfig, change: &ConsentChange) -> Self {
        let update = ConsentModeMapping::from_config(&resolved.config).update_for(change);
        Self {
            event: CONSENT_UPDATE_EVENT.to_string(),
            klaro_geo_template: resolved.template_key.clone(),
            klaro_geo_location: resolved.location.to_string(),
            consents: change.consents.clone(),
            consent_mode: update.0,
        }
    }
}

/// Where consent events go: the page's `dataLayer`, a test recorder, ...
pub trait ConsentEventSink {
    fn forward(&mut self, event: &DataLayerEvent) -> Result<()>;
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<DataLayerEvent>,
}

impl ConsentEventSink for RecordingSink {
    fn forward(&mut self, event: &DataLayerEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Record of a visitor's consent decision, for the consent log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsentReceipt {
    pub timestamp: u64,
    pub template: Option<String>,
    pub location: DetectedLocation,
    pub consents: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub consent_mode: BTreeMap<String, ConsentState>,
}

impl ConsentReceipt {
    /// `None` when the effective template disables consent logging.
    pub fn build(resolved: &ResolvedConfig, change: &ConsentChange, timestamp: u64) -> Option<Self> {
        if !resolved.plugin_settings.enable_consent_logging() {
            return None;
        }
        let update = ConsentModeMapping::from_config(&resolved.config).update_for(change);
        Some(Self {
            timestamp,
            template: resolved.template_key.clone(),
            location: resolved.location.clone(),
            consents: change.consents.clone(),
            consent_mode: update.0,
        })
    }
}

/// Build the `dataLayer` event for a change and hand it to `sink`.
pub fn forward_consent_change(
    resolved: &ResolvedConfig,
    change: &ConsentChange,
    sink: &mut dyn ConsentEventSink,
) -> Result<DataLayerEvent> {
    let event = DataLayerEvent::consent_update(resolved, change);
    sink.forward(&event)?;
    Ok(event)
}
