// crates/klaro-geo-core/src/services.rs

//! Klaro service descriptors and the GTM callback snippets that get attached
//! to every resolved config.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One entry of the widget's `services` array.
///
/// Field names follow the widget's camelCase; snake_case spellings from older
/// stored settings are accepted on read. Keys the core does not model
/// (`onAccept`, `onInit`, ...) pass through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub purposes: Vec<String>,
    /// Cookie names, regexes, or `[pattern, path, domain]` triples.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<Value>,
    #[serde(default, rename = "optOut", alias = "opt_out")]
    pub opt_out: bool,
    #[serde(default, rename = "onlyOnce", alias = "only_once")]
    pub only_once: bool,
    #[serde(
        default,
        rename = "contextualConsentOnly",
        alias = "contextual_consent_only",
        skip_serializing_if = "Option::is_none"
    )]
    pub contextual_consent_only: Option<bool>,
    /// Language code → partial service text overrides.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub translations: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            required: false,
            default: false,
            purposes: Vec::new(),
            cookies: Vec::new(),
            opt_out: false,
            only_once: false,
            contextual_consent_only: None,
            translations: Map::new(),
            extra: Map::new(),
        }
    }
}

/// The configured services, in display order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceStore {
    services: Vec<Service>,
}

impl ServiceStore {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    /// Lenient load: an array (or JSON-encoded array) of service objects.
    /// Unreadable or unnamed entries are dropped with a warning.
    pub fn from_value(raw: &Value) -> Self {
        let decoded;
        let items = match raw {
            Value::Array(items) => items,
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => {
                    decoded = items;
                    &decoded
                }
                _ => {
                    tracing::warn!("stored services are unreadable; ignoring");
                    return Self::default();
                }
            },
            Value::Null => return Self::default(),
            _ => {
                tracing::warn!("stored services are not a list; ignoring");
                return Self::default();
            }
        };

        let services = items
            .iter()
            .filter_map(|item| match Service::deserialize(item) {
                Ok(service) if !service.name.trim().is_empty() => Some(service),
                Ok(_) => {
                    tracing::warn!("dropping service without a name");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed service");
                    None
                }
            })
            .collect();
        Self { services }
    }

    pub fn list(&self) -> &[Service] {
        &self.services
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.services)?)
    }
}

/// Google Tag Manager snippets run by the widget on init and on accept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtmSettings {
    #[serde(default)]
    pub oninit: String,
    #[serde(default)]
    pub onaccept: String,
}

impl GtmSettings {
    pub fn from_value(raw: &Value) -> Self {
        match crate::geo::decode_object(raw) {
            Some(map) => Self::deserialize(Value::Object(map)).unwrap_or_default(),
            None => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.oninit.trim().is_empty() && self.onaccept.trim().is_empty()
    }

    /// `{ oninit, onaccept }`, or `None` when both are blank.
    pub fn to_config_value(&self) -> Option<Value> {
        if self.is_empty() {
            None
        } else {
            Some(json!({ "oninit": self.oninit, "onaccept": self.onaccept }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_accepts_legacy_spellings_and_keeps_extras() {
        let raw = json!([{
            "name": "google-analytics",
            "purposes": ["analytics"],
            "opt_out": true,
            "onlyOnce": true,
            "onAccept": "gtag('consent','update',{})",
            "translations": { "de": { "title": "Google Analytics (DE)" } }
        }]);
        let store = ServiceStore::from_value(&raw);
        let ga = store.get("google-analytics").unwrap();
        assert!(ga.opt_out);
        assert!(ga.only_once);
        assert!(ga.extra.contains_key("onAccept"));

        let out = store.to_value().unwrap();
        assert_eq!(out[0]["optOut"], json!(true));
        assert_eq!(out[0]["onAccept"], json!("gtag('consent','update',{})"));
        assert!(out[0].get("opt_out").is_none());
    }

    #[test]
    fn malformed_services_are_dropped() {
        let raw = json!([{ "name": "" }, { "title": "no name" }, 7, { "name": "ok" }]);
        let store = ServiceStore::from_value(&raw);
        assert_eq!(store.list().len(), 1);
        assert!(ServiceStore::from_value(&json!({ "a": 1 })).is_empty());
        assert_eq!(ServiceStore::from_value(&json!("[{\"name\":\"x\"}]")).list().len(), 1);
    }

    #[test]
    fn gtm_attaches_only_when_set() {
        assert_eq!(GtmSettings::default().to_config_value(), None);
        let gtm = GtmSettings { oninit: String::new(), onaccept: "go()".into() };
        assert_eq!(gtm.to_config_value(), Some(json!({ "oninit": "", "onaccept": "go()" })));
    }
}
