// crates/klaro-geo-core/src/geo/legacy.rs

//! Read-side normalization of stored country settings.
//!
//! Shapes accepted, all folded into [`GeoOverrideStore`]:
//! - `{ "default_template": .., "countries": { .. }, "visible_countries": [..] }`
//! - the bare country map (`{ "FR": { .. }, "default_template": .. }`),
//!   where keys that are not two letters are ignored
//! - either of the above JSON-encoded inside a string
//! - country entries as a bare template string
//! - region maps nested under `regions` or flat as siblings of `template`
//! - a `regions` value that is itself a JSON-encoded string

use super::{Assignment, CountryEntry, GeoOverrideStore};
use crate::error::Result;
use crate::template::{TemplateStore, DEFAULT_TEMPLATE_KEY};
use crate::text::{normalize_country_code, normalize_region_code};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const DEFAULT_TEMPLATE_FIELD: &str = "default_template";
const COUNTRIES_FIELD: &str = "countries";
const VISIBLE_FIELD: &str = "visible_countries";
const TEMPLATE_FIELD: &str = "template";
const REGIONS_FIELD: &str = "regions";

/// An object, or a string holding a JSON-encoded object. Anything else is
/// `None`.
pub fn decode_object(raw: &Value) -> Option<Map<String, Value>> {
    match raw {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

impl GeoOverrideStore {
    /// Normalize whatever is stored into the canonical shape.
    ///
    /// Never fails: unreadable parts become empty. A missing
    /// `default_template` is seeded with the first template in `templates`
    /// (or `"default"` when there are none), which is logged.
    pub fn from_value(raw: &Value, templates: &TemplateStore) -> Self {
        let root = match decode_object(raw) {
            Some(map) => map,
            None => {
                if !raw.is_null() {
                    tracing::warn!("stored country settings are unreadable; using defaults");
                }
                Map::new()
            }
        };

        let default_template = root
            .get(DEFAULT_TEMPLATE_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let seeded = templates.first_key().unwrap_or(DEFAULT_TEMPLATE_KEY);
                tracing::warn!(seeded, "no default template configured; falling back");
                seeded.to_string()
            });

        let countries_map = match root.get(COUNTRIES_FIELD) {
            Some(nested) => decode_object(nested).unwrap_or_default(),
            // Bare map: only two-letter keys are countries.
            None => root
                .iter()
                .filter(|(k, _)| k.as_str() != DEFAULT_TEMPLATE_FIELD && k.as_str() != VISIBLE_FIELD)
                .filter(|(k, _)| {
                    let is_code = looks_like_country_code(k);
                    if !is_code {
                        tracing::debug!(key = %k, "ignoring non-country key in country settings");
                    }
                    is_code
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        let mut countries = BTreeMap::new();
        for (code, entry) in &countries_map {
            let Some(code) = normalize_country_code(code) else {
                continue;
            };
            match normalize_entry(&code, entry) {
                Some(entry) => {
                    countries.insert(code, entry);
                }
                None => tracing::debug!(country = %code, "ignoring unreadable country entry"),
            }
        }

        let mut store = GeoOverrideStore {
            default_template,
            countries,
            visible_countries: Vec::new(),
        };

        if let Some(Value::Array(list)) = root.get(VISIBLE_FIELD) {
            store.set_visible_countries(list.iter().filter_map(Value::as_str));
        }

        store
    }

    /// Canonical stored form.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn looks_like_country_code(key: &str) -> bool {
    let key = key.trim();
    key.len() == 2 && key.bytes().all(|b| b.is_ascii_alphabetic())
}

fn normalize_entry(country: &str, raw: &Value) -> Option<CountryEntry> {
    match raw {
        Value::String(text) => {
            // Either a template key or a JSON-encoded entry.
            if let Some(map) = decode_object(raw) {
                return Some(entry_from_map(country, &map));
            }
            Some(CountryEntry {
                template: Assignment::parse(text).unwrap_or(Assignment::Inherit),
                regions: BTreeMap::new(),
            })
        }
        Value::Object(map) => Some(entry_from_map(country, map)),
        _ => None,
    }
}

fn entry_from_map(country: &str, map: &Map<String, Value>) -> CountryEntry {
    let template = map
        .get(TEMPLATE_FIELD)
        .and_then(Value::as_str)
        .and_then(Assignment::parse)
        .unwrap_or(Assignment::Inherit);

    let mut regions = BTreeMap::new();

    // Legacy flat format first, so the nested map wins on conflict.
    for (key, value) in map {
        if key == TEMPLATE_FIELD || key == REGIONS_FIELD {
            continue;
        }
        insert_region(&mut regions, country, key, value);
    }

    if let Some(nested) = map.get(REGIONS_FIELD).and_then(decode_object) {
        for (key, value) in &nested {
            insert_region(&mut regions, country, key, value);
        }
    }

    CountryEntry { template, regions }
}

fn insert_region(
    regions: &mut BTreeMap<String, Assignment>,
    country: &str,
    code: &str,
    value: &Value,
) {
    let Some(assignment) = value.as_str().and_then(Assignment::parse) else {
        return;
    };
    if let Some(code) = normalize_region_code(country, code) {
        regions.insert(code, assignment);
    }
}
