// crates/klaro-geo-core/src/template/mod.rs

//! # Templates
//!
//! A template is a named bundle of Klaro widget options that may inherit from
//! another template. [`TemplateStore`] keeps them in insertion order;
//! [`TemplateResolver`] materializes the effective config of one key.

use crate::error::{KlaroGeoError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

mod resolver;

pub use resolver::{ChainIssue, ResolvedTemplate, TemplateResolver};

/// Reserved key of the template every installation starts with.
pub const DEFAULT_TEMPLATE_KEY: &str = "default";

/// Plugin-level (non-widget) flags stored next to a template's config.
///
/// Kept as an open map so inheritance can deep-merge it exactly like the
/// widget config; typed accessors cover the flags the core reads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginSettings(pub Map<String, Value>);

impl PluginSettings {
    /// Whether consent receipts should be logged. Absent means enabled.
    pub fn enable_consent_logging(&self) -> bool {
        self.0
            .get("enable_consent_logging")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn set_enable_consent_logging(&mut self, enabled: bool) {
        self.0
            .insert("enable_consent_logging".into(), Value::Bool(enabled));
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A named, inheritable bundle of widget configuration.
///
/// The template's key is the key it is stored under in [`TemplateStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Display name. A stored record without one takes its key.
    #[serde(default)]
    pub name: String,
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit_from: Option<String>,
    #[serde(default)]
    pub plugin_settings: PluginSettings,
}

impl Template {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            config,
            inherit_from: None,
            plugin_settings: PluginSettings::default(),
        }
    }

    pub fn inheriting(mut self, parent: impl Into<String>) -> Self {
        self.inherit_from = Some(parent.into());
        self
    }

    /// Normalize a stored record: a non-object config becomes `{}` and an
    /// empty `inherit_from` becomes `None`.
    fn normalized(mut self) -> Self {
        if !self.config.is_object() {
            self.config = empty_object();
        }
        if self
            .inherit_from
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            self.inherit_from = None;
        }
        self
    }

    /// Best-effort read of a stored record whose fields have the wrong
    /// types. Fields that cannot be used fall back to their defaults.
    fn salvage(map: &Map<String, Value>) -> Self {
        Self {
            name: map.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            config: map.get("config").cloned().unwrap_or_else(empty_object),
            inherit_from: map.get("inherit_from").and_then(Value::as_str).map(str::to_string),
            plugin_settings: map
                .get("plugin_settings")
                .and_then(Value::as_object)
                .cloned()
                .map(PluginSettings)
                .unwrap_or_default(),
        }
    }
}

/// Template key → [`Template`], in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateStore {
    entries: Vec<(String, Template)>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding only an empty `"default"` template.
    pub fn with_default() -> Self {
        let mut store = Self::new();
        store.set(
            DEFAULT_TEMPLATE_KEY,
            Template::new("Default Template", empty_object()),
        );
        store
    }

    /// Lenient load from a stored settings value.
    ///
    /// Accepts an object or a JSON-encoded string holding one. An entry with
    /// mistyped fields keeps what can be read, and a blank name becomes the
    /// key. Only entries that are not objects at all are skipped.
    pub fn from_value(raw: &Value) -> Self {
        let mut store = Self::new();
        let Some(map) = crate::geo::decode_object(raw) else {
            if !raw.is_null() {
                tracing::warn!("stored templates are not an object; starting empty");
            }
            return store;
        };

        for (key, value) in map {
            if key.trim().is_empty() {
                continue;
            }
            let mut template = match (Template::deserialize(&value), value.as_object()) {
                (Ok(template), _) => template,
                (Err(e), Some(fields)) => {
                    tracing::warn!(template = %key, error = %e, "template has malformed fields; keeping the rest");
                    Template::salvage(fields)
                }
                (Err(e), None) => {
                    tracing::warn!(template = %key, error = %e, "skipping malformed template");
                    continue;
                }
            };
            if template.name.trim().is_empty() {
                tracing::debug!(template = %key, "template has no name; using its key");
                template.name = key.clone();
            }
            store.set(key, template);
        }
        store
    }

    /// The stored form, in insertion order.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn get(&self, key: &str) -> Option<&Template> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, t)| t)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Template> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, t)| t)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. Replacing keeps the key's original position.
    pub fn set(&mut self, key: impl Into<String>, template: Template) {
        let key = key.into();
        let template = template.normalized();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = template,
            None => self.entries.push((key, template)),
        }
    }

    /// Remove a template. The reserved `"default"` key and absent keys both
    /// fail with `NotFound`.
    pub fn remove(&mut self, key: &str) -> Result<Template> {
        if key == DEFAULT_TEMPLATE_KEY {
            return Err(KlaroGeoError::NotFound(format!(
                "template '{key}' is reserved and cannot be deleted"
            )));
        }
        let idx = self
            .entries
            .iter()
            .position(|(k, _)| k == key)
            .ok_or_else(|| KlaroGeoError::NotFound(format!("template '{key}'")))?;
        Ok(self.entries.remove(idx).1)
    }

    /// `(key, template)` pairs in insertion order.
    pub fn list(&self) -> impl Iterator<Item = (&str, &Template)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive lookup by display name.
    pub fn find_by_name(&self, name: &str) -> Option<(&str, &Template)> {
        let wanted = name.trim().to_lowercase();
        self.list()
            .find(|(_, t)| t.name.trim().to_lowercase() == wanted)
    }

    /// Create `new_key` as a copy of `source_key`'s config and plugin
    /// settings, with `inherit_from` pointing at the source.
    pub fn create_from(&mut self, new_key: &str, source_key: &str, name: &str) -> Result<&Template> {
        let source = self
            .get(source_key)
            .ok_or_else(|| KlaroGeoError::SourceNotFound(source_key.to_string()))?;
        if self.find_by_name(name).is_some() {
            return Err(KlaroGeoError::DuplicateName(name.trim().to_string()));
        }
        let new_key = new_key.trim();
        if new_key.is_empty() {
            return Err(KlaroGeoError::InvalidData("template key is empty".into()));
        }
        if self.contains(new_key) {
            return Err(KlaroGeoError::KeyExists(new_key.to_string()));
        }

        let template = Template {
            name: name.trim().to_string(),
            config: source.config.clone(),
            inherit_from: Some(source_key.to_string()),
            plugin_settings: source.plugin_settings.clone(),
        };
        self.set(new_key, template);
        Ok(&self.entries[self.entries.len() - 1].1)
    }

    /// Point `key` at a new parent (or none). Rejects a missing parent and a
    /// change that would close a cycle; the store is untouched on error.
    pub fn set_parent(&mut self, key: &str, parent: Option<&str>) -> Result<()> {
        if !self.contains(key) {
            return Err(KlaroGeoError::TemplateNotFound(key.to_string()));
        }
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(KlaroGeoError::TemplateNotFound(parent.to_string()));
            }
            if self.ancestors_reach(parent, key) {
                return Err(KlaroGeoError::CyclicInheritance {
                    start: key.to_string(),
                    repeated: key.to_string(),
                });
            }
        }
        if let Some(template) = self.get_mut(key) {
            template.inherit_from = parent.map(str::to_string);
        }
        Ok(())
    }

    /// True if walking `inherit_from` from `start` (inclusive) hits `target`.
    fn ancestors_reach(&self, start: &str, target: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(start);
        while let Some(key) = current {
            if key == target {
                return true;
            }
            if !seen.insert(key) {
                return false;
            }
            current = self.get(key).and_then(|t| t.inherit_from.as_deref());
        }
        false
    }

    pub fn resolver(&self) -> TemplateResolver<'_> {
        TemplateResolver::new(self)
    }
}

impl Serialize for TemplateStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, template) in &self.entries {
            map.serialize_entry(key, template)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TemplateStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StoreVisitor;

        impl<'de> Visitor<'de> for StoreVisitor {
            type Value = TemplateStore;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of template key to template")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut store = TemplateStore::new();
                while let Some((key, template)) = access.next_entry::<String, Template>()? {
                    store.set(key, template);
                }
                Ok(store)
            }
        }

        deserializer.deserialize_map(StoreVisitor)
    }
}
