// crates/klaro-geo-core/src/settings/mod.rs

//! # Settings Persistence
//!
//! A key-value [`SettingsBackend`] holds the raw stored settings; a
//! [`SettingsStore`] loads them into typed stores and applies admin saves.
//!
//! Every geo save is a read-modify-write performed inside
//! [`SettingsBackend::update_many`], merging onto the latest stored value
//! and checking template keys against the templates stored at that moment.
//! A country save and a region save for the same country never clobber
//! each other, whatever order they land in.

use crate::error::{KlaroGeoError, Result};
use crate::geo::{Assignment, GeoOverrideStore};
use crate::location::DetectedLocation;
use crate::resolver::{ConfigResolver, ResolvedConfig};
use crate::services::{GtmSettings, ServiceStore};
use crate::template::{Template, TemplateStore, DEFAULT_TEMPLATE_KEY};
use crate::text::{normalize_country_code, slugify_key};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

pub const TEMPLATES_KEY: &str = "klaro_geo_templates";
pub const COUNTRY_SETTINGS_KEY: &str = "klaro_geo_country_settings";
pub const SERVICES_KEY: &str = "klaro_geo_services";
pub const GTM_SETTINGS_KEY: &str = "klaro_geo_gtm_settings";

/// Raw key-value storage for settings.
pub trait SettingsBackend: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Lock-scoped read-modify-write. `f` receives the current value and
    /// returns the value to store; if it fails nothing is written. `f` must
    /// not call back into the backend.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Result<Value>,
    ) -> Result<Value>;

    /// [`update`](Self::update) over several keys under one lock scope. `f`
    /// receives every key in `keys` (absent ones as `None`) and may replace
    /// or clear entries. Changed keys are written back and a `None` deletes.
    /// Removed entries and keys outside `keys` are left as stored.
    fn update_many(
        &self,
        keys: &[&str],
        f: &mut dyn FnMut(&mut BTreeMap<String, Option<Value>>) -> Result<()>,
    ) -> Result<()>;
}

/// Every store loaded at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub templates: TemplateStore,
    pub geo: GeoOverrideStore,
    pub services: ServiceStore,
    pub gtm: GtmSettings,
}

impl Snapshot {
    pub fn resolver(&self) -> ConfigResolver<'_> {
        ConfigResolver::new(&self.templates, &self.geo, &self.services, &self.gtm)
    }
}

/// Typed access to the plugin's stored settings.
#[derive(Debug)]
pub struct SettingsStore<B> {
    backend: B,
}

impl<B: SettingsBackend> SettingsStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // -----------------------------------------------------------------------
    // LOADING
    // -----------------------------------------------------------------------

    /// Stored templates, or a store holding only `"default"` when nothing
    /// was ever saved.
    pub fn load_templates(&self) -> Result<TemplateStore> {
        Ok(templates_from(self.backend.get(TEMPLATES_KEY)?.as_ref()))
    }

    pub fn load_geo_overrides(&self) -> Result<GeoOverrideStore> {
        let templates = self.load_templates()?;
        let raw = self.backend.get(COUNTRY_SETTINGS_KEY)?.unwrap_or(Value::Null);
        Ok(GeoOverrideStore::from_value(&raw, &templates))
    }

    pub fn load_services(&self) -> Result<ServiceStore> {
        let raw = self.backend.get(SERVICES_KEY)?.unwrap_or(Value::Null);
        Ok(ServiceStore::from_value(&raw))
    }

    pub fn load_gtm_settings(&self) -> Result<GtmSettings> {
        let raw = self.backend.get(GTM_SETTINGS_KEY)?.unwrap_or(Value::Null);
        Ok(GtmSettings::from_value(&raw))
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let templates = self.load_templates()?;
        let raw_geo = self.backend.get(COUNTRY_SETTINGS_KEY)?.unwrap_or(Value::Null);
        let geo = GeoOverrideStore::from_value(&raw_geo, &templates);
        Ok(Snapshot {
            templates,
            geo,
            services: self.load_services()?,
            gtm: self.load_gtm_settings()?,
        })
    }

    pub fn resolve(&self, location: &DetectedLocation) -> Result<ResolvedConfig> {
        Ok(self.snapshot()?.resolver().resolve(location))
    }

    pub fn resolve_config(&self, country: Option<&str>, region: Option<&str>) -> Result<Value> {
        Ok(self.snapshot()?.resolver().resolve_config(country, region))
    }

    // -----------------------------------------------------------------------
    // TEMPLATES
    // -----------------------------------------------------------------------

    fn update_templates<T>(
        &self,
        mut f: impl FnMut(&mut TemplateStore) -> Result<T>,
    ) -> Result<T> {
        let mut out = None;
        self.backend.update(TEMPLATES_KEY, &mut |current| {
            let mut store = templates_from(current.as_ref());
            out = Some(f(&mut store)?);
            store.to_value()
        })?;
        out.ok_or_else(|| KlaroGeoError::InvalidData("template update did not run".into()))
    }

    /// Insert or replace a template. The parent, if any, must exist and must
    /// not lead back to `key`.
    pub fn save_template(&self, key: &str, template: Template) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(KlaroGeoError::InvalidData("template key is empty".into()));
        }
        self.update_templates(|store| {
            if let Some(parent) = template.inherit_from.as_deref().filter(|p| !p.trim().is_empty()) {
                if !store.contains(parent) {
                    return Err(KlaroGeoError::TemplateNotFound(parent.to_string()));
                }
            }
            store.set(key, template.clone());
            store.resolver().ancestor_chain(key).map(|_| ())
        })
    }

    /// Create a template from `source_key`. Without an explicit key, one is
    /// derived from `name`.
    pub fn create_template_from(
        &self,
        new_key: Option<&str>,
        source_key: &str,
        name: &str,
    ) -> Result<(String, Template)> {
        let key = match new_key {
            Some(k) => k.trim().to_string(),
            None => slugify_key(name),
        };
        let template = self.update_templates(|store| store.create_from(&key, source_key, name).cloned())?;
        tracing::debug!(template = %key, source = source_key, "template created");
        Ok((key, template))
    }

    pub fn set_template_parent(&self, key: &str, parent: Option<&str>) -> Result<()> {
        self.update_templates(|store| store.set_parent(key, parent))
    }

    /// Delete a template that nothing references. On `InUse` the error lists
    /// every referencing place (`"FR"`, `"FR-IDF"`, or `"default_template"`).
    ///
    /// The reference check and the removal share one lock scope with the
    /// country settings, so a concurrent geo save cannot slip in between.
    pub fn delete_template(&self, key: &str) -> Result<Template> {
        if key == DEFAULT_TEMPLATE_KEY {
            return Err(KlaroGeoError::NotFound(format!(
                "template '{key}' is reserved and cannot be deleted"
            )));
        }

        let mut removed = None;
        self.backend
            .update_many(&[TEMPLATES_KEY, COUNTRY_SETTINGS_KEY], &mut |values| {
                let mut templates = templates_from(stored(values, TEMPLATES_KEY));
                if !templates.contains(key) {
                    return Err(KlaroGeoError::NotFound(format!("template '{key}'")));
                }

                let raw_geo = stored(values, COUNTRY_SETTINGS_KEY).cloned().unwrap_or(Value::Null);
                let geo = GeoOverrideStore::from_value(&raw_geo, &templates);
                let mut countries = Vec::new();
                if geo.default_template == key {
                    countries.push("default_template".to_string());
                }
                countries.extend(geo.countries_referencing(key));
                if !countries.is_empty() {
                    return Err(KlaroGeoError::InUse {
                        key: key.to_string(),
                        countries,
                    });
                }

                removed = Some(templates.remove(key)?);
                values.insert(TEMPLATES_KEY.to_string(), Some(templates.to_value()?));
                Ok(())
            })?;
        tracing::debug!(template = key, "template deleted");
        removed.ok_or_else(|| KlaroGeoError::InvalidData("template delete did not run".into()))
    }

    // -----------------------------------------------------------------------
    // GEO OVERRIDES (independent merge operations)
    // -----------------------------------------------------------------------

    /// Read-modify-write of the country settings. The templates are read
    /// under the same lock, so assignments are validated against what is
    /// stored at write time.
    fn update_geo(
        &self,
        mut f: impl FnMut(&TemplateStore, &mut GeoOverrideStore) -> Result<()>,
    ) -> Result<GeoOverrideStore> {
        let mut out = None;
        self.backend
            .update_many(&[TEMPLATES_KEY, COUNTRY_SETTINGS_KEY], &mut |values| {
                let templates = templates_from(stored(values, TEMPLATES_KEY));
                let raw = stored(values, COUNTRY_SETTINGS_KEY).cloned().unwrap_or(Value::Null);
                let mut geo = GeoOverrideStore::from_value(&raw, &templates);
                f(&templates, &mut geo)?;
                geo.prune();
                values.insert(COUNTRY_SETTINGS_KEY.to_string(), Some(geo.to_value()?));
                out = Some(geo);
                Ok(())
            })?;
        out.ok_or_else(|| KlaroGeoError::InvalidData("country settings update did not run".into()))
    }

    /// Set one country's own template; its regions are kept.
    pub fn save_country_template(
        &self,
        country: &str,
        assignment: Assignment,
    ) -> Result<GeoOverrideStore> {
        let code = require_country(country)?;
        self.update_geo(|templates, geo| {
            require_templates(templates, [&assignment])?;
            geo.set_country_template(&code, assignment.clone());
            Ok(())
        })
    }

    /// Replace one country's region map; its own template is kept.
    pub fn save_country_regions(
        &self,
        country: &str,
        regions: BTreeMap<String, Assignment>,
    ) -> Result<GeoOverrideStore> {
        let code = require_country(country)?;
        self.update_geo(|templates, geo| {
            require_templates(templates, regions.values())?;
            geo.set_country_regions(&code, regions.clone());
            Ok(())
        })
    }

    /// Set (or clear, with `None`) a single region.
    pub fn save_region_template(
        &self,
        country: &str,
        region: &str,
        assignment: Option<Assignment>,
    ) -> Result<GeoOverrideStore> {
        let code = require_country(country)?;
        self.update_geo(|templates, geo| {
            require_templates(templates, assignment.iter())?;
            geo.set_region(&code, region, assignment.clone());
            Ok(())
        })
    }

    pub fn save_visible_countries(&self, countries: &[String]) -> Result<GeoOverrideStore> {
        self.update_geo(|_, geo| {
            geo.set_visible_countries(countries);
            Ok(())
        })
    }

    pub fn save_default_template(&self, key: &str) -> Result<GeoOverrideStore> {
        let key = key.trim();
        self.update_geo(|templates, geo| {
            if !templates.contains(key) {
                return Err(KlaroGeoError::TemplateNotFound(key.to_string()));
            }
            geo.default_template = key.to_string();
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // SERVICES / GTM
    // -----------------------------------------------------------------------

    pub fn save_services(&self, services: &ServiceStore) -> Result<()> {
        self.backend.set(SERVICES_KEY, &services.to_value()?)
    }

    pub fn save_gtm_settings(&self, gtm: &GtmSettings) -> Result<()> {
        self.backend.set(GTM_SETTINGS_KEY, &serde_json::to_value(gtm)?)
    }
}

/// Stored templates, or a store holding only `"default"` when absent.
fn templates_from(raw: Option<&Value>) -> TemplateStore {
    match raw {
        Some(raw) => TemplateStore::from_value(raw),
        None => TemplateStore::with_default(),
    }
}

fn stored<'a>(values: &'a BTreeMap<String, Option<Value>>, key: &str) -> Option<&'a Value> {
    values.get(key).and_then(Option::as_ref)
}

fn require_templates<'k>(
    templates: &TemplateStore,
    keys: impl IntoIterator<Item = &'k Assignment>,
) -> Result<()> {
    for key in keys.into_iter().filter_map(Assignment::template_key) {
        if !templates.contains(key) {
            return Err(KlaroGeoError::TemplateNotFound(key.to_string()));
        }
    }
    Ok(())
}

fn require_country(country: &str) -> Result<String> {
    normalize_country_code(country)
        .ok_or_else(|| KlaroGeoError::InvalidData(format!("invalid country code '{country}'")))
}
