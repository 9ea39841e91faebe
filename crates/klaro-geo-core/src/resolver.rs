// crates/klaro-geo-core/src/resolver.rs

//! # Config Resolution
//!
//! Location → winning template key → effective template config → services
//! and GTM attached. Always produces a config: missing templates fall back to
//! the default template, then to the first stored template, then to `{}`
//! (the widget's own built-in defaults).

use crate::geo::{GeoOverrideStore, TemplateMatch};
use crate::location::{DetectedLocation, GeoDetector};
use crate::services::{GtmSettings, ServiceStore};
use crate::template::{ChainIssue, PluginSettings, TemplateStore};
use serde::Serialize;
use serde_json::{Map, Value};

/// Full outcome of one resolution pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub location: DetectedLocation,
    /// Key chosen by the precedence chain, before any fallback.
    pub matched: TemplateMatch,
    /// Key actually materialized; `None` when no template was available.
    pub template_key: Option<String>,
    /// Keys tried and found missing, in the order tried.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_templates: Vec<String>,
    /// Inheritance chain of `template_key`, most specific first.
    pub chain: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ChainIssue>,
    pub plugin_settings: PluginSettings,
    pub config: Value,
}

impl ResolvedConfig {
    /// True if the matched key could not be used as-is.
    pub fn used_fallback(&self) -> bool {
        self.template_key.as_deref() != Some(self.matched.key.as_str())
    }
}

/// Pure function of its borrowed stores.
#[derive(Debug, Clone, Copy)]
pub struct ConfigResolver<'a> {
    templates: &'a TemplateStore,
    geo: &'a GeoOverrideStore,
    services: &'a ServiceStore,
    gtm: &'a GtmSettings,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(
        templates: &'a TemplateStore,
        geo: &'a GeoOverrideStore,
        services: &'a ServiceStore,
        gtm: &'a GtmSettings,
    ) -> Self {
        Self {
            templates,
            geo,
            services,
            gtm,
        }
    }

    /// The widget configuration for a location.
    pub fn resolve_config(&self, country: Option<&str>, region: Option<&str>) -> Value {
        self.resolve(&DetectedLocation::new(country, region)).config
    }

    pub fn resolve_for(&self, detector: &dyn GeoDetector) -> ResolvedConfig {
        self.resolve(&detector.detect())
    }

    #[tracing::instrument(level = "debug", skip(self, location), fields(location = %location))]
    pub fn resolve(&self, location: &DetectedLocation) -> ResolvedConfig {
        let matched = self
            .geo
            .winning_template(location.country(), location.region());

        let mut candidates: Vec<&str> = vec![matched.key.as_str(), self.geo.default_template.as_str()];
        if let Some(first) = self.templates.first_key() {
            candidates.push(first);
        }
        candidates.dedup();

        let resolver = self.templates.resolver();
        let mut missing_templates = Vec::new();
        let mut resolved = None;

        for key in candidates {
            if missing_templates.iter().any(|m: &String| m == key) {
                continue;
            }
            match resolver.resolve_detailed(key) {
                Ok(r) => {
                    resolved = Some(r);
                    break;
                }
                Err(e) => {
                    tracing::warn!(template = key, error = %e, "template unavailable; trying next fallback");
                    missing_templates.push(key.to_string());
                }
            }
        }

        let (template_key, chain, issues, plugin_settings, mut config) = match resolved {
            Some(r) => (Some(r.key), r.chain, r.issues, r.plugin_settings, r.config),
            None => {
                tracing::warn!("no templates available; widget falls back to its built-in defaults");
                (
                    None,
                    Vec::new(),
                    Vec::new(),
                    PluginSettings::default(),
                    Value::Object(Map::new()),
                )
            }
        };

        if let Value::Object(map) = &mut config {
            if !self.services.is_empty() {
                match self.services.to_value() {
                    Ok(services) => {
                        map.insert("services".into(), services);
                    }
                    Err(e) => tracing::warn!(error = %e, "services could not be serialized; leaving them out"),
                }
            }
            if let Some(gtm) = self.gtm.to_config_value() {
                map.insert("gtm".into(), gtm);
            }
        }

        tracing::debug!(
            matched = %matched.key,
            source = %matched.source,
            used = ?template_key,
            "config resolved"
        );

        ResolvedConfig {
            location: location.clone(),
            matched,
            template_key,
            missing_templates,
            chain,
            issues,
            plugin_settings,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Assignment, MatchSource};
    use crate::services::Service;
    use crate::template::Template;
    use serde_json::json;

    struct Fixture {
        templates: TemplateStore,
        geo: GeoOverrideStore,
        services: ServiceStore,
        gtm: GtmSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let mut templates = TemplateStore::new();
            templates.set("default", Template::new("Default", json!({ "title": "A" })));
            templates.set(
                "eu",
                Template::new("EU", json!({ "title": "B" })).inheriting("default"),
            );
            let mut geo = GeoOverrideStore::new("default");
            geo.set_country_template("DE", Assignment::Template("eu".into()));
            Self {
                templates,
                geo,
                services: ServiceStore::default(),
                gtm: GtmSettings::default(),
            }
        }

        fn resolver(&self) -> ConfigResolver<'_> {
            ConfigResolver::new(&self.templates, &self.geo, &self.services, &self.gtm)
        }
    }

    #[test]
    fn services_and_gtm_attach_only_when_present() {
        let mut fx = Fixture::new();
        let config = fx.resolver().resolve_config(Some("DE"), None);
        assert!(config.get("services").is_none());
        assert!(config.get("gtm").is_none());

        fx.services = ServiceStore::new(vec![Service::new("matomo")]);
        fx.gtm.oninit = "init()".into();
        let config = fx.resolver().resolve_config(Some("DE"), None);
        assert_eq!(config["services"][0]["name"], json!("matomo"));
        assert_eq!(config["gtm"]["oninit"], json!("init()"));
        assert_eq!(config["title"], json!("B"));
    }

    #[test]
    fn fallback_chain_is_recorded() {
        let mut fx = Fixture::new();
        fx.geo.set_country_template("FR", Assignment::Template("ghost".into()));
        let r = fx.resolver().resolve(&DetectedLocation::new(Some("FR"), None));
        assert_eq!(r.matched.source, MatchSource::Country);
        assert_eq!(r.missing_templates, vec!["ghost"]);
        assert_eq!(r.template_key.as_deref(), Some("default"));
        assert!(r.used_fallback());
    }

    #[test]
    fn dangling_default_falls_to_first_template() {
        let mut fx = Fixture::new();
        fx.geo.default_template = "gone".into();
        let r = fx.resolver().resolve(&DetectedLocation::unknown());
        assert_eq!(r.missing_templates, vec!["gone"]);
        assert_eq!(r.template_key.as_deref(), Some("default"));
        assert_eq!(r.config["title"], json!("A"));
    }

    #[test]
    fn empty_store_yields_empty_config() {
        let mut fx = Fixture::new();
        fx.templates = TemplateStore::new();
        let r = fx.resolver().resolve(&DetectedLocation::new(Some("DE"), None));
        assert_eq!(r.template_key, None);
        assert_eq!(r.config, json!({}));
        assert_eq!(r.missing_templates, vec!["eu", "default"]);
    }

    #[test]
    fn detector_seam() {
        let fx = Fixture::new();
        let forced = DetectedLocation::parse("DE-BY");
        let r = fx.resolver().resolve_for(&forced);
        assert_eq!(r.chain, vec!["eu", "default"]);
        assert_eq!(r.location.region(), Some("BY"));
    }
}
