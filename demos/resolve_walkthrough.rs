//! Resolution walkthrough for klaro-geo-rs
//!
//! This example demonstrates how to:
//! - Store templates with inheritance
//! - Assign templates to countries and regions
//! - Resolve the widget config for a few visitor locations
//! - Shape the dataLayer event for a consent change

use klaro_geo_rs::consent::{forward_consent_change, ConsentChange, RecordingSink};
use klaro_geo_rs::*;
use serde_json::json;
use std::collections::BTreeMap;

fn main() -> Result<()> {
    println!("=== Klaro Geo Resolution Walkthrough ===\n");

    let store = SettingsStore::new(MemoryBackend::new());

    // Example 1: Templates
    println!("--- Example 1: Templates with inheritance ---");
    store.save_template(
        DEFAULT_TEMPLATE_KEY,
        Template::new(
            "Default Template",
            json!({
                "mustConsent": false,
                "styling": { "theme": ["light", "bottom"] },
                "translations": { "en": { "consentModal": { "title": "Cookies" } } },
                "consent_mode_settings": { "analytics_storage_service": "google-analytics" }
            }),
        ),
    )?;
    let (eu, mut strict) =
        store.create_template_from(Some("strict-eu"), DEFAULT_TEMPLATE_KEY, "Strict EU")?;
    strict.config = json!({ "mustConsent": true, "translations": { "de": { "consentModal": { "title": "Datenschutz" } } } });
    store.save_template(&eu, strict)?;
    for (key, template) in store.load_templates()?.list() {
        println!("{key}: {} (inherits: {:?})", template.name, template.inherit_from);
    }
    println!();

    // Example 2: Overrides
    println!("--- Example 2: Country and region overrides ---");
    store.save_country_template("DE", Assignment::Template(eu.clone()))?;
    store.save_country_template("FR", Assignment::Template(eu.clone()))?;
    store.save_country_regions(
        "FR",
        BTreeMap::from([("FR-IDF".to_string(), Assignment::Template(DEFAULT_TEMPLATE_KEY.into()))]),
    )?;
    store.save_services(&ServiceStore::new(vec![Service::new("google-analytics")]))?;
    let geo = store.load_geo_overrides()?;
    println!("{}", serde_json::to_string_pretty(&geo.to_value()?)?);
    println!();

    // Example 3: Resolve
    println!("--- Example 3: Resolve per location ---");
    for raw in ["DE", "FR", "FR-IDF", "US", ""] {
        let resolved = store.resolve(&DetectedLocation::parse(raw))?;
        println!(
            "{:<8} → {} ({}), mustConsent = {}",
            resolved.location.to_string(),
            resolved.matched.key,
            resolved.matched.source,
            resolved.config["mustConsent"]
        );
    }
    println!();

    // Example 4: Consent change
    println!("--- Example 4: dataLayer event ---");
    let resolved = store.resolve(&DetectedLocation::parse("DE"))?;
    let change = ConsentChange {
        consents: BTreeMap::from([("google-analytics".to_string(), true)]),
    };
    let mut sink = RecordingSink::default();
    let event = forward_consent_change(&resolved, &change, &mut sink)?;
    println!("{}", serde_json::to_string_pretty(&event)?);

    Ok(())
}
