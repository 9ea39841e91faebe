// crates/klaro-geo-core/tests/settings_store.rs
//
// Persistence round trips through the settings backends.

use klaro_geo_core::settings::{COUNTRY_SETTINGS_KEY, TEMPLATES_KEY};
use klaro_geo_core::{
    Assignment, FileBackend, GtmSettings, KlaroGeoError, MemoryBackend, Service, ServiceStore,
    SettingsBackend, SettingsStore, Template,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::thread;

fn seeded<B: SettingsBackend>(backend: B) -> SettingsStore<B> {
    let store = SettingsStore::new(backend);
    store
        .save_template("default", Template::new("Default", json!({ "title": "A" })))
        .unwrap();
    store
        .save_template("eu", Template::new("EU", json!({ "title": "B" })).inheriting("default"))
        .unwrap();
    store
        .save_template("idf", Template::new("IDF", json!({ "title": "C" })).inheriting("eu"))
        .unwrap();
    store
}

/// Two-letter codes `<prefix>A`, `<prefix>B`, ...
fn codes(prefix: char, n: u8) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{}", (b'A' + i) as char)).collect()
}

fn file_store(dir: &Path) -> SettingsStore<FileBackend> {
    SettingsStore::new(FileBackend::new(dir))
}

#[test]
fn country_and_region_saves_do_not_clobber() {
    let store = seeded(MemoryBackend::new());

    store.save_country_template("FR", Assignment::Template("eu".into())).unwrap();
    store
        .save_country_regions(
            "FR",
            BTreeMap::from([("FR-IDF".to_string(), Assignment::Template("idf".into()))]),
        )
        .unwrap();

    let geo = store.load_geo_overrides().unwrap();
    assert_eq!(geo.assignment("FR"), Some(&Assignment::Template("eu".into())));
    assert_eq!(
        geo.region_assignment("FR", "IDF"),
        Some(&Assignment::Template("idf".into()))
    );

    // Other order.
    store.save_country_template("FR", Assignment::Inherit).unwrap();
    let geo = store.load_geo_overrides().unwrap();
    assert_eq!(geo.assignment("FR"), Some(&Assignment::Inherit));
    assert!(geo.region_assignment("FR", "IDF").is_some());
}

#[test]
fn region_save_merges_onto_latest_stored_value() {
    let store = seeded(MemoryBackend::new());
    let stale = store.load_geo_overrides().unwrap();

    store.save_country_template("DE", Assignment::Template("eu".into())).unwrap();
    store
        .save_region_template("FR", "IDF", Some(Assignment::Template("idf".into())))
        .unwrap();

    assert!(stale.countries.is_empty());
    let geo = store.load_geo_overrides().unwrap();
    assert_eq!(geo.winning_template_key(Some("DE"), None), "eu");
    assert_eq!(geo.winning_template_key(Some("FR"), Some("IDF")), "idf");

    store.save_region_template("FR", "IDF", None).unwrap();
    let geo = store.load_geo_overrides().unwrap();
    assert_eq!(geo.winning_template_key(Some("FR"), Some("IDF")), "default");
}

#[test]
fn legacy_stored_settings_are_normalized_on_save() {
    let backend = MemoryBackend::with_values([
        (
            TEMPLATES_KEY,
            json!({ "default": { "name": "Default", "config": { "title": "A" } },
                    "eu": { "name": "EU", "config": { "title": "B" } } }),
        ),
        (
            COUNTRY_SETTINGS_KEY,
            json!(json!({ "default_template": "default", "FR": { "template": "eu", "IDF": "inherit" } }).to_string()),
        ),
    ]);
    let store = SettingsStore::new(backend);

    store.save_visible_countries(&["fr".to_string(), "de".to_string()]).unwrap();

    let raw = store.backend().get(COUNTRY_SETTINGS_KEY).unwrap().unwrap();
    assert_eq!(
        raw,
        json!({
            "default_template": "default",
            "countries": { "FR": { "template": "eu", "regions": { "IDF": "inherit" } } },
            "visible_countries": ["DE", "FR"]
        })
    );
}

#[test]
fn delete_is_blocked_until_references_are_gone() {
    let store = seeded(MemoryBackend::new());
    store.save_region_template("BE", "BE-WBR", Some(Assignment::Template("idf".into()))).unwrap();

    match store.delete_template("idf") {
        Err(KlaroGeoError::InUse { key, countries }) => {
            assert_eq!(key, "idf");
            assert_eq!(countries, vec!["BE-WBR"]);
        }
        other => panic!("expected InUse, got {other:?}"),
    }

    store.save_region_template("BE", "WBR", Some(Assignment::Inherit)).unwrap();
    let removed = store.delete_template("idf").unwrap();
    assert_eq!(removed.name, "IDF");
    assert!(!store.load_templates().unwrap().contains("idf"));
}

#[test]
fn file_backend_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = seeded(FileBackend::new(dir.path()));
        store.save_country_template("DE", Assignment::Template("eu".into())).unwrap();
        store
            .save_services(&ServiceStore::new(vec![Service::new("google-analytics")]))
            .unwrap();
        store
            .save_gtm_settings(&GtmSettings { oninit: "init()".into(), onaccept: String::new() })
            .unwrap();
    }

    assert!(dir.path().join("klaro_geo_templates.json").exists());
    assert!(dir.path().join("klaro_geo_country_settings.json").exists());

    let store = SettingsStore::new(FileBackend::new(dir.path()));
    let de = store.resolve_config(Some("DE"), None).unwrap();
    assert_eq!(de["title"], json!("B"));
    assert_eq!(de["services"][0]["name"], json!("google-analytics"));
    assert_eq!(de["gtm"], json!({ "oninit": "init()", "onaccept": "" }));

    let us = store.resolve_config(Some("US"), None).unwrap();
    assert_eq!(us["title"], json!("A"));
}

#[test]
fn create_copies_source_and_links_parent() {
    let store = seeded(MemoryBackend::new());
    let (key, created) = store.create_template_from(Some("eu-strict"), "eu", "EU Strict").unwrap();
    assert_eq!(key, "eu-strict");
    assert_eq!(created.config, json!({ "title": "B" }));
    assert_eq!(created.inherit_from.as_deref(), Some("eu"));

    assert!(matches!(
        store.create_template_from(None, "eu", "eu strict"),
        Err(KlaroGeoError::DuplicateName(_))
    ));
    assert!(matches!(
        store.create_template_from(None, "ghost", "Anything"),
        Err(KlaroGeoError::SourceNotFound(_))
    ));
    assert_eq!(store.load_templates().unwrap().len(), 4);
}

#[test]
fn concurrent_saves_from_separate_backends_are_all_kept() {
    let dir = tempfile::tempdir().unwrap();
    seeded(FileBackend::new(dir.path()));

    let country_saves = {
        let dir = dir.path().to_path_buf();
        thread::spawn(move || {
            let store = file_store(&dir);
            for code in codes('A', 20) {
                store.save_country_template(&code, Assignment::Template("eu".into())).unwrap();
            }
        })
    };
    let region_saves = {
        let dir = dir.path().to_path_buf();
        thread::spawn(move || {
            let store = file_store(&dir);
            for code in codes('B', 20) {
                store
                    .save_region_template(&code, "R1", Some(Assignment::Template("idf".into())))
                    .unwrap();
            }
        })
    };
    country_saves.join().unwrap();
    region_saves.join().unwrap();

    let geo = file_store(dir.path()).load_geo_overrides().unwrap();
    assert_eq!(geo.countries.len(), 40);
    for code in codes('A', 20) {
        assert_eq!(geo.winning_template_key(Some(code.as_str()), None), "eu", "{code}");
    }
    for code in codes('B', 20) {
        assert_eq!(geo.winning_template_key(Some(code.as_str()), Some("R1")), "idf", "{code}");
    }
}

#[test]
fn nameless_template_survives_an_unrelated_save() {
    let backend = MemoryBackend::with_values([(
        TEMPLATES_KEY,
        json!({
            "default": { "name": "Default", "config": { "title": "A" } },
            "eu": { "config": { "title": "B" }, "inherit_from": "default" }
        }),
    )]);
    let store = SettingsStore::new(backend);
    assert_eq!(store.load_templates().unwrap().keys().collect::<Vec<_>>(), vec!["default", "eu"]);

    store.save_template("us", Template::new("US", json!({ "title": "C" }))).unwrap();

    let raw = store.backend().get(TEMPLATES_KEY).unwrap().unwrap();
    assert_eq!(raw["eu"]["config"], json!({ "title": "B" }));
    assert_eq!(raw["eu"]["name"], json!("eu"));
    assert_eq!(raw["eu"]["inherit_from"], json!("default"));
    assert!(raw.get("us").is_some());

    store.save_country_template("DE", Assignment::Template("eu".into())).unwrap();
    assert_eq!(store.resolve_config(Some("DE"), None).unwrap()["title"], json!("B"));
}

#[test]
fn racing_deletes_never_leave_dangling_references() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(FileBackend::new(dir.path()));
    let targets: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
    for key in &targets {
        store.save_template(key, Template::new(key.to_uppercase(), json!({}))).unwrap();
    }

    let assigner = {
        let dir = dir.path().to_path_buf();
        let targets = targets.clone();
        thread::spawn(move || {
            let store = file_store(&dir);
            for (code, key) in codes('C', 10).iter().zip(&targets) {
                match store.save_country_template(code, Assignment::Template(key.clone())) {
                    Ok(_) | Err(KlaroGeoError::TemplateNotFound(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        })
    };
    let deleter = {
        let dir = dir.path().to_path_buf();
        let targets = targets.clone();
        thread::spawn(move || {
            let store = file_store(&dir);
            for key in &targets {
                match store.delete_template(key) {
                    Ok(_) | Err(KlaroGeoError::InUse { .. }) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        })
    };
    assigner.join().unwrap();
    deleter.join().unwrap();

    let store = file_store(dir.path());
    let templates = store.load_templates().unwrap();
    let geo = store.load_geo_overrides().unwrap();
    for (code, entry) in &geo.countries {
        if let Some(key) = entry.template.template_key() {
            assert!(templates.contains(key), "{code} points at deleted template {key}");
        }
    }
}
