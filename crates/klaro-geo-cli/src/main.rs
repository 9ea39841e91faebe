//! klaro-geo: command-line interface for klaro-geo-core
//!
//! Operator tool over a directory of stored settings: inspect and edit
//! templates, assign them to countries and regions, and print the widget
//! configuration a visitor from a given location would receive.
//!
//! Usage examples
//! --------------
//!
//! - Start a settings directory
//!   $ klaro-geo init
//!
//! - Create a template and assign it to Germany
//!   $ klaro-geo templates create "Strict EU"
//!   $ klaro-geo set-country DE strict-eu
//!
//! - Override one region, then check who wins
//!   $ klaro-geo set-region FR IDF strict-eu
//!   $ klaro-geo winner FR-IDF
//!
//! - Print the resolved widget config
//!   $ klaro-geo resolve --location FR-IDF
//!   $ klaro-geo resolve --country US --detailed
//!
//! Settings live in `--settings-dir` (or `KLARO_GEO_SETTINGS_DIR`). Country
//! and subdivision names come from the tables bundled with `klaro-geo-core`
//! unless `--data-dir` points elsewhere. `RUST_LOG` controls diagnostics.
mod args;

use crate::args::{CliArgs, Commands, TemplateCommand};
use anyhow::{anyhow, bail, Context};
use clap::Parser;
use klaro_geo_core::settings::{COUNTRY_SETTINGS_KEY, TEMPLATES_KEY};
use klaro_geo_core::{
    Assignment, DetectedLocation, FileBackend, GeoOverrideStore, ReferenceData, SettingsBackend,
    SettingsStore, Template, DEFAULT_TEMPLATE_KEY,
};
use serde_json::{json, Value};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose);
    tracing::debug!(settings_dir = %args.settings_dir.display(), "using settings directory");

    let store = SettingsStore::new(FileBackend::new(&args.settings_dir));

    match args.command {
        Commands::Init => {
            if store.backend().get(TEMPLATES_KEY)?.is_none() {
                store.save_template(
                    DEFAULT_TEMPLATE_KEY,
                    Template::new("Default Template", json!({})),
                )?;
            }
            if store.backend().get(COUNTRY_SETTINGS_KEY)?.is_none() {
                if let Some(first) = store.load_templates()?.first_key() {
                    store.save_default_template(first)?;
                }
            }
            println!("Settings ready in {}", args.settings_dir.display());
        }

        Commands::Resolve {
            location,
            country,
            region,
            detailed,
        } => {
            let location = match location {
                Some(raw) => DetectedLocation::parse(&raw),
                None => DetectedLocation::new(country.as_deref(), region.as_deref()),
            };
            let resolved = store.resolve(&location)?;
            let out = if detailed {
                serde_json::to_string_pretty(&resolved)?
            } else {
                serde_json::to_string_pretty(&resolved.config)?
            };
            println!("{out}");
        }

        Commands::Winner { location } => {
            let location = DetectedLocation::parse(&location);
            let snapshot = store.snapshot()?;
            let matched = snapshot
                .geo
                .winning_template(location.country(), location.region());
            println!("{location}: {} ({})", matched.key, matched.source);
            if !snapshot.templates.contains(&matched.key) {
                let resolved = snapshot.resolver().resolve(&location);
                match resolved.template_key {
                    Some(used) => println!("  template is missing; falls back to {used}"),
                    None => println!("  no templates stored; widget uses its built-in defaults"),
                }
            }
        }

        Commands::Templates(cmd) => run_templates(&store, cmd)?,

        Commands::Countries { all, search } => {
            let reference = load_reference(args.data_dir.as_deref())?;
            let geo = store.load_geo_overrides()?;
            let countries = match search.as_deref() {
                Some(q) => reference.search_countries(q),
                None => reference.countries(),
            };
            for (code, name) in countries {
                if !all && !geo.is_visible(code) {
                    continue;
                }
                let regions = geo
                    .countries
                    .get(code)
                    .map(|e| e.regions.len())
                    .unwrap_or(0);
                let suffix = if regions > 0 {
                    format!(" (+{regions} region overrides)")
                } else {
                    String::new()
                };
                println!("{code}  {name}: {}{suffix}", describe(&geo, geo.assignment(code)));
            }
        }

        Commands::Regions { country } => {
            let reference = load_reference(args.data_dir.as_deref())?;
            let geo = store.load_geo_overrides()?;
            let Some(country_name) = reference.country_name(&country) else {
                bail!("Country {country} not found");
            };
            let code = country.trim().to_ascii_uppercase();
            println!("Regions in {country_name}:");
            for (region, name) in reference.regions_of(&code) {
                let winner = geo.winning_template_key(Some(code.as_str()), Some(region.as_str()));
                println!(
                    "- {code}-{region} {name}: {} → {winner}",
                    describe_region(geo.region_assignment(&code, region))
                );
            }
            if let Some(entry) = geo.countries.get(&code) {
                for (region, assignment) in &entry.regions {
                    if !reference.is_known_region(&code, region) {
                        println!("- {code}-{region} (unknown): {assignment}");
                    }
                }
            }
        }

        Commands::SetCountry { country, template } => {
            let reference = load_reference(args.data_dir.as_deref())?;
            if !reference.is_known_country(&country) {
                bail!("Country {country} not found");
            }
            let assignment = parse_assignment(&template)?;
            let geo = store.save_country_template(&country, assignment)?;
            println!(
                "{}: {}",
                country.trim().to_ascii_uppercase(),
                describe(&geo, geo.assignment(&country))
            );
        }

        Commands::SetRegion {
            country,
            region,
            template,
        } => {
            let reference = load_reference(args.data_dir.as_deref())?;
            if !reference.is_known_region(&country, &region) {
                bail!("Region {region} not found in {country}");
            }
            let assignment = template.as_deref().map(parse_assignment).transpose()?;
            let geo = store.save_region_template(&country, &region, assignment)?;
            println!(
                "{country}-{region}: {}",
                describe_region(geo.region_assignment(&country, &region))
            );
        }

        Commands::SetDefault { template } => {
            let geo = store.save_default_template(&template)?;
            println!("Default template: {}", geo.default_template);
        }

        Commands::SetVisible { countries } => {
            let geo = store.save_visible_countries(&countries)?;
            if geo.visible_countries.is_empty() {
                println!("All countries visible");
            } else {
                println!("Visible: {}", geo.visible_countries.join(", "));
            }
        }
    }

    Ok(())
}

fn run_templates(store: &SettingsStore<FileBackend>, cmd: TemplateCommand) -> anyhow::Result<()> {
    match cmd {
        TemplateCommand::List => {
            let templates = store.load_templates()?;
            let geo = store.load_geo_overrides()?;
            for (key, template) in templates.list() {
                let parent = template
                    .inherit_from
                    .as_deref()
                    .map(|p| format!(" ← {p}"))
                    .unwrap_or_default();
                let marker = if key == geo.default_template { " [default]" } else { "" };
                println!("{key}: {}{parent}{marker}", template.name);
            }
        }

        TemplateCommand::Show { key, effective } => {
            let templates = store.load_templates()?;
            let template = templates
                .get(&key)
                .ok_or_else(|| anyhow!("Template {key} not found"))?;
            let out: Value = if effective {
                let resolved = templates.resolver().resolve_detailed(&key)?;
                json!({
                    "name": template.name,
                    "chain": resolved.chain,
                    "config": resolved.config,
                    "plugin_settings": resolved.plugin_settings,
                })
            } else {
                serde_json::to_value(template)?
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        TemplateCommand::Create { name, from, key } => {
            let (key, template) = store
                .create_template_from(key.as_deref(), &from, &name)
                .with_context(|| format!("creating template '{name}'"))?;
            println!("Created {key}: {} ← {from}", template.name);
        }

        TemplateCommand::Delete { key } => {
            let removed = store.delete_template(&key)?;
            println!("Deleted {key} ({})", removed.name);
        }

        TemplateCommand::SetParent { key, parent } => {
            store.set_template_parent(&key, parent.as_deref())?;
            match parent {
                Some(p) => println!("{key} now inherits from {p}"),
                None => println!("{key} no longer inherits"),
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_reference(data_dir: Option<&Path>) -> anyhow::Result<ReferenceData> {
    match data_dir {
        Some(dir) => ReferenceData::load_from_dir(dir)
            .with_context(|| format!("loading reference data from {}", dir.display())),
        None => Ok(ReferenceData::load()?.clone()),
    }
}

fn parse_assignment(raw: &str) -> anyhow::Result<Assignment> {
    Assignment::parse(raw).ok_or_else(|| anyhow!("template must not be empty"))
}

fn describe(geo: &GeoOverrideStore, assignment: Option<&Assignment>) -> String {
    match assignment {
        None => format!("{} (default)", geo.default_template),
        Some(Assignment::Inherit) => format!("inherit → {}", geo.default_template),
        Some(Assignment::Template(key)) => key.clone(),
    }
}

fn describe_region(assignment: Option<&Assignment>) -> String {
    match assignment {
        None => "not set".to_string(),
        Some(a) => a.to_string(),
    }
}
