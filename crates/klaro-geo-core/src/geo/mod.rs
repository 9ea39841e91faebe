// crates/klaro-geo-core/src/geo/mod.rs

//! # Geo Overrides
//!
//! Which template applies where. A country may pin a template or
//! [`Assignment::Inherit`] the default; a region may pin a template or inherit
//! its country's choice. Stored data in any of the historical shapes is
//! normalized once in [`GeoOverrideStore::from_value`].

use crate::text::{normalize_country_code, normalize_region_code};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

mod legacy;

pub use legacy::decode_object;

/// Sentinel meaning "fall through to the next less specific level".
pub const INHERIT: &str = "inherit";

/// A configured value at country or region level.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Assignment {
    Inherit,
    Template(String),
}

impl Assignment {
    /// Parse a stored or user-supplied value. Blank input is "not configured".
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else if raw.eq_ignore_ascii_case(INHERIT) {
            Some(Self::Inherit)
        } else {
            Some(Self::Template(raw.to_string()))
        }
    }

    pub fn template_key(&self) -> Option<&str> {
        match self {
            Self::Inherit => None,
            Self::Template(key) => Some(key),
        }
    }

    pub fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }
}

impl From<String> for Assignment {
    fn from(raw: String) -> Self {
        Self::parse(&raw).unwrap_or(Self::Inherit)
    }
}

impl From<Assignment> for String {
    fn from(a: Assignment) -> Self {
        a.to_string()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str(INHERIT),
            Self::Template(key) => f.write_str(key),
        }
    }
}

/// Per-country overrides in canonical (nested) shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryEntry {
    pub template: Assignment,
    #[serde(default)]
    pub regions: BTreeMap<String, Assignment>,
}

impl Default for CountryEntry {
    fn default() -> Self {
        Self {
            template: Assignment::Inherit,
            regions: BTreeMap::new(),
        }
    }
}

impl CountryEntry {
    pub fn with_template(key: impl Into<String>) -> Self {
        Self {
            template: Assignment::Template(key.into()),
            regions: BTreeMap::new(),
        }
    }
}

/// Which rule of the precedence chain picked the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Region,
    Country,
    Default,
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSource::Region => write!(f, "region override"),
            MatchSource::Country => write!(f, "country override"),
            MatchSource::Default => write!(f, "default template"),
        }
    }
}

/// The winning template key for a location, with the rule that chose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateMatch {
    pub key: String,
    pub source: MatchSource,
}

/// Default template plus per-country/per-region assignments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoOverrideStore {
    pub default_template: String,
    #[serde(default)]
    pub countries: BTreeMap<String, CountryEntry>,
    /// Countries shown in the admin UI. Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visible_countries: Vec<String>,
}

impl GeoOverrideStore {
    pub fn new(default_template: impl Into<String>) -> Self {
        Self {
            default_template: default_template.into(),
            countries: BTreeMap::new(),
            visible_countries: Vec::new(),
        }
    }

    /// Precedence, most specific first: concrete region override, concrete
    /// country override, default template. `Inherit` at either level falls
    /// through exactly like an absent entry.
    pub fn winning_template(&self, country: Option<&str>, region: Option<&str>) -> TemplateMatch {
        let country = country.and_then(normalize_country_code);
        let entry = country.as_deref().and_then(|c| self.countries.get(c));

        if let (Some(entry), Some(country), Some(region)) = (entry, country.as_deref(), region) {
            let region = normalize_region_code(country, region);
            if let Some(key) = region
                .as_deref()
                .and_then(|r| entry.regions.get(r))
                .and_then(Assignment::template_key)
            {
                return TemplateMatch {
                    key: key.to_string(),
                    source: MatchSource::Region,
                };
            }
        }

        if let Some(key) = entry.and_then(|e| e.template.template_key()) {
            return TemplateMatch {
                key: key.to_string(),
                source: MatchSource::Country,
            };
        }

        TemplateMatch {
            key: self.default_template.clone(),
            source: MatchSource::Default,
        }
    }

    pub fn winning_template_key(&self, country: Option<&str>, region: Option<&str>) -> String {
        self.winning_template(country, region).key
    }

    /// The configured country-level value; `None` means never configured.
    pub fn assignment(&self, country: &str) -> Option<&Assignment> {
        let country = normalize_country_code(country)?;
        self.countries.get(&country).map(|e| &e.template)
    }

    pub fn region_assignment(&self, country: &str, region: &str) -> Option<&Assignment> {
        let country = normalize_country_code(country)?;
        let region = normalize_region_code(&country, region)?;
        self.countries.get(&country)?.regions.get(&region)
    }

    // -----------------------------------------------------------------------
    // MUTATION (each call is one independent merge operation)
    // -----------------------------------------------------------------------

    /// Set a country's own template, keeping its region map.
    pub fn set_country_template(&mut self, country: &str, assignment: Assignment) {
        if let Some(country) = normalize_country_code(country) {
            self.countries.entry(country).or_default().template = assignment;
        }
    }

    /// Replace a country's region map, keeping its own template.
    pub fn set_country_regions(&mut self, country: &str, regions: BTreeMap<String, Assignment>) {
        let Some(country) = normalize_country_code(country) else {
            return;
        };
        let regions = regions
            .into_iter()
            .filter_map(|(code, a)| normalize_region_code(&country, &code).map(|c| (c, a)))
            .collect();
        self.countries.entry(country).or_default().regions = regions;
    }

    /// Set or clear (`None`) one region's assignment.
    pub fn set_region(&mut self, country: &str, region: &str, assignment: Option<Assignment>) {
        let Some(country) = normalize_country_code(country) else {
            return;
        };
        let Some(region) = normalize_region_code(&country, region) else {
            return;
        };
        match assignment {
            Some(a) => {
                self.countries.entry(country).or_default().regions.insert(region, a);
            }
            None => {
                if let Some(entry) = self.countries.get_mut(&country) {
                    entry.regions.remove(&region);
                }
            }
        }
    }

    pub fn remove_country(&mut self, country: &str) -> Option<CountryEntry> {
        normalize_country_code(country).and_then(|c| self.countries.remove(&c))
    }

    pub fn set_visible_countries<I, S>(&mut self, countries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = countries
            .into_iter()
            .filter_map(|c| normalize_country_code(c.as_ref()))
            .collect();
        list.sort();
        list.dedup();
        self.visible_countries = list;
    }

    pub fn is_visible(&self, country: &str) -> bool {
        self.visible_countries.is_empty()
            || normalize_country_code(country)
                .is_some_and(|c| self.visible_countries.contains(&c))
    }

    /// Drop entries that pin the default template with no region overrides;
    /// they resolve exactly like an absent entry.
    pub fn prune(&mut self) {
        let default = self.default_template.clone();
        self.countries.retain(|_, entry| {
            !(entry.regions.is_empty() && entry.template.template_key() == Some(default.as_str()))
        });
    }

    /// Places that name `key`: `"FR"` for a country-level assignment and
    /// `"FR-IDF"` for a region-level one.
    pub fn countries_referencing(&self, key: &str) -> Vec<String> {
        let mut out = Vec::new();
        for (country, entry) in &self.countries {
            if entry.template.template_key() == Some(key) {
                out.push(country.clone());
            }
            for (region, assignment) in &entry.regions {
                if assignment.template_key() == Some(key) {
                    out.push(format!("{country}-{region}"));
                }
            }
        }
        out
    }

    /// Every concrete template key referenced anywhere, default included.
    pub fn referenced_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = std::iter::once(self.default_template.as_str())
            .chain(self.countries.values().flat_map(|entry| {
                entry
                    .template
                    .template_key()
                    .into_iter()
                    .chain(entry.regions.values().filter_map(Assignment::template_key))
            }))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}
