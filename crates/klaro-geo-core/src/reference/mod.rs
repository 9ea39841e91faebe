// crates/klaro-geo-core/src/reference/mod.rs

//! # Reference Data
//!
//! Immutable country and subdivision display names, used by the admin
//! surfaces to label overrides. Codes are stored uppercased; subdivision codes
//! are stored without their country prefix (`BE-WBR` lives under `BE` as
//! `WBR`).

use crate::text::fold_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod load;

pub use load::DATA_CACHE_FILENAME;

/// Separator used when one subdivision code carries several source names.
pub const NAME_SEPARATOR: &str = " / ";

static NO_REGIONS: BTreeMap<String, String> = BTreeMap::new();

/// Country → name and (country, region) → name lookup tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    countries: BTreeMap<String, String>,
    regions: BTreeMap<String, BTreeMap<String, String>>,
}

/// Simple aggregate counts, mirroring what the CLI prints for `stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceStats {
    pub countries: usize,
    pub regions: usize,
}

impl ReferenceData {
    /// Display name for an ISO 3166-1 alpha-2 code, case-insensitive.
    pub fn country_name(&self, code: &str) -> Option<&str> {
        self.countries
            .get(&code.trim().to_ascii_uppercase())
            .map(String::as_str)
    }

    /// All subdivisions of a country, keyed by code without prefix.
    ///
    /// Unknown countries yield an empty map.
    pub fn regions_of(&self, country: &str) -> &BTreeMap<String, String> {
        self.regions
            .get(&country.trim().to_ascii_uppercase())
            .unwrap_or(&NO_REGIONS)
    }

    /// Display name of a single subdivision. Accepts `"WBR"` or `"BE-WBR"`.
    pub fn region_name(&self, country: &str, region: &str) -> Option<&str> {
        let code = crate::text::normalize_region_code(country, region)?;
        self.regions_of(country).get(&code).map(String::as_str)
    }

    pub fn is_known_country(&self, code: &str) -> bool {
        self.country_name(code).is_some()
    }

    pub fn is_known_region(&self, country: &str, region: &str) -> bool {
        self.region_name(country, region).is_some()
    }

    /// `(code, name)` pairs sorted by display name.
    pub fn countries(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .countries
            .iter()
            .map(|(code, name)| (code.as_str(), name.as_str()))
            .collect();
        out.sort_by_cached_key(|(_, name)| fold_key(name));
        out
    }

    /// Accent- and case-insensitive substring search over country names.
    /// An exact code match is returned first.
    pub fn search_countries(&self, query: &str) -> Vec<(&str, &str)> {
        let q = fold_key(query.trim());
        if q.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some((code, name)) = self.countries.get_key_value(&q.to_ascii_uppercase()) {
            out.push((code.as_str(), name.as_str()));
        }
        for (code, name) in self.countries() {
            if fold_key(name).contains(&q) && !out.iter().any(|(c, _)| *c == code) {
                out.push((code, name));
            }
        }
        out
    }

    pub fn stats(&self) -> ReferenceStats {
        ReferenceStats {
            countries: self.countries.len(),
            regions: self.regions.values().map(BTreeMap::len).sum(),
        }
    }

    // -----------------------------------------------------------------------
    // BUILDING (used by the loader)
    // -----------------------------------------------------------------------

    pub(crate) fn insert_country(&mut self, code: &str, name: &str) {
        if let Some(code) = crate::text::normalize_country_code(code) {
            self.countries.insert(code, name.trim().to_string());
        }
    }

    /// Adds a subdivision name. A second, different name for the same code is
    /// appended with [`NAME_SEPARATOR`]; a repeated name is ignored.
    pub(crate) fn insert_region(&mut self, country: &str, region: &str, name: &str) {
        let Some(country) = crate::text::normalize_country_code(country) else {
            return;
        };
        let Some(code) = crate::text::normalize_region_code(&country, region) else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }

        let slot = self.regions.entry(country).or_default().entry(code).or_default();
        if slot.is_empty() {
            slot.push_str(name);
        } else if !slot.split(NAME_SEPARATOR).any(|existing| existing == name) {
            slot.push_str(NAME_SEPARATOR);
            slot.push_str(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReferenceData {
        let mut data = ReferenceData::default();
        data.insert_country("be", "Belgium");
        data.insert_country("FR", "France");
        data.insert_country("AX", "Åland Islands");
        data.insert_region("BE", "BE-BRU", "Brussels-Capital Region");
        data.insert_region("BE", "BE-BRU", "Région de Bruxelles-Capitale");
        data.insert_region("BE", "BE-BRU", "Brussels-Capital Region");
        data.insert_region("BE", "WBR", "Brabant wallon");
        data
    }

    #[test]
    fn duplicate_region_names_coalesce() {
        let data = sample();
        assert_eq!(
            data.region_name("BE", "BRU"),
            Some("Brussels-Capital Region / Région de Bruxelles-Capitale")
        );
        assert_eq!(data.region_name("be", "be-wbr"), Some("Brabant wallon"));
        assert_eq!(data.stats(), ReferenceStats { countries: 3, regions: 2 });
    }

    #[test]
    fn unknown_country_has_no_regions() {
        let data = sample();
        assert!(data.regions_of("ZZ").is_empty());
        assert_eq!(data.country_name("ZZ"), None);
        assert_eq!(data.country_name("be"), Some("Belgium"));
    }

    #[test]
    fn countries_sort_by_folded_name() {
        let data = sample();
        let names: Vec<&str> = data.countries().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["Åland Islands", "Belgium", "France"]);
    }

    #[test]
    fn search_prefers_code_then_name() {
        let data = sample();
        let hits = data.search_countries("fr");
        assert_eq!(hits[0], ("FR", "France"));
        assert_eq!(data.search_countries("aland"), vec![("AX", "Åland Islands")]);
        assert!(data.search_countries("  ").is_empty());
    }
}
