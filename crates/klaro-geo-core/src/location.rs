// crates/klaro-geo-core/src/location.rs
use crate::text::{normalize_country_code, normalize_region_code};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A visitor's location as reported by a geolocation collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLocation {
    pub country_code: Option<String>,
    pub region_code: Option<String>,
}

impl DetectedLocation {
    /// Normalizes codes: the country is uppercased, the region is uppercased
    /// and loses a `"<COUNTRY>-"` prefix. A region without a country is
    /// dropped since it cannot be matched.
    pub fn new(country: Option<&str>, region: Option<&str>) -> Self {
        let country_code = country.and_then(normalize_country_code);
        let region_code = match (&country_code, region) {
            (Some(c), Some(r)) => normalize_region_code(c, r),
            _ => None,
        };
        Self {
            country_code,
            region_code,
        }
    }

    /// Parse a debug override such as `"FR-IDF"`, `"FR"` or `""`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once('-') {
            Some((country, region)) => Self::new(Some(country), Some(region)),
            None => Self::new(Some(raw), None),
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn country(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region_code.as_deref()
    }
}

impl fmt::Display for DetectedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.country_code, &self.region_code) {
            (Some(c), Some(r)) => write!(f, "{c}-{r}"),
            (Some(c), None) => write!(f, "{c}"),
            _ => write!(f, "unknown"),
        }
    }
}

/// Source of a visitor's location: a GeoIP lookup, an edge header, or a
/// fixed debug override.
pub trait GeoDetector {
    fn detect(&self) -> DetectedLocation;
}

impl GeoDetector for DetectedLocation {
    fn detect(&self) -> DetectedLocation {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_debug_overrides() {
        let loc = DetectedLocation::parse("fr-idf");
        assert_eq!(loc.country(), Some("FR"));
        assert_eq!(loc.region(), Some("IDF"));
        assert_eq!(loc.to_string(), "FR-IDF");

        assert_eq!(DetectedLocation::parse("DE").to_string(), "DE");
        assert_eq!(DetectedLocation::parse(""), DetectedLocation::unknown());
    }

    #[test]
    fn region_without_country_is_dropped() {
        let loc = DetectedLocation::new(None, Some("IDF"));
        assert_eq!(loc, DetectedLocation::unknown());
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let loc = DetectedLocation::new(Some("be"), Some("BE-WBR"));
        let value = serde_json::to_value(&loc).unwrap();
        assert_eq!(value, serde_json::json!({ "countryCode": "BE", "regionCode": "WBR" }));
    }
}
