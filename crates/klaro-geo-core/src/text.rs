// crates/klaro-geo-core/src/text.rs

/// Convert a string into a folded key suitable for comparison.
///
/// This performs:
/// 1) Transliterate Unicode → ASCII (e.g. `Côte d'Ivoire` -> `Cote d'Ivoire`)
/// 2) Normalize to lowercase
///
/// # Examples
///
/// ```rust
/// use klaro_geo_core::text::fold_key;
///
/// assert_eq!(fold_key("Åland Islands"), "aland islands");
/// assert_eq!(fold_key("Straße"), "strasse");
/// ```
pub fn fold_key(s: &str) -> String {
    deunicode::deunicode(s).to_lowercase()
}

/// Derive a template key from a display name.
///
/// Transliterates to ASCII, lowercases, and collapses every run of
/// non-alphanumeric characters into a single `-`.
///
/// ```rust
/// use klaro_geo_core::text::slugify_key;
///
/// assert_eq!(slugify_key("Strict EU"), "strict-eu");
/// assert_eq!(slugify_key("  Zürich / Genève  "), "zurich-geneve");
/// ```
pub fn slugify_key(name: &str) -> String {
    let folded = fold_key(name);
    let mut out = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for ch in folded.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Uppercase and trim an ISO country code. Empty input yields `None`.
pub fn normalize_country_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_ascii_uppercase())
    }
}

/// Uppercase a subdivision code and strip a leading `"<COUNTRY>-"` prefix.
///
/// `("BE", "be-wbr")` → `"WBR"`, `("FR", "IDF")` → `"IDF"`.
pub fn normalize_region_code(country: &str, region: &str) -> Option<String> {
    let region = region.trim().to_ascii_uppercase();
    let stripped = region
        .strip_prefix(&format!("{}-", country.trim().to_ascii_uppercase()))
        .unwrap_or(&region);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_handles_edges() {
        assert_eq!(slugify_key(""), "");
        assert_eq!(slugify_key("---"), "");
        assert_eq!(slugify_key("EU 2024!"), "eu-2024");
    }

    #[test]
    fn region_prefix_is_stripped() {
        assert_eq!(normalize_region_code("BE", "BE-WBR").as_deref(), Some("WBR"));
        assert_eq!(normalize_region_code("be", "be-wbr").as_deref(), Some("WBR"));
        assert_eq!(normalize_region_code("FR", "idf").as_deref(), Some("IDF"));
        assert_eq!(normalize_region_code("FR", " "), None);
    }

    #[test]
    fn country_codes_are_uppercased() {
        assert_eq!(normalize_country_code(" de ").as_deref(), Some("DE"));
        assert_eq!(normalize_country_code(""), None);
    }
}
