// crates/klaro-geo-core/src/reference/load.rs

//! Physical layer for [`ReferenceData`]: CSV parsing, optional gzip, and a
//! bincode cache next to the source tables.

use super::ReferenceData;
use crate::error::{KlaroGeoError, Result};
use once_cell::sync::OnceCell;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

static REFERENCE_CACHE: OnceCell<ReferenceData> = OnceCell::new();

pub const DATA_CACHE_FILENAME: &str = "reference.bin";

const COUNTRIES_STEM: &str = "countries.csv";
const SUBDIVISIONS_STEM: &str = "subdivisions.csv";

const COUNTRY_CODE_HEADERS: &[&str] = &["code", "country_code", "iso2", "alpha2"];
const COUNTRY_NAME_HEADERS: &[&str] = &["name", "country_name", "country"];
const SUB_COUNTRY_HEADERS: &[&str] = &["country_code", "country", "iso2"];
const SUB_CODE_HEADERS: &[&str] = &["code", "subdivision_code", "region_code"];
const SUB_NAME_HEADERS: &[&str] = &["name", "subdivision_name", "region_name"];

impl ReferenceData {
    pub fn default_data_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
    }

    /// Load the bundled dataset once per process.
    pub fn load() -> Result<&'static Self> {
        REFERENCE_CACHE.get_or_try_init(|| Self::load_from_dir(Self::default_data_dir()))
    }

    /// **Smart Load:** reuse `reference.bin` if it is newer than both tables,
    /// otherwise parse the CSVs and refresh the cache (best-effort).
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let countries_path = locate_table(dir, COUNTRIES_STEM)?;
        let subdivisions_path = locate_table(dir, SUBDIVISIONS_STEM)?;
        let cache_path = dir.join(DATA_CACHE_FILENAME);

        if is_cache_fresh(&cache_path, &[&countries_path, &subdivisions_path]) {
            match read_cache(&cache_path) {
                Ok(data) => return Ok(data),
                Err(e) => tracing::debug!(error = %e, "reference cache unreadable, rebuilding"),
            }
        }

        let data = Self::from_readers(
            open_stream(&countries_path)?,
            open_stream(&subdivisions_path)?,
        )?;

        if let Err(e) = write_cache(&cache_path, &data) {
            tracing::debug!(error = %e, path = %cache_path.display(), "could not write reference cache");
        }

        Ok(data)
    }

    /// Parse the two delimited tables.
    ///
    /// Columns are located by header name; rows with a missing code or name
    /// are skipped.
    pub fn from_readers<C: Read, S: Read>(countries: C, subdivisions: S) -> Result<Self> {
        let mut data = ReferenceData::default();

        let mut rdr = csv_reader(countries);
        let headers = rdr.headers()?.clone();
        let code_idx = find_column(&headers, COUNTRY_CODE_HEADERS)?;
        let name_idx = find_column(&headers, COUNTRY_NAME_HEADERS)?;
        for record in rdr.records() {
            let record = record?;
            match (record.get(code_idx), record.get(name_idx)) {
                (Some(code), Some(name)) if !code.is_empty() && !name.is_empty() => {
                    data.insert_country(code, name);
                }
                _ => continue,
            }
        }

        let mut rdr = csv_reader(subdivisions);
        let headers = rdr.headers()?.clone();
        let country_idx = find_column(&headers, SUB_COUNTRY_HEADERS)?;
        let code_idx = find_column(&headers, SUB_CODE_HEADERS)?;
        let name_idx = find_column(&headers, SUB_NAME_HEADERS)?;
        for record in rdr.records() {
            let record = record?;
            if let (Some(country), Some(code), Some(name)) = (
                record.get(country_idx),
                record.get(code_idx),
                record.get(name_idx),
            ) {
                data.insert_region(country, code, name);
            }
        }

        Ok(data)
    }
}

// -----------------------------------------------------------------------------
// INTERNAL TRANSPORT HELPERS
// -----------------------------------------------------------------------------

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Result<usize> {
    candidates
        .iter()
        .find_map(|want| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(want))
        })
        .ok_or_else(|| {
            KlaroGeoError::InvalidData(format!(
                "missing column (expected one of: {})",
                candidates.join(", ")
            ))
        })
}

/// Prefers `<stem>.gz` when compression is compiled in.
fn locate_table(dir: &Path, stem: &str) -> Result<PathBuf> {
    #[cfg(feature = "compact")]
    {
        let gz = dir.join(format!("{stem}.gz"));
        if gz.is_file() {
            return Ok(gz);
        }
    }

    let plain = dir.join(stem);
    if plain.is_file() {
        Ok(plain)
    } else {
        Err(KlaroGeoError::NotFound(format!(
            "reference table {stem} not found in {}",
            dir.display()
        )))
    }
}

/// Opens a file, buffers it, and wraps it in a Gzip decoder when the name
/// ends in `.gz`.
fn open_stream(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| {
        KlaroGeoError::NotFound(format!("Dataset not found at {}: {}", path.display(), e))
    })?;

    let reader = BufReader::new(file);
    let gzipped = path.extension().is_some_and(|ext| ext == "gz");

    if gzipped {
        #[cfg(feature = "compact")]
        {
            use flate2::read::GzDecoder;
            return Ok(Box::new(GzDecoder::new(reader)));
        }
        #[cfg(not(feature = "compact"))]
        {
            return Err(KlaroGeoError::InvalidData(format!(
                "{} is gzipped but 'compact' is disabled",
                path.display()
            )));
        }
    }

    Ok(Box::new(reader))
}

fn is_cache_fresh(cache_path: &Path, sources: &[&Path]) -> bool {
    let cache_time = match fs::metadata(cache_path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    sources.iter().all(|source| {
        fs::metadata(source)
            .and_then(|m| m.modified())
            .map(|t| t <= cache_time)
            .unwrap_or(false)
    })
}

fn read_cache(path: &Path) -> Result<ReferenceData> {
    let bytes = fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

fn write_cache(path: &Path, data: &ReferenceData) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, data)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTRIES: &str = "code,name\nBE,Belgium\nFR,France\n,Nowhere\n";
    const SUBDIVISIONS: &str = "\
country_code,subdivision_name,code
BE,Brabant wallon,BE-WBR
BE,Waals-Brabant,BE-WBR
FR,Île-de-France,FR-IDF
FR,,FR-XXX
";

    #[test]
    fn parses_tables() {
        let data =
            ReferenceData::from_readers(COUNTRIES.as_bytes(), SUBDIVISIONS.as_bytes()).unwrap();
        assert_eq!(data.country_name("BE"), Some("Belgium"));
        assert_eq!(data.stats().countries, 2);
        assert_eq!(data.region_name("BE", "WBR"), Some("Brabant wallon / Waals-Brabant"));
        assert_eq!(data.region_name("FR", "IDF"), Some("Île-de-France"));
        assert!(!data.is_known_region("FR", "XXX"));
    }

    #[test]
    fn missing_column_is_invalid_data() {
        let err = ReferenceData::from_readers("iso,label\n".as_bytes(), SUBDIVISIONS.as_bytes())
            .unwrap_err();
        assert!(matches!(err, KlaroGeoError::InvalidData(_)));
    }

    #[test]
    fn load_from_dir_writes_and_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(COUNTRIES_STEM), COUNTRIES).unwrap();
        fs::write(dir.path().join(SUBDIVISIONS_STEM), SUBDIVISIONS).unwrap();

        let first = ReferenceData::load_from_dir(dir.path()).unwrap();
        assert!(dir.path().join(DATA_CACHE_FILENAME).is_file());

        let second = ReferenceData::load_from_dir(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_tables_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReferenceData::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, KlaroGeoError::NotFound(_)));
    }

    #[test]
    fn bundled_dataset_loads() {
        let data = ReferenceData::load().unwrap();
        assert_eq!(data.country_name("DE"), Some("Germany"));
        assert_eq!(data.region_name("FR", "FR-IDF"), Some("Île-de-France"));
    }
}
