// crates/klaro-geo-core/src/error.rs
use thiserror::Error;

/// Errors raised by the configuration core.
///
/// Resolution never surfaces these to a visitor: [`crate::ConfigResolver`]
/// recovers from `TemplateNotFound` and `CyclicInheritance` locally. The admin
/// operations (`create_from`, `remove`, `delete_template`, ...) return them
/// synchronously and leave the stores untouched.
#[derive(Debug, Error)]
pub enum KlaroGeoError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// The inheritance chain starting at the first key revisits the second.
    #[error("cyclic inheritance: chain starting at '{start}' revisits '{repeated}'")]
    CyclicInheritance { start: String, repeated: String },

    #[error("source template not found: {0}")]
    SourceNotFound(String),

    #[error("a template named '{0}' already exists")]
    DuplicateName(String),

    #[error("template key '{0}' is already taken")]
    KeyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("template '{key}' is still used by: {}", countries.join(", "))]
    InUse { key: String, countries: Vec<String> },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("cache encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, KlaroGeoError>;
