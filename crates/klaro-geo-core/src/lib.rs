// crates/klaro-geo-core/src/lib.rs

pub mod consent; // dataLayer / Consent Mode payloads
pub mod error;
pub mod geo; // Country and region overrides
pub mod location;
pub mod merge;
pub mod reference; // Country / subdivision names
pub mod resolver; // Location → widget config
pub mod services;
pub mod settings; // Backends + typed load/save
pub mod template;
pub mod text;

// Re-exports
pub use crate::error::{KlaroGeoError, Result};
pub use crate::geo::{Assignment, CountryEntry, GeoOverrideStore, MatchSource, TemplateMatch};
pub use crate::location::{DetectedLocation, GeoDetector};
pub use crate::reference::{ReferenceData, ReferenceStats};
pub use crate::resolver::{ConfigResolver, ResolvedConfig};
pub use crate::services::{GtmSettings, Service, ServiceStore};
pub use crate::settings::{FileBackend, MemoryBackend, SettingsBackend, SettingsStore, Snapshot};
pub use crate::template::{
    ChainIssue, PluginSettings, ResolvedTemplate, Template, TemplateResolver, TemplateStore,
    DEFAULT_TEMPLATE_KEY,
};
