use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for klaro-geo
#[derive(Debug, Parser)]
#[command(
    name = "klaro-geo",
    version,
    about = "Inspect and edit Klaro Geo templates and country overrides, and resolve widget configs"
)]
pub struct CliArgs {
    /// Directory holding the stored settings (one JSON file per setting)
    #[arg(
        short = 's',
        long = "settings-dir",
        env = "KLARO_GEO_SETTINGS_DIR",
        default_value = "./klaro-geo-settings",
        global = true
    )]
    pub settings_dir: PathBuf,

    /// Directory with countries.csv / subdivisions.csv (default: bundled data)
    #[arg(short = 'd', long = "data-dir", env = "KLARO_GEO_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log resolution details to stderr (same as RUST_LOG=debug)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the settings directory with a "default" template
    Init,

    /// Print the widget config for a location
    Resolve {
        /// Location override such as FR-IDF or DE
        #[arg(short = 'l', long = "location", conflicts_with_all = ["country", "region"])]
        location: Option<String>,

        /// ISO2 country code
        #[arg(short = 'c', long = "country")]
        country: Option<String>,

        /// Subdivision code, with or without the country prefix
        #[arg(short = 'r', long = "region", requires = "country")]
        region: Option<String>,

        /// Print the full resolution report instead of the config alone
        #[arg(long = "detailed")]
        detailed: bool,
    },

    /// Show which template wins for a location, and why
    Winner {
        /// Location such as FR-IDF, DE, or "" for unknown
        location: String,
    },

    /// Manage templates
    #[command(subcommand)]
    Templates(TemplateCommand),

    /// List countries with their configured template
    Countries {
        /// Include countries hidden by the visibility allowlist
        #[arg(short = 'a', long = "all")]
        all: bool,

        /// Accent- and case-insensitive name filter
        #[arg(long = "search")]
        search: Option<String>,
    },

    /// List a country's regions with their configured template
    Regions {
        /// ISO2 code of the country
        country: String,
    },

    /// Set a country's template ("inherit" to use the default)
    SetCountry { country: String, template: String },

    /// Set a region's template ("inherit" to use the country's); omit to clear
    SetRegion {
        country: String,
        region: String,
        template: Option<String>,
    },

    /// Set the default template
    SetDefault { template: String },

    /// Restrict the country list to these codes; no codes shows all
    SetVisible { countries: Vec<String> },
}

#[derive(Debug, Subcommand)]
pub enum TemplateCommand {
    /// List templates in stored order
    List,

    /// Print one template as JSON
    Show {
        key: String,

        /// Print the config merged over the inheritance chain
        #[arg(short = 'e', long = "effective")]
        effective: bool,
    },

    /// Create a template as a copy of another
    Create {
        /// Display name
        name: String,

        /// Template to copy from
        #[arg(short = 'f', long = "from", default_value = "default")]
        from: String,

        /// Explicit key (default: derived from the name)
        #[arg(short = 'k', long = "key")]
        key: Option<String>,
    },

    /// Delete a template that nothing references
    Delete { key: String },

    /// Change a template's parent; omit the parent to detach it
    SetParent { key: String, parent: Option<String> },
}
