//! klaro-geo-cli
//! =============
//!
//! Command-line interface for the `klaro-geo-core` configuration core.
//!
//! This crate primarily provides a binary (`klaro-geo`). The library target
//! only carries this overview so docs.rs renders a page for it.
//!
//! Quick start
//! -----------
//!
//! ```text
//! klaro-geo init
//! klaro-geo templates create "Strict EU"
//! klaro-geo set-country DE strict-eu
//! klaro-geo resolve --location DE
//! ```
//!
//! For programmatic access use [`klaro-geo-core`] directly.
#![cfg_attr(docsrs, feature(doc_cfg))]
