//! klaro-geo-rs
//!
//! Umbrella crate re-exporting [`klaro_geo_core`] so the walkthrough in
//! `demos/` can `use klaro_geo_rs::*`.

pub use klaro_geo_core::*;
