// crates/klaro-geo-core/src/template/resolver.rs

use super::{PluginSettings, TemplateStore};
use crate::error::{KlaroGeoError, Result};
use crate::merge::deep_merge;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A defect met while walking an inheritance chain. Neither is fatal:
/// the chain is cut where the defect sits and resolution carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainIssue {
    /// `template` inherits from `repeated`, which was already visited.
    Cycle { template: String, repeated: String },
    /// `template` inherits from `parent`, which is not in the store.
    DanglingParent { template: String, parent: String },
}

/// Outcome of resolving one template key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTemplate {
    pub key: String,
    /// Keys walked, most specific first.
    pub chain: Vec<String>,
    pub config: Value,
    pub plugin_settings: PluginSettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ChainIssue>,
}

/// Computes effective template configs over a borrowed [`TemplateStore`].
///
/// Pure over the store's current contents; holds no state between calls.
#[derive(Debug, Clone, Copy)]
pub struct TemplateResolver<'a> {
    store: &'a TemplateStore,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(store: &'a TemplateStore) -> Self {
        Self { store }
    }

    /// The effective config of `key`.
    ///
    /// Fails only with `TemplateNotFound`; cycles and dangling parents cut the
    /// chain and are logged.
    pub fn resolve(&self, key: &str) -> Result<Value> {
        self.resolve_detailed(key).map(|r| r.config)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn resolve_detailed(&self, key: &str) -> Result<ResolvedTemplate> {
        let (chain, issues) = self.walk(key)?;

        for issue in &issues {
            match issue {
                ChainIssue::Cycle { template, repeated } => tracing::warn!(
                    start = key,
                    template = %template,
                    repeated = %repeated,
                    "cyclic template inheritance; chain truncated"
                ),
                ChainIssue::DanglingParent { template, parent } => tracing::warn!(
                    template = %template,
                    parent = %parent,
                    "template inherits from a missing parent; chain truncated"
                ),
            }
        }

        // Most distant ancestor first, so closer templates win.
        let mut config = Value::Object(Map::new());
        let mut plugin = Value::Object(Map::new());
        for ancestor in chain.iter().rev() {
            if let Some(template) = self.store.get(ancestor) {
                deep_merge(&mut config, &template.config);
                deep_merge(&mut plugin, &template.plugin_settings.as_value());
            }
        }

        let plugin_settings = match plugin {
            Value::Object(map) => PluginSettings(map),
            _ => PluginSettings::default(),
        };

        tracing::debug!(chain = ?chain, "template resolved");

        Ok(ResolvedTemplate {
            key: key.to_string(),
            chain,
            config,
            plugin_settings,
            issues,
        })
    }

    /// Strict ancestor chain of `key`, most specific first.
    ///
    /// Fails with `CyclicInheritance` where [`Self::resolve`] would truncate.
    /// A dangling parent still just ends the chain.
    pub fn ancestor_chain(&self, key: &str) -> Result<Vec<String>> {
        let (chain, issues) = self.walk(key)?;
        for issue in issues {
            if let ChainIssue::Cycle { repeated, .. } = issue {
                return Err(KlaroGeoError::CyclicInheritance {
                    start: key.to_string(),
                    repeated,
                });
            }
        }
        Ok(chain)
    }

    fn walk(&self, key: &str) -> Result<(Vec<String>, Vec<ChainIssue>)> {
        let mut template = self
            .store
            .get(key)
            .ok_or_else(|| KlaroGeoError::TemplateNotFound(key.to_string()))?;

        let mut visited: HashSet<&str> = HashSet::new();
        let mut chain = vec![key.to_string()];
        let mut issues = Vec::new();
        visited.insert(key);
        let mut current = key;

        while let Some(parent) = template.inherit_from.as_deref() {
            if !visited.insert(parent) {
                issues.push(ChainIssue::Cycle {
                    template: current.to_string(),
                    repeated: parent.to_string(),
                });
                break;
            }
            match self.store.get(parent) {
                Some(next) => {
                    chain.push(parent.to_string());
                    template = next;
                    current = parent;
                }
                None => {
                    issues.push(ChainIssue::DanglingParent {
                        template: current.to_string(),
                        parent: parent.to_string(),
                    });
                    break;
                }
            }
        }

        Ok((chain, issues))
    }
}
