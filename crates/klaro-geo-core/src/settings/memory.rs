// crates/klaro-geo-core/src/settings/memory.rs
use super::SettingsBackend;
use crate::error::Result;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory backend, for tests and one-shot tools.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated backend, e.g. with raw legacy settings.
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            values: Mutex::new(values),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Result<Value>,
    ) -> Result<Value> {
        let mut values = self.lock();
        let next = f(values.get(key).cloned())?;
        values.insert(key.to_string(), next.clone());
        Ok(next)
    }

    fn update_many(
        &self,
        keys: &[&str],
        f: &mut dyn FnMut(&mut BTreeMap<String, Option<Value>>) -> Result<()>,
    ) -> Result<()> {
        let mut values = self.lock();
        let before: BTreeMap<String, Option<Value>> = keys
            .iter()
            .map(|k| (k.to_string(), values.get(*k).cloned()))
            .collect();
        let mut after = before.clone();
        f(&mut after)?;
        for (key, old) in &before {
            match after.remove(key) {
                Some(Some(new)) if Some(&new) != old.as_ref() => {
                    values.insert(key.clone(), new);
                }
                Some(None) if old.is_some() => {
                    values.remove(key);
                }
                _ => {}
            }
        }
        Ok(())
    }
}
