use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::TabmetaError;

/// Declarative key transformation applied before metadata is namespaced and
/// merged: `remap` renames flat keys, then `namespace` groups listed keys
/// under new sub-mapping keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyMap {
    #[serde(default)]
    pub remap: BTreeMap<String, String>,
    #[serde(default)]
    pub namespace: BTreeMap<String, Vec<String>>,
}

impl KeyMap {
    pub fn load(path: &Utf8Path) -> Result<Self, TabmetaError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| TabmetaError::ConfigRead(path.as_std_path().to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| TabmetaError::KeyMapParse(err.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.remap.is_empty() && self.namespace.is_empty()
    }

    /// Renames keys, then gathers namespaced keys into sub-mappings. A
    /// namespace colliding with a data key is skipped with a warning; keys
    /// not claimed by any namespace stay at the top level.
    pub fn apply(&self, data: Map<String, Value>) -> Map<String, Value> {
        let mut renamed = Map::new();
        for (key, value) in data {
            let key = self.remap.get(&key).cloned().unwrap_or(key);
            renamed.insert(key, value);
        }

        if self.namespace.is_empty() {
            return renamed;
        }

        let mut result = Map::new();
        for (namespace, keys) in &self.namespace {
            if renamed.contains_key(namespace) {
                warn!(namespace, "namespace collides with a data key, skipping");
                continue;
            }
            let mut grouped = Map::new();
            for key in keys {
                match renamed.remove(key) {
                    Some(value) => {
                        grouped.insert(key.clone(), value);
                    }
                    None => debug!(namespace, key, "namespaced key absent from row"),
                }
            }
            if !grouped.is_empty() {
                result.insert(namespace.clone(), Value::Object(grouped));
            }
        }

        for (key, value) in renamed {
            result.insert(key, value);
        }
        result
    }
}
