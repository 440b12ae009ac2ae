//! # Per-app config overrides.
//!
//! Optional JSON file `{ "<app name>": { key: value, ... } }`. Values are merged over
//! the manifest's `config` when an app's scoped API is built. Entries that are not
//! objects are skipped.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ConfigError;

/// Admin-edited config values keyed by app name.
#[derive(Debug, Clone, Default)]
pub struct AppOverrides {
    by_app: HashMap<String, Map<String, Value>>,
}

impl AppOverrides {
    /// Reads overrides from `path`; a missing file yields an empty set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_value(raw))
    }

    /// Builds overrides from a parsed document.
    pub fn from_value(raw: Value) -> Self {
        let Value::Object(top) = raw else {
            warn!("app overrides document is not an object; ignored");
            return Self::default();
        };
        let by_app = top
            .into_iter()
            .filter_map(|(app, values)| match values {
                Value::Object(map) => Some((app, map)),
                _ => {
                    warn!(app = %app, "app overrides entry is not an object; skipped");
                    None
                }
            })
            .collect();
        Self { by_app }
    }

    /// Overrides for `app`, if any.
    pub fn for_app(&self, app: &str) -> Option<&Map<String, Value>> {
        self.by_app.get(app)
    }

    /// `base` with this app's overrides applied on top (shallow merge).
    pub fn merged(&self, app: &str, base: &Map<String, Value>) -> Map<String, Value> {
        let mut out = base.clone();
        if let Some(over) = self.for_app(app) {
            for (k, v) in over {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overrides_manifest_values() {
        let ov = AppOverrides::from_value(json!({
            "weather": {"units": "imperial"},
            "broken": 3
        }));
        assert!(ov.for_app("broken").is_none());

        let base = json!({"units": "metric", "city": "Oslo"});
        let merged = ov.merged("weather", base.as_object().unwrap());
        assert_eq!(merged["units"], json!("imperial"));
        assert_eq!(merged["city"], json!("Oslo"));

        let untouched = ov.merged("other", base.as_object().unwrap());
        assert_eq!(untouched["units"], json!("metric"));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ov = AppOverrides::load(&dir.path().join("nope.json")).unwrap();
        assert!(ov.for_app("x").is_none());
    }
}
