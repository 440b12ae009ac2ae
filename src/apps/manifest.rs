//! # App manifests.
//!
//! Each app directory holds a `manifest.json`:
//!
//! ```json
//! {
//!   "name": "Hello World",
//!   "entry_point": "hello_world",
//!   "timeout_seconds": 60,
//!   "timeout_behavior": "return",
//!   "requires_network": false,
//!   "tags": ["demo"],
//!   "config": { "greeting": "Hello" }
//! }
//! ```
//!
//! ## Validation
//! - `name` and `entry_point` are required (non-empty);
//! - `timeout_seconds` must be > 0 (defaults to the system default when absent);
//! - `timeout_behavior` must be `"return"` or `"continue"` (default `"return"`);
//! - `entry_point` must be registered;
//! - unknown keys and wrongly typed values are rejected.
//!
//! `config` stays a free-form JSON object and is passed through unmodified.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::registry::AppRegistry;
use crate::error::ManifestError;
use crate::policies::TimeoutBehavior;

/// File name of a manifest inside an app directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Validated, immutable app manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct AppManifest {
    /// Human-friendly name.
    pub name: String,
    /// Registered mini-app to run.
    pub entry_point: String,
    pub timeout_seconds: u64,
    pub timeout_behavior: TimeoutBehavior,
    pub requires_network: bool,
    pub requires_audio: bool,
    pub tags: BTreeSet<String>,
    /// Free-form app config, passed through unmodified.
    pub config: Map<String, Value>,
    pub description: String,
    pub version: String,
    pub author: String,
    /// Secret keys the app expects; checked (warn only) at scan time.
    pub required_env: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    name: Option<String>,
    entry_point: Option<String>,
    timeout_seconds: Option<i64>,
    timeout_behavior: Option<String>,
    #[serde(default)]
    requires_network: bool,
    #[serde(default)]
    requires_audio: bool,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    config: Map<String, Value>,
    #[serde(default)]
    description: String,
    version: Option<String>,
    #[serde(default)]
    author: String,
    #[serde(default)]
    required_env: Vec<String>,
}

fn required(app: &str, field: &'static str, value: Option<String>) -> Result<String, ManifestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ManifestError::Missing {
            app: app.to_string(),
            field,
        }),
    }
}

impl AppManifest {
    /// Parses and validates manifest text for the app directory `app`.
    pub fn parse(
        app: &str,
        text: &str,
        default_timeout_seconds: u64,
        registry: &AppRegistry,
    ) -> Result<Self, ManifestError> {
        let raw: RawManifest =
            serde_json::from_str(text).map_err(|e| ManifestError::Malformed {
                app: app.to_string(),
                reason: e.to_string(),
            })?;

        let name = required(app, "name", raw.name)?;
        let entry_point = required(app, "entry_point", raw.entry_point)?;

        let timeout_seconds = match raw.timeout_seconds {
            None => default_timeout_seconds.max(1),
            Some(v) if v > 0 => v.unsigned_abs(),
            Some(v) => {
                return Err(ManifestError::InvalidTimeout {
                    app: app.to_string(),
                    value: v,
                });
            }
        };

        let timeout_behavior = match raw.timeout_behavior.as_deref() {
            None => TimeoutBehavior::default(),
            Some(s) => TimeoutBehavior::parse(s).ok_or_else(|| {
                ManifestError::UnknownTimeoutBehavior {
                    app: app.to_string(),
                    value: s.to_string(),
                }
            })?,
        };

        if !registry.contains(&entry_point) {
            return Err(ManifestError::UnknownEntryPoint {
                app: app.to_string(),
                entry_point,
            });
        }

        Ok(Self {
            name,
            entry_point,
            timeout_seconds,
            timeout_behavior,
            requires_network: raw.requires_network,
            requires_audio: raw.requires_audio,
            tags: raw.tags.into_iter().collect(),
            config: raw.config,
            description: raw.description,
            version: raw.version.unwrap_or_else(|| "1.0.0".to_string()),
            author: raw.author,
            required_env: raw.required_env,
        })
    }

    /// Reads `<dir>/manifest.json`; the directory name is the app name.
    pub fn load(
        dir: &Path,
        default_timeout_seconds: u64,
        registry: &AppRegistry,
    ) -> Result<Self, ManifestError> {
        let app = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text =
            std::fs::read_to_string(dir.join(MANIFEST_FILE)).map_err(|e| ManifestError::Io {
                app: app.clone(),
                reason: e.to_string(),
            })?;
        Self::parse(&app, &text, default_timeout_seconds, registry)
    }

    /// Execution timeout.
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Deadline to arm, per `timeout_behavior`.
    #[inline]
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout_behavior.deadline(self.timeout())
    }
}
