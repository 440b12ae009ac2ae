//! # Secrets store.
//!
//! Loaded once at startup and passed explicitly. Resolution order for a key:
//! process environment (captured at load), then the `KEY=VALUE` secrets file.
//!
//! File format: `KEY=VALUE` lines; blank lines and `#` comments are ignored,
//! an optional `export ` prefix is accepted and surrounding quotes are stripped.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::ConfigError;

/// Immutable key/value secrets.
#[derive(Clone, Default)]
pub struct Secrets {
    env: HashMap<String, String>,
    file: HashMap<String, String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print values.
        f.debug_struct("Secrets")
            .field("file_keys", &self.file.len())
            .finish_non_exhaustive()
    }
}

impl Secrets {
    /// Builds a store from an environment snapshot and parsed file entries.
    pub fn from_parts(env: HashMap<String, String>, file: HashMap<String, String>) -> Self {
        Self { env, file }
    }

    /// Captures the process environment and reads `path` if given.
    ///
    /// A missing file is logged and treated as empty.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env = std::env::vars().collect();
        let file = match path {
            Some(p) if p.is_file() => {
                info!(path = %p.display(), "loading secrets");
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_path_buf(),
                    source,
                })?;
                parse_env_file(&text)
            }
            Some(p) => {
                warn!(path = %p.display(), "secrets file does not exist");
                HashMap::new()
            }
            None => HashMap::new(),
        };
        Ok(Self { env, file })
    }

    /// Secret value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.env
            .get(key)
            .or_else(|| self.file.get(key))
            .map(String::as_str)
    }

    /// True if `key` resolves to a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }
}

/// Parses `KEY=VALUE` lines.
pub fn parse_env_file(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            warn!(line = lineno + 1, "ignoring malformed secrets line");
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        out.insert(key.trim().to_string(), value.to_string());
    }
    out
}
