//! # App discovery and switch mapping.
//!
//! [`AppManager`] is built once by [`AppManager::scan`] and is immutable afterwards:
//!
//! ```text
//! scan(roots, mappings_path)
//!   ├─► for root in roots, for dir in root (sorted):
//!   │      ├─ first directory with a given name wins
//!   │      ├─ AppManifest::load(dir) ─ Err ─► error!(app, field), excluded
//!   │      └─ Ok ─► warn! for each required_env key missing from secrets
//!   └─► mapping file {"<0..255>": "<app dir>"} (optionally under "app_mappings")
//!          └─ bad key / out of range / duplicate / non-string / unknown app ─► warn!, skipped
//! ```
//!
//! `resolve` and `mappings` never expose the backing map by reference.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::apps::{AppManifest, AppRegistry, MANIFEST_FILE};
use crate::config::PanelContext;
use crate::error::{ManifestError, MappingError};

/// One mapped app, for app-list displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSummary {
    pub switch_value: u8,
    /// App directory name.
    pub app: String,
    /// Manifest display name.
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
struct AppEntry {
    manifest: Arc<AppManifest>,
    dir: PathBuf,
}

/// Validated manifests plus the switch → app mapping.
#[derive(Debug, Default)]
pub struct AppManager {
    apps: BTreeMap<String, AppEntry>,
    mappings: BTreeMap<u8, String>,
    rejected: Vec<ManifestError>,
    skipped: Vec<MappingError>,
}

impl AppManager {
    /// Scans `roots` and loads the mapping file at `mappings_path`.
    ///
    /// A missing or malformed mapping file yields an empty mapping; nothing here
    /// aborts startup.
    pub fn scan(
        roots: &[PathBuf],
        mappings_path: &Path,
        registry: &AppRegistry,
        ctx: &PanelContext,
    ) -> Self {
        let raw = match std::fs::read_to_string(mappings_path) {
            Ok(text) => serde_json::from_str::<Value>(&text).unwrap_or_else(|e| {
                error!(path = %mappings_path.display(), error = %e, "malformed mapping file; no apps mapped");
                Value::Null
            }),
            Err(e) => {
                warn!(path = %mappings_path.display(), error = %e, "cannot read mapping file; no apps mapped");
                Value::Null
            }
        };
        Self::scan_with_mappings(roots, &raw, registry, ctx)
    }

    /// Scans `roots` and applies an already-parsed mapping document.
    pub fn scan_with_mappings(
        roots: &[PathBuf],
        mappings: &Value,
        registry: &AppRegistry,
        ctx: &PanelContext,
    ) -> Self {
        let mut mgr = Self::default();
        let default_timeout = ctx.config.system.default_timeout_secs();
        for root in roots {
            mgr.scan_root(root, default_timeout, registry, ctx);
        }
        mgr.apply_mappings(mappings);
        info!(
            apps = mgr.apps.len(),
            rejected = mgr.rejected.len(),
            mapped = mgr.mappings.len(),
            "app scan complete"
        );
        mgr
    }

    fn scan_root(
        &mut self,
        root: &Path,
        default_timeout: u64,
        registry: &AppRegistry,
        ctx: &PanelContext,
    ) {
        let entries = match std::fs::read_dir(root) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "cannot read apps directory");
                return;
            }
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            let Some(app) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if app.starts_with('.') || app.starts_with('_') {
                continue;
            }
            if self.apps.contains_key(&app) {
                debug!(app = %app, dir = %dir.display(), "app shadowed by earlier root");
                continue;
            }
            match AppManifest::load(&dir, default_timeout, registry) {
                Ok(manifest) => {
                    for key in &manifest.required_env {
                        if !ctx.secrets.has(key) {
                            warn!(app = %app, key = %key, "required secret is not set");
                        }
                    }
                    debug!(app = %app, name = %manifest.name, "app loaded");
                    self.apps.insert(
                        app,
                        AppEntry {
                            manifest: Arc::new(manifest),
                            dir,
                        },
                    );
                }
                Err(e) => {
                    error!(
                        app = %e.app(),
                        field = e.field(),
                        label = e.as_label(),
                        error = %e,
                        "manifest rejected"
                    );
                    self.rejected.push(e);
                }
            }
        }
    }

    fn apply_mappings(&mut self, raw: &Value) {
        let doc = match raw {
            Value::Object(top) => match top.get("app_mappings") {
                Some(Value::Object(inner)) => inner,
                _ => top,
            },
            Value::Null => return,
            _ => {
                warn!("mapping document is not an object; no apps mapped");
                return;
            }
        };

        for (key, value) in doc {
            match self.mapping_entry(key, value) {
                Ok((switch, app)) => {
                    self.mappings.insert(switch, app);
                }
                Err(e) => {
                    warn!(error = %e, "switch mapping skipped");
                    self.skipped.push(e);
                }
            }
        }
    }

    fn mapping_entry(&self, key: &str, value: &Value) -> Result<(u8, String), MappingError> {
        let n: i64 = key.trim().parse().map_err(|_| MappingError::NotInteger {
            key: key.to_string(),
        })?;
        let switch = u8::try_from(n).map_err(|_| MappingError::OutOfRange {
            key: key.to_string(),
        })?;
        if self.mappings.contains_key(&switch) {
            return Err(MappingError::Duplicate { value: switch });
        }
        let app = value
            .as_str()
            .ok_or(MappingError::NotAName { value: switch })?;
        if !self.apps.contains_key(app) {
            return Err(MappingError::UnknownApp {
                value: switch,
                app: app.to_string(),
            });
        }
        Ok((switch, app.to_string()))
    }

    /// App directory name mapped to `switch_value`.
    pub fn resolve(&self, switch_value: u8) -> Option<&str> {
        self.mappings.get(&switch_value).map(String::as_str)
    }

    /// Copy of the switch → app mapping.
    pub fn mappings(&self) -> BTreeMap<u8, String> {
        self.mappings.clone()
    }

    pub fn manifest(&self, app: &str) -> Option<Arc<AppManifest>> {
        self.apps.get(app).map(|e| Arc::clone(&e.manifest))
    }

    pub fn app_dir(&self, app: &str) -> Option<&Path> {
        self.apps.get(app).map(|e| e.dir.as_path())
    }

    /// Names of every valid app, mapped or not.
    pub fn app_names(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }

    /// Mapped apps, sorted by switch value.
    pub fn summaries(&self) -> Vec<AppSummary> {
        self.mappings
            .iter()
            .filter_map(|(switch, app)| {
                self.apps.get(app).map(|e| AppSummary {
                    switch_value: *switch,
                    app: app.clone(),
                    name: e.manifest.name.clone(),
                    description: e.manifest.description.clone(),
                })
            })
            .collect()
    }

    /// Manifests that failed validation.
    pub fn rejected(&self) -> &[ManifestError] {
        &self.rejected
    }

    /// Mapping entries that were skipped.
    pub fn skipped_mappings(&self) -> &[MappingError] {
        &self.skipped
    }
}
