//! # Configuration, secrets and per-app overrides.
//!
//! Everything is loaded once at startup into a [`PanelContext`] that is passed by
//! `Arc` into each component's constructor. Nothing reads ambient global state after
//! startup.

mod overrides;
mod panel;
mod secrets;

use std::path::Path;

pub use overrides::AppOverrides;
pub use panel::{CONFIG_FILE_ENV, ColorPins, HardwareConfig, PanelConfig, SystemConfig};
pub use secrets::{Secrets, parse_env_file};

use crate::error::ConfigError;

/// Startup context shared by every component.
#[derive(Debug, Clone, Default)]
pub struct PanelContext {
    pub config: PanelConfig,
    pub secrets: Secrets,
    pub overrides: AppOverrides,
}

impl PanelContext {
    /// Bundles already-loaded parts.
    pub fn new(config: PanelConfig, secrets: Secrets, overrides: AppOverrides) -> Self {
        Self {
            config,
            secrets,
            overrides,
        }
    }

    /// Context with `config` and no secrets or overrides (tests, simulation).
    pub fn from_config(config: PanelConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Loads secrets and overrides named by `config.system`.
    pub fn load(config: PanelConfig) -> Result<Self, ConfigError> {
        let secrets = Secrets::load(config.system.secrets_path.as_deref())?;
        let overrides = match config.system.overrides_path.as_deref() {
            Some(p) => AppOverrides::load(p)?,
            None => AppOverrides::default(),
        };
        Ok(Self::new(config, secrets, overrides))
    }

    /// Loads config from `explicit` (or the environment), then secrets and overrides.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(PanelConfig::load(explicit)?)
    }
}
