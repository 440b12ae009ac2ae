//! # Panel configuration.
//!
//! [`PanelConfig`] holds every runtime setting, split into [`HardwareConfig`]
//! (pin wiring and timings) and [`SystemConfig`] (runtime behaviour).
//!
//! Loading order:
//! 1. explicit path, else `PANEL_CONFIG_FILE`, else built-in defaults;
//! 2. environment overrides (`PANEL_LOG_LEVEL`, `PANEL_DEV_MODE`, `PANEL_EVENT_QUEUE_SIZE`).
//!
//! Every field has a default; unknown keys are rejected.
//!
//! ## Sentinel values
//! - `preempt_join_ms` below `stop_grace_ms` is raised to `stop_grace_ms`
//! - `event_bus_queue_size = 0` is clamped to 1
//! - `default_timeout_seconds = 0` is clamped to 1

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::hal::Color;

/// Environment variable naming the config file.
pub const CONFIG_FILE_ENV: &str = "PANEL_CONFIG_FILE";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanelConfig {
    /// Pin wiring and hardware timings.
    pub hardware: HardwareConfig,
    /// Runtime behaviour.
    pub system: SystemConfig,
}

/// One pin per colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColorPins {
    pub red: u32,
    pub yellow: u32,
    pub green: u32,
    pub blue: u32,
}

impl ColorPins {
    /// Pin assigned to `color`.
    pub fn get(&self, color: Color) -> u32 {
        match color {
            Color::Red => self.red,
            Color::Yellow => self.yellow,
            Color::Green => self.green,
            Color::Blue => self.blue,
        }
    }
}

/// Pin assignments (BCM numbering) and hardware parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HardwareConfig {
    /// Multiplexer select lines S0, S1, S2.
    pub mux_select_pins: [u32; 3],
    /// Shared multiplexer data line (active low).
    pub mux_data_pin: u32,
    pub button_pins: ColorPins,
    pub led_pins: ColorPins,
    pub go_button_pin: u32,
    /// TM1637 clock line.
    pub display_clk_pin: u32,
    /// TM1637 data line.
    pub display_dio_pin: u32,
    /// Display brightness, 0..=7.
    pub display_brightness: u8,
    /// Interval between full switch scans.
    pub switch_poll_ms: u64,
    /// Settle time after changing the select lines.
    pub mux_settle_us: u64,
    /// Lockout after a colour-button edge.
    pub button_debounce_ms: u64,
    /// Lockout after a go-button edge.
    pub go_debounce_ms: u64,
    /// Half-period of the TM1637 bit clock.
    pub display_bit_delay_us: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            mux_select_pins: [5, 6, 13],
            mux_data_pin: 19,
            button_pins: ColorPins {
                red: 26,
                yellow: 16,
                green: 20,
                blue: 21,
            },
            led_pins: ColorPins {
                red: 12,
                yellow: 25,
                green: 24,
                blue: 23,
            },
            go_button_pin: 17,
            display_clk_pin: 2,
            display_dio_pin: 3,
            display_brightness: 7,
            switch_poll_ms: 50,
            mux_settle_us: 500,
            button_debounce_ms: 50,
            go_debounce_ms: 200,
            display_bit_delay_us: 5,
        }
    }
}

impl HardwareConfig {
    #[inline]
    pub fn switch_poll(&self) -> Duration {
        Duration::from_millis(self.switch_poll_ms.max(1))
    }

    #[inline]
    pub fn mux_settle(&self) -> Duration {
        Duration::from_micros(self.mux_settle_us)
    }

    #[inline]
    pub fn button_debounce(&self) -> Duration {
        Duration::from_millis(self.button_debounce_ms)
    }

    #[inline]
    pub fn go_debounce(&self) -> Duration {
        Duration::from_millis(self.go_debounce_ms)
    }

    #[inline]
    pub fn display_bit_delay(&self) -> Duration {
        Duration::from_micros(self.display_bit_delay_us)
    }
}

/// Runtime behaviour.
///
/// ## Field semantics
/// - `stop_grace_ms`: how long a timed-out app gets to observe its stop signal
/// - `preempt_join_ms`: extended join window after `stop()` (never below the grace)
/// - `start_timeout_ms`: how long `launch` waits for the worker to report it started
/// - `shutdown_grace_ms`: how long shutdown waits for the dispatch loop to drain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    pub log_level: String,
    /// Trace every bus event at debug level.
    pub log_events: bool,
    /// Force the simulation backend and expose dev mode to apps.
    pub dev_mode: bool,
    pub event_bus_queue_size: usize,
    /// Used when a manifest omits `timeout_seconds`.
    pub default_timeout_seconds: u64,
    pub stop_grace_ms: u64,
    pub preempt_join_ms: u64,
    pub start_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    /// App roots scanned in order; the first directory with a given name wins.
    pub apps_dirs: Vec<PathBuf>,
    pub mappings_path: PathBuf,
    pub overrides_path: Option<PathBuf>,
    pub secrets_path: Option<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_events: false,
            dev_mode: false,
            event_bus_queue_size: 1000,
            default_timeout_seconds: 900,
            stop_grace_ms: 2000,
            preempt_join_ms: 5000,
            start_timeout_ms: 2000,
            shutdown_grace_ms: 5000,
            apps_dirs: vec![PathBuf::from("apps")],
            mappings_path: PathBuf::from("config/app_mappings.json"),
            overrides_path: None,
            secrets_path: None,
        }
    }
}

impl SystemConfig {
    #[inline]
    pub fn queue_size(&self) -> usize {
        self.event_bus_queue_size.max(1)
    }

    #[inline]
    pub fn default_timeout_secs(&self) -> u64 {
        self.default_timeout_seconds.max(1)
    }

    #[inline]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Extended join window after a pre-empting `stop()`; never shorter than the grace.
    #[inline]
    pub fn preempt_join(&self) -> Duration {
        Duration::from_millis(self.preempt_join_ms.max(self.stop_grace_ms))
    }

    #[inline]
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms.max(1))
    }

    #[inline]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl PanelConfig {
    /// Parses a JSON document.
    pub fn from_json_str(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(path, &text)
    }

    /// Loads configuration from the process environment.
    ///
    /// `explicit` wins over `PANEL_CONFIG_FILE`; with neither, defaults are used.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// [`PanelConfig::load`] with an injectable environment lookup.
    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_FILE_ENV).map(PathBuf::from));

        let mut cfg = match path {
            Some(p) => {
                debug!(path = %p.display(), "loading config");
                Self::from_file(&p)?
            }
            None => Self::default(),
        };
        cfg.apply_env(env)?;
        Ok(cfg)
    }

    /// Applies `PANEL_*` overrides from `env`.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(level) = env("PANEL_LOG_LEVEL") {
            self.system.log_level = level.trim().to_string();
        }
        if let Some(raw) = env("PANEL_DEV_MODE") {
            self.system.dev_mode = parse_flag(&raw);
        }
        if let Some(raw) = env("PANEL_EVENT_QUEUE_SIZE") {
            self.system.event_bus_queue_size =
                raw.trim().parse().map_err(|_| ConfigError::Env {
                    var: "PANEL_EVENT_QUEUE_SIZE",
                    value: raw.clone(),
                })?;
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
