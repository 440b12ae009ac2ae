//! # Hardware abstraction.
//!
//! [`Hardware`] is the capability set of the panel: colour buttons, go button,
//! LEDs, switches, numeric display, output surface and speaker. It is the single
//! dynamic-dispatch boundary; two backends implement it:
//!
//! - [`SimHardware`]: in-memory state driven by `simulate_*` calls (tests, dev mode, console);
//! - [`GpioHardware`]: multiplexed switch scanning, debounced buttons, direct LED
//!   writes and a TM1637 display over a [`PinBank`](gpio::PinBank).
//!
//! Backends report raw input through one [`InputSink`] callback, invoked from the
//! backend's own thread(s). [`select_backend`] picks the backend once at startup.
//!
//! ```text
//! poller / simulate_* ──► InputSink(RawInput) ──► HardwareEventBridge ──► EventBus
//! ```

mod console;
pub mod gpio;
mod output;
mod sim;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use console::{ConsoleCommand, ParseCommandError, parse_command};
pub use gpio::GpioHardware;
pub use output::{OutputSurface, ScreenContent, Speaker};
pub use sim::SimHardware;

use crate::config::PanelConfig;
use crate::error::HalError;

/// Colour of a button and its paired LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Yellow,
    Green,
    Blue,
}

impl Color {
    /// All colours, in panel order.
    pub const ALL: [Color; 4] = [Color::Red, Color::Yellow, Color::Green, Color::Blue];

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Yellow => "yellow",
            Color::Green => "green",
            Color::Blue => "blue",
        }
    }

    /// Position in [`Color::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown colour name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown colour '{0}'")]
pub struct ParseColorError(pub String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Color::Red),
            "yellow" => Ok(Color::Yellow),
            "green" => Ok(Color::Green),
            "blue" => Ok(Color::Blue),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}

/// Raw input reported by a backend, before LED gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInput {
    ButtonPressed(Color),
    ButtonReleased(Color),
    GoPressed,
    /// Emitted only when the 8-bit value actually changed.
    SwitchChanged { old: u8, new: u8 },
}

/// Callback through which a backend reports raw input.
pub type InputSink = Arc<dyn Fn(RawInput) + Send + Sync>;

/// Which backend is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareKind {
    Simulation,
    Gpio,
}

impl HardwareKind {
    /// Value of `hardware_type` in `system.started`.
    pub fn as_str(self) -> &'static str {
        match self {
            HardwareKind::Simulation => "simulation",
            HardwareKind::Gpio => "gpio",
        }
    }
}

/// Capability set of the panel.
///
/// All methods are callable from any thread. Input is reported through the sink
/// given to [`Hardware::attach`]; a backend without a sink drops input.
pub trait Hardware: Send + Sync + 'static {
    /// Backend identity.
    fn kind(&self) -> HardwareKind;

    /// Installs the raw-input callback, replacing any previous one.
    fn attach(&self, sink: InputSink);

    /// Current 8-bit switch value.
    fn switch_value(&self) -> u8;

    /// Drives an LED. Callers other than the event bridge must not use this directly.
    fn set_led(&self, color: Color, on: bool) -> Result<(), HalError>;

    /// Last value written to an LED.
    fn led(&self, color: Color) -> bool;

    /// Shows a number (0..=9999) on the display, or blanks it with `None`.
    fn show_number(&self, value: Option<u16>) -> Result<(), HalError>;

    /// Number currently on the display.
    fn display_value(&self) -> Option<u16>;

    /// Display brightness, clamped to 0..=7.
    fn set_brightness(&self, level: u8) -> Result<(), HalError>;

    /// Shared output surface.
    fn surface(&self) -> &OutputSurface;

    fn play_sound(&self, path: &Path) -> Result<(), HalError>;

    fn stop_sound(&self);

    /// Stops background threads and releases pins. Idempotent.
    fn shutdown(&self);
}

/// The backend chosen at startup.
#[derive(Clone)]
pub enum Backend {
    Simulation(Arc<SimHardware>),
    #[cfg(feature = "gpio")]
    Gpio(Arc<GpioHardware<gpio::SysfsPinBank>>),
}

impl Backend {
    /// Backend behind the single trait boundary.
    pub fn hardware(&self) -> Arc<dyn Hardware> {
        match self {
            Backend::Simulation(sim) => sim.clone(),
            #[cfg(feature = "gpio")]
            Backend::Gpio(hw) => hw.clone(),
        }
    }

    /// The simulation handle, when running simulated.
    pub fn simulation(&self) -> Option<&Arc<SimHardware>> {
        match self {
            Backend::Simulation(sim) => Some(sim),
            #[cfg(feature = "gpio")]
            Backend::Gpio(_) => None,
        }
    }
}

/// Device-tree model string of the host board.
const DT_MODEL: &str = "/sys/firmware/devicetree/base/model";

/// True if a device-tree model string names a Raspberry Pi.
pub fn is_raspberry_pi_model(model: &str) -> bool {
    model.to_ascii_lowercase().contains("raspberry pi")
}

/// Platform capability probe.
pub fn probe_raspberry_pi() -> bool {
    std::fs::read_to_string(DT_MODEL)
        .map(|m| is_raspberry_pi_model(&m))
        .unwrap_or(false)
}

/// Picks the backend once.
///
/// Simulation is used when `force_simulation` or `dev_mode` is set, when the probe
/// does not find a Raspberry Pi, or when the crate was built without `gpio`.
pub fn select_backend(cfg: &PanelConfig, force_simulation: bool) -> Result<Backend, HalError> {
    let is_pi = probe_raspberry_pi();
    if force_simulation || cfg.system.dev_mode || !is_pi {
        info!(
            dev_mode = cfg.system.dev_mode,
            forced = force_simulation,
            is_pi,
            "using simulation backend"
        );
        return Ok(Backend::Simulation(Arc::new(SimHardware::new())));
    }

    #[cfg(feature = "gpio")]
    {
        let pins = gpio::SysfsPinBank::open(&cfg.hardware)?;
        let hw = GpioHardware::start(pins, cfg.hardware.clone())?;
        info!("using gpio backend");
        Ok(Backend::Gpio(hw))
    }

    #[cfg(not(feature = "gpio"))]
    {
        tracing::warn!("raspberry pi detected but built without `gpio` feature; using simulation backend");
        Ok(Backend::Simulation(Arc::new(SimHardware::new())))
    }
}
