//! Linux sysfs pin bank (feature `gpio`).
//!
//! Inputs are expected to have pull-ups configured by the board (device tree or
//! external resistors); sysfs cannot set them.

use embedded_hal::digital::{InputPin, OutputPin, PinState};
use linux_embedded_hal::SysfsPin;
use tracing::{debug, warn};

use super::{Line, PinBank};
use crate::config::HardwareConfig;
use crate::error::HalError;
use crate::hal::Color;

/// Panel lines mapped onto exported sysfs pins.
pub struct SysfsPinBank {
    select: [SysfsPin; 3],
    data: SysfsPin,
    buttons: [SysfsPin; 4],
    go: SysfsPin,
    leds: [SysfsPin; 4],
    clk: SysfsPin,
    dio: SysfsPin,
}

fn export(number: u32) -> Result<SysfsPin, HalError> {
    let pin = SysfsPin::new(u64::from(number));
    pin.export()
        .map_err(|e| HalError::pin(format!("gpio{number}"), format!("export: {e:?}")))?;
    Ok(pin)
}

fn input(number: u32) -> Result<SysfsPin, HalError> {
    export(number)?
        .into_input_pin()
        .map_err(|e| HalError::pin(format!("gpio{number}"), format!("{e:?}")))
}

fn output(number: u32, initial: PinState) -> Result<SysfsPin, HalError> {
    export(number)?
        .into_output_pin(initial)
        .map_err(|e| HalError::pin(format!("gpio{number}"), format!("{e:?}")))
}

fn colour_pins(
    pins: &crate::config::ColorPins,
    open: impl Fn(u32) -> Result<SysfsPin, HalError>,
) -> Result<[SysfsPin; 4], HalError> {
    Ok([
        open(pins.get(Color::Red))?,
        open(pins.get(Color::Yellow))?,
        open(pins.get(Color::Green))?,
        open(pins.get(Color::Blue))?,
    ])
}

impl SysfsPinBank {
    /// Exports and configures every pin named in `cfg`.
    pub fn open(cfg: &HardwareConfig) -> Result<Self, HalError> {
        let [s0, s1, s2] = cfg.mux_select_pins;
        let bank = Self {
            select: [
                output(s0, PinState::Low)?,
                output(s1, PinState::Low)?,
                output(s2, PinState::Low)?,
            ],
            data: input(cfg.mux_data_pin)?,
            buttons: colour_pins(&cfg.button_pins, input)?,
            go: input(cfg.go_button_pin)?,
            leds: colour_pins(&cfg.led_pins, |n| output(n, PinState::Low))?,
            clk: output(cfg.display_clk_pin, PinState::High)?,
            dio: output(cfg.display_dio_pin, PinState::High)?,
        };
        debug!("sysfs pins exported");
        Ok(bank)
    }

    fn pin_mut(&mut self, line: Line) -> Result<&mut SysfsPin, HalError> {
        Ok(match line {
            Line::MuxSelect(i) => self
                .select
                .get_mut(usize::from(i))
                .ok_or_else(|| HalError::pin(line, "no such select line"))?,
            Line::MuxData => &mut self.data,
            Line::Button(c) => &mut self.buttons[c.index()],
            Line::GoButton => &mut self.go,
            Line::Led(c) => &mut self.leds[c.index()],
            Line::DisplayClk => &mut self.clk,
            Line::DisplayDio => &mut self.dio,
        })
    }
}

impl PinBank for SysfsPinBank {
    fn read(&mut self, line: Line) -> Result<bool, HalError> {
        self.pin_mut(line)?
            .is_high()
            .map_err(|e| HalError::pin(line, format!("{e:?}")))
    }

    fn write(&mut self, line: Line, high: bool) -> Result<(), HalError> {
        self.pin_mut(line)?
            .set_state(PinState::from(high))
            .map_err(|e| HalError::pin(line, format!("{e:?}")))
    }

    fn release(&mut self) {
        let all = self
            .select
            .iter()
            .chain(std::iter::once(&self.data))
            .chain(self.buttons.iter())
            .chain(std::iter::once(&self.go))
            .chain(self.leds.iter())
            .chain([&self.clk, &self.dio]);
        for pin in all {
            if let Err(e) = pin.unexport() {
                warn!(error = ?e, "failed to unexport pin");
            }
        }
    }
}
