//! # Simulation backend.
//!
//! In-memory panel driven by explicit `simulate_*` calls. Semantics match the GPIO
//! backend: a switch change equal to the current value is skipped, a press is a
//! press edge followed by a release edge, and input is reported through the sink
//! on the caller's thread.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use super::{Color, Hardware, HardwareKind, InputSink, OutputSurface, RawInput, Speaker};
use crate::error::HalError;

#[derive(Debug, Default)]
struct SimState {
    switch: u8,
    leds: [bool; 4],
    display: Option<u16>,
    brightness: u8,
    shut_down: bool,
}

/// In-memory hardware backend.
pub struct SimHardware {
    state: Mutex<SimState>,
    sink: RwLock<Option<InputSink>>,
    surface: OutputSurface,
    speaker: Speaker,
}

impl Default for SimHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHardware {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                brightness: 7,
                ..SimState::default()
            }),
            sink: RwLock::new(None),
            surface: OutputSurface::new(),
            speaker: Speaker::new(),
        }
    }

    /// Backend with switches preset to `value` (no change event).
    pub fn with_switch(value: u8) -> Self {
        let sim = Self::new();
        sim.state().switch = value;
        sim
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, input: RawInput) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => sink(input),
            None => debug!(?input, "no input sink attached; dropped"),
        }
    }

    /// Physical tap of a colour button: press edge, then release edge.
    pub fn simulate_press(&self, color: Color) {
        self.emit(RawInput::ButtonPressed(color));
        self.emit(RawInput::ButtonReleased(color));
    }

    /// Press edge only (button held down).
    pub fn simulate_hold(&self, color: Color) {
        self.emit(RawInput::ButtonPressed(color));
    }

    /// Release edge only.
    pub fn simulate_release(&self, color: Color) {
        self.emit(RawInput::ButtonReleased(color));
    }

    pub fn simulate_go(&self) {
        self.emit(RawInput::GoPressed);
    }

    /// Sets the switches; returns false (and emits nothing) if the value is unchanged.
    pub fn simulate_change(&self, value: u8) -> bool {
        let old = {
            let mut st = self.state();
            if st.switch == value {
                return false;
            }
            std::mem::replace(&mut st.switch, value)
        };
        self.emit(RawInput::SwitchChanged { old, new: value });
        true
    }

    /// Snapshot of all LEDs, in [`Color::ALL`] order.
    pub fn leds(&self) -> [bool; 4] {
        self.state().leds
    }

    pub fn brightness(&self) -> u8 {
        self.state().brightness
    }

    pub fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }
}

impl Hardware for SimHardware {
    fn kind(&self) -> HardwareKind {
        HardwareKind::Simulation
    }

    fn attach(&self, sink: InputSink) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn switch_value(&self) -> u8 {
        self.state().switch
    }

    fn set_led(&self, color: Color, on: bool) -> Result<(), HalError> {
        self.state().leds[color.index()] = on;
        Ok(())
    }

    fn led(&self, color: Color) -> bool {
        self.state().leds[color.index()]
    }

    fn show_number(&self, value: Option<u16>) -> Result<(), HalError> {
        self.state().display = value.map(|v| v.min(9999));
        Ok(())
    }

    fn display_value(&self) -> Option<u16> {
        self.state().display
    }

    fn set_brightness(&self, level: u8) -> Result<(), HalError> {
        self.state().brightness = level.min(7);
        Ok(())
    }

    fn surface(&self) -> &OutputSurface {
        &self.surface
    }

    fn play_sound(&self, path: &Path) -> Result<(), HalError> {
        self.speaker.play(path);
        Ok(())
    }

    fn stop_sound(&self) {
        self.speaker.stop();
    }

    fn shutdown(&self) {
        self.speaker.stop();
        let mut st = self.state();
        if !st.shut_down {
            st.shut_down = true;
            st.leds = [false; 4];
            st.display = None;
            debug!("simulation backend shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording(sim: &SimHardware) -> Arc<Mutex<Vec<RawInput>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sim.attach(Arc::new(move |input| sink.lock().unwrap().push(input)));
        seen
    }

    #[test]
    fn unchanged_switch_value_is_skipped() {
        let sim = SimHardware::new();
        let seen = recording(&sim);
        assert!(sim.simulate_change(5));
        assert!(!sim.simulate_change(5));
        assert!(sim.simulate_change(0));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RawInput::SwitchChanged { old: 0, new: 5 },
                RawInput::SwitchChanged { old: 5, new: 0 },
            ]
        );
    }

    #[test]
    fn press_is_a_tap() {
        let sim = SimHardware::new();
        let seen = recording(&sim);
        sim.simulate_press(Color::Green);
        sim.simulate_go();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RawInput::ButtonPressed(Color::Green),
                RawInput::ButtonReleased(Color::Green),
                RawInput::GoPressed,
            ]
        );
    }

    #[test]
    fn outputs_are_clamped_and_cleared_on_shutdown() {
        let sim = SimHardware::with_switch(42);
        assert_eq!(sim.switch_value(), 42);
        sim.set_led(Color::Red, true).unwrap();
        sim.show_number(Some(12345)).unwrap();
        sim.set_brightness(99).unwrap();
        assert_eq!(sim.display_value(), Some(9999));
        assert_eq!(sim.brightness(), 7);

        sim.shutdown();
        sim.shutdown();
        assert!(sim.is_shut_down());
        assert_eq!(sim.leds(), [false; 4]);
        assert_eq!(sim.display_value(), None);
    }
}
