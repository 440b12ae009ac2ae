//! # Hardware → bus bridge and LED owner.
//!
//! [`HardwareEventBridge`] is the only translator from raw backend input to bus
//! events and the only writer of LED state.
//!
//! ```text
//! RawInput::ButtonPressed(c)  ──► leds[c] ? publish input.button.pressed{button:c} : drop (debug)
//! RawInput::ButtonReleased(c) ──► leds[c] ? publish input.button.released{button:c} : drop (debug)
//! RawInput::GoPressed         ──► publish input.go_button.pressed{}
//! RawInput::SwitchChanged     ──► publish input.switch.changed{old_value,new_value}
//! set_led(c, on)              ──► hardware.set_led, leds[c] = on, publish output.led.state_changed
//! ```
//!
//! ## Rules
//! - Gating reads the LED state under the same lock `set_led` writes it, so a press
//!   is forwarded iff the LED was lit at the instant the press was handled.
//! - Callable from backend threads; publishing uses the thread-safe path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::json;
use tracing::{debug, warn};

use crate::error::HalError;
use crate::events::{EventBus, kinds};
use crate::hal::{Color, Hardware, RawInput};

/// Converts backend input into bus events and owns LED state.
pub struct HardwareEventBridge {
    hardware: Arc<dyn Hardware>,
    bus: EventBus,
    leds: Mutex<[bool; 4]>,
}

impl HardwareEventBridge {
    pub fn new(hardware: Arc<dyn Hardware>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            hardware,
            bus,
            leds: Mutex::new([false; 4]),
        })
    }

    fn leds(&self) -> MutexGuard<'_, [bool; 4]> {
        self.leds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs this bridge as the backend's input sink.
    pub fn attach(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.hardware.attach(Arc::new(move |input| {
            if let Some(bridge) = weak.upgrade() {
                bridge.handle_input(input);
            }
        }));
    }

    /// Translates one raw input.
    pub fn handle_input(&self, input: RawInput) {
        match input {
            RawInput::ButtonPressed(color) => self.gated(kinds::BUTTON_PRESSED, color),
            RawInput::ButtonReleased(color) => self.gated(kinds::BUTTON_RELEASED, color),
            RawInput::GoPressed => self.bus.publish_threadsafe(kinds::GO_BUTTON_PRESSED, json!({})),
            RawInput::SwitchChanged { old, new } => self.bus.publish_threadsafe(
                kinds::SWITCH_CHANGED,
                json!({"old_value": old, "new_value": new}),
            ),
        }
    }

    fn gated(&self, event_type: &str, color: Color) {
        let leds = self.leds();
        if leds[color.index()] {
            self.bus
                .publish_threadsafe(event_type, json!({"button": color.as_str()}));
        } else {
            debug!(button = %color, event_type, "button input gated: led off");
        }
    }

    /// Drives an LED and records its state.
    pub fn set_led(&self, color: Color, on: bool) -> Result<(), HalError> {
        let mut leds = self.leds();
        self.hardware.set_led(color, on)?;
        leds[color.index()] = on;
        self.bus.publish_threadsafe(
            kinds::LED_STATE_CHANGED,
            json!({"color": color.as_str(), "is_on": on}),
        );
        Ok(())
    }

    pub fn led(&self, color: Color) -> bool {
        self.leds()[color.index()]
    }

    /// Snapshot of all LEDs, in [`Color::ALL`] order.
    pub fn led_state(&self) -> [bool; 4] {
        *self.leds()
    }

    /// Forces every LED off. Publishes a change only for LEDs that were lit.
    pub fn clear_leds(&self) {
        let mut leds = self.leds();
        for color in Color::ALL {
            if let Err(e) = self.hardware.set_led(color, false) {
                warn!(led = %color, error = %e, "failed to turn off led");
            }
            let was_on = std::mem::replace(&mut leds[color.index()], false);
            if was_on {
                self.bus.publish_threadsafe(
                    kinds::LED_STATE_CHANGED,
                    json!({"color": color.as_str(), "is_on": false}),
                );
            }
        }
    }

    pub fn hardware(&self) -> &Arc<dyn Hardware> {
        &self.hardware
    }
}
