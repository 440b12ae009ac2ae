//! # Multiplexed switch scanning.
//!
//! Eight switches share one data line through an 8-to-1 multiplexer. For each
//! channel the scanner drives the three select lines with the channel number,
//! waits the settle time and samples the data line (active low: low = switch on).
//!
//! ```text
//! channel i: S0 = bit0(i), S1 = bit1(i), S2 = bit2(i) ─► settle ─► read DATA
//!            DATA low ⇒ value |= 1 << i
//! ```

use std::time::Duration;

use super::{Line, PinBank};
use crate::error::HalError;

/// Reconstructs the 8-bit switch value and reports changes.
#[derive(Debug, Clone)]
pub struct MuxScanner {
    settle: Duration,
    value: u8,
}

impl MuxScanner {
    /// Scanner whose last known value is `initial`.
    pub fn new(settle: Duration, initial: u8) -> Self {
        Self {
            settle,
            value: initial,
        }
    }

    /// Last known value.
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Reads all eight channels.
    pub fn read_value<P: PinBank + ?Sized>(&self, pins: &mut P) -> Result<u8, HalError> {
        let mut value = 0u8;
        for channel in 0..8u8 {
            for bit in 0..3u8 {
                pins.write(Line::MuxSelect(bit), (channel >> bit) & 1 == 1)?;
            }
            if !self.settle.is_zero() {
                std::thread::sleep(self.settle);
            }
            if !pins.read(Line::MuxData)? {
                value |= 1 << channel;
            }
        }
        Ok(value)
    }

    /// Reads all channels; returns `(old, new)` only when the value differs.
    pub fn scan<P: PinBank + ?Sized>(&mut self, pins: &mut P) -> Result<Option<(u8, u8)>, HalError> {
        let new = self.read_value(pins)?;
        if new == self.value {
            return Ok(None);
        }
        let old = std::mem::replace(&mut self.value, new);
        Ok(Some((old, new)))
    }
}
