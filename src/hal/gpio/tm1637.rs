//! # TM1637 4-digit 7-segment display driver.
//!
//! Bit-banged two-wire protocol over the CLK and DIO lines of a [`PinBank`].
//!
//! Frame sequence for one update:
//! ```text
//! start 0x40 stop                      data command, auto-increment
//! start 0xC0 d0 d1 d2 d3 stop          address 0, four segment bytes
//! start 0x88|brightness stop           display on, brightness 0..=7
//! ```
//! Bytes go out LSB first; data changes while CLK is low and the acknowledge
//! clock is sent with DIO released.

use std::time::Duration;

use super::{Line, PinBank};
use crate::error::HalError;

const CMD_DATA_AUTO: u8 = 0x40;
const CMD_ADDR0: u8 = 0xC0;
const CMD_DISPLAY_ON: u8 = 0x88;

/// Segment patterns for digits 0-9.
pub const DIGITS: [u8; 10] = [0x3f, 0x06, 0x5b, 0x4f, 0x66, 0x6d, 0x7d, 0x07, 0x7f, 0x6f];

/// Segment bytes for `value`, right-aligned without leading zeros; `None` blanks.
pub fn encode(value: Option<u16>) -> [u8; 4] {
    let mut out = [0u8; 4];
    let Some(mut n) = value.map(|v| v.min(9999)) else {
        return out;
    };
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[usize::from(n % 10)];
        n /= 10;
        if n == 0 {
            break;
        }
    }
    out
}

/// Display driver state.
#[derive(Debug, Clone)]
pub struct Tm1637 {
    brightness: u8,
    bit_delay: Duration,
}

impl Tm1637 {
    pub fn new(brightness: u8, bit_delay: Duration) -> Self {
        Self {
            brightness: brightness.min(7),
            bit_delay,
        }
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn set_brightness(&mut self, level: u8) {
        self.brightness = level.min(7);
    }

    /// Writes four segment bytes and the display-control command.
    pub fn write_segments<P: PinBank + ?Sized>(
        &self,
        pins: &mut P,
        segments: [u8; 4],
    ) -> Result<(), HalError> {
        self.start(pins)?;
        self.write_byte(pins, CMD_DATA_AUTO)?;
        self.stop(pins)?;

        self.start(pins)?;
        self.write_byte(pins, CMD_ADDR0)?;
        for b in segments {
            self.write_byte(pins, b)?;
        }
        self.stop(pins)?;

        self.start(pins)?;
        self.write_byte(pins, CMD_DISPLAY_ON | self.brightness)?;
        self.stop(pins)
    }

    pub fn show<P: PinBank + ?Sized>(&self, pins: &mut P, value: Option<u16>) -> Result<(), HalError> {
        self.write_segments(pins, encode(value))
    }

    fn delay(&self) {
        if !self.bit_delay.is_zero() {
            std::thread::sleep(self.bit_delay);
        }
    }

    fn set<P: PinBank + ?Sized>(&self, pins: &mut P, line: Line, high: bool) -> Result<(), HalError> {
        pins.write(line, high)?;
        self.delay();
        Ok(())
    }

    fn start<P: PinBank + ?Sized>(&self, pins: &mut P) -> Result<(), HalError> {
        self.set(pins, Line::DisplayDio, true)?;
        self.set(pins, Line::DisplayClk, true)?;
        self.set(pins, Line::DisplayDio, false)
    }

    fn stop<P: PinBank + ?Sized>(&self, pins: &mut P) -> Result<(), HalError> {
        self.set(pins, Line::DisplayClk, false)?;
        self.set(pins, Line::DisplayDio, false)?;
        self.set(pins, Line::DisplayClk, true)?;
        self.set(pins, Line::DisplayDio, true)
    }

    fn write_byte<P: PinBank + ?Sized>(&self, pins: &mut P, byte: u8) -> Result<(), HalError> {
        for bit in 0..8 {
            self.set(pins, Line::DisplayClk, false)?;
            self.set(pins, Line::DisplayDio, (byte >> bit) & 1 == 1)?;
            self.set(pins, Line::DisplayClk, true)?;
        }
        // ack clock
        self.set(pins, Line::DisplayClk, false)?;
        self.set(pins, Line::DisplayDio, true)?;
        self.set(pins, Line::DisplayClk, true)?;
        self.set(pins, Line::DisplayClk, false)
    }
}
