//! # GPIO backend.
//!
//! [`GpioHardware`] drives the physical panel through a [`PinBank`]:
//!
//! - one poller thread ticks every 10 ms, samples the colour and go buttons
//!   (active low, lockout debounce) and scans the switch multiplexer every
//!   `switch_poll_ms` (about 20 Hz);
//! - LEDs are direct writes;
//! - the numeric display is a TM1637 ([`Tm1637`]).
//!
//! Input is reported through the attached sink from the poller thread, outside
//! the pin lock. A pin error makes the poller log a warning and back off for a
//! second; it never stops the thread.
//!
//! [`SysfsPinBank`] (feature `gpio`) maps the logical lines onto Linux sysfs pins.

mod debounce;
mod mux;
#[cfg(feature = "gpio")]
mod sysfs;
mod tm1637;

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub use debounce::{Debouncer, Edge};
pub use mux::MuxScanner;
#[cfg(feature = "gpio")]
pub use sysfs::SysfsPinBank;
pub use tm1637::{DIGITS, Tm1637, encode};

use super::{Color, Hardware, HardwareKind, InputSink, OutputSurface, RawInput, Speaker};
use crate::config::HardwareConfig;
use crate::error::HalError;

const TICK: Duration = Duration::from_millis(10);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Logical panel line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    /// Multiplexer select line S0..S2.
    MuxSelect(u8),
    /// Shared multiplexer output (active low).
    MuxData,
    /// Colour button input (active low).
    Button(Color),
    /// Go button input (active low).
    GoButton,
    Led(Color),
    DisplayClk,
    DisplayDio,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::MuxSelect(i) => write!(f, "mux-s{i}"),
            Line::MuxData => f.write_str("mux-data"),
            Line::Button(c) => write!(f, "button-{c}"),
            Line::GoButton => f.write_str("go-button"),
            Line::Led(c) => write!(f, "led-{c}"),
            Line::DisplayClk => f.write_str("display-clk"),
            Line::DisplayDio => f.write_str("display-dio"),
        }
    }
}

/// Digital I/O for the panel's logical lines.
pub trait PinBank: Send + 'static {
    /// Reads an input line; `true` is electrically high.
    fn read(&mut self, line: Line) -> Result<bool, HalError>;

    /// Drives an output line.
    fn write(&mut self, line: Line, high: bool) -> Result<(), HalError>;

    /// Releases the pins. Called once on shutdown.
    fn release(&mut self) {}
}

struct DisplayState {
    tm: Tm1637,
    value: Option<u16>,
}

struct Shared<P: PinBank> {
    pins: Mutex<P>,
    cfg: HardwareConfig,
    running: AtomicBool,
    switch: AtomicU8,
    leds: Mutex<[bool; 4]>,
    display: Mutex<DisplayState>,
    sink: RwLock<Option<InputSink>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: PinBank> Shared<P> {
    fn emit(&self, input: RawInput) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink(input);
        }
    }

    fn poll_loop(&self, initial: u8) {
        let mut mux = MuxScanner::new(self.cfg.mux_settle(), initial);
        let mut buttons = Color::ALL.map(|_| Debouncer::new(self.cfg.button_debounce()));
        let mut go = Debouncer::new(self.cfg.go_debounce());
        let mut next_scan = Instant::now();
        let mut inputs = Vec::with_capacity(8);

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            let res = self.sample(&mut mux, &mut buttons, &mut go, now, &mut next_scan, &mut inputs);
            for input in inputs.drain(..) {
                self.emit(input);
            }
            match res {
                Ok(()) => std::thread::sleep(TICK),
                Err(e) => {
                    warn!(error = %e, "input poll failed; backing off");
                    std::thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        debug!("input poller stopped");
    }

    fn sample(
        &self,
        mux: &mut MuxScanner,
        buttons: &mut [Debouncer; 4],
        go: &mut Debouncer,
        now: Instant,
        next_scan: &mut Instant,
        out: &mut Vec<RawInput>,
    ) -> Result<(), HalError> {
        let mut pins = lock(&self.pins);
        for color in Color::ALL {
            let pressed = !pins.read(Line::Button(color))?;
            match buttons[color.index()].sample(pressed, now) {
                Some(Edge::Pressed) => out.push(RawInput::ButtonPressed(color)),
                Some(Edge::Released) => out.push(RawInput::ButtonReleased(color)),
                None => {}
            }
        }
        if go.sample(!pins.read(Line::GoButton)?, now) == Some(Edge::Pressed) {
            out.push(RawInput::GoPressed);
        }
        if now >= *next_scan {
            *next_scan = now + self.cfg.switch_poll();
            if let Some((old, new)) = mux.scan(&mut *pins)? {
                self.switch.store(new, Ordering::Release);
                out.push(RawInput::SwitchChanged { old, new });
            }
        }
        Ok(())
    }
}

/// Physical panel backend.
pub struct GpioHardware<P: PinBank> {
    shared: Arc<Shared<P>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    surface: OutputSurface,
    speaker: Speaker,
}

impl<P: PinBank> GpioHardware<P> {
    /// Initialises outputs, reads the initial switch value and starts the poller.
    ///
    /// The initial switch value is primed without a change event.
    pub fn start(mut pins: P, cfg: HardwareConfig) -> Result<Arc<Self>, HalError> {
        for color in Color::ALL {
            pins.write(Line::Led(color), false)?;
        }
        let tm = Tm1637::new(cfg.display_brightness, cfg.display_bit_delay());
        tm.show(&mut pins, None)?;
        let initial = MuxScanner::new(cfg.mux_settle(), 0).read_value(&mut pins)?;

        let shared = Arc::new(Shared {
            pins: Mutex::new(pins),
            cfg,
            running: AtomicBool::new(true),
            switch: AtomicU8::new(initial),
            leds: Mutex::new([false; 4]),
            display: Mutex::new(DisplayState { tm, value: None }),
            sink: RwLock::new(None),
        });

        let worker = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("panel-poller".into())
            .spawn(move || worker.poll_loop(initial))
            .map_err(|e| HalError::Spawn(e.to_string()))?;

        info!(switch_value = initial, "gpio backend started");
        Ok(Arc::new(Self {
            shared,
            poller: Mutex::new(Some(handle)),
            surface: OutputSurface::new(),
            speaker: Speaker::new(),
        }))
    }

    fn stop_poller(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = lock(&self.poller).take() {
            if handle.join().is_err() {
                warn!("input poller panicked");
            }
        }
    }

    fn ensure_running(&self) -> Result<(), HalError> {
        if self.shared.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(HalError::ShutDown)
        }
    }
}

impl<P: PinBank> Hardware for GpioHardware<P> {
    fn kind(&self) -> HardwareKind {
        HardwareKind::Gpio
    }

    fn attach(&self, sink: InputSink) {
        *self
            .shared
            .sink
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn switch_value(&self) -> u8 {
        self.shared.switch.load(Ordering::Acquire)
    }

    fn set_led(&self, color: Color, on: bool) -> Result<(), HalError> {
        self.ensure_running()?;
        let mut leds = lock(&self.shared.leds);
        lock(&self.shared.pins).write(Line::Led(color), on)?;
        leds[color.index()] = on;
        Ok(())
    }

    fn led(&self, color: Color) -> bool {
        lock(&self.shared.leds)[color.index()]
    }

    fn show_number(&self, value: Option<u16>) -> Result<(), HalError> {
        self.ensure_running()?;
        let value = value.map(|v| v.min(9999));
        let mut display = lock(&self.shared.display);
        display.tm.show(&mut *lock(&self.shared.pins), value)?;
        display.value = value;
        Ok(())
    }

    fn display_value(&self) -> Option<u16> {
        lock(&self.shared.display).value
    }

    fn set_brightness(&self, level: u8) -> Result<(), HalError> {
        self.ensure_running()?;
        let mut display = lock(&self.shared.display);
        display.tm.set_brightness(level);
        let value = display.value;
        display.tm.show(&mut *lock(&self.shared.pins), value)
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
        if !self.shared.running.load(Ordering::Acquire) {
            return;
        }
        self.stop_poller();
        self.speaker.stop();

        let mut leds = lock(&self.shared.leds);
        let mut display = lock(&self.shared.display);
        let mut pins = lock(&self.shared.pins);
        for color in Color::ALL {
            if let Err(e) = pins.write(Line::Led(color), false) {
                warn!(error = %e, "failed to turn off led on shutdown");
            }
        }
        *leds = [false; 4];
        if let Err(e) = display.tm.show(&mut *pins, None) {
            warn!(error = %e, "failed to blank display on shutdown");
        }
        display.value = None;
        pins.release();
        info!("gpio backend shut down");
    }
}

impl<P: PinBank> Drop for GpioHardware<P> {
    fn drop(&mut self) {
        self.stop_poller();
    }
}
