//! Built-in demo app: greets, lights every LED and counts colour presses.
//! Red exits; otherwise it runs until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use super::api::AppApi;
use super::app::MiniApp;
use super::stop::StopSignal;
use crate::error::{AppError, HandlerError};
use crate::events::{Event, kinds};
use crate::hal::Color;
use crate::subscribers::HandlerFn;

const POLL: Duration = Duration::from_millis(200);

/// `hello_world` entry point.
#[derive(Debug, Default, Clone, Copy)]
pub struct HelloWorld;

impl HelloWorld {
    pub const ENTRY_POINT: &'static str = "hello_world";
}

fn summary(greeting: &str, counts: &[AtomicU32; 4]) -> String {
    let tally: Vec<String> = Color::ALL
        .iter()
        .map(|c| format!("{c}={}", counts[c.index()].load(Ordering::Relaxed)))
        .collect();
    format!("{greeting} | presses: {} | red exits", tally.join(" "))
}

impl MiniApp for HelloWorld {
    fn run(&self, stop: &StopSignal, api: &AppApi) -> Result<(), AppError> {
        api.info("starting");
        let greeting = api.config_str("greeting", "Hello, panel!").to_string();
        api.display_text(greeting.clone());

        for color in Color::ALL {
            api.set_led(color, true)?;
        }

        let exit = Arc::new(AtomicBool::new(false));
        let counts = Arc::new([0u32; 4].map(AtomicU32::new));
        {
            let exit = Arc::clone(&exit);
            let counts = Arc::clone(&counts);
            let api2 = api.clone();
            api.subscribe(
                kinds::BUTTON_PRESSED,
                HandlerFn::arc("hello_world.buttons", move |ev: &Event| {
                    let Some(color) = ev.get_str("button").and_then(|b| b.parse::<Color>().ok())
                    else {
                        return Ok::<_, HandlerError>(());
                    };
                    counts[color.index()].fetch_add(1, Ordering::Relaxed);
                    if color == Color::Red {
                        exit.store(true, Ordering::Release);
                    } else {
                        api2.display_text(summary(&greeting, &counts));
                    }
                    Ok(())
                }),
                None,
            )?;
        }

        while !exit.load(Ordering::Acquire) {
            if stop.wait(POLL) {
                break;
            }
        }

        for color in Color::ALL {
            if let Err(e) = api.set_led(color, false) {
                api.warn(format_args!("led off failed: {e}"));
            }
        }
        api.info("stopping");
        Ok(())
    }
}
