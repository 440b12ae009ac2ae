//! # Console commands for the simulation backend.
//!
//! Line-based override surface read from stdin by the binary:
//!
//! ```text
//! go                 press the go button
//! switch <0..255>    set the switches
//! press <colour>     tap a colour button
//! status             print switch value, LEDs, display and current app
//! help
//! quit
//! ```

use thiserror::Error;

use super::Color;

/// One parsed console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Go,
    Switch(u8),
    Press(Color),
    Status,
    Help,
    Quit,
}

/// Why a console line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCommandError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parses one console line; blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ParseCommandError> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    let cmd = match cmd.to_ascii_lowercase().as_str() {
        "go" | "g" => ConsoleCommand::Go,
        "switch" | "s" => {
            let value = arg
                .and_then(|a| a.parse::<u8>().ok())
                .ok_or(ParseCommandError::Usage("switch <0..255>"))?;
            ConsoleCommand::Switch(value)
        }
        "press" | "p" => {
            let color = arg
                .and_then(|a| a.parse::<Color>().ok())
                .ok_or(ParseCommandError::Usage("press <red|yellow|green|blue>"))?;
            ConsoleCommand::Press(color)
        }
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(ParseCommandError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}
