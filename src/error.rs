//! Error types used by the panel runtime, its handlers and mini-apps.
//!
//! - [`RuntimeError`]: startup/shutdown failures of the runtime itself.
//! - [`HandlerError`]: a bus subscriber failed; the subscription is dropped.
//! - [`AppError`]: a mini-app failed during execution.
//! - [`LaunchError`]: the runner refused or failed to start an execution.
//! - [`ManifestError`] / [`MappingError`]: scan-time validation failures.
//! - [`HalError`]: hardware backend failures.
//! - [`ConfigError`]: configuration could not be loaded.
//!
//! Every enum provides `as_label()`: a short stable snake_case label for logs.

use std::any::Any;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the runtime itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The dispatch loop (or the whole system) was started twice.
    #[error("runtime already started")]
    AlreadyStarted,

    /// Shutdown grace period was exceeded; the dispatch loop did not drain in time.
    #[error("shutdown grace {grace:?} exceeded; dispatch loop abandoned")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
    },

    /// Hardware failed during startup or shutdown.
    #[error(transparent)]
    Hardware(#[from] HalError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use panelvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5) };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Hardware(_) => "runtime_hardware",
        }
    }
}

/// # Errors raised by bus handlers.
///
/// Any error (or panic) from a handler removes that single subscription.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler returned an error.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler panicked while processing an event.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Panicked { .. } => "handler_panicked",
        }
    }
}

/// # Errors raised by mini-app executions.
///
/// Caught at the worker boundary; the execution transitions to `Error` and the
/// summary is published on `system.app.error`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// The app returned an error.
    #[error("{error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The app panicked.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// A hardware call made by the app failed.
    #[error(transparent)]
    Hardware(#[from] HalError),

    /// The execution owning this API has already ended.
    #[error("execution of '{app}' has ended")]
    Closed {
        /// App directory name.
        app: String,
    },
}

impl AppError {
    /// Convenience constructor for [`AppError::Failed`].
    pub fn msg(error: impl std::fmt::Display) -> Self {
        AppError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            AppError::Failed { .. } => "app_failed",
            AppError::Panicked { .. } => "app_panicked",
            AppError::Hardware(_) => "app_hardware",
            AppError::Closed { .. } => "app_closed",
        }
    }

    /// Summarized message suitable for `system.app.error` payloads.
    ///
    /// Long messages are truncated so a faulty app cannot flood the bus.
    pub fn summary(&self) -> String {
        const MAX: usize = 200;
        let full = self.to_string();
        match full.char_indices().nth(MAX) {
            Some((idx, _)) => format!("{}...", &full[..idx]),
            None => full,
        }
    }
}

/// # Errors returned by `AppRunner::launch`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Another execution is not yet back to `Idle`.
    #[error("runner busy with app '{current}'")]
    Busy {
        /// App currently holding the execution slot.
        current: String,
    },

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The worker did not report that it started executing.
    #[error("worker did not start within {0:?}")]
    StartTimeout(Duration),
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::Busy { .. } => "launch_busy",
            LaunchError::Spawn(_) => "launch_spawn",
            LaunchError::StartTimeout(_) => "launch_start_timeout",
        }
    }
}

/// # Manifest validation failures.
///
/// The app is excluded from the switch mapping; startup continues.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// A required field is absent.
    #[error("app '{app}': missing required field '{field}'")]
    Missing {
        /// App directory name.
        app: String,
        /// Offending field.
        field: &'static str,
    },

    /// `timeout_seconds` is zero or negative.
    #[error("app '{app}': field 'timeout_seconds' must be > 0 (got {value})")]
    InvalidTimeout {
        /// App directory name.
        app: String,
        /// Value found in the manifest.
        value: i64,
    },

    /// `timeout_behavior` is not one of the known values.
    #[error("app '{app}': field 'timeout_behavior' has unknown value '{value}'")]
    UnknownTimeoutBehavior {
        /// App directory name.
        app: String,
        /// Value found in the manifest.
        value: String,
    },

    /// `entry_point` does not name a registered mini-app.
    #[error("app '{app}': field 'entry_point' names unregistered app '{entry_point}'")]
    UnknownEntryPoint {
        /// App directory name.
        app: String,
        /// Value found in the manifest.
        entry_point: String,
    },

    /// The manifest is not valid JSON or has wrongly typed / unknown fields.
    #[error("app '{app}': malformed manifest: {reason}")]
    Malformed {
        /// App directory name.
        app: String,
        /// Parser message.
        reason: String,
    },

    /// The manifest file could not be read.
    #[error("app '{app}': cannot read manifest: {reason}")]
    Io {
        /// App directory name.
        app: String,
        /// I/O message.
        reason: String,
    },
}

impl ManifestError {
    /// App directory name the error refers to.
    pub fn app(&self) -> &str {
        match self {
            ManifestError::Missing { app, .. }
            | ManifestError::InvalidTimeout { app, .. }
            | ManifestError::UnknownTimeoutBehavior { app, .. }
            | ManifestError::UnknownEntryPoint { app, .. }
            | ManifestError::Malformed { app, .. }
            | ManifestError::Io { app, .. } => app,
        }
    }

    /// Manifest field the error refers to (`"*"` when not field-specific).
    pub fn field(&self) -> &'static str {
        match self {
            ManifestError::Missing { field, .. } => field,
            ManifestError::InvalidTimeout { .. } => "timeout_seconds",
            ManifestError::UnknownTimeoutBehavior { .. } => "timeout_behavior",
            ManifestError::UnknownEntryPoint { .. } => "entry_point",
            ManifestError::Malformed { .. } | ManifestError::Io { .. } => "*",
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManifestError::Missing { .. } => "manifest_missing_field",
            ManifestError::InvalidTimeout { .. } => "manifest_invalid_timeout",
            ManifestError::UnknownTimeoutBehavior { .. } => "manifest_unknown_timeout_behavior",
            ManifestError::UnknownEntryPoint { .. } => "manifest_unknown_entry_point",
            ManifestError::Malformed { .. } => "manifest_malformed",
            ManifestError::Io { .. } => "manifest_io",
        }
    }
}

/// # Switch-mapping entries that were skipped.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// Key is not an integer.
    #[error("switch key '{key}' is not an integer")]
    NotInteger {
        /// Raw key.
        key: String,
    },

    /// Key is outside 0..=255.
    #[error("switch key '{key}' is outside 0..=255")]
    OutOfRange {
        /// Raw key.
        key: String,
    },

    /// Two keys normalise to the same switch value.
    #[error("switch value {value} is mapped more than once")]
    Duplicate {
        /// Normalised switch value.
        value: u8,
    },

    /// Value is not a string app name.
    #[error("switch value {value} maps to a non-string value")]
    NotAName {
        /// Normalised switch value.
        value: u8,
    },

    /// Mapped app has no valid manifest.
    #[error("switch value {value} maps to unknown or invalid app '{app}'")]
    UnknownApp {
        /// Normalised switch value.
        value: u8,
        /// App name found in the mapping.
        app: String,
    },
}

/// # Hardware backend failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    /// Pin read/write failed.
    #[error("pin {pin}: {reason}")]
    Pin {
        /// Logical pin name.
        pin: String,
        /// Backend message.
        reason: String,
    },

    /// Backend has already been shut down.
    #[error("hardware backend is shut down")]
    ShutDown,

    /// The input poller thread could not be spawned.
    #[error("failed to spawn poller: {0}")]
    Spawn(String),
}

impl HalError {
    /// Convenience constructor for [`HalError::Pin`].
    pub fn pin(pin: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        HalError::Pin {
            pin: pin.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// # Configuration loading failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid.
    #[error("invalid {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// An environment override has an invalid value.
    #[error("environment variable {var} has invalid value '{value}'")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Renders a panic payload caught by `catch_unwind` as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
