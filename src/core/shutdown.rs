//! # Termination signals.
//!
//! [`wait_for_shutdown_signal`] completes with the name of the first termination
//! signal received; the name becomes the `reason` of `system.shutdown.initiated`.
//!
//! - Unix: `SIGINT`, `SIGTERM`, `SIGQUIT` (and Ctrl-C through tokio).
//! - Elsewhere: Ctrl-C only.

/// Waits for SIGINT, SIGTERM or SIGQUIT.
///
/// Listeners are registered per call; `Err` if registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl_c")
}
