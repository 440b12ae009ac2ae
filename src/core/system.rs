//! # SystemManager: wires the panel runtime and drives startup and shutdown.
//!
//! ```text
//! start():
//!   subscribe AppLauncher   ◄─ input.go_button.pressed, input.switch.changed,
//!                              system.app.finished, system.app.error
//!   subscribe ScreenRenderer ◄─ output.screen.updated
//!   subscribe shutdown hook  ◄─ system.shutdown.requested
//!   subscribe EventLogger    ◄─ *                      (system.log_events)
//!   EventBus::start          ─► dispatch loop
//!   AppLauncher::start       ─► launch queue
//!   HardwareEventBridge::attach
//!   display = switch value, publish system.started{hardware_type}
//!
//! shutdown(reason):
//!   publish system.shutdown.initiated{reason}
//!   stop launch queue ─► AppRunner::stop()  (extended join window)
//!   cancel dispatch loop ─► drain within shutdown_grace ─┬─ Ok
//!                                                        └─ GraceExceeded
//!   Hardware::shutdown()
//! ```
//!
//! `run_until_shutdown` waits for SIGINT/SIGTERM/SIGQUIT/Ctrl-C or a
//! `system.shutdown.requested` event, whichever comes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::bridge::HardwareEventBridge;
use super::launcher::AppLauncher;
use super::manager::AppManager;
use super::renderer::ScreenRenderer;
use super::runner::AppRunner;
use super::shutdown;
use crate::config::PanelContext;
use crate::error::{HandlerError, RuntimeError};
use crate::events::{Event, EventBus, kinds};
use crate::hal::Hardware;
use crate::subscribers::{EventLogger, HandlerFn};

pub(super) struct Loops {
    pub(super) dispatch: JoinHandle<()>,
    pub(super) launch: JoinHandle<()>,
}

/// Owns every runtime component for the life of the process.
pub struct SystemManager {
    pub(super) ctx: Arc<PanelContext>,
    pub(super) bus: EventBus,
    pub(super) hardware: Arc<dyn Hardware>,
    pub(super) bridge: Arc<HardwareEventBridge>,
    pub(super) manager: Arc<AppManager>,
    pub(super) runner: Arc<AppRunner>,
    pub(super) launcher: Arc<AppLauncher>,

    pub(super) dispatch_token: CancellationToken,
    pub(super) launch_token: CancellationToken,
    /// Cancelled by a `system.shutdown.requested` event.
    pub(super) requested: CancellationToken,
    pub(super) loops: Mutex<Option<Loops>>,
    pub(super) started: AtomicBool,
    pub(super) stopped: AtomicBool,
}

impl SystemManager {
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn hardware(&self) -> &Arc<dyn Hardware> {
        &self.hardware
    }

    pub fn bridge(&self) -> &Arc<HardwareEventBridge> {
        &self.bridge
    }

    pub fn apps(&self) -> &Arc<AppManager> {
        &self.manager
    }

    pub fn runner(&self) -> &Arc<AppRunner> {
        &self.runner
    }

    pub fn context(&self) -> &Arc<PanelContext> {
        &self.ctx
    }

    /// Wires subscriptions and starts the dispatch loop and the launch queue.
    ///
    /// Must be called from within a tokio runtime. A second call fails with
    /// [`RuntimeError::AlreadyStarted`].
    pub fn start(&self) -> Result<(), RuntimeError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::AlreadyStarted);
        }

        for topic in AppLauncher::TOPICS {
            self.bus.subscribe(topic, self.launcher.clone(), None);
        }
        self.bus.subscribe(
            ScreenRenderer::TOPIC,
            ScreenRenderer::new(Arc::clone(&self.hardware)),
            None,
        );
        let requested = self.requested.clone();
        self.bus.subscribe(
            kinds::SHUTDOWN_REQUESTED,
            HandlerFn::arc("shutdown-hook", move |_e: &Event| {
                requested.cancel();
                Ok::<_, HandlerError>(())
            }),
            None,
        );
        if self.ctx.config.system.log_events {
            self.bus.subscribe("*", Arc::new(EventLogger), None);
        }

        let dispatch = self.bus.start(self.dispatch_token.clone())?;
        let launch = self.launcher.start(self.launch_token.clone())?;
        *self.loops.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Loops { dispatch, launch });

        self.bridge.attach();

        let value = self.hardware.switch_value();
        match self.hardware.show_number(Some(u16::from(value))) {
            Ok(()) => self
                .bus
                .publish(kinds::DISPLAY_UPDATED, json!({"value": value})),
            Err(e) => warn!(error = %e, "initial display update failed"),
        }

        let hardware_type = self.hardware.kind().as_str();
        self.bus
            .publish(kinds::SYSTEM_STARTED, json!({"hardware_type": hardware_type}));
        info!(
            hardware_type,
            switch_value = value,
            apps = self.manager.app_names().len(),
            mapped = self.manager.mappings().len(),
            "panel started"
        );
        Ok(())
    }

    /// Asks the running system to shut down through the bus.
    pub fn request_shutdown(&self, reason: &str) {
        self.bus
            .publish_threadsafe(kinds::SHUTDOWN_REQUESTED, json!({"reason": reason}));
    }

    /// Stops the current app, drains the dispatch loop and releases the hardware.
    ///
    /// Idempotent. Returns [`RuntimeError::GraceExceeded`] if the dispatch loop
    /// did not drain within `shutdown_grace`; the hardware is released either way.
    pub async fn shutdown(&self, reason: &str) -> Result<(), RuntimeError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(reason, "shutdown initiated");
        self.bus
            .publish(kinds::SHUTDOWN_INITIATED, json!({"reason": reason}));

        let grace = self.ctx.config.system.shutdown_grace();
        let mut loops = self
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        self.launch_token.cancel();
        if let Some(l) = loops.as_mut() {
            if time::timeout(grace, &mut l.launch).await.is_err() {
                warn!(grace = ?grace, "launch queue did not stop in time");
            }
        }

        if !self.runner.stop().await {
            warn!(app = ?self.runner.current_app(), "app did not stop before shutdown");
        }

        self.dispatch_token.cancel();
        let drained = match loops {
            Some(Loops { dispatch, .. }) => time::timeout(grace, dispatch).await.is_ok(),
            None => true,
        };

        self.hardware.shutdown();
        if drained {
            info!("shutdown complete");
            Ok(())
        } else {
            warn!(grace = ?grace, "dispatch loop did not drain in time");
            Err(RuntimeError::GraceExceeded { grace })
        }
    }

    /// Starts the system, waits for a termination signal or a
    /// `system.shutdown.requested` event, then shuts down.
    pub async fn run_until_shutdown(&self) -> Result<(), RuntimeError> {
        if !self.started.load(Ordering::Acquire) {
            self.start()?;
        }

        let reason = tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => match res {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(error = %e, "signal handlers unavailable; waiting for shutdown request");
                    self.requested.cancelled().await;
                    "requested"
                }
            },
            _ = self.requested.cancelled() => "requested",
        };
        self.shutdown(reason).await
    }
}
