//! # Go-button launcher.
//!
//! [`AppLauncher`] is a bus [`Handler`] subscribed to the go button, the switch
//! and the app terminal events. Launches are handed to a single launch queue so
//! the dispatch loop never waits on a pre-emption.
//!
//! ```text
//! input.go_button.pressed
//!   ├─ switch_value = hardware.switch_value()          (read exactly once)
//!   ├─ publish system.app.launch.requested{switch_value}
//!   ├─ manager.resolve(switch_value)
//!   │     ├─ None ─► screen "No app mapped to switch N"; done
//!   │     └─ Some(app) ─► launch queue
//!   └─ launch queue (one request at a time, newest pending request wins):
//!         runner.stop()  (pre-empt, extended join window)
//!         screen "Launching <name>...", display = switch_value
//!         runner.launch(..) ─► Running ─► publish system.app.started{app_name, switch_value}
//!
//! system.app.finished | system.app.error  ─► no newer app active? clear screen, display = switch
//! input.switch.changed                    ─► no app active? display = new_value
//! ```
//!
//! The handler itself never fails, so its subscriptions are never removed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::bridge::HardwareEventBridge;
use super::manager::{AppManager, AppSummary};
use super::runner::AppRunner;
use crate::apps::{ApiParts, AppApi, AppRegistry};
use crate::config::PanelContext;
use crate::error::{HandlerError, RuntimeError};
use crate::events::{Event, EventBus, kinds};
use crate::hal::{Hardware, ScreenContent};
use crate::subscribers::Handler;

/// A resolved go-press waiting for the launch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LaunchRequest {
    switch_value: u8,
    app: String,
}

/// Everything the launch queue needs.
struct Shared {
    bus: EventBus,
    bridge: Arc<HardwareEventBridge>,
    manager: Arc<AppManager>,
    registry: AppRegistry,
    runner: Arc<AppRunner>,
    ctx: Arc<PanelContext>,
    summaries: Arc<Vec<AppSummary>>,
}

/// Go-button handler plus the launch queue behind it.
pub struct AppLauncher {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<LaunchRequest>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<LaunchRequest>>>,
}

impl AppLauncher {
    pub fn new(
        bus: EventBus,
        bridge: Arc<HardwareEventBridge>,
        manager: Arc<AppManager>,
        registry: AppRegistry,
        runner: Arc<AppRunner>,
        ctx: Arc<PanelContext>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let summaries = Arc::new(manager.summaries());
        Arc::new(Self {
            shared: Arc::new(Shared {
                bus,
                bridge,
                manager,
                registry,
                runner,
                ctx,
                summaries,
            }),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    /// Event types this handler must be subscribed to.
    pub const TOPICS: [&'static str; 4] = [
        kinds::GO_BUTTON_PRESSED,
        kinds::SWITCH_CHANGED,
        kinds::APP_FINISHED,
        kinds::APP_ERROR,
    ];

    /// Spawns the launch queue. A second call fails with [`RuntimeError::AlreadyStarted`].
    pub fn start(&self, token: CancellationToken) -> Result<JoinHandle<()>, RuntimeError> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RuntimeError::AlreadyStarted)?;
        let shared = Arc::clone(&self.shared);
        Ok(tokio::spawn(launch_queue(shared, rx, token)))
    }

    fn hardware(&self) -> &Arc<dyn Hardware> {
        self.shared.bridge.hardware()
    }

    fn on_go(&self) {
        let switch_value = self.hardware().switch_value();
        self.shared.bus.publish(
            kinds::APP_LAUNCH_REQUESTED,
            json!({"switch_value": switch_value}),
        );

        let Some(app) = self.shared.manager.resolve(switch_value) else {
            info!(switch_value, "go pressed; no app mapped");
            self.shared.screen(ScreenContent::Text(format!(
                "No app mapped to switch {switch_value}"
            )));
            return;
        };
        debug!(switch_value, app, "go pressed; launch queued");
        let req = LaunchRequest {
            switch_value,
            app: app.to_string(),
        };
        if self.tx.send(req).is_err() {
            warn!(switch_value, "launch queue closed; go press ignored");
        }
    }

    fn on_app_ended(&self) {
        if self.shared.runner.is_active() {
            return;
        }
        self.shared.screen(ScreenContent::Clear);
        let value = self.hardware().switch_value();
        self.shared.show_number(Some(u16::from(value)));
    }

    fn on_switch(&self, event: &Event) {
        if self.shared.runner.is_active() {
            return;
        }
        let Some(value) = event.get_u64("new_value").and_then(|v| u16::try_from(v).ok()) else {
            return;
        };
        self.shared.show_number(Some(value));
    }
}

#[async_trait]
impl Handler for AppLauncher {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match event.event_type() {
            kinds::GO_BUTTON_PRESSED => self.on_go(),
            kinds::SWITCH_CHANGED => self.on_switch(event),
            kinds::APP_FINISHED | kinds::APP_ERROR => self.on_app_ended(),
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "app-launcher"
    }
}

async fn launch_queue(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<LaunchRequest>,
    token: CancellationToken,
) {
    loop {
        let mut req = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };
        while let Ok(newer) = rx.try_recv() {
            debug!(superseded = %req.app, by = %newer.app, "launch request superseded");
            req = newer;
        }
        shared.launch(req).await;
    }
    debug!("launch queue stopped");
}

impl Shared {
    fn screen(&self, content: ScreenContent) {
        self.bus.publish(
            kinds::SCREEN_UPDATED,
            json!({"content_type": content.content_type(), "content": content.content()}),
        );
    }

    fn show_number(&self, value: Option<u16>) {
        if let Err(e) = self.bridge.hardware().show_number(value) {
            warn!(error = %e, "display update failed");
            return;
        }
        self.bus.publish(kinds::DISPLAY_UPDATED, json!({"value": value}));
    }

    async fn launch(&self, req: LaunchRequest) {
        let LaunchRequest { switch_value, app } = req;
        let (Some(manifest), Some(app_dir)) = (
            self.manager.manifest(&app),
            self.manager.app_dir(&app).map(PathBuf::from),
        ) else {
            error!(app = %app, "mapped app has no manifest");
            return;
        };
        let Some(entry) = self.registry.get(&manifest.entry_point) else {
            error!(app = %app, entry_point = %manifest.entry_point, "entry point not registered");
            return;
        };

        if !self.runner.is_idle() {
            info!(app = %app, current = ?self.runner.current_app(), "pre-empting running app");
            if !self.runner.stop().await {
                warn!(app = %app, "previous app still winding down");
            }
        }

        self.screen(ScreenContent::Text(format!("Launching {}...", manifest.name)));
        self.show_number(Some(u16::from(switch_value)));

        let api = AppApi::new(ApiParts {
            app: app.clone(),
            manifest: Arc::clone(&manifest),
            app_dir,
            bus: self.bus.clone(),
            bridge: Arc::clone(&self.bridge),
            ctx: Arc::clone(&self.ctx),
            summaries: Arc::clone(&self.summaries),
        });

        let bus = self.bus.clone();
        let started_name = app.clone();
        let res = self
            .runner
            .launch(&app, entry, &manifest, api, move || {
                bus.publish_threadsafe(
                    kinds::APP_STARTED,
                    json!({"app_name": started_name, "switch_value": switch_value}),
                );
            })
            .await;

        if let Err(e) = res {
            error!(app = %app, switch_value, label = e.as_label(), error = %e, "launch failed");
            self.screen(ScreenContent::Text(format!(
                "Failed to launch {}: {e}",
                manifest.name
            )));
        }
    }
}
