//! # Scoped API handed to mini-apps.
//!
//! [`AppApi`] is the capability-limited facade a mini-app sees:
//!
//! - **screen**: `display_text` / `display_markdown` / `display_html` / `display_image` /
//!   `clear_screen` publish `output.screen.updated`; the renderer on the dispatch
//!   loop applies them, so the app thread never touches the surface;
//! - **LEDs**: `set_led` through the event bridge (the single LED writer);
//! - **bus**: `subscribe` / `unsubscribe` / `publish_threadsafe`; every subscription
//!   made here is removed when the execution ends;
//! - **lifetime**: once the execution ends the API is closed. Subscribing and LED
//!   writes fail with [`AppError::Closed`]; screen updates and publishes are dropped;
//! - **config**: merged manifest config + overrides, secrets, dev-mode flag, app list;
//! - **assets and sound**: paths inside the app directory, speaker;
//! - **logging**: records carry an `app` field.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use super::manifest::AppManifest;
use crate::config::PanelContext;
use crate::core::{AppSummary, HardwareEventBridge};
use crate::error::AppError;
use crate::events::{EventBus, Payload, kinds};
use crate::hal::{Color, ScreenContent};
use crate::subscribers::{HandlerRef, SubscriptionId};

/// Everything needed to build an [`AppApi`].
pub struct ApiParts {
    /// App directory name.
    pub app: String,
    pub manifest: Arc<AppManifest>,
    pub app_dir: PathBuf,
    pub bus: EventBus,
    pub bridge: Arc<HardwareEventBridge>,
    pub ctx: Arc<PanelContext>,
    pub summaries: Arc<Vec<AppSummary>>,
}

struct Inner {
    parts: ApiParts,
    config: Map<String, Value>,
    subs: Mutex<Vec<SubscriptionId>>,
    closed: AtomicBool,
}

/// Capability-scoped facade for one execution. Cheap to clone.
#[derive(Clone)]
pub struct AppApi {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AppApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppApi")
            .field("app", &self.inner.parts.app)
            .finish_non_exhaustive()
    }
}

impl AppApi {
    pub fn new(parts: ApiParts) -> Self {
        let config = parts
            .ctx
            .overrides
            .merged(&parts.app, &parts.manifest.config);
        Self {
            inner: Arc::new(Inner {
                parts,
                config,
                subs: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn subs(&self) -> MutexGuard<'_, Vec<SubscriptionId>> {
        self.inner
            .subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` once the execution owning this API has ended.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn closed_error(&self) -> AppError {
        AppError::Closed {
            app: self.inner.parts.app.clone(),
        }
    }

    /// App directory name.
    pub fn app_name(&self) -> &str {
        &self.inner.parts.app
    }

    pub fn manifest(&self) -> &AppManifest {
        &self.inner.parts.manifest
    }

    // ---- screen ----

    /// Publishes content for the output surface.
    pub fn render(&self, content: ScreenContent) {
        if self.is_closed() {
            debug!(app = %self.inner.parts.app, "screen update after close dropped");
            return;
        }
        self.inner.parts.bus.publish_threadsafe(
            kinds::SCREEN_UPDATED,
            json!({"content_type": content.content_type(), "content": content.content()}),
        );
    }

    pub fn display_text(&self, text: impl Into<String>) {
        self.render(ScreenContent::Text(text.into()));
    }

    pub fn display_markdown(&self, markdown: impl Into<String>) {
        self.render(ScreenContent::Markdown(markdown.into()));
    }

    pub fn display_html(&self, html: impl Into<String>) {
        self.render(ScreenContent::Html(html.into()));
    }

    /// Shows an image; relative paths resolve inside the app directory.
    pub fn display_image(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let resolved = if path.is_relative() {
            self.inner.parts.app_dir.join(path)
        } else {
            path.to_path_buf()
        };
        self.render(ScreenContent::Image(resolved));
    }

    pub fn clear_screen(&self) {
        self.render(ScreenContent::Clear);
    }

    // ---- LEDs ----

    pub fn set_led(&self, color: Color, on: bool) -> Result<(), AppError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.inner.parts.bridge.set_led(color, on)?;
        Ok(())
    }

    pub fn led(&self, color: Color) -> bool {
        self.inner.parts.bridge.led(color)
    }

    // ---- bus ----

    /// Subscribes for the lifetime of this execution.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: HandlerRef,
        filter: Option<Payload>,
    ) -> Result<SubscriptionId, AppError> {
        let mut subs = self.subs();
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let id = self.inner.parts.bus.subscribe(pattern, handler, filter);
        subs.push(id);
        Ok(id)
    }

    /// Removes a subscription made through this API. Foreign ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subs();
        let Some(pos) = subs.iter().position(|s| *s == id) else {
            return false;
        };
        subs.swap_remove(pos);
        self.inner.parts.bus.unsubscribe(id)
    }

    pub fn publish_threadsafe(&self, event_type: &str, payload: Value) {
        if self.is_closed() {
            debug!(app = %self.inner.parts.app, event_type, "publish after close dropped");
            return;
        }
        self.inner.parts.bus.publish_threadsafe(event_type, payload);
    }

    /// Closes the API and removes every subscription this execution still holds.
    pub(crate) fn cleanup(&self) -> usize {
        let ids = {
            let mut subs = self.subs();
            self.inner.closed.store(true, Ordering::Release);
            std::mem::take(&mut *subs)
        };
        let removed = ids
            .into_iter()
            .filter(|id| self.inner.parts.bus.unsubscribe(*id))
            .count();
        if removed > 0 {
            debug!(app = %self.inner.parts.app, removed, "app subscriptions removed");
        }
        removed
    }

    // ---- config ----

    /// Manifest `config` with admin overrides applied.
    pub fn config(&self) -> &Map<String, Value> {
        &self.inner.config
    }

    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.inner.config.get(key)
    }

    /// String config value or `default`.
    pub fn config_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.config_value(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    pub fn secret(&self, key: &str) -> Option<&str> {
        self.inner.parts.ctx.secrets.get(key)
    }

    pub fn is_dev_mode(&self) -> bool {
        self.inner.parts.ctx.config.system.dev_mode
    }

    /// Mapped apps, sorted by switch value.
    pub fn app_summaries(&self) -> &[AppSummary] {
        &self.inner.parts.summaries
    }

    // ---- files and sound ----

    pub fn app_dir(&self) -> &Path {
        &self.inner.parts.app_dir
    }

    /// `<app_dir>/assets/<name>`.
    pub fn asset_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.inner.parts.app_dir.join("assets").join(name)
    }

    /// Plays a sound; relative paths resolve inside the assets directory.
    pub fn play_sound(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let path = path.as_ref();
        let resolved = if path.is_relative() {
            self.asset_path(path)
        } else {
            path.to_path_buf()
        };
        self.inner.parts.bridge.hardware().play_sound(&resolved)?;
        Ok(())
    }

    pub fn stop_sound(&self) {
        self.inner.parts.bridge.hardware().stop_sound();
    }

    // ---- logging ----

    pub fn debug(&self, msg: impl std::fmt::Display) {
        debug!(app = %self.inner.parts.app, "{msg}");
    }

    pub fn info(&self, msg: impl std::fmt::Display) {
        info!(app = %self.inner.parts.app, "{msg}");
    }

    pub fn warn(&self, msg: impl std::fmt::Display) {
        warn!(app = %self.inner.parts.app, "{msg}");
    }

    pub fn error(&self, msg: impl std::fmt::Display) {
        error!(app = %self.inner.parts.app, "{msg}");
    }
}
