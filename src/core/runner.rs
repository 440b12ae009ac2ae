//! # Single-slot mini-app runner.
//!
//! [`AppRunner`] owns the one "current execution" slot. Each execution runs on its
//! own OS thread; an async supervise task watches it for completion, the deadline
//! and stop requests.
//!
//! ```text
//! Idle ──launch()──► Launching ──worker started──► Running ──┬─ returned Ok ───► Finished
//!  ▲                                                          ├─ returned Err ──► Error
//!  │                                                          ├─ panicked ──────► Error
//!  │                                                          ├─ deadline ──────► TimedOut
//!  │                                                          └─ stop() ────────► Finished (stopped)
//!  └────────── cleanup: app subscriptions removed, LEDs off, finished/error published ──┘
//! ```
//!
//! ## Rules
//! - `launch` is rejected with [`LaunchError::Busy`] unless the slot is Idle.
//! - The deadline is armed when the execution enters Launching. On expiry the stop
//!   signal is set and the worker gets `stop_grace` to exit.
//! - `stop` sets the stop signal and waits at most `preempt_join` for Idle. A worker
//!   still alive after its window is abandoned with a warning, never killed.
//! - Exactly one terminal event is published per execution:
//!   `system.app.finished{app_name, reason}` or `system.app.error{app_name, error}`.
//! - The terminal event is queued before the slot returns to Idle, so `stop`
//!   returns only after that event is on the bus.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::bridge::HardwareEventBridge;
use crate::apps::{AppApi, AppManifest, AppRef, StopSignal};
use crate::config::SystemConfig;
use crate::error::{AppError, LaunchError, panic_message};
use crate::events::{EventBus, kinds};

/// Extra wait granted to `stop` on top of the join window, covering cleanup.
const STOP_SLACK: Duration = Duration::from_millis(500);

/// Timeouts beyond this (about 30 years) arm no deadline.
const MAX_DEADLINE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Lifecycle state of the execution slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerStatus {
    Idle,
    Launching,
    Running,
    Finished,
    Error,
    TimedOut,
}

impl RunnerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerStatus::Idle => "idle",
            RunnerStatus::Launching => "launching",
            RunnerStatus::Running => "running",
            RunnerStatus::Finished => "finished",
            RunnerStatus::Error => "error",
            RunnerStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `reason` of `system.app.finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The app returned on its own.
    Normal,
    /// The app returned (or was abandoned) after a stop request.
    Stopped,
    /// The deadline expired.
    Timeout,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Normal => "normal",
            FinishReason::Stopped => "stopped",
            FinishReason::Timeout => "timeout",
        }
    }
}

/// Timing knobs of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Grace period after a deadline expires.
    pub stop_grace: Duration,
    /// Join window after a pre-emption; never shorter than `stop_grace`.
    pub preempt_join: Duration,
    /// Maximum wait for the worker thread to start.
    pub start_timeout: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

impl RunnerSettings {
    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self {
            stop_grace: cfg.stop_grace(),
            preempt_join: cfg.preempt_join(),
            start_timeout: cfg.start_timeout(),
        }
    }
}

#[derive(Default)]
struct Slot {
    app: Option<String>,
    stop: Option<StopSignal>,
    started_at: Option<Instant>,
}

/// How the supervise task saw the execution end.
enum Outcome {
    Returned(Result<(), AppError>),
    Deadline,
    StopRequested,
}

type Done = oneshot::Receiver<Result<(), AppError>>;

/// Owns the current execution.
pub struct AppRunner {
    bus: EventBus,
    bridge: Arc<HardwareEventBridge>,
    settings: RunnerSettings,
    slot: Mutex<Slot>,
    status: watch::Sender<RunnerStatus>,
}

impl AppRunner {
    pub fn new(
        bus: EventBus,
        bridge: Arc<HardwareEventBridge>,
        settings: RunnerSettings,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(RunnerStatus::Idle);
        Arc::new(Self {
            bus,
            bridge,
            settings,
            slot: Mutex::new(Slot::default()),
            status,
        })
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: RunnerStatus) {
        let prev = self.status.send_replace(status);
        if prev != status {
            debug!(from = %prev, to = %status, "runner status");
        }
    }

    pub fn status(&self) -> RunnerStatus {
        *self.status.borrow()
    }

    /// Watches status transitions.
    pub fn watch_status(&self) -> watch::Receiver<RunnerStatus> {
        self.status.subscribe()
    }

    pub fn is_idle(&self) -> bool {
        self.status() == RunnerStatus::Idle
    }

    /// True while an execution is launching or running (not yet terminal).
    pub fn is_active(&self) -> bool {
        matches!(self.status(), RunnerStatus::Launching | RunnerStatus::Running)
    }

    /// App directory name of the current execution.
    pub fn current_app(&self) -> Option<String> {
        self.slot().app.clone()
    }

    /// Time since the current execution entered Running.
    pub fn uptime(&self) -> Option<Duration> {
        self.slot().started_at.map(|t| t.elapsed())
    }

    pub fn settings(&self) -> RunnerSettings {
        self.settings
    }

    /// Starts `app` in the slot.
    ///
    /// Returns once the worker thread is executing and the slot is Running;
    /// `on_running` is called right after that transition, before any terminal
    /// event of this execution can be published.
    pub async fn launch<F>(
        self: &Arc<Self>,
        name: &str,
        app: AppRef,
        manifest: &AppManifest,
        api: AppApi,
        on_running: F,
    ) -> Result<(), LaunchError>
    where
        F: FnOnce() + Send,
    {
        let stop = StopSignal::new();
        {
            let mut slot = self.slot();
            let current = self.status();
            if current != RunnerStatus::Idle {
                let current = slot.app.clone().unwrap_or_else(|| current.to_string());
                return Err(LaunchError::Busy { current });
            }
            slot.app = Some(name.to_string());
            slot.stop = Some(stop.clone());
            slot.started_at = None;
            self.set_status(RunnerStatus::Launching);
        }
        let deadline = manifest
            .deadline()
            .filter(|d| *d <= MAX_DEADLINE)
            .and_then(|d| Instant::now().checked_add(d));

        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<Result<(), AppError>>();
        let worker_stop = stop.clone();
        let worker_api = api.clone();
        let spawned = thread::Builder::new()
            .name(format!("app-{name}"))
            .spawn(move || {
                let _ = started_tx.send(());
                let res = catch_unwind(AssertUnwindSafe(|| app.run(&worker_stop, &worker_api)))
                    .unwrap_or_else(|p| {
                        Err(AppError::Panicked {
                            info: panic_message(&*p),
                        })
                    });
                let _ = done_tx.send(res);
            });

        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(app = %name, error = %e, "failed to spawn app worker");
                api.cleanup();
                self.reset();
                return Err(LaunchError::Spawn(e));
            }
        };

        if !matches!(
            time::timeout(self.settings.start_timeout, started_rx).await,
            Ok(Ok(()))
        ) {
            stop.set();
            warn!(app = %name, timeout = ?self.settings.start_timeout, "app worker did not start; abandoned");
            drop(worker);
            self.finish(name, &api, RunnerStatus::Error, Err("worker did not start".into()));
            return Err(LaunchError::StartTimeout(self.settings.start_timeout));
        }

        self.slot().started_at = Some(Instant::now());
        self.set_status(RunnerStatus::Running);
        info!(
            app = %name,
            timeout = ?manifest.timeout(),
            behavior = manifest.timeout_behavior.as_str(),
            "app running"
        );
        on_running();

        let runner = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            runner
                .supervise(name, stop, deadline, done_rx, worker, api)
                .await;
        });
        Ok(())
    }

    async fn supervise(
        &self,
        name: String,
        stop: StopSignal,
        deadline: Option<Instant>,
        mut done: Done,
        worker: thread::JoinHandle<()>,
        api: AppApi,
    ) {
        let outcome = {
            let timer = async {
                match deadline {
                    Some(at) => time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(timer);
            tokio::select! {
                biased;
                res = &mut done => Outcome::Returned(res.unwrap_or_else(|_| Err(AppError::msg("worker vanished")))),
                _ = stop.cancelled() => Outcome::StopRequested,
                _ = &mut timer => Outcome::Deadline,
            }
        };

        let (status, result, exited) = match outcome {
            Outcome::Returned(Ok(())) => {
                let reason = if stop.is_set() {
                    FinishReason::Stopped
                } else {
                    FinishReason::Normal
                };
                (RunnerStatus::Finished, Ok(reason), true)
            }
            Outcome::Returned(Err(e)) => (RunnerStatus::Error, Err(e.summary()), true),
            Outcome::Deadline => {
                stop.set();
                self.set_status(RunnerStatus::TimedOut);
                warn!(app = %name, grace = ?self.settings.stop_grace, "app timed out; stop signalled");
                let exited = wait_exit(&mut done, self.settings.stop_grace).await.is_some();
                (RunnerStatus::TimedOut, Ok(FinishReason::Timeout), exited)
            }
            Outcome::StopRequested => {
                match wait_exit(&mut done, self.settings.preempt_join).await {
                    Some(Err(e)) => (RunnerStatus::Error, Err(e.summary()), true),
                    Some(Ok(())) => (RunnerStatus::Finished, Ok(FinishReason::Stopped), true),
                    None => (RunnerStatus::Finished, Ok(FinishReason::Stopped), false),
                }
            }
        };

        if exited {
            let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        } else {
            warn!(app = %name, "app worker ignored stop signal; thread leaked");
            drop(worker);
        }
        self.finish(&name, &api, status, result);
    }

    /// Terminal transition plus cleanup back to Idle.
    fn finish(
        &self,
        name: &str,
        api: &AppApi,
        status: RunnerStatus,
        result: Result<FinishReason, String>,
    ) {
        self.set_status(status);
        api.cleanup();
        self.bridge.clear_leds();

        match result {
            Ok(reason) => {
                info!(app = %name, reason = reason.as_str(), "app finished");
                self.bus.publish_threadsafe(
                    kinds::APP_FINISHED,
                    json!({"app_name": name, "reason": reason.as_str()}),
                );
            }
            Err(error) => {
                error!(app = %name, error = %error, "app failed");
                self.bus.publish_threadsafe(
                    kinds::APP_ERROR,
                    json!({"app_name": name, "error": error}),
                );
            }
        }
        self.reset();
    }

    fn reset(&self) {
        let mut slot = self.slot();
        *slot = Slot::default();
        self.set_status(RunnerStatus::Idle);
    }

    /// Signals the current execution to stop and waits for the slot to become Idle.
    ///
    /// Idempotent. Returns `true` once Idle, `false` if the wait window passed.
    pub async fn stop(&self) -> bool {
        let stop = self.slot().stop.clone();
        let Some(stop) = stop else {
            return self.is_idle();
        };
        stop.set();

        let mut rx = self.status.subscribe();
        let window = self.settings.preempt_join + STOP_SLACK;
        match time::timeout(window, rx.wait_for(|s| *s == RunnerStatus::Idle)).await {
            Ok(Ok(_)) => true,
            _ => {
                warn!(window = ?window, status = %self.status(), "runner did not reach idle after stop");
                false
            }
        }
    }
}

/// Waits up to `window` for the worker to report. `None` means it is still running.
async fn wait_exit(done: &mut Done, window: Duration) -> Option<Result<(), AppError>> {
    match time::timeout(window, done).await {
        Ok(Ok(res)) => Some(res),
        Ok(Err(_)) => Some(Err(AppError::msg("worker vanished"))),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{ApiParts, AppFn, AppRegistry};
    use crate::config::PanelContext;
    use crate::events::Event;
    use crate::hal::{Color, SimHardware};
    use crate::subscribers::HandlerFn;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio_util::sync::CancellationToken;

    struct Rig {
        bus: EventBus,
        sim: Arc<SimHardware>,
        bridge: Arc<HardwareEventBridge>,
        runner: Arc<AppRunner>,
        seen: Arc<Mutex<Vec<Event>>>,
        token: CancellationToken,
    }

    fn settings() -> RunnerSettings {
        RunnerSettings {
            stop_grace: Duration::from_millis(200),
            preempt_join: Duration::from_millis(300),
            start_timeout: Duration::from_secs(2),
        }
    }

    fn rig() -> Rig {
        let bus = EventBus::new(256);
        let sim = Arc::new(SimHardware::new());
        let bridge = HardwareEventBridge::new(sim.clone(), bus.clone());
        let runner = AppRunner::new(bus.clone(), bridge.clone(), settings());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            "system.app.*",
            HandlerFn::arc("rec", move |ev: &Event| {
                sink.lock().unwrap().push(ev.clone());
                Ok::<_, crate::HandlerError>(())
            }),
            None,
        );
        let token = CancellationToken::new();
        bus.start(token.clone()).unwrap();
        Rig {
            bus,
            sim,
            bridge,
            runner,
            seen,
            token,
        }
    }

    fn manifest(json: &str) -> AppManifest {
        AppManifest::parse("demo", json, 60, &AppRegistry::with_builtins()).unwrap()
    }

    fn api(rig: &Rig, manifest: &AppManifest) -> AppApi {
        AppApi::new(ApiParts {
            app: "demo".into(),
            manifest: Arc::new(manifest.clone()),
            app_dir: PathBuf::from("/tmp/demo"),
            bus: rig.bus.clone(),
            bridge: rig.bridge.clone(),
            ctx: Arc::new(PanelContext::default()),
            summaries: Arc::new(Vec::new()),
        })
    }

    async fn wait_idle(runner: &AppRunner) {
        let mut rx = runner.watch_status();
        time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == RunnerStatus::Idle))
            .await
            .unwrap()
            .unwrap();
    }

    async fn terminal(rig: &Rig) -> Event {
        for _ in 0..200 {
            let found = rig
                .seen
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.is(kinds::APP_FINISHED) || e.is(kinds::APP_ERROR))
                .cloned();
            if let Some(ev) = found {
                return ev;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no terminal event");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn normal_return_finishes_and_clears_leds() {
        let rig = rig();
        let m = manifest(r#"{"name":"Demo","entry_point":"hello_world"}"#);
        let app = AppFn::arc(|_stop: &StopSignal, api: &AppApi| {
            api.set_led(Color::Green, true)?;
            Ok(())
        });
        let running = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&running);
        rig.runner
            .launch("demo", app, &m, api(&rig, &m), move || flag.store(true, Ordering::SeqCst))
            .await
            .unwrap();
        assert!(running.load(Ordering::SeqCst));

        let ev = terminal(&rig).await;
        wait_idle(&rig.runner).await;
        assert!(ev.is(kinds::APP_FINISHED));
        assert_eq!(ev.get_str("reason"), Some("normal"));
        assert_eq!(rig.sim.leds(), [false; 4]);
        assert_eq!(rig.runner.current_app(), None);
        rig.token.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_and_panic_become_error_events() {
        let rig = rig();
        let m = manifest(r#"{"name":"Demo","entry_point":"hello_world"}"#);
        let app = AppFn::arc(|_s: &StopSignal, _a: &AppApi| -> Result<(), AppError> {
            panic!("kaboom")
        });
        rig.runner
            .launch("demo", app, &m, api(&rig, &m), || {})
            .await
            .unwrap();
        let ev = terminal(&rig).await;
        assert!(ev.is(kinds::APP_ERROR));
        assert!(ev.get_str("error").unwrap().contains("kaboom"));
        wait_idle(&rig.runner).await;
        rig.token.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn busy_slot_rejects_launch() {
        let rig = rig();
        let m = manifest(r#"{"name":"Demo","entry_point":"hello_world"}"#);
        let blocker = AppFn::arc(|stop: &StopSignal, _a: &AppApi| {
            while !stop.wait(Duration::from_millis(20)) {}
            Ok(())
        });
        rig.runner
            .launch("demo", blocker.clone(), &m, api(&rig, &m), || {})
            .await
            .unwrap();
        assert_eq!(rig.runner.status(), RunnerStatus::Running);

        let err = rig
            .runner
            .launch("other", blocker, &m, api(&rig, &m), || {})
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Busy { ref current } if current == "demo"));

        assert!(rig.runner.stop().await);
        assert!(rig.runner.stop().await);
        let ev = terminal(&rig).await;
        assert_eq!(ev.get_str("reason"), Some("stopped"));
        rig.token.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_times_out_a_stubborn_app() {
        let rig = rig();
        let m = manifest(r#"{"name":"Demo","entry_point":"hello_world","timeout_seconds":1}"#);
        let release = StopSignal::new();
        let gate = release.clone();
        // Ignores its own stop signal until released.
        let app = AppFn::arc(move |_s: &StopSignal, api: &AppApi| {
            api.set_led(Color::Red, true)?;
            gate.wait(Duration::from_secs(30));
            Ok(())
        });
        let started = Instant::now();
        rig.runner
            .launch("demo", app, &m, api(&rig, &m), || {})
            .await
            .unwrap();

        let ev = terminal(&rig).await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(ev.get_str("reason"), Some("timeout"));
        assert_eq!(rig.sim.leds(), [false; 4]);
        wait_idle(&rig.runner).await;
        release.set();
        rig.token.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn continue_behavior_arms_no_deadline() {
        let rig = rig();
        let m = manifest(
            r#"{"name":"Demo","entry_point":"hello_world","timeout_seconds":1,"timeout_behavior":"continue"}"#,
        );
        let app = AppFn::arc(|stop: &StopSignal, _a: &AppApi| {
            while !stop.wait(Duration::from_millis(20)) {}
            Ok(())
        });
        rig.runner
            .launch("demo", app, &m, api(&rig, &m), || {})
            .await
            .unwrap();
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(rig.runner.status(), RunnerStatus::Running);
        assert!(rig.runner.stop().await);
        rig.token.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn huge_timeout_runs_without_deadline_and_slot_recovers() {
        let rig = rig();
        let m = manifest(
            r#"{"name":"Demo","entry_point":"hello_world","timeout_seconds":9223372036854775807}"#,
        );
        let app = AppFn::arc(|stop: &StopSignal, _a: &AppApi| {
            while !stop.wait(Duration::from_millis(20)) {}
            Ok(())
        });
        rig.runner
            .launch("demo", app.clone(), &m, api(&rig, &m), || {})
            .await
            .unwrap();
        assert_eq!(rig.runner.status(), RunnerStatus::Running);

        assert!(rig.runner.stop().await);
        let ev = terminal(&rig).await;
        assert_eq!(ev.get_str("reason"), Some("stopped"));
        wait_idle(&rig.runner).await;

        // The slot accepts the next launch.
        rig.runner
            .launch("demo", app, &m, api(&rig, &m), || {})
            .await
            .unwrap();
        assert_eq!(rig.runner.status(), RunnerStatus::Running);
        assert!(rig.runner.stop().await);
        rig.token.cancel();
    }
}
