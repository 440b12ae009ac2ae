#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use panelvisor::apps::MANIFEST_FILE;
use panelvisor::{
    AppManager, AppRegistry, Event, EventBus, HandlerError, HandlerFn, PanelConfig, PanelContext,
    SimHardware, SystemBuilder, SystemManager,
};
use serde_json::Value;
use tempfile::TempDir;

/// Records every event matching a pattern.
#[derive(Clone)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn attach(bus: &EventBus, pattern: &str) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            pattern,
            HandlerFn::arc("recorder", move |ev: &Event| {
                sink.lock().unwrap().push(ev.clone());
                Ok::<_, HandlerError>(())
            }),
            None,
        );
        Self { seen }
    }

    pub fn events(&self) -> Vec<Event> {
        self.seen.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.is(event_type))
            .collect()
    }

    /// Waits until `pred` holds for some recorded event and returns it.
    pub async fn wait_for(&self, within: Duration, pred: impl Fn(&Event) -> bool) -> Event {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if let Some(ev) = self.seen.lock().unwrap().iter().find(|e| pred(e)).cloned() {
                return ev;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("event not observed within {within:?}; saw {:?}", self.types());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_type(&self, event_type: &str, within: Duration) -> Event {
        self.wait_for(within, |e| e.is(event_type)).await
    }

    pub fn types(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }
}

pub fn write_app(root: &Path, dir: &str, manifest: Value) {
    let d = root.join(dir);
    std::fs::create_dir_all(&d).unwrap();
    std::fs::write(d.join(MANIFEST_FILE), manifest.to_string()).unwrap();
}

/// Short windows so stop/timeout paths finish quickly.
pub fn fast_config() -> PanelConfig {
    let mut cfg = PanelConfig::default();
    cfg.system.stop_grace_ms = 200;
    cfg.system.preempt_join_ms = 500;
    cfg.system.shutdown_grace_ms = 3000;
    cfg
}

/// A started system on simulated hardware with a recorder on `"*"`.
pub struct Panel {
    pub system: Arc<SystemManager>,
    pub sim: Arc<SimHardware>,
    pub rec: Recorder,
    _apps: TempDir,
}

impl Panel {
    pub fn start(
        apps: &[(&str, Value)],
        mappings: Value,
        registry: AppRegistry,
        switch: u8,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, manifest) in apps {
            write_app(dir.path(), name, manifest.clone());
        }
        let ctx = PanelContext::from_config(fast_config());
        let manager = AppManager::scan_with_mappings(
            &[dir.path().to_path_buf()],
            &mappings,
            &registry,
            &ctx,
        );

        let sim = Arc::new(SimHardware::with_switch(switch));
        let system = SystemBuilder::new(ctx)
            .with_hardware(sim.clone())
            .with_registry(registry)
            .with_apps(manager)
            .build();
        let rec = Recorder::attach(system.bus(), "*");
        system.start().unwrap();
        Self {
            system,
            sim,
            rec,
            _apps: dir,
        }
    }

    pub async fn wait_idle(&self, within: Duration) {
        let mut rx = self.system.runner().watch_status();
        tokio::time::timeout(within, rx.wait_for(|s| *s == panelvisor::RunnerStatus::Idle))
            .await
            .expect("runner did not return to idle")
            .unwrap();
    }

    pub async fn wait_running(&self, within: Duration) {
        let mut rx = self.system.runner().watch_status();
        tokio::time::timeout(within, rx.wait_for(|s| *s == panelvisor::RunnerStatus::Running))
            .await
            .expect("runner did not reach running")
            .unwrap();
    }
}
