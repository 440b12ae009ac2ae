//! Builder wiring a [`SystemManager`] from a [`PanelContext`].

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use super::bridge::HardwareEventBridge;
use super::launcher::AppLauncher;
use super::manager::AppManager;
use super::runner::{AppRunner, RunnerSettings};
use super::system::SystemManager;
use crate::apps::AppRegistry;
use crate::config::PanelContext;
use crate::events::EventBus;
use crate::hal::{Hardware, SimHardware};

/// Builder for a [`SystemManager`].
pub struct SystemBuilder {
    ctx: PanelContext,
    hardware: Option<Arc<dyn Hardware>>,
    registry: AppRegistry,
    manager: Option<AppManager>,
}

impl SystemBuilder {
    /// Creates a builder with the built-in apps registered and no hardware chosen.
    pub fn new(ctx: PanelContext) -> Self {
        Self {
            ctx,
            hardware: None,
            registry: AppRegistry::with_builtins(),
            manager: None,
        }
    }

    /// Sets the hardware backend. Defaults to a fresh [`SimHardware`].
    pub fn with_hardware(mut self, hardware: Arc<dyn Hardware>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    /// Replaces the entry-point registry.
    pub fn with_registry(mut self, registry: AppRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Uses an already scanned app manager instead of scanning `system.apps_dirs`.
    pub fn with_apps(mut self, manager: AppManager) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Builds every component. Nothing runs until [`SystemManager::start`].
    ///
    /// Without [`with_apps`](Self::with_apps), scans `system.apps_dirs` and loads
    /// `system.mappings_path`.
    pub fn build(self) -> Arc<SystemManager> {
        let sys = &self.ctx.config.system;
        let bus = EventBus::new(sys.queue_size());
        let hardware = self
            .hardware
            .unwrap_or_else(|| Arc::new(SimHardware::new()) as Arc<dyn Hardware>);
        let manager = Arc::new(self.manager.unwrap_or_else(|| {
            AppManager::scan(&sys.apps_dirs, &sys.mappings_path, &self.registry, &self.ctx)
        }));
        let settings = RunnerSettings::from_config(sys);

        let ctx = Arc::new(self.ctx);
        let bridge = HardwareEventBridge::new(Arc::clone(&hardware), bus.clone());
        let runner = AppRunner::new(bus.clone(), Arc::clone(&bridge), settings);
        let launcher = AppLauncher::new(
            bus.clone(),
            Arc::clone(&bridge),
            Arc::clone(&manager),
            self.registry,
            Arc::clone(&runner),
            Arc::clone(&ctx),
        );

        Arc::new(SystemManager {
            ctx,
            bus,
            hardware,
            bridge,
            manager,
            runner,
            launcher,
            dispatch_token: CancellationToken::new(),
            launch_token: CancellationToken::new(),
            requested: CancellationToken::new(),
            loops: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }
}
