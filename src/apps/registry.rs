//! # Entry-point registry.
//!
//! Mini-apps are compiled in and registered under the `entry_point` name their
//! manifest refers to. A manifest naming an unregistered entry point fails
//! validation.

use std::collections::HashMap;
use std::fmt;

use super::app::AppRef;
use super::hello_world::HelloWorld;

/// Entry-point name → mini-app.
#[derive(Clone, Default)]
pub struct AppRegistry {
    apps: HashMap<String, AppRef>,
}

impl fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.apps.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("AppRegistry").field("entry_points", &names).finish()
    }
}

impl AppRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in apps (`hello_world`).
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(HelloWorld::ENTRY_POINT, std::sync::Arc::new(HelloWorld));
        reg
    }

    /// Registers (or replaces) an entry point.
    pub fn register(&mut self, entry_point: impl Into<String>, app: AppRef) -> &mut Self {
        self.apps.insert(entry_point.into(), app);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, entry_point: impl Into<String>, app: AppRef) -> Self {
        self.register(entry_point, app);
        self
    }

    pub fn get(&self, entry_point: &str) -> Option<AppRef> {
        self.apps.get(entry_point).cloned()
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.apps.contains_key(entry_point)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
