//! # Built-in event logger.
//!
//! [`EventLogger`] subscribes to `"*"` and traces every bus event at debug level.
//! Enabled with `system.log_events`.
//!
//! ## Output format
//! ```text
//! DEBUG panelvisor::subscribers::log: event seq=12 type=system.app.started payload={"app_name":"hello_world","switch_value":1}
//! ```

use async_trait::async_trait;
use tracing::debug;

use super::Handler;
use crate::error::HandlerError;
use crate::events::Event;

/// Traces every event it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventLogger;

#[async_trait]
impl Handler for EventLogger {
    async fn handle(&self, e: &Event) -> Result<(), HandlerError> {
        // Serializing a JSON map cannot fail; fall back to Debug anyway.
        let payload = serde_json::to_string(e.payload())
            .unwrap_or_else(|_| format!("{:?}", e.payload()));
        debug!(seq = e.seq, r#type = e.event_type(), %payload, "event");
        Ok(())
    }

    fn name(&self) -> &str {
        "event-logger"
    }
}
