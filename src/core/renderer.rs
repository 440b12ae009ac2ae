//! Applies `output.screen.updated` to the output surface on the dispatch loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::HandlerError;
use crate::events::{Event, kinds};
use crate::hal::{Hardware, ScreenContent};
use crate::subscribers::Handler;

/// The only code that renders to the surface.
pub struct ScreenRenderer {
    hardware: Arc<dyn Hardware>,
}

impl ScreenRenderer {
    pub const TOPIC: &'static str = kinds::SCREEN_UPDATED;

    pub fn new(hardware: Arc<dyn Hardware>) -> Arc<Self> {
        Arc::new(Self { hardware })
    }
}

#[async_trait]
impl Handler for ScreenRenderer {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let content_type = event.get_str("content_type").unwrap_or("text");
        let content = event.get_str("content").unwrap_or_default();
        match ScreenContent::from_parts(content_type, content) {
            Some(c) => self.hardware.surface().render(c),
            None => warn!(content_type, "unknown screen content type; ignored"),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "screen-renderer"
    }
}
