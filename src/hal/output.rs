//! # Output surface and speaker.
//!
//! The [`OutputSurface`] is the shared screen. Only dispatch-loop code renders to it
//! (through the screen renderer subscriber); mini-app threads publish
//! `output.screen.updated` instead of touching it.
//!
//! The rendering technology is external: the surface keeps the current content,
//! counts renders and logs what would be shown.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

/// Something that can be shown on the output surface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScreenContent {
    /// Blank screen.
    #[default]
    Clear,
    /// Plain text.
    Text(String),
    /// Markdown source.
    Markdown(String),
    /// HTML fragment.
    Html(String),
    /// Path to an image file.
    Image(PathBuf),
}

impl ScreenContent {
    /// `content_type` string used in `output.screen.updated`.
    pub fn content_type(&self) -> &'static str {
        match self {
            ScreenContent::Clear => "clear",
            ScreenContent::Text(_) => "text",
            ScreenContent::Markdown(_) => "markdown",
            ScreenContent::Html(_) => "html",
            ScreenContent::Image(_) => "image",
        }
    }

    /// `content` string used in `output.screen.updated`.
    pub fn content(&self) -> String {
        match self {
            ScreenContent::Clear => String::new(),
            ScreenContent::Text(s) | ScreenContent::Markdown(s) | ScreenContent::Html(s) => {
                s.clone()
            }
            ScreenContent::Image(p) => p.display().to_string(),
        }
    }

    /// Rebuilds content from an event's `content_type` / `content` pair.
    ///
    /// Returns `None` for an unknown content type.
    pub fn from_parts(content_type: &str, content: &str) -> Option<Self> {
        Some(match content_type {
            "clear" => ScreenContent::Clear,
            "text" => ScreenContent::Text(content.to_string()),
            "markdown" => ScreenContent::Markdown(content.to_string()),
            "html" => ScreenContent::Html(content.to_string()),
            "image" => ScreenContent::Image(PathBuf::from(content)),
            _ => return None,
        })
    }

    /// Text of a `Text` content, if that is what this is.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScreenContent::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Default)]
struct SurfaceState {
    current: ScreenContent,
    renders: u64,
}

/// The panel's shared screen.
#[derive(Default)]
pub struct OutputSurface {
    state: Mutex<SurfaceState>,
}

impl OutputSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the current content.
    pub fn render(&self, content: ScreenContent) {
        match &content {
            ScreenContent::Clear => debug!("screen cleared"),
            other => info!(
                content_type = other.content_type(),
                content = %other.content(),
                "screen"
            ),
        }
        let mut st = self.state();
        st.current = content;
        st.renders += 1;
    }

    /// Content currently shown.
    pub fn current(&self) -> ScreenContent {
        self.state().current.clone()
    }

    /// Number of renders since creation.
    pub fn render_count(&self) -> u64 {
        self.state().renders
    }
}

/// Speaker output. Audio playback is external; the speaker tracks what is playing.
#[derive(Default)]
pub struct Speaker {
    playing: Mutex<Option<PathBuf>>,
}

impl Speaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(&self, path: &Path) {
        info!(path = %path.display(), "play sound");
        *self.playing.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
    }

    pub fn stop(&self) {
        if let Some(path) = self
            .playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            debug!(path = %path.display(), "stop sound");
        }
    }

    /// File currently playing, if any.
    pub fn playing(&self) -> Option<PathBuf> {
        self.playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_parts_are_symmetric_for_known_types() {
        for c in [
            ScreenContent::Clear,
            ScreenContent::Text("hi".into()),
            ScreenContent::Markdown("# hi".into()),
            ScreenContent::Html("<b>hi</b>".into()),
            ScreenContent::Image("/tmp/a.png".into()),
        ] {
            assert_eq!(
                ScreenContent::from_parts(c.content_type(), &c.content()),
                Some(c)
            );
        }
        assert_eq!(ScreenContent::from_parts("video", "x"), None);
    }

    #[test]
    fn surface_tracks_current_content() {
        let s = OutputSurface::new();
        assert_eq!(s.current(), ScreenContent::Clear);
        s.render(ScreenContent::Text("hello".into()));
        assert_eq!(s.current().as_text(), Some("hello"));
        assert_eq!(s.render_count(), 1);
    }
}
