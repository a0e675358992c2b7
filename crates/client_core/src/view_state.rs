//! Presentation-facing pieces of the view state: scroll anchoring and the
//! chat status line.

use std::time::Duration;

use shared::domain::SessionStatus;

/// Wait before scrolling so freshly rendered content has settled its height.
pub const DEFAULT_SCROLL_DELAY: Duration = Duration::from_millis(250);

/// Scroll geometry reported by the presentation surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub scroll_top: u32,
    pub client_height: u32,
    pub scroll_height: u32,
}

impl Viewport {
    pub fn is_at_bottom(&self) -> bool {
        self.scroll_top.saturating_add(self.client_height) >= self.scroll_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub delay: Duration,
    pub smooth: bool,
}

/// Remembers whether the viewport sat at its bottom edge before content changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollAnchor {
    at_bottom: bool,
    delay: Duration,
}

impl Default for ScrollAnchor {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_DELAY)
    }
}

impl ScrollAnchor {
    pub fn new(delay: Duration) -> Self {
        Self {
            at_bottom: true,
            delay,
        }
    }

    pub fn at_bottom(&self) -> bool {
        self.at_bottom
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn record(&mut self, viewport: Viewport) {
        self.at_bottom = viewport.is_at_bottom();
    }

    /// Follow-up scroll for a content change; only when anchored at the bottom.
    pub fn after_mutation(&self) -> Option<ScrollRequest> {
        self.at_bottom.then_some(ScrollRequest {
            delay: self.delay,
            smooth: true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStatus {
    pub prompt: String,
    pub status: SessionStatus,
}

/// Typing indicator is hidden once the session is over.
pub fn show_busy_indicator(busy: bool, terminated: bool) -> bool {
    busy && !terminated
}
