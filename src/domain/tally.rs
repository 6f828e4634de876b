use serde::Serialize;
use tokio::time::Instant;

/// Bounding box of the embedded frame in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FrameRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FrameRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

/// Ambient browser events observed by the heuristic collectors.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    VisibilityChanged { visible: bool },
    /// A pointer press anywhere on the page.
    Click { x: f64, y: f64 },
    FrameFocused,
    FrameResized { width: f64, height: f64 },
    FrameLoaded,
}

/// Per-session interaction counters. Monotonic; only a new page session resets them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionTally {
    pub clicks_inside_frame: u32,
    pub frame_focus_count: u32,
    pub last_interaction: Instant,
}

impl InteractionTally {
    pub fn new(now: Instant) -> Self {
        Self {
            clicks_inside_frame: 0,
            frame_focus_count: 0,
            last_interaction: now,
        }
    }

    pub fn record_click(&mut self, at: Instant) {
        self.clicks_inside_frame = self.clicks_inside_frame.saturating_add(1);
        self.touch(at);
    }

    pub fn record_focus(&mut self, at: Instant) {
        self.frame_focus_count = self.frame_focus_count.saturating_add(1);
        self.touch(at);
    }

    pub fn interactions(&self) -> u32 {
        self.clicks_inside_frame.saturating_add(self.frame_focus_count)
    }

    /// Moves the last-interaction mark forward without counting a frame interaction.
    pub fn touch(&mut self, at: Instant) {
        if at > self.last_interaction {
            self.last_interaction = at;
        }
    }
}
