//! Monitor that records dispatched events through `tracing`.
use crate::event::HidEvent;
use crate::eventbus::EventMonitor;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace, warn, Level};

/// Logs every event it sees. Never handles events, so it can sit in any scope
/// without changing dispatch.
pub struct EventLogger {
    level: Level,
    count: AtomicU64,
}

impl EventLogger {
    pub fn new() -> Self {
        Self::with_level(Level::DEBUG)
    }

    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            count: AtomicU64::new(0),
        }
    }

    /// Events logged so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EventMonitor for EventLogger {
    fn on_event(&self, event: &HidEvent) -> bool {
        self.count.fetch_add(1, Ordering::Relaxed);
        let device = event.device().map(|d| d.as_str()).unwrap_or("-");
        let desc = event.display_description();
        if self.level == Level::ERROR || self.level == Level::WARN {
            warn!(device, event = %desc, "input");
        } else if self.level == Level::INFO {
            info!(device, event = %desc, "input");
        } else if self.level == Level::DEBUG {
            debug!(device, event = %desc, "input");
        } else {
            trace!(device, event = %desc, "input");
        }
        false
    }
}
