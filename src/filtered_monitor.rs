use crate::event::HidEvent;
use crate::eventbus::EventMonitor;

/// Wraps a monitor and forwards only events a user-supplied predicate accepts.
///
/// Rejected events count as not handled.
pub struct FilteredMonitor {
    predicate: Box<dyn Fn(&HidEvent) -> bool + Send + Sync>,
    inner: Box<dyn EventMonitor>,
}

impl FilteredMonitor {
    pub fn new(
        predicate: impl Fn(&HidEvent) -> bool + Send + Sync + 'static,
        inner: impl EventMonitor + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            inner: Box::new(inner),
        }
    }
}

impl EventMonitor for FilteredMonitor {
    fn on_event(&self, event: &HidEvent) -> bool {
        (self.predicate)(event) && self.inner.on_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventState, HidEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn only_accepted_events_reach_inner() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let monitor = FilteredMonitor::new(
            |e: &HidEvent| e.state() == EventState::On,
            move |_: &HidEvent| {
                s.fetch_add(1, Ordering::SeqCst);
                true
            },
        );
        let press = HidEvent::button(None, Instant::now(), 4, 2, EventState::On);
        assert!(monitor.on_event(&press));
        assert!(!monitor.on_event(&press.null_event()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
