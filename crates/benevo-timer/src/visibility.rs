//! Foreground/background tracking.
//!
//! The host (a desktop shell, a mobile runtime, a test) reports what the
//! app just went through as a [`VisibilityEvent`]. The monitor keeps
//! track of how long the app was away and, when it returns after more
//! than [`VisibilityConfig::background_threshold`], asks for a refresh.
//!
//! [`VisibilityMonitor::handle`] is pure bookkeeping and easy to test.
//! [`VisibilityMonitor::start`] wraps it in a task that forwards refresh
//! requests to a [`RefreshTrigger`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use benevo_types::{Clock, Timestamp};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::{TriggerSource, VisibilityConfig};

/// Something that can be asked to refresh the session.
///
/// The session coordinator implements this. The future resolves once the
/// request has been handled (or skipped because one was in flight).
pub trait RefreshTrigger: Send + Sync + 'static {
    fn request_refresh(&self, source: TriggerSource) -> impl Future<Output = ()> + Send;
}

/// A lifecycle signal from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityEvent {
    /// The document/window became hidden.
    Hidden,
    /// The document/window became visible.
    Visible,
    /// The mobile runtime moved the app to the background.
    Paused,
    /// The mobile runtime brought the app back.
    Resumed,
    /// The window lost focus.
    Blurred,
    /// The window regained focus.
    Focused,
}

impl VisibilityEvent {
    fn is_away(self) -> bool {
        matches!(self, Self::Hidden | Self::Paused | Self::Blurred)
    }

    fn source(self) -> TriggerSource {
        match self {
            Self::Focused | Self::Blurred => TriggerSource::Focus,
            _ => TriggerSource::Visibility,
        }
    }
}

/// What [`VisibilityMonitor::handle`] concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityAction {
    /// Redundant event (already in that state).
    None,
    /// Went to the background.
    MarkedBackground,
    /// Came back, but not long enough ago to matter.
    MarkedForeground { away: Duration },
    /// Came back after the threshold; a refresh should run.
    RequestRefresh { away: Duration, source: TriggerSource },
}

/// Snapshot of the monitor's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityState {
    pub is_foreground: bool,
    pub last_transition_at: Timestamp,
    /// Total time spent in the background since the monitor was created.
    pub accumulated_background: Duration,
}

/// Tracks foreground/background transitions.
#[derive(Debug)]
pub struct VisibilityMonitor {
    config: VisibilityConfig,
    state: VisibilityState,
}

impl VisibilityMonitor {
    /// A monitor that starts in the foreground at `now`.
    pub fn new(config: VisibilityConfig, now: Timestamp) -> Self {
        Self {
            config,
            state: VisibilityState {
                is_foreground: true,
                last_transition_at: now,
                accumulated_background: Duration::ZERO,
            },
        }
    }

    pub fn state(&self) -> VisibilityState {
        self.state
    }

    /// Applies one event at time `now`.
    pub fn handle(&mut self, event: VisibilityEvent, now: Timestamp) -> VisibilityAction {
        if event.is_away() {
            if !self.state.is_foreground {
                return VisibilityAction::None;
            }
            self.state.is_foreground = false;
            self.state.last_transition_at = now;
            tracing::trace!(?event, "app went to background");
            return VisibilityAction::MarkedBackground;
        }

        if self.state.is_foreground {
            return VisibilityAction::None;
        }
        let away = now.saturating_duration_since(self.state.last_transition_at);
        self.state.is_foreground = true;
        self.state.last_transition_at = now;
        self.state.accumulated_background += away;

        if away > self.config.background_threshold {
            tracing::debug!(?event, away_secs = away.as_secs(), "back after long absence");
            VisibilityAction::RequestRefresh {
                away,
                source: event.source(),
            }
        } else {
            tracing::trace!(?event, away_ms = away.as_millis() as u64, "back in foreground");
            VisibilityAction::MarkedForeground { away }
        }
    }

    /// Moves the monitor into a task fed by the returned handle.
    ///
    /// Refresh requests are spawned so a slow refresh never delays the
    /// bookkeeping of later events. Must be called inside a tokio runtime.
    pub fn start<T: RefreshTrigger>(self, trigger: Arc<T>, clock: Arc<dyn Clock>) -> VisibilityHandle {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<VisibilityEvent>();
        let (state_tx, state_rx) = watch::channel(self.state);
        let mut monitor = self;

        let task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let action = monitor.handle(event, clock.now());
                state_tx.send_replace(monitor.state);
                if let VisibilityAction::RequestRefresh { source, .. } = action {
                    let trigger = Arc::clone(&trigger);
                    tokio::spawn(async move {
                        trigger.request_refresh(source).await;
                    });
                }
            }
            tracing::debug!("visibility monitor stopped");
        });

        tracing::info!("visibility monitor started");
        VisibilityHandle {
            events: events_tx,
            state: state_rx,
            task,
        }
    }
}

/// Feeds events to a started [`VisibilityMonitor`].
///
/// Dropping the handle closes the channel and the task exits on its own.
#[derive(Debug)]
pub struct VisibilityHandle {
    events: mpsc::UnboundedSender<VisibilityEvent>,
    state: watch::Receiver<VisibilityState>,
    task: JoinHandle<()>,
}

impl VisibilityHandle {
    /// Reports an event. Returns `false` if the monitor has stopped.
    pub fn notify(&self, event: VisibilityEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// The latest state published by the monitor task.
    pub fn state(&self) -> VisibilityState {
        *self.state.borrow()
    }

    /// A receiver that sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<VisibilityState> {
        self.state.clone()
    }

    /// Stops the monitor task immediately.
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(60);

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_secs(1_000 + secs)
    }

    fn monitor() -> VisibilityMonitor {
        VisibilityMonitor::new(VisibilityConfig::default(), at(0))
    }

    #[test]
    fn test_short_absence_does_not_refresh() {
        let mut m = monitor();

        assert_eq!(m.handle(VisibilityEvent::Hidden, at(0)), VisibilityAction::MarkedBackground);
        let action = m.handle(VisibilityEvent::Visible, at(60));

        assert_eq!(action, VisibilityAction::MarkedForeground { away: MIN });
    }

    #[test]
    fn test_long_absence_requests_visibility_refresh() {
        let mut m = monitor();
        m.handle(VisibilityEvent::Paused, at(0));

        let action = m.handle(VisibilityEvent::Resumed, at(6 * 60));

        assert_eq!(
            action,
            VisibilityAction::RequestRefresh {
                away: 6 * MIN,
                source: TriggerSource::Visibility
            }
        );
    }

    #[test]
    fn test_focus_return_uses_focus_source() {
        let mut m = monitor();
        m.handle(VisibilityEvent::Blurred, at(0));

        let action = m.handle(VisibilityEvent::Focused, at(10 * 60));

        assert!(matches!(
            action,
            VisibilityAction::RequestRefresh { source: TriggerSource::Focus, .. }
        ));
    }

    #[test]
    fn test_exactly_threshold_is_not_long_enough() {
        let mut m = monitor();
        m.handle(VisibilityEvent::Hidden, at(0));

        let action = m.handle(VisibilityEvent::Visible, at(5 * 60));

        assert_eq!(action, VisibilityAction::MarkedForeground { away: 5 * MIN });
    }

    #[test]
    fn test_repeated_hidden_keeps_first_transition_time() {
        let mut m = monitor();
        m.handle(VisibilityEvent::Hidden, at(0));

        assert_eq!(m.handle(VisibilityEvent::Blurred, at(200)), VisibilityAction::None);
        let action = m.handle(VisibilityEvent::Visible, at(400));

        assert!(matches!(action, VisibilityAction::RequestRefresh { .. }));
    }

    #[test]
    fn test_visible_while_foreground_is_ignored() {
        let mut m = monitor();
        assert_eq!(m.handle(VisibilityEvent::Visible, at(900)), VisibilityAction::None);
        assert_eq!(m.state().last_transition_at, at(0));
    }

    #[test]
    fn test_background_time_accumulates() {
        let mut m = monitor();
        m.handle(VisibilityEvent::Hidden, at(0));
        m.handle(VisibilityEvent::Visible, at(30));
        m.handle(VisibilityEvent::Hidden, at(100));
        m.handle(VisibilityEvent::Visible, at(190));

        let state = m.state();
        assert!(state.is_foreground);
        assert_eq!(state.accumulated_background, Duration::from_secs(120));
        assert_eq!(state.last_transition_at, at(190));
    }
}
