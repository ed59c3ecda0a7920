//! Session configuration.

use std::time::Duration;

use benevo_timer::SchedulerConfig;
use serde::{Deserialize, Serialize};

/// Timing knobs for the session coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity window after which a stored record is dead.
    /// Default: 24 hours.
    pub session_ttl: Duration,
    /// How often the checkpoint task persists a live session.
    /// Default: 5 minutes.
    pub checkpoint_interval: Duration,
    /// How long a fetched profile is served without refetching.
    /// Default: 2 minutes.
    pub profile_cache_ttl: Duration,
    /// Capacity of the [`SessionEvent`](crate::SessionEvent) broadcast.
    /// Slow subscribers lag and skip events past this. Default: 64.
    pub event_capacity: usize,
    pub scheduler: SchedulerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(24 * 60 * 60),
            checkpoint_interval: Duration::from_secs(5 * 60),
            profile_cache_ttl: Duration::from_secs(2 * 60),
            event_capacity: 64,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Clamp out-of-range values.
    ///
    /// - `session_ttl` at least one minute
    /// - `checkpoint_interval` at least one second
    /// - `event_capacity` at least one
    pub fn validated(mut self) -> Self {
        if self.session_ttl < Duration::from_secs(60) {
            tracing::warn!(session_ttl = ?self.session_ttl, "session_ttl below 1m, raising");
            self.session_ttl = Duration::from_secs(60);
        }
        if self.checkpoint_interval < Duration::from_secs(1) {
            tracing::warn!(checkpoint_interval = ?self.checkpoint_interval, "checkpoint_interval below 1s, raising");
            self.checkpoint_interval = Duration::from_secs(1);
        }
        if self.event_capacity == 0 {
            tracing::warn!("event_capacity is 0, raising to 1");
            self.event_capacity = 1;
        }
        self.scheduler = self.scheduler.validated();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.checkpoint_interval, Duration::from_secs(300));
        assert_eq!(config.profile_cache_ttl, Duration::from_secs(120));
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_validated_clamps_zeroes() {
        let config = SessionConfig {
            session_ttl: Duration::ZERO,
            checkpoint_interval: Duration::ZERO,
            event_capacity: 0,
            ..SessionConfig::default()
        }
        .validated();

        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.checkpoint_interval, Duration::from_secs(1));
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_loads_from_json() {
        let json = r#"{
            "session_ttl": {"secs": 3600, "nanos": 0},
            "checkpoint_interval": {"secs": 60, "nanos": 0},
            "profile_cache_ttl": {"secs": 120, "nanos": 0},
            "event_capacity": 16,
            "scheduler": {
                "lead_time": {"secs": 300, "nanos": 0},
                "minimum_delay": {"secs": 60, "nanos": 0},
                "elevated_interval": {"secs": 600, "nanos": 0},
                "default_interval": {"secs": 1200, "nanos": 0},
                "retry_jitter": {"secs": 0, "nanos": 0}
            }
        }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.event_capacity, 16);
    }
}
