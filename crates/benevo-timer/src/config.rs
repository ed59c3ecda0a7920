//! Scheduler and visibility configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Timing knobs for proactive token refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long before the token's `exp` to refresh. Default: 5 minutes.
    pub lead_time: Duration,
    /// Floor on any computed delay, so a token that is already (nearly)
    /// expired doesn't cause a refresh storm. Default: 60 seconds.
    pub minimum_delay: Duration,
    /// Fallback interval for elevated roles when `exp` is unreadable.
    /// Default: 10 minutes.
    pub elevated_interval: Duration,
    /// Fallback interval for every other role. Default: 20 minutes.
    pub default_interval: Duration,
    /// Upper bound of the random jitter added to retries after a
    /// transient failure. Spreads devices out after a provider outage.
    /// Default: 30 seconds. Zero disables jitter.
    pub retry_jitter: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lead_time: Duration::from_secs(5 * 60),
            minimum_delay: Duration::from_secs(60),
            elevated_interval: Duration::from_secs(10 * 60),
            default_interval: Duration::from_secs(20 * 60),
            retry_jitter: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`TokenExpiryScheduler::new`](crate::TokenExpiryScheduler::new).
    /// Rules:
    /// - `minimum_delay` is at least one second.
    /// - both fallback intervals are at least `minimum_delay`.
    pub fn validated(mut self) -> Self {
        if self.minimum_delay < Duration::from_secs(1) {
            tracing::warn!(minimum_delay = ?self.minimum_delay, "minimum_delay below 1s, raising");
            self.minimum_delay = Duration::from_secs(1);
        }
        if self.elevated_interval < self.minimum_delay {
            tracing::warn!(elevated_interval = ?self.elevated_interval, "elevated_interval below minimum_delay, raising");
            self.elevated_interval = self.minimum_delay;
        }
        if self.default_interval < self.minimum_delay {
            tracing::warn!(default_interval = ?self.default_interval, "default_interval below minimum_delay, raising");
            self.default_interval = self.minimum_delay;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// VisibilityConfig
// ---------------------------------------------------------------------------

/// Knobs for the visibility monitor.
///
/// Deliberately separate from the profile cache TTL: the two happen to be
/// in the same ballpark, but they answer different questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Time away after which coming back requests a refresh.
    /// Default: 5 minutes.
    pub background_threshold: Duration,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            background_threshold: Duration::from_secs(5 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.lead_time, Duration::from_secs(300));
        assert_eq!(config.minimum_delay, Duration::from_secs(60));
        assert_eq!(config.elevated_interval, Duration::from_secs(600));
        assert_eq!(config.default_interval, Duration::from_secs(1200));
    }

    #[test]
    fn test_validated_raises_intervals_to_minimum() {
        let config = SchedulerConfig {
            minimum_delay: Duration::from_secs(90),
            elevated_interval: Duration::from_secs(10),
            default_interval: Duration::from_secs(10),
            ..SchedulerConfig::default()
        }
        .validated();

        assert_eq!(config.elevated_interval, Duration::from_secs(90));
        assert_eq!(config.default_interval, Duration::from_secs(90));
    }

    #[test]
    fn test_validated_raises_zero_minimum_delay() {
        let config = SchedulerConfig {
            minimum_delay: Duration::ZERO,
            ..SchedulerConfig::default()
        }
        .validated();
        assert_eq!(config.minimum_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_validated_keeps_good_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn test_visibility_default_threshold_is_five_minutes() {
        assert_eq!(
            VisibilityConfig::default().background_threshold,
            Duration::from_secs(300)
        );
    }
}
