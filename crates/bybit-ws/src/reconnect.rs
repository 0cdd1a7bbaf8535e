//! Reconnection policy: bounded, jittered exponential backoff

use std::time::Duration;

/// Backoff policy for stream reconnection and snapshot retries
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for the computed delay
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt
    pub multiplier: f64,
    /// Jitter fraction (0.0 to 1.0) applied to each delay
    pub jitter: f64,
    /// Give up after this many attempts (None = retry forever)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
            // Stream reconnects retry until the consumer disposes
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter fraction
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Bound the number of attempts
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Check whether another attempt is allowed (1-indexed)
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Base delay for an attempt, before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(ms as u64).min(self.max_delay)
    }

    /// Delay for an attempt with jitter applied
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter == 0.0 {
            return base;
        }
        let range = base.as_millis() as f64 * self.jitter;
        let offset = rand::random::<f64>() * 2.0 * range - range;
        Duration::from_millis((base.as_millis() as f64 + offset).max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_capped() {
        let config = ReconnectConfig::new()
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(8))
            .with_jitter(0.0);

        assert_eq!(config.base_delay(1), Duration::from_millis(500));
        assert_eq!(config.base_delay(2), Duration::from_secs(1));
        assert_eq!(config.base_delay(3), Duration::from_secs(2));
        assert_eq!(config.base_delay(20), Duration::from_secs(8));
    }

    #[test]
    fn test_attempt_bounds() {
        let unbounded = ReconnectConfig::default();
        assert!(unbounded.allows_attempt(1));
        assert!(unbounded.allows_attempt(10_000));

        let bounded = ReconnectConfig::default().with_max_attempts(3);
        assert!(bounded.allows_attempt(3));
        assert!(!bounded.allows_attempt(4));
    }

    #[test]
    fn test_jitter_stays_near_base() {
        let config = ReconnectConfig::new()
            .with_initial_delay(Duration::from_millis(1000))
            .with_jitter(0.5);
        for _ in 0..100 {
            let d = config.delay(1).as_millis();
            assert!((500..=1500).contains(&d), "delay {d} outside jitter range");
        }
    }
}
