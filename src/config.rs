//! River configuration

use std::time::Duration;

/// Shortest survey window or flush interval a river will run with
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Registry namespaces, one top-level bucket per river kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    /// Bus peers: `<stream>/<peer>`
    pub bus: String,
    /// Pub peers: `<stream>/<peer>`
    pub publishers: String,
    /// Responders: `<path..>/<sequence>`
    pub hangup: String,
    /// Scribe checkins: `<stream>/<sequence>`
    pub scribe: String,
    /// Scribe message log: `<stream>/<sequence>`
    pub log: String,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            bus: "bus".into(),
            publishers: "pub".into(),
            hangup: "hangup".into(),
            scribe: "scribe".into(),
            log: "log".into(),
        }
    }
}

/// Configuration options shared by every river created from one handle
#[derive(Debug, Clone)]
pub struct RiverConfig {
    /// Per-link channel capacity
    pub channel_capacity: usize,

    /// How long one survey attempt waits for replies
    pub survey_timeout: Duration,

    /// Survey attempts before giving up on silent respondents
    pub survey_attempts: usize,

    /// Scribe flushes when this many messages are buffered
    pub scribe_batch_size: usize,

    /// Scribe flushes at least this often while it has messages
    pub scribe_flush_interval: Duration,

    /// Registry namespaces
    pub namespaces: Namespaces,
}

impl Default for RiverConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            survey_timeout: Duration::from_millis(30),
            survey_attempts: 3,
            scribe_batch_size: 128,
            scribe_flush_interval: Duration::from_secs(1),
            namespaces: Namespaces::default(),
        }
    }
}

impl RiverConfig {
    /// Set the per-link channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the per-attempt survey window
    pub fn survey_timeout(mut self, timeout: Duration) -> Self {
        self.survey_timeout = timeout.max(MIN_PERIOD);
        self
    }

    /// Set the number of survey attempts
    pub fn survey_attempts(mut self, attempts: usize) -> Self {
        self.survey_attempts = attempts.max(1);
        self
    }

    /// Set the scribe batch size
    pub fn scribe_batch_size(mut self, size: usize) -> Self {
        self.scribe_batch_size = size.max(1);
        self
    }

    /// Set the scribe flush interval
    pub fn scribe_flush_interval(mut self, interval: Duration) -> Self {
        self.scribe_flush_interval = interval.max(MIN_PERIOD);
        self
    }

    /// Replace the registry namespaces
    pub fn namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = namespaces;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RiverConfig::default();

        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.survey_timeout, Duration::from_millis(30));
        assert_eq!(config.survey_attempts, 3);
        assert_eq!(config.scribe_batch_size, 128);
        assert_eq!(config.scribe_flush_interval, Duration::from_secs(1));
        assert_eq!(config.namespaces.bus, "bus");
    }

    #[test]
    fn test_builder_clamps_zero() {
        let config = RiverConfig::default()
            .channel_capacity(0)
            .survey_attempts(0)
            .scribe_batch_size(0)
            .survey_timeout(Duration::ZERO)
            .scribe_flush_interval(Duration::ZERO);

        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.survey_attempts, 1);
        assert_eq!(config.scribe_batch_size, 1);
        assert_eq!(config.survey_timeout, MIN_PERIOD);
        assert_eq!(config.scribe_flush_interval, MIN_PERIOD);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RiverConfig::default()
            .survey_timeout(Duration::from_millis(5))
            .survey_attempts(5)
            .scribe_batch_size(16)
            .scribe_flush_interval(Duration::from_millis(50));

        assert_eq!(config.survey_timeout, Duration::from_millis(5));
        assert_eq!(config.survey_attempts, 5);
        assert_eq!(config.scribe_batch_size, 16);
        assert_eq!(config.scribe_flush_interval, Duration::from_millis(50));
    }
}
