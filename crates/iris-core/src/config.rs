use std::time::Duration;

use crate::error::AppError;

/// Scheduling and fan-out settings for a [`Poller`](crate::poller::Poller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Wait between the end of one batch and the start of the next.
    pub interval: Duration,
    /// Wait after a batch that failed above the dispatcher.
    pub error_backoff: Duration,
    /// Maximum number of targets fetched at once.
    pub concurrency_limit: usize,
    /// Batches buffered between the worker and a slow consumer.
    pub delivery_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            error_backoff: Duration::from_secs(600),
            concurrency_limit: 5,
            delivery_capacity: 16,
        }
    }
}

impl PollerConfig {
    /// Read configuration from environment variables.
    ///
    /// - `IRIS_INTERVAL_SECS` (optional, defaults to 600)
    /// - `IRIS_BACKOFF_SECS` (optional, defaults to the interval)
    /// - `IRIS_CONCURRENCY` (optional, defaults to 5)
    /// - `IRIS_DELIVERY_CAPACITY` (optional, defaults to 16)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let interval = match positive(&lookup, "IRIS_INTERVAL_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.interval,
        };
        let error_backoff = match positive(&lookup, "IRIS_BACKOFF_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => interval,
        };
        let concurrency_limit = match positive(&lookup, "IRIS_CONCURRENCY")? {
            Some(n) => to_usize("IRIS_CONCURRENCY", n)?,
            None => defaults.concurrency_limit,
        };
        let delivery_capacity = match positive(&lookup, "IRIS_DELIVERY_CAPACITY")? {
            Some(n) => to_usize("IRIS_DELIVERY_CAPACITY", n)?,
            None => defaults.delivery_capacity,
        };

        Ok(Self {
            interval,
            error_backoff,
            concurrency_limit,
            delivery_capacity,
        })
    }

    /// Set the interval. The backoff follows it unless set explicitly afterwards.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self.error_backoff = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_delivery_capacity(mut self, capacity: usize) -> Self {
        self.delivery_capacity = capacity;
        self
    }

    /// Reject settings the poller cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.concurrency_limit == 0 {
            return Err(AppError::ConfigError(
                "Concurrency limit must be at least 1".into(),
            ));
        }
        if self.delivery_capacity == 0 {
            return Err(AppError::ConfigError(
                "Delivery capacity must be at least 1".into(),
            ));
        }
        if self.interval.is_zero() {
            return Err(AppError::ConfigError("Interval must be non-zero".into()));
        }
        Ok(())
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, AppError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let parsed: u64 = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {key} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    Ok(Some(parsed))
}

fn to_usize(key: &str, value: u64) -> Result<usize, AppError> {
    usize::try_from(value)
        .map_err(|_| AppError::ConfigError(format!("{key} is too large: {value}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_ten_minute_cycle() {
        let config = PollerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(600));
        assert_eq!(config.error_backoff, Duration::from_secs(600));
        assert_eq!(config.concurrency_limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = PollerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PollerConfig::default());
    }

    #[test]
    fn backoff_follows_interval_when_unset() {
        let config = PollerConfig::from_lookup(lookup(&[("IRIS_INTERVAL_SECS", "60")])).unwrap();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.error_backoff, Duration::from_secs(60));
    }

    #[test]
    fn every_variable_is_read() {
        let config = PollerConfig::from_lookup(lookup(&[
            ("IRIS_INTERVAL_SECS", "30"),
            ("IRIS_BACKOFF_SECS", "5"),
            ("IRIS_CONCURRENCY", "8"),
            ("IRIS_DELIVERY_CAPACITY", "2"),
        ]))
        .unwrap();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.error_backoff, Duration::from_secs(5));
        assert_eq!(config.concurrency_limit, 8);
        assert_eq!(config.delivery_capacity, 2);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        let err = PollerConfig::from_lookup(lookup(&[("IRIS_CONCURRENCY", "0")])).unwrap_err();
        assert!(err.to_string().contains("at least 1"));

        let err = PollerConfig::from_lookup(lookup(&[("IRIS_INTERVAL_SECS", "ten")])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("IRIS_INTERVAL_SECS"));
    }

    #[test]
    fn builder_overrides() {
        let config = PollerConfig::default()
            .with_interval(Duration::from_secs(10))
            .with_error_backoff(Duration::from_secs(1))
            .with_concurrency_limit(2);
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.error_backoff, Duration::from_secs(1));
        assert_eq!(config.concurrency_limit, 2);
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let config = PollerConfig::default().with_concurrency_limit(0);
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        let config = PollerConfig::default().with_delivery_capacity(0);
        assert!(config.validate().is_err());
    }
}
