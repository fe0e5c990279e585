use std::time::Duration;

/// Recorder runtime knobs. Environment overrides, invalid values fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Upper bound on one fetch; a cycle that exceeds it fails without touching the cache.
    pub fetch_timeout: Duration,
    /// Period of the built-in periodic driver.
    pub interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self { Self { fetch_timeout: Duration::from_secs(30), interval: Duration::from_secs(60) } }
}

impl RecorderConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            fetch_timeout: env_secs("CLOUDREC_CYCLE_TIMEOUT_SECS").unwrap_or(d.fetch_timeout),
            interval: env_secs("CLOUDREC_INTERVAL_SECS").unwrap_or(d.interval),
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
