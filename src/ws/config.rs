#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use url::Url;

use crate::error::Error;
use crate::{DEFAULT_WS_URL, Result, WS_URL_VAR};

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between `{"type":"ping"}` frames while the connection is open
    pub heartbeat_interval: Duration,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
///
/// The delay before attempt `n` is `initial_backoff * backoff_multiplier^(n - 1)`,
/// capped at `max_backoff`. No jitter is applied.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Backoff duration before the first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_randomization_factor(0.0)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}

/// Reads the server endpoint from [`WS_URL_VAR`], falling back to [`DEFAULT_WS_URL`].
pub fn endpoint_from_env() -> Result<Url> {
    let raw = std::env::var(WS_URL_VAR).unwrap_or_else(|_| DEFAULT_WS_URL.to_owned());
    parse_endpoint(&raw)
}

/// Parses a `ws://` or `wss://` endpoint.
pub fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::validation(format!(
            "unsupported WebSocket scheme `{other}` in {WS_URL_VAR}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use backoff::backoff::Backoff as _;

    use super::*;
    use crate::error::Kind;

    #[test]
    fn backoff_sequence() {
        let config = ReconnectConfig::default();
        let mut backoff: ExponentialBackoff = config.into();

        let delays: Vec<u128> = (0..5)
            .map(|_| backoff.next_backoff().unwrap().as_millis())
            .collect();

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn backoff_respects_max() {
        let config = ReconnectConfig::default();
        let mut backoff: ExponentialBackoff = config.into();

        for _ in 0..5 {
            let _next = backoff.next_backoff();
        }

        // 32s would exceed the ceiling
        let duration = backoff.next_backoff().unwrap();
        assert_eq!(duration.as_millis(), 30_000);
        let duration = backoff.next_backoff().unwrap();
        assert_eq!(duration.as_millis(), 30_000);
    }

    #[test]
    fn backoff_reset_starts_over() {
        let mut backoff: ExponentialBackoff = ReconnectConfig::default().into();
        let _first = backoff.next_backoff();
        let _second = backoff.next_backoff();

        backoff.reset();

        assert_eq!(backoff.next_backoff().unwrap().as_millis(), 1000);
    }

    #[test]
    fn defaults_match_protocol() {
        let config = Config::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, Some(5));
    }

    #[test]
    fn parse_endpoint_accepts_ws_schemes() {
        let url = parse_endpoint("wss://realtime.example.com/ws").unwrap();
        assert_eq!(url.host_str(), Some("realtime.example.com"));

        parse_endpoint(DEFAULT_WS_URL).unwrap();
    }

    #[test]
    fn parse_endpoint_rejects_http() {
        let err = parse_endpoint("https://example.com").unwrap_err();
        assert_eq!(err.kind(), Kind::Validation);
    }
}
