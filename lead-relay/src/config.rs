//! Configuration module for environment variable parsing.
//!
//! The Facebook app credentials, the verify token and the public base URL are
//! required; the process refuses to start without them. Everything else has a
//! default.

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::forward::RetryPolicy;

/// Path of the inbound lead event endpoint, relative to the public base URL.
pub const LEAD_EVENTS_PATH: &str = "/webhooks/lead-events";

/// Path of the OAuth redirect endpoint, relative to the public base URL.
pub const OAUTH_CALLBACK_PATH: &str = "/oauth/callback";

const DEFAULT_GRAPH_API_BASE_URL: &str = "https://graph.facebook.com/v18.0";
const DEFAULT_OAUTH_DIALOG_URL: &str = "https://www.facebook.com/v18.0/dialog/oauth";

/// Upper bound on delivery attempts per lead.
pub const MAX_FORWARD_ATTEMPTS: u32 = 10;

/// Upper bound on debug log entries kept in memory.
pub const MAX_DEBUG_LOG_CAPACITY: usize = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is missing or empty")]
    Missing(&'static str),

    #[error("environment variable {name} is not an absolute URL: {value}")]
    InvalidUrl { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Facebook application identifier
    pub app_id: String,

    /// Facebook application secret, also the signing key of inbound events
    pub app_secret: String,

    /// Token echoed back by the provider during the subscription handshake
    pub verify_token: String,

    /// Canonical external base URL of this service, without trailing slash
    pub public_base_url: String,

    /// Port for the web server to listen on
    pub port: u16,

    /// Graph API root, versioned
    pub graph_api_base_url: String,

    /// OAuth dialog the user is sent to during setup
    pub oauth_dialog_url: String,

    /// Total delivery attempts per lead
    pub forward_max_attempts: u32,

    /// Wait after the first failed delivery attempt; doubles per attempt
    pub forward_initial_backoff_ms: u64,

    /// Timeout of a single delivery attempt
    pub forward_timeout_ms: u64,

    /// Reject inbound events that carry no signature header
    pub require_signature: bool,

    /// Number of entries kept by the debug event log
    pub debug_log_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let public_base_url = required(&lookup, "PUBLIC_BASE_URL")?;
        if !is_absolute_url(&public_base_url) {
            return Err(ConfigError::InvalidUrl {
                name: "PUBLIC_BASE_URL",
                value: public_base_url,
            });
        }

        Ok(Config {
            app_id: required(&lookup, "FACEBOOK_APP_ID")?,
            app_secret: required(&lookup, "FACEBOOK_APP_SECRET")?,
            verify_token: required(&lookup, "FACEBOOK_VERIFY_TOKEN")?,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),

            port: parse_or(&lookup, "PORT", 8080),

            graph_api_base_url: lookup("GRAPH_API_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE_URL.to_string()),

            oauth_dialog_url: lookup("OAUTH_DIALOG_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_OAUTH_DIALOG_URL.to_string()),

            forward_max_attempts: at_most(
                "FORWARD_MAX_ATTEMPTS",
                parse_or(&lookup, "FORWARD_MAX_ATTEMPTS", 3),
                MAX_FORWARD_ATTEMPTS,
            ),

            forward_initial_backoff_ms: parse_or(&lookup, "FORWARD_INITIAL_BACKOFF_MS", 2000),

            forward_timeout_ms: parse_or(&lookup, "FORWARD_TIMEOUT_MS", 30_000),

            require_signature: parse_or(&lookup, "REQUIRE_SIGNATURE", true),

            debug_log_capacity: at_most(
                "DEBUG_LOG_CAPACITY",
                parse_or(&lookup, "DEBUG_LOG_CAPACITY", 100),
                MAX_DEBUG_LOG_CAPACITY,
            ),
        })
    }

    /// Absolute URL the provider pushes lead events to.
    pub fn callback_url(&self) -> String {
        format!("{}{}", self.public_base_url, LEAD_EVENTS_PATH)
    }

    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}{}", self.public_base_url, OAUTH_CALLBACK_PATH)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.forward_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.forward_initial_backoff_ms),
            attempt_timeout: Duration::from_millis(self.forward_timeout_ms),
        }
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Parse an optional variable, falling back to `default` when absent or malformed.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = match lookup(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

fn at_most<T>(name: &str, value: T, max: T) -> T
where
    T: PartialOrd + std::fmt::Display,
{
    if value > max {
        warn!(env_var = name, value = %value, max = %max, "Value too large, clamping");
        max
    } else {
        value
    }
}

fn is_absolute_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("FACEBOOK_APP_ID", "1234"),
        ("FACEBOOK_APP_SECRET", "app-secret"),
        ("FACEBOOK_VERIFY_TOKEN", "verify-me"),
        ("PUBLIC_BASE_URL", "https://relay.example.com/"),
    ];

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup_from(REQUIRED)).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.graph_api_base_url, DEFAULT_GRAPH_API_BASE_URL);
        assert_eq!(config.forward_max_attempts, 3);
        assert_eq!(config.forward_initial_backoff_ms, 2000);
        assert_eq!(config.forward_timeout_ms, 30_000);
        assert!(config.require_signature);
        assert_eq!(config.debug_log_capacity, 100);
    }

    #[test]
    fn test_callback_urls_built_from_base() {
        let config = Config::from_lookup(lookup_from(REQUIRED)).unwrap();

        assert_eq!(
            config.callback_url(),
            "https://relay.example.com/webhooks/lead-events"
        );
        assert_eq!(
            config.oauth_redirect_uri(),
            "https://relay.example.com/oauth/callback"
        );
    }

    #[test]
    fn test_missing_secret_fails_fast() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "FACEBOOK_APP_SECRET")
            .collect();

        let err = Config::from_lookup(lookup_from(&pairs)).err();
        assert_eq!(err, Some(ConfigError::Missing("FACEBOOK_APP_SECRET")));
    }

    #[test]
    fn test_blank_required_value_is_missing() {
        let mut pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "FACEBOOK_VERIFY_TOKEN")
            .collect();
        pairs.push(("FACEBOOK_VERIFY_TOKEN", "   "));

        let err = Config::from_lookup(lookup_from(&pairs)).err();
        assert_eq!(err, Some(ConfigError::Missing("FACEBOOK_VERIFY_TOKEN")));
    }

    #[test]
    fn test_relative_base_url_rejected() {
        let mut pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "PUBLIC_BASE_URL")
            .collect();
        pairs.push(("PUBLIC_BASE_URL", "relay.example.com"));

        assert!(matches!(
            Config::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::InvalidUrl { name: "PUBLIC_BASE_URL", .. })
        ));
    }

    #[test]
    fn test_malformed_optional_uses_default() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FORWARD_MAX_ATTEMPTS", "lots"));
        pairs.push(("REQUIRE_SIGNATURE", "false"));

        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.forward_max_attempts, 3);
        assert!(!config.require_signature);
    }

    #[test]
    fn test_oversized_limits_are_clamped() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FORWARD_MAX_ATTEMPTS", "4000000000"));
        pairs.push(("DEBUG_LOG_CAPACITY", "50000000"));

        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.forward_max_attempts, MAX_FORWARD_ATTEMPTS);
        assert_eq!(config.debug_log_capacity, MAX_DEBUG_LOG_CAPACITY);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FORWARD_MAX_ATTEMPTS", "0"));
        pairs.push(("FORWARD_INITIAL_BACKOFF_MS", "1000"));

        let policy = Config::from_lookup(lookup_from(&pairs)).unwrap().retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_backoff, Duration::from_millis(1000));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(30));
    }
}
