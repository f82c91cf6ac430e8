//! Application configuration shared by every request adapter.
//!
//! The owning application builds one [`AppConfig`] and hands an `Arc` of it to
//! each [`RequestAdapter`](crate::RequestAdapter); adapters only read it.
//!
//! ```
//! use std::time::Duration;
//! use micro_express::AppConfig;
//!
//! let config = AppConfig::builder().body_timeout(Duration::from_secs(2)).trust_proxy(true).build();
//! assert_eq!(config.body_timeout(), Duration::from_secs(2));
//!
//! let config: AppConfig = serde_json::from_str(r#"{ "body_timeout_ms": 250 }"#).unwrap();
//! assert_eq!(config.body_timeout(), Duration::from_millis(250));
//! assert!(!config.trust_proxy());
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Deadline for receiving the whole request body.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    body_timeout_ms: u64,
    trust_proxy: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig::builder().build()
    }
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::new()
    }

    pub fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.body_timeout_ms)
    }

    /// Whether forwarding headers set by a proxy are trusted for the client address.
    pub fn trust_proxy(&self) -> bool {
        self.trust_proxy
    }
}

#[derive(Debug)]
pub struct AppConfigBuilder {
    body_timeout: Duration,
    trust_proxy: bool,
}

impl AppConfigBuilder {
    fn new() -> Self {
        Self { body_timeout: DEFAULT_BODY_TIMEOUT, trust_proxy: false }
    }

    pub fn body_timeout(mut self, body_timeout: Duration) -> Self {
        self.body_timeout = body_timeout;
        self
    }

    pub fn trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn build(self) -> AppConfig {
        AppConfig {
            body_timeout_ms: u64::try_from(self.body_timeout.as_millis()).unwrap_or(u64::MAX),
            trust_proxy: self.trust_proxy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = AppConfig::default();
        assert_eq!(config.body_timeout(), DEFAULT_BODY_TIMEOUT);
        assert!(!config.trust_proxy());
    }

    #[test]
    fn deserialize_partial() {
        let config: AppConfig = serde_json::from_str(r#"{ "trust_proxy": true }"#).unwrap();
        assert_eq!(config.body_timeout(), DEFAULT_BODY_TIMEOUT);
        assert!(config.trust_proxy());
    }
}
