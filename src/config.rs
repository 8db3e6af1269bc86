use crate::error::{MirageError, Result};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Upstream fetch configuration
    pub upstream: UpstreamConfig,
    /// Rate limiter configuration
    pub rate_limit: RateLimitConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Directory served for non-proxy routes
    pub static_dir: String,
    /// Log every proxied target (raw and normalized)
    pub log_requests: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Request timeout in seconds, 0 disables the timeout
    pub timeout_secs: u64,
    /// Skip TLS certificate validation for upstream connections
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Admitted requests per window for one (client, target) pair
    pub max_requests: usize,
    /// Sliding window length in milliseconds
    pub window_ms: u64,
    /// Table size that triggers an inline sweep of stale keys
    pub max_keys: usize,
    /// Interval of the background sweep in seconds
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            accept_invalid_certs: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 2,
            window_ms: 10_000,
            max_keys: 100_000,
            cleanup_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server: ServerConfig {
                port: parse_env("PORT", "3000")?,
                host: get_env_or("HOST", "0.0.0.0"),
                static_dir: get_env_or("STATIC_DIR", "public"),
                log_requests: required_bool("LOG_REQUESTS")?,
            },
            upstream: UpstreamConfig {
                timeout_secs: parse_env("UPSTREAM_TIMEOUT_SECS", "30")?,
                accept_invalid_certs: parse_env("UPSTREAM_ACCEPT_INVALID_CERTS", "true")?,
            },
            rate_limit: RateLimitConfig {
                enabled: parse_env("RATE_LIMIT_ENABLED", "true")?,
                max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", "2")?,
                window_ms: parse_env("RATE_LIMIT_WINDOW_MS", "10000")?,
                max_keys: parse_env("RATE_LIMIT_MAX_KEYS", "100000")?,
                cleanup_interval_secs: parse_env("RATE_LIMIT_CLEANUP_SECS", "60")?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the listen address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// The request-logging switch has no default: the process must not start
/// unless it is set to an explicit boolean.
fn required_bool(key: &str) -> Result<bool> {
    let raw = env::var(key).map_err(|_| MirageError::MissingEnvVar(key.to_string()))?;
    raw.trim()
        .parse()
        .map_err(|_| MirageError::InvalidConfig(format!("{} must be true or false", key)))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| MirageError::InvalidConfig(format!("{} has an invalid value", key)))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "PORT",
        "HOST",
        "STATIC_DIR",
        "LOG_REQUESTS",
        "UPSTREAM_TIMEOUT_SECS",
        "UPSTREAM_ACCEPT_INVALID_CERTS",
        "RATE_LIMIT_ENABLED",
        "RATE_LIMIT_MAX_REQUESTS",
        "RATE_LIMIT_WINDOW_MS",
        "RATE_LIMIT_MAX_KEYS",
        "RATE_LIMIT_CLEANUP_SECS",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("LOG_REQUESTS", "false");
        let config = Config::from_env().unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.static_dir, "public");
        assert!(!config.server.log_requests);

        assert_eq!(config.upstream, UpstreamConfig::default());
        assert_eq!(config.upstream.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.rate_limit, RateLimitConfig::default());

        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("LOG_REQUESTS", "true");
        env::set_var("PORT", "8080");
        env::set_var("HOST", "127.0.0.1");
        env::set_var("STATIC_DIR", "/srv/www");
        env::set_var("UPSTREAM_TIMEOUT_SECS", "0");
        env::set_var("UPSTREAM_ACCEPT_INVALID_CERTS", "false");
        env::set_var("RATE_LIMIT_MAX_REQUESTS", "5");
        env::set_var("RATE_LIMIT_WINDOW_MS", "60000");

        let config = Config::from_env().unwrap();

        assert!(config.server.log_requests);
        assert_eq!(config.server_addr(), "127.0.0.1:8080");
        assert_eq!(config.server.static_dir, "/srv/www");
        assert_eq!(config.upstream.timeout(), None);
        assert!(!config.upstream.accept_invalid_certs);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_ms, 60_000);
    }

    #[test]
    fn test_config_requires_log_requests_flag() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, MirageError::MissingEnvVar(ref key) if key == "LOG_REQUESTS"));
    }

    #[test]
    fn test_config_rejects_non_boolean_log_requests() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("LOG_REQUESTS", "yes");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, MirageError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("LOG_REQUESTS", "true");
        env::set_var("PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, MirageError::InvalidConfig(_)));
    }
}
