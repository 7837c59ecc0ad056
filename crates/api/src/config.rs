//! Application configuration loaded from environment variables.

use std::time::Duration;

use cart_store::RetryPolicy;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `CART_RETRY_ATTEMPTS`: attempts per conflicting write (default: `3`)
/// - `CART_RETRY_BACKOFF_MS`: linear backoff step (default: `10`)
/// - `CATALOG_FILE`: JSON product list loaded into the catalog at startup;
///   without it the in-memory catalog starts empty
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub catalog_file: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`; unparsable values fall back
    /// to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            retry_attempts: lookup("CART_RETRY_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.retry_attempts),
            retry_backoff_ms: lookup("CART_RETRY_BACKOFF_MS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.retry_backoff_ms),
            catalog_file: lookup("CATALOG_FILE").filter(|path| !path.trim().is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            retry_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: 10,
            catalog_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database_url, None);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.catalog_file, None);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_lookup_overrides() {
        let config = from_map(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("CART_RETRY_ATTEMPTS", "5"),
            ("CART_RETRY_BACKOFF_MS", "0"),
            ("CATALOG_FILE", "fixtures/catalog.json"),
        ]);

        assert_eq!(config.port, 8081);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.database_max_connections, 4);
        assert_eq!(config.retry_policy(), RetryPolicy::immediate(5));
        assert_eq!(config.catalog_file.as_deref(), Some("fixtures/catalog.json"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = from_map(&[("PORT", "not-a-port"), ("CART_RETRY_ATTEMPTS", "-1")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn test_blank_database_url_means_in_memory() {
        let config = from_map(&[("DATABASE_URL", "  "), ("CATALOG_FILE", "")]);
        assert_eq!(config.database_url, None);
        assert_eq!(config.catalog_file, None);
    }
}
