//! Server configuration for the clinical store REST API.
//!
//! Configuration comes from command line arguments, environment variables
//! or code.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HCS_SERVER_PORT` | 8080 | Server port |
//! | `HCS_SERVER_HOST` | 127.0.0.1 | Host to bind |
//! | `HCS_LOG_LEVEL` | info | Log level |
//! | `HCS_MAX_BODY_SIZE` | 10485760 | Max request body (bytes) |
//! | `HCS_REQUEST_TIMEOUT` | 30 | Request timeout (seconds) |
//! | `HCS_ENABLE_CORS` | true | Enable CORS |
//! | `HCS_CORS_ORIGINS` | * | Allowed origins |
//! | `HCS_CORS_METHODS` | GET,POST,PUT,PATCH,DELETE,OPTIONS | Allowed methods |
//! | `HCS_CORS_HEADERS` | Content-Type,Accept,If-Match,... | Allowed headers |
//! | `HCS_BASE_URL` | http://localhost:8080 | Base URL for links and `Location` |
//! | `HCS_DATABASE_PATH` | hcs.db | SQLite file, or `:memory:` |
//! | `HCS_DEFAULT_PAGE_SIZE` | 20 | Default `_count` |
//! | `HCS_MAX_PAGE_SIZE` | 1000 | Upper bound for `_count` |
//! | `HCS_DEFAULT_FHIR_VERSION` | R4 | Version used when a request names none |
//!
//! # Example
//!
//! ```rust
//! use helios_store_rest::ServerConfig;
//!
//! let config = ServerConfig {
//!     port: 3000,
//!     host: "0.0.0.0".to_string(),
//!     database_path: ":memory:".to_string(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use clap::Parser;

use crate::version::FhirVersion;

const DEFAULT_CORS_HEADERS: &str =
    "Content-Type,Accept,If-Match,If-None-Match,If-None-Exist,If-Modified-Since,Prefer";

/// Server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "hcs")]
#[command(about = "Helios clinical store server")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(short, long, env = "HCS_SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "HCS_SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "HCS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum request body size in bytes.
    #[arg(long, env = "HCS_MAX_BODY_SIZE", default_value = "10485760")]
    pub max_body_size: usize,

    /// Request timeout in seconds.
    #[arg(long, env = "HCS_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Enable CORS.
    #[arg(long, env = "HCS_ENABLE_CORS", default_value = "true")]
    pub enable_cors: bool,

    /// Allowed CORS origins (comma-separated, or * for all).
    #[arg(long, env = "HCS_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Allowed CORS methods (comma-separated, or * for all).
    #[arg(
        long,
        env = "HCS_CORS_METHODS",
        default_value = "GET,POST,PUT,PATCH,DELETE,OPTIONS"
    )]
    pub cors_methods: String,

    /// Allowed CORS headers (comma-separated, or * for all).
    #[arg(long, env = "HCS_CORS_HEADERS", default_value = DEFAULT_CORS_HEADERS)]
    pub cors_headers: String,

    /// Base URL used in `Location` headers, `fullUrl`s and bundle links.
    #[arg(long, env = "HCS_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// SQLite database file. `:memory:` keeps everything in memory.
    #[arg(long, env = "HCS_DATABASE_PATH", default_value = "hcs.db")]
    pub database_path: String,

    /// Default page size for searches without `_count`.
    #[arg(long, env = "HCS_DEFAULT_PAGE_SIZE", default_value = "20")]
    pub default_page_size: u32,

    /// Maximum page size; larger `_count` values are capped.
    #[arg(long, env = "HCS_MAX_PAGE_SIZE", default_value = "1000")]
    pub max_page_size: u32,

    /// FHIR version assumed when `Accept` / `Content-Type` carry no `fhirVersion`.
    #[arg(long, env = "HCS_DEFAULT_FHIR_VERSION", default_value = "R4")]
    pub default_fhir_version: FhirVersion,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
            request_timeout: 30,
            enable_cors: true,
            cors_origins: "*".to_string(),
            cors_methods: "GET,POST,PUT,PATCH,DELETE,OPTIONS".to_string(),
            cors_headers: DEFAULT_CORS_HEADERS.to_string(),
            base_url: "http://localhost:8080".to_string(),
            database_path: "hcs.db".to_string(),
            default_page_size: 20,
            max_page_size: 1000,
            default_fhir_version: FhirVersion::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the environment only, ignoring
    /// command line arguments. Falls back to defaults on parse errors.
    pub fn from_env() -> Self {
        Self::try_parse_from(["hcs"]).unwrap_or_default()
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Returns `true` when the database lives in memory.
    pub fn is_memory_database(&self) -> bool {
        self.database_path == ":memory:"
    }

    /// Validates the configuration, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_body_size == 0 {
            errors.push("Max body size cannot be 0".to_string());
        }

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.default_page_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }

        if self.default_page_size > self.max_page_size {
            errors.push("Default page size cannot exceed max page size".to_string());
        }

        if self.database_path.trim().is_empty() {
            errors.push("Database path cannot be empty".to_string());
        }

        if url::Url::parse(&self.base_url).is_err() {
            errors.push(format!("Base URL '{}' is not a valid URL", self.base_url));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing: in-memory database,
    /// ephemeral port, small pages, no CORS.
    pub fn for_testing() -> Self {
        Self {
            port: 0,
            log_level: "debug".to_string(),
            request_timeout: 5,
            enable_cors: false,
            base_url: "http://localhost:8080".to_string(),
            database_path: ":memory:".to_string(),
            default_page_size: 10,
            max_page_size: 100,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.enable_cors);
        assert_eq!(config.default_fhir_version, FhirVersion::R4);
        assert!(!config.is_memory_database());
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            port: 3000,
            host: "0.0.0.0".to_string(),
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let config = ServerConfig {
            base_url: "https://fhir.example.com/r4/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.base_url(), "https://fhir.example.com/r4");
    }

    #[test]
    fn test_validate_valid() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(ServerConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let config = ServerConfig {
            request_timeout: 0,
            default_page_size: 100,
            max_page_size: 50,
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("timeout")));
        assert!(errors.iter().any(|e| e.contains("page size")));
        assert!(errors.iter().any(|e| e.contains("Base URL")));
    }

    #[test]
    fn test_parse_from_args() {
        let config = ServerConfig::try_parse_from([
            "hcs",
            "--port",
            "9090",
            "--database-path",
            ":memory:",
            "--default-fhir-version",
            "R5",
        ])
        .unwrap();
        assert_eq!(config.port, 9090);
        assert!(config.is_memory_database());
        assert_eq!(config.default_fhir_version, FhirVersion::R5);
    }

    #[test]
    fn test_for_testing() {
        let config = ServerConfig::for_testing();
        assert_eq!(config.port, 0);
        assert!(!config.enable_cors);
        assert!(config.is_memory_database());
    }
}
