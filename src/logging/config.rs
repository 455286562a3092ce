/**
 * Logging Configuration
 * Settings for the subscriber, read from the environment
 */
use std::path::PathBuf;

use crate::config::Environment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default directive for this crate when `RUST_LOG` is unset
    pub level: String,
    /// Directory for the rolling `app.log` / `error.log` files
    pub dir: PathBuf,
    /// JSON lines instead of the human-readable format
    pub json: bool,
    /// Write log files at all; console output is always on
    pub files: bool,
}

impl LogConfig {
    pub fn for_environment(environment: Environment) -> Self {
        let production = environment == Environment::Production;
        Self {
            level: if production { "info" } else { "debug" }.to_string(),
            dir: PathBuf::from("logs"),
            json: production,
            files: environment != Environment::Test,
        }
    }

    /// `LOG_LEVEL`, `LOG_DIR` and `LOG_FORMAT` (`json` | `pretty`) override the defaults.
    pub fn from_env(environment: Environment) -> Self {
        let defaults = Self::for_environment(environment);
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or(defaults.level),
            dir: std::env::var("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.dir),
            json: match std::env::var("LOG_FORMAT").as_deref() {
                Ok("json") => true,
                Ok("pretty") => false,
                _ => defaults.json,
            },
            files: defaults.files,
        }
    }

    pub fn filter_directive(&self) -> String {
        format!(
            "portfolio_cms={},tower_http=debug,axum=debug,sqlx=warn",
            self.level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults() {
        let prod = LogConfig::for_environment(Environment::Production);
        assert!(prod.json);
        assert_eq!(prod.level, "info");

        let dev = LogConfig::for_environment(Environment::Development);
        assert!(!dev.json);
        assert!(dev.files);
        assert!(dev.filter_directive().starts_with("portfolio_cms=debug"));

        assert!(!LogConfig::for_environment(Environment::Test).files);
    }
}
