//! Environment-driven application configuration.
//!
//! Everything is read once at startup by [`AppConfig::from_env`] and shared
//! read-only through the application state.

use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";
pub const DEFAULT_REFRESH_SECRET: &str = "default-refresh-secret-change-in-production";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
    /// Public base URL the providers redirect back to
    pub callback_base: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp: Option<SmtpConfig>,
    pub from_name: String,
    pub from_email: String,
    /// Recipient of contact-form notifications
    pub admin_email: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u64,
}

/// Connection pool sizing; the URL itself lives on [`AppConfig::database_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbPoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 10,
            idle_timeout_secs: 300,
        }
    }
}

impl DbPoolConfig {
    /// `DB_POOL_MAX`, `DB_POOL_MIN`, `DB_CONNECT_TIMEOUT`, `DB_IDLE_TIMEOUT` from `source`.
    fn from_source(source: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_connections: parse_from(&source, "DB_POOL_MAX", defaults.max_connections),
            min_connections: parse_from(&source, "DB_POOL_MIN", defaults.min_connections),
            connect_timeout_secs: parse_from(
                &source,
                "DB_CONNECT_TIMEOUT",
                defaults.connect_timeout_secs,
            ),
            idle_timeout_secs: parse_from(&source, "DB_IDLE_TIMEOUT", defaults.idle_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub allowed_types: Vec<String>,
    pub dir: PathBuf,
    pub cloudinary: Option<CloudinaryConfig>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub client_url: String,
    pub allowed_origins: Vec<String>,
    pub database_url: Option<String>,
    pub db_pool: DbPoolConfig,
    pub redis_url: Option<String>,
    pub jwt: JwtConfig,
    pub bcrypt_cost: u32,
    pub oauth: OAuthConfig,
    pub mail: MailConfig,
    pub rate_limit: RateLimitConfig,
    pub upload: UploadConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            host: "127.0.0.1".to_string(),
            port: 5000,
            client_url: "http://localhost:3000".to_string(),
            allowed_origins: Vec::new(),
            database_url: None,
            db_pool: DbPoolConfig::default(),
            redis_url: None,
            jwt: JwtConfig {
                access_secret: DEFAULT_JWT_SECRET.to_string(),
                refresh_secret: DEFAULT_REFRESH_SECRET.to_string(),
                access_ttl: chrono::Duration::minutes(15),
                refresh_ttl: chrono::Duration::days(30),
            },
            bcrypt_cost: bcrypt::DEFAULT_COST,
            oauth: OAuthConfig {
                google: None,
                github: None,
                callback_base: "http://localhost:5000".to_string(),
            },
            mail: MailConfig {
                smtp: None,
                from_name: "Portfolio".to_string(),
                from_email: "noreply@portfolio.local".to_string(),
                admin_email: "admin@portfolio.com".to_string(),
            },
            rate_limit: RateLimitConfig {
                window: Duration::from_millis(15 * 60 * 1000),
                max_requests: 100,
            },
            upload: UploadConfig {
                max_file_size: 5 * 1024 * 1024,
                allowed_types: vec![
                    "image/jpeg".to_string(),
                    "image/png".to_string(),
                    "image/webp".to_string(),
                    "application/pdf".to_string(),
                ],
                dir: PathBuf::from("uploads"),
                cloudinary: None,
            },
        }
    }
}

impl AppConfig {
    /// Build from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let access_secret = var("JWT_SECRET").unwrap_or(defaults.jwt.access_secret);
        let refresh_secret = var("JWT_REFRESH_SECRET").unwrap_or(defaults.jwt.refresh_secret);

        let smtp = var("SMTP_HOST").map(|host| SmtpConfig {
            host,
            port: parse_or("SMTP_PORT", 587),
            user: var("SMTP_USER").unwrap_or_default(),
            pass: var("SMTP_PASS").unwrap_or_default(),
        });

        let cloudinary = match (
            var("CLOUDINARY_CLOUD_NAME"),
            var("CLOUDINARY_API_KEY"),
            var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let port = parse_or("PORT", defaults.port);

        Self {
            environment: parse_or("ENVIRONMENT", defaults.environment),
            host: var("HOST").unwrap_or(defaults.host),
            port,
            client_url: var("CLIENT_URL").unwrap_or(defaults.client_url),
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            database_url: var("DATABASE_URL"),
            db_pool: DbPoolConfig::from_source(var),
            redis_url: var("REDIS_URL"),
            jwt: JwtConfig {
                access_secret,
                refresh_secret,
                access_ttl: chrono::Duration::minutes(parse_or("JWT_ACCESS_EXPIRY_MINUTES", 15)),
                refresh_ttl: chrono::Duration::days(parse_or("JWT_REFRESH_EXPIRY_DAYS", 30)),
            },
            bcrypt_cost: parse_or("BCRYPT_COST", defaults.bcrypt_cost),
            oauth: OAuthConfig {
                google: oauth_client("GOOGLE"),
                github: oauth_client("GITHUB"),
                callback_base: var("OAUTH_CALLBACK_BASE")
                    .unwrap_or_else(|| format!("http://localhost:{}", port)),
            },
            mail: MailConfig {
                smtp,
                from_name: var("FROM_NAME").unwrap_or(defaults.mail.from_name),
                from_email: var("FROM_EMAIL").unwrap_or(defaults.mail.from_email),
                admin_email: var("ADMIN_EMAIL").unwrap_or(defaults.mail.admin_email),
            },
            rate_limit: RateLimitConfig {
                window: Duration::from_millis(parse_or("RATE_LIMIT_WINDOW_MS", 15 * 60 * 1000)),
                max_requests: parse_or("RATE_LIMIT_MAX_REQUESTS", 100),
            },
            upload: UploadConfig {
                max_file_size: parse_or("MAX_FILE_SIZE", defaults.upload.max_file_size),
                allowed_types: var("ALLOWED_FILE_TYPES")
                    .map(|s| s.split(',').map(|t| t.trim().to_string()).collect())
                    .unwrap_or(defaults.upload.allowed_types),
                dir: var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload.dir),
                cloudinary,
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Refuse insecure signing secrets outside development.
    pub fn check_secrets(&self) -> Result<(), String> {
        if !self.is_production() {
            return Ok(());
        }
        if self.jwt.access_secret.is_empty() || self.jwt.access_secret == DEFAULT_JWT_SECRET {
            return Err("JWT_SECRET must be set to a secure, unique value in production".into());
        }
        if self.jwt.refresh_secret.is_empty()
            || self.jwt.refresh_secret == DEFAULT_REFRESH_SECRET
            || self.jwt.refresh_secret == self.jwt.access_secret
        {
            return Err(
                "JWT_REFRESH_SECRET must be set and differ from JWT_SECRET in production".into(),
            );
        }
        Ok(())
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    parse_from(var, key, default)
}

fn parse_from<T>(source: impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match source(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default");
            default
        }),
        None => default,
    }
}

fn oauth_client(prefix: &str) -> Option<OAuthClientConfig> {
    let client_id = var(&format!("{prefix}_CLIENT_ID"))?;
    let client_secret = var(&format!("{prefix}_CLIENT_SECRET"))?;
    Some(OAuthClientConfig {
        client_id,
        client_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parses_aliases() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("Development".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_default_rate_limit_matches_fifteen_minutes() {
        let config = AppConfig::default();
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.upload.max_file_size, 5 * 1024 * 1024);
    }

    #[test]
    fn test_production_rejects_default_secrets() {
        let mut config = AppConfig {
            environment: Environment::Production,
            ..AppConfig::default()
        };
        assert!(config.check_secrets().is_err());

        config.jwt.access_secret = "a-long-random-access-secret".into();
        config.jwt.refresh_secret = config.jwt.access_secret.clone();
        assert!(config.check_secrets().is_err());

        config.jwt.refresh_secret = "another-long-random-secret".into();
        assert!(config.check_secrets().is_ok());
    }

    #[test]
    fn test_development_allows_default_secrets() {
        assert!(AppConfig::default().check_secrets().is_ok());
    }

    #[test]
    fn test_malformed_pool_size_falls_back_to_default() {
        let pool = DbPoolConfig::from_source(|key| match key {
            "DB_POOL_MAX" => Some("not-a-number".to_string()),
            "DB_IDLE_TIMEOUT" => Some(" 60 ".to_string()),
            _ => None,
        });
        assert_eq!(pool.max_connections, 10);
        assert_eq!(pool.min_connections, 2);
        assert_eq!(pool.idle_timeout_secs, 60);
        assert_eq!(DbPoolConfig::from_source(|_| None), DbPoolConfig::default());
    }
}
