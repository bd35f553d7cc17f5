use std::path::PathBuf;

use axum_extra::extract::cookie::SameSite;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};
use jsonwebtoken::Algorithm;
use thiserror::Error;

/// Errors that prevent the service from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SECRET_KEY must be set")]
    MissingSecretKey,
    #[error("unsupported signing algorithm '{0}' (expected HS256, HS384 or HS512)")]
    UnsupportedAlgorithm(String),
    #[error("invalid COOKIE_SAMESITE value '{0}' (expected lax, strict or none)")]
    InvalidSameSite(String),
    #[error("ACCESS_TOKEN_EXPIRE_HOURS must be positive, got {0}")]
    InvalidTokenTtl(i64),
}

/// Raw settings as read from flags, the environment and `.env`.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Directory holding the default SQLite database
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// SQLite connection URL (defaults to DATA_DIR/conversations.db)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Maximum number of pooled database connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub database_max_connections: u32,

    /// Secret used to sign session tokens
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Token signing algorithm
    #[arg(long, env = "JWT_ALGORITHM", default_value = "HS256")]
    pub jwt_algorithm: String,

    /// Session lifetime in hours
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE_HOURS", default_value_t = 1)]
    pub access_token_expire_hours: i64,

    /// Username of the admin account created at startup
    #[arg(long, env = "ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    /// Password of the admin account created at startup
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Set the Secure flag on the session cookie
    #[arg(
        long,
        env = "COOKIE_SECURE",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub cookie_secure: bool,

    /// SameSite policy of the session cookie
    #[arg(long, env = "COOKIE_SAMESITE", default_value = "lax")]
    pub cookie_samesite: String,

    /// Comma separated list of allowed cross-origin request origins
    #[arg(long, env = "CORS_ORIGINS", default_value = "")]
    pub cors_origins: String,

    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cookie: CookieConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn in_data_dir(data_dir: &std::path::Path) -> Self {
        Self {
            url: format!(
                "sqlite:{}?mode=rwc",
                data_dir.join("conversations.db").display()
            ),
            max_connections: 5,
        }
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub token_ttl_hours: i64,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl AuthConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            algorithm: Algorithm::HS256,
            token_ttl_hours: 1,
            admin_username: None,
            admin_password: None,
        }
    }

    /// Admin bootstrap credentials, only when both halves are present.
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (self.admin_username.as_deref(), self.admin_password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &self.admin_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn parse(origins: &str) -> Self {
        Self {
            allowed_origins: origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn parse_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(ConfigError::UnsupportedAlgorithm(value.to_string())),
    }
}

fn parse_same_site(value: &str) -> Result<SameSite, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        _ => Err(ConfigError::InvalidSameSite(value.to_string())),
    }
}

impl Config {
    pub fn from_args(args: ConfigArgs) -> Result<Self, ConfigError> {
        let secret_key = args
            .secret_key
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingSecretKey)?;

        if args.access_token_expire_hours <= 0 {
            return Err(ConfigError::InvalidTokenTtl(args.access_token_expire_hours));
        }

        let mut database = DatabaseConfig::in_data_dir(&args.data_dir);
        if let Some(url) = args.database_url.filter(|u| !u.trim().is_empty()) {
            database.url = url;
        }
        database.max_connections = args.database_max_connections.max(1);

        Ok(Self {
            server: ServerConfig {
                host: args.host,
                port: args.port,
                data_dir: args.data_dir,
            },
            database,
            auth: AuthConfig {
                secret_key,
                algorithm: parse_algorithm(&args.jwt_algorithm)?,
                token_ttl_hours: args.access_token_expire_hours,
                admin_username: args.admin_username,
                admin_password: args.admin_password,
            },
            cookie: CookieConfig {
                secure: args.cookie_secure,
                same_site: parse_same_site(&args.cookie_samesite)?,
            },
            cors: CorsConfig::parse(&args.cors_origins),
            logging: LoggingConfig {
                level: args.log_level,
            },
        })
    }

    /// Defaults for everything except the signing secret.
    pub fn with_secret(secret_key: impl Into<String>) -> Self {
        let server = ServerConfig::default();
        Self {
            database: DatabaseConfig::in_data_dir(&server.data_dir),
            server,
            auth: AuthConfig::new(secret_key),
            cookie: CookieConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ConfigArgs,
    }

    fn args(extra: &[&str]) -> ConfigArgs {
        let mut argv = vec!["chatledger"];
        argv.extend_from_slice(extra);
        TestCli::try_parse_from(argv).unwrap().config
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let mut a = args(&[]);
        a.secret_key = None;
        assert_eq!(
            Config::from_args(a).unwrap_err(),
            ConfigError::MissingSecretKey
        );

        let mut a = args(&[]);
        a.secret_key = Some("   ".to_string());
        assert_eq!(
            Config::from_args(a).unwrap_err(),
            ConfigError::MissingSecretKey
        );
    }

    #[test]
    fn test_defaults() {
        let mut a = args(&["--data-dir", "/tmp/ledger"]);
        a.secret_key = Some("s3cret".to_string());
        a.database_url = None;
        a.admin_username = None;
        a.admin_password = None;
        a.jwt_algorithm = "HS256".to_string();
        a.access_token_expire_hours = 1;
        a.cookie_samesite = "lax".to_string();

        let config = Config::from_args(a).unwrap();
        assert_eq!(config.auth.algorithm, Algorithm::HS256);
        assert_eq!(config.auth.token_ttl_hours, 1);
        assert_eq!(
            config.database.url,
            "sqlite:/tmp/ledger/conversations.db?mode=rwc"
        );
        assert_eq!(config.cookie.same_site, SameSite::Lax);
        assert!(config.auth.admin_credentials().is_none());
    }

    #[test]
    fn test_rejects_asymmetric_algorithm() {
        assert!(matches!(
            parse_algorithm("RS256"),
            Err(ConfigError::UnsupportedAlgorithm(_))
        ));
        assert_eq!(parse_algorithm("hs512").unwrap(), Algorithm::HS512);
    }

    #[test]
    fn test_same_site_values() {
        assert_eq!(parse_same_site("Strict").unwrap(), SameSite::Strict);
        assert_eq!(parse_same_site("none").unwrap(), SameSite::None);
        assert!(parse_same_site("sometimes").is_err());
    }

    #[test]
    fn test_log_level_is_carried_into_config() {
        let mut a = args(&["--log-level", "debug"]);
        a.secret_key = Some("s3cret".to_string());
        a.access_token_expire_hours = 1;
        a.jwt_algorithm = "HS256".to_string();
        a.cookie_samesite = "lax".to_string();

        let config = Config::from_args(a).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cookie_secure_can_be_disabled() {
        let a = args(&["--cookie-secure", "false"]);
        assert!(!a.cookie_secure);
        let a = args(&["--cookie-secure", "true"]);
        assert!(a.cookie_secure);
    }

    #[test]
    fn test_non_positive_ttl() {
        let mut a = args(&[]);
        a.secret_key = Some("s3cret".to_string());
        a.access_token_expire_hours = 0;
        assert_eq!(
            Config::from_args(a).unwrap_err(),
            ConfigError::InvalidTokenTtl(0)
        );
    }

    #[test]
    fn test_cors_origins_parsing() {
        let cors = CorsConfig::parse(" https://a.example , ,https://b.example,");
        assert_eq!(
            cors.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(CorsConfig::parse("").allowed_origins.is_empty());
    }

    #[test]
    fn test_admin_credentials_need_both_halves() {
        let mut auth = AuthConfig::new("k");
        auth.admin_username = Some("admin".to_string());
        assert!(auth.admin_credentials().is_none());
        auth.admin_password = Some("secret".to_string());
        assert_eq!(auth.admin_credentials(), Some(("admin", "secret")));
    }
}
