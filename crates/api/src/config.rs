//! Process configuration, read once from the environment at startup.

use chrono::Duration;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "natours-dev-secret-change-me";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_JWT_TTL: &str = "90d";
const DEFAULT_COOKIE_DAYS: i64 = 90;
const DEFAULT_BODY_LIMIT: usize = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be one of {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("USE_PERSISTENT_STORES is set but DATABASE_URL is missing")]
    MissingDatabaseUrl,
}

/// Seed administrator created at startup when absent.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub jwt_cookie_ttl: Duration,
    pub body_limit_bytes: usize,
    /// Postgres connection string; `None` keeps everything in memory.
    pub database_url: Option<String>,
    pub admin: Option<AdminBootstrap>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("environment", &self.environment)
            .field("port", &self.port)
            .field("jwt_ttl", &self.jwt_ttl)
            .field("jwt_cookie_ttl", &self.jwt_cookie_ttl)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("persistent", &self.database_url.is_some())
            .field("admin", &self.admin)
            .finish_non_exhaustive()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            port: DEFAULT_PORT,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_ttl: Duration::days(90),
            jwt_cookie_ttl: Duration::days(DEFAULT_COOKIE_DAYS),
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            database_url: None,
            admin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match var("NATOURS_ENV").as_deref() {
            None | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "NATOURS_ENV",
                    expected: "development, production",
                    value: other.to_string(),
                });
            }
        };

        let port = match var("PORT") {
            None => DEFAULT_PORT,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                expected: "a port number",
                value: raw,
            })?,
        };

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let raw_ttl = var("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_JWT_TTL.to_string());
        let jwt_ttl = parse_duration(&raw_ttl).ok_or(ConfigError::Invalid {
            var: "JWT_EXPIRES_IN",
            expected: "a positive span such as 90d, 12h, 30m or 45s",
            value: raw_ttl.clone(),
        })?;

        let jwt_cookie_ttl = match var("JWT_COOKIE_EXPIRES_IN") {
            None => Duration::days(DEFAULT_COOKIE_DAYS),
            Some(raw) => match raw.parse::<i64>() {
                Ok(days) if days > 0 => Duration::days(days),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "JWT_COOKIE_EXPIRES_IN",
                        expected: "a positive number of days",
                        value: raw,
                    });
                }
            },
        };

        let body_limit_bytes = match var("BODY_LIMIT_BYTES") {
            None => DEFAULT_BODY_LIMIT,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "BODY_LIMIT_BYTES",
                expected: "a byte count",
                value: raw,
            })?,
        };

        let use_persistent = var("USE_PERSISTENT_STORES")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);
        let database_url = if use_persistent {
            Some(var("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?)
        } else {
            None
        };

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap { email, password }),
            _ => None,
        };

        Ok(Self {
            environment,
            port,
            jwt_secret,
            jwt_ttl,
            jwt_cookie_ttl,
            body_limit_bytes,
            database_url,
            admin,
        })
    }
}

/// `90d`, `12h`, `30m`, `45s`; a bare number is seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let amount: i64 = digits.parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        "" | "s" => Some(Duration::seconds(amount)),
        "m" => Some(Duration::minutes(amount)),
        "h" => Some(Duration::hours(amount)),
        "d" => Some(Duration::days(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.jwt_ttl, Duration::days(90));
        assert_eq!(cfg.jwt_cookie_ttl, Duration::days(90));
        assert_eq!(cfg.body_limit_bytes, 10 * 1024);
        assert!(cfg.database_url.is_none());
        assert!(cfg.admin.is_none());
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("NATOURS_ENV", "production"),
            ("PORT", "8080"),
            ("JWT_SECRET", "s3cret"),
            ("JWT_EXPIRES_IN", "12h"),
            ("JWT_COOKIE_EXPIRES_IN", "7"),
            ("BODY_LIMIT_BYTES", "2048"),
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/natours"),
            ("ADMIN_EMAIL", "admin@natours.io"),
            ("ADMIN_PASSWORD", "pass1234"),
        ])
        .unwrap();

        assert!(cfg.environment.is_production());
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.jwt_ttl, Duration::hours(12));
        assert_eq!(cfg.jwt_cookie_ttl, Duration::days(7));
        assert_eq!(cfg.body_limit_bytes, 2048);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/natours"));
        assert_eq!(cfg.admin.unwrap().email, "admin@natours.io");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("NATOURS_ENV", "staging")]),
            Err(ConfigError::Invalid { var: "NATOURS_ENV", .. })
        ));
        assert!(matches!(
            config(&[("JWT_EXPIRES_IN", "soon")]),
            Err(ConfigError::Invalid { var: "JWT_EXPIRES_IN", .. })
        ));
        assert_eq!(
            config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err(),
            ConfigError::MissingDatabaseUrl
        );
    }

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("90d"), Some(Duration::days(90)));
        assert_eq!(parse_duration("30m"), Some(Duration::minutes(30)));
        assert_eq!(parse_duration("45s"), Some(Duration::seconds(45)));
        assert_eq!(parse_duration("120"), Some(Duration::seconds(120)));
        assert_eq!(parse_duration("0d"), None);
        assert_eq!(parse_duration("2w"), None);
        assert_eq!(parse_duration("d"), None);
    }
}
