//! Process settings read from the environment.

use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_CATALOG_PATH: &str = "catalog.json";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{name} is not a valid {expected}: '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("SECRET_KEY must be set when DATABASE_URL is set")]
    MissingSecret,
}

#[derive(Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub secret_key: Option<String>,
    pub bind_addr: String,
    pub catalog_path: PathBuf,
    pub max_body_bytes: usize,
    pub db_max_connections: u32,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("bind_addr", &self.bind_addr)
            .field("catalog_path", &self.catalog_path)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("db_max_connections", &self.db_max_connections)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Settings::from_env`] with an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL");
        let secret_key = get("SECRET_KEY");
        match (&database_url, &secret_key) {
            (Some(_), None) => return Err(SettingsError::MissingSecret),
            (None, None) => tracing::warn!("SECRET_KEY not set"),
            _ => {}
        }

        Ok(Settings {
            database_url,
            secret_key,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            catalog_path: get("CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH)),
            max_body_bytes: parse_or("MAX_BODY_BYTES", get("MAX_BODY_BYTES"), DEFAULT_MAX_BODY_BYTES)?,
            db_max_connections: parse_or(
                "DB_MAX_CONNECTIONS",
                get("DB_MAX_CONNECTIONS"),
                DEFAULT_DB_MAX_CONNECTIONS,
            )?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, SettingsError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| SettingsError::Invalid {
            name,
            expected: "positive integer",
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_database() {
        let s = settings(&[]).unwrap();
        assert!(s.database_url.is_none());
        assert_eq!(s.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(s.catalog_path, PathBuf::from("catalog.json"));
        assert_eq!(s.max_body_bytes, 1 << 20);
        assert_eq!(s.db_max_connections, 5);
    }

    #[test]
    fn database_requires_secret() {
        let err = settings(&[("DATABASE_URL", "postgres://localhost/records")]).unwrap_err();
        assert!(matches!(err, SettingsError::MissingSecret));
        let s = settings(&[
            ("DATABASE_URL", "postgres://localhost/records"),
            ("SECRET_KEY", "hunter2"),
            ("DB_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        assert_eq!(s.db_max_connections, 12);
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = settings(&[("MAX_BODY_BYTES", "lots")]).unwrap_err();
        assert_eq!(err.to_string(), "MAX_BODY_BYTES is not a valid positive integer: 'lots'");
    }

    #[test]
    fn debug_redacts_secrets() {
        let s = settings(&[("DATABASE_URL", "postgres://u:pw@h/db"), ("SECRET_KEY", "hunter2")]).unwrap();
        let shown = format!("{:?}", s);
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("pw@h"));
        assert!(shown.contains("<redacted>"));
    }
}
