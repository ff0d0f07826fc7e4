//! Environment-driven configuration.
//!
//! keel reads everything from the process environment once, at startup. Each
//! type offers `from_env()` for production and `from_lookup()` for tests, so
//! tests never have to mutate the real environment.

use std::fmt;

/// Database credentials gathered from the environment.
///
/// | Field | Variable |
/// |---|---|
/// | `url` | `DATABASE_URL` |
/// | `host` | `DB_HOST` |
/// | `port` | `DB_PORT` |
/// | `username` | `DB_USERNAME` |
/// | `password` | `DB_PASSWORD` |
/// | `name` | `DB` |
/// | `log_statements` | `DB_LOGS` (any non-empty value) |
///
/// Values are copied verbatim; a missing variable reads as an empty string.
/// Validation happens later, when a connector is built from these values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DbAuth {
    pub url: String,
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub name: String,
    pub log_statements: bool,
}

impl DbAuth {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).unwrap_or_default();
        Self {
            url: var("DATABASE_URL"),
            host: var("DB_HOST"),
            port: var("DB_PORT"),
            username: var("DB_USERNAME"),
            password: var("DB_PASSWORD"),
            name: var("DB"),
            log_statements: !var("DB_LOGS").is_empty(),
        }
    }
}

impl fmt::Debug for DbAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbAuth")
            .field("url", &if self.url.is_empty() { "" } else { "<redacted>" })
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("log_statements", &self.log_statements)
            .finish()
    }
}

/// Deployment mode. Gates the auth gate and the verifier's CORS headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    Production,
    /// Local and CI runs: no session-verification backend required.
    #[default]
    Development,
}

impl RunMode {
    /// Reads `RUN_MODE`. Unset or unknown values mean development.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        lookup("RUN_MODE").as_deref().map(Self::parse).unwrap_or_default()
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "release" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn db_auth_copies_every_variable_verbatim() {
        let vars = env(&[
            ("DATABASE_URL", "postgres://u:p@db:5432/app"),
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_USERNAME", "svc"),
            ("DB_PASSWORD", "s3cr3t with spaces"),
            ("DB", "orders"),
        ]);
        let auth = DbAuth::from_lookup(|k| vars.get(k).cloned());

        assert_eq!(auth.url, "postgres://u:p@db:5432/app");
        assert_eq!(auth.host, "db.internal");
        assert_eq!(auth.port, "6543");
        assert_eq!(auth.username, "svc");
        assert_eq!(auth.password, "s3cr3t with spaces");
        assert_eq!(auth.name, "orders");
        assert!(!auth.log_statements);
    }

    #[test]
    fn db_auth_missing_variables_are_empty() {
        let auth = DbAuth::from_lookup(|_| None);
        assert_eq!(auth, DbAuth::default());
    }

    #[test]
    fn db_logs_enables_statement_logging() {
        let vars = env(&[("DB_LOGS", "1")]);
        assert!(DbAuth::from_lookup(|k| vars.get(k).cloned()).log_statements);
    }

    #[test]
    fn debug_output_hides_password() {
        let auth = DbAuth { password: "hunter2".into(), ..DbAuth::default() };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }

    #[test]
    fn run_mode_parsing() {
        assert_eq!(RunMode::parse("production"), RunMode::Production);
        assert_eq!(RunMode::parse(" Release "), RunMode::Production);
        assert_eq!(RunMode::parse("prod"), RunMode::Production);
        assert_eq!(RunMode::parse("debug"), RunMode::Development);
        assert_eq!(RunMode::parse(""), RunMode::Development);
        assert_eq!(RunMode::from_lookup(|_| None), RunMode::Development);
    }
}
