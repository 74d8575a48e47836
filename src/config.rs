use anyhow::Context;
use subscription_types::subscription::service::ValidationPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl DbConfig {
    pub fn connection_string(&self) -> String {
        let Self {
            host,
            port,
            user,
            password,
            name,
        } = self;
        format!("host={host} port={port} user={user} dbname={name} password={password}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server_address: String,
    pub server_port: u16,
    pub db: DbConfig,
    pub validation: ValidationPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as missing and fall back to defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, anyhow::Error> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let server_port = var("SERVER_PORT", "8080")
            .parse()
            .context("SERVER_PORT is not a valid port")?;
        let db_port = var("DB_PORT", "5432")
            .parse()
            .context("DB_PORT is not a valid port")?;
        let ssl_mode = var("SSL_MODE", "disable");
        if ssl_mode != "disable" {
            return Err(anyhow::anyhow!(
                "SSL_MODE={ssl_mode} is not supported, only plain connections are available"
            ));
        }
        let user = var("DB_USER", "postgres");
        Ok(Self {
            server_address: var("SERVER_ADDRESS", "0.0.0.0"),
            server_port,
            db: DbConfig {
                host: var("DB_HOST", "localhost"),
                port: db_port,
                password: var("DB_PASSWORD", "postgres"),
                name: var("DB_NAME", &user),
                user,
            },
            validation: var("SUBSCRIPTION_VALIDATION", "lenient").parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let vars: HashMap<_, _> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn falls_back_to_defaults() {
        let cfg = config(&[("DB_HOST", "  ")]).unwrap();
        assert_eq!(cfg.server_address, "0.0.0.0");
        assert_eq!(cfg.server_port, 8080);
        assert_eq!(cfg.db.host, "localhost");
        assert_eq!(cfg.db.name, "postgres");
        assert_eq!(cfg.validation, ValidationPolicy::Lenient);
        assert_eq!(
            cfg.db.connection_string(),
            "host=localhost port=5432 user=postgres dbname=postgres password=postgres"
        );
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("SERVER_PORT", "9000"),
            ("DB_USER", "subs"),
            ("DB_PORT", "6543"),
            ("SUBSCRIPTION_VALIDATION", "strict"),
        ])
        .unwrap();
        assert_eq!(cfg.server_port, 9000);
        assert_eq!(cfg.db.port, 6543);
        assert_eq!(cfg.db.name, "subs");
        assert_eq!(cfg.validation, ValidationPolicy::Strict);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("SERVER_PORT", "http")]).is_err());
        assert!(config(&[("SSL_MODE", "require")]).is_err());
        assert!(config(&[("SUBSCRIPTION_VALIDATION", "sometimes")]).is_err());
    }
}
