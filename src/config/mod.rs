use std::path::PathBuf;

use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;

/// Configuration for the API server
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    /// HMAC secret used to sign access and refresh tokens
    pub jwt_secret: String,
    /// Shared secret required to register admin and staff accounts
    pub super_key: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Root directory for stored uploads, served under `/static/uploads`
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    #[serde(default)]
    pub run_migrations: bool,
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub mail_from: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_connections() -> u32 {
    5
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("static/uploads")
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_access_token_minutes() -> i64 {
    15
}

fn default_refresh_token_days() -> i64 {
    30
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables from a `.env` file are loaded first when one exists.
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let config = envy::from_env::<Config>()?;

        Ok(config)
    }

    /// Build a configuration from an explicit list of variables
    #[cfg(test)]
    pub fn from_iter<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter::<_, Config>(vars)?)
    }

    /// Get a direct reference to the database URL
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Address the HTTP listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Largest accepted request body: one upload plus room for the other form fields
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes + 1024 * 1024
    }

    /// SMTP settings, present only when every mail variable is set
    pub fn smtp(&self) -> Option<SmtpSettings> {
        match (&self.smtp_host, &self.smtp_username, &self.smtp_password, &self.mail_from) {
            (Some(host), Some(username), Some(password), Some(from)) => Some(SmtpSettings {
                host: host.clone(),
                username: username.clone(),
                password: password.clone(),
                from: from.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    let config = Config::load()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/kayzonale".to_string()),
            ("JWT_SECRET".to_string(), "secret".to_string()),
            ("SUPER_KEY".to_string(), "super".to_string()),
        ];
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        vars
    }

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let config = Config::from_iter(vars(&[])).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.body_limit(), 6 * 1024 * 1024);
        assert_eq!(config.access_token_minutes, 15);
        assert!(!config.run_migrations);
        assert!(config.smtp().is_none());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let vars = vec![("DATABASE_URL".to_string(), "postgres://localhost/db".to_string())];
        assert!(Config::from_iter(vars).is_err());
    }

    #[test]
    fn smtp_requires_every_field() {
        let partial = Config::from_iter(vars(&[("SMTP_HOST", "smtp.example.com")])).unwrap();
        assert!(partial.smtp().is_none());

        let full = Config::from_iter(vars(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "mailer"),
            ("SMTP_PASSWORD", "pw"),
            ("MAIL_FROM", "shop@example.com"),
            ("PORT", "8080"),
        ]))
        .unwrap();
        assert_eq!(full.port, 8080);
        assert_eq!(full.smtp().unwrap().host, "smtp.example.com");
    }
}
