use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing::info;

use snipbox_api::oauth::{OAuthClient, OAuthProviders};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub session_days: i64,
    pub oauth: OAuthProviders,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("SNIPBOX_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SNIPBOX_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let host = get("SNIPBOX_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&get, "SNIPBOX_PORT", 3000)?;
        let public_url = get("SNIPBOX_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        let session_days: i64 = parse_or(&get, "SNIPBOX_SESSION_DAYS", 7)?;
        if session_days < 1 {
            bail!("SNIPBOX_SESSION_DAYS must be at least 1");
        }

        Ok(Self {
            host,
            port,
            jwt_secret,
            db_path: get("SNIPBOX_DB_PATH").unwrap_or_else(|| "snipbox.db".into()).into(),
            storage_dir: get("SNIPBOX_STORAGE_DIR").unwrap_or_else(|| "./storage".into()).into(),
            public_url,
            session_days,
            oauth: OAuthProviders {
                github: oauth_client(&get, "GITHUB"),
                google: oauth_client(&get, "GOOGLE"),
            },
        })
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("Invalid {key} value '{raw}'")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

/// A provider is enabled only when both its id and secret are set.
fn oauth_client<F>(get: &F, provider: &str) -> Option<OAuthClient>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = get(&format!("SNIPBOX_{provider}_CLIENT_ID")).filter(|v| !v.is_empty())?;
    let client_secret = get(&format!("SNIPBOX_{provider}_CLIENT_SECRET")).filter(|v| !v.is_empty())?;
    Some(OAuthClient {
        client_id,
        client_secret,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(load(&[]).is_err());
        assert!(load(&[("SNIPBOX_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("SNIPBOX_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.public_url, "http://localhost:3000");
        assert_eq!(config.session_days, 7);
        assert!(config.oauth.github.is_none());
        assert!(config.oauth.google.is_none());
    }

    #[test]
    fn provider_needs_id_and_secret() {
        let config = load(&[
            ("SNIPBOX_JWT_SECRET", "s3cret"),
            ("SNIPBOX_GITHUB_CLIENT_ID", "id"),
            ("SNIPBOX_GOOGLE_CLIENT_ID", "id"),
            ("SNIPBOX_GOOGLE_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        assert!(config.oauth.github.is_none());
        assert_eq!(config.oauth.google.unwrap().client_secret, "secret");
    }

    #[test]
    fn bad_numbers_error() {
        assert!(load(&[("SNIPBOX_JWT_SECRET", "s"), ("SNIPBOX_PORT", "http")]).is_err());
        assert!(load(&[("SNIPBOX_JWT_SECRET", "s"), ("SNIPBOX_SESSION_DAYS", "0")]).is_err());
    }
}
