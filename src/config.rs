// Connection settings for the hosted database
//
// Values come from the process environment only (a `.env` file is loaded into
// the environment by the binary first). There are no built-in fallbacks for
// the project URL or the key.

use crate::error::ConfigError;
use reqwest::Url;
use std::fmt;
use std::time::Duration;

pub const URL_VAR: &str = "SUPABASE_URL";
pub const KEY_VAR: &str = "SUPABASE_KEY";
pub const TIMEOUT_VAR: &str = "SUPABASE_TIMEOUT_SECS";

#[derive(Clone)]
pub struct DatabaseConfig {
    /// Project base URL, e.g. https://<ref>.supabase.co
    pub url: Url,
    /// Sent as both `apikey` and bearer token
    pub key: String,
    /// None keeps the HTTP client's default
    pub timeout: Option<Duration>,
}

// Keep the key out of logs and panic messages
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_str())
            .field("key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DatabaseConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let raw_url = get(URL_VAR).ok_or(ConfigError::Missing(URL_VAR))?;
        let url = Url::parse(raw_url.trim_end_matches('/'))
            .map_err(|e| ConfigError::InvalidValue(URL_VAR, e.to_string()))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(ConfigError::InvalidValue(
                URL_VAR,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        let key = get(KEY_VAR).ok_or(ConfigError::Missing(KEY_VAR))?;

        let timeout = match get(TIMEOUT_VAR) {
            None => None,
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(TIMEOUT_VAR, raw.clone()))?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue(TIMEOUT_VAR, raw));
                }
                Some(Duration::from_secs(secs))
            }
        };

        Ok(DatabaseConfig { url, key, timeout })
    }

    /// `<url>/rest/v1/<path>`
    pub fn rest_url(&self, path: &str) -> Result<Url, ConfigError> {
        let base = format!("{}/rest/v1/", self.url.as_str().trim_end_matches('/'));
        Url::parse(&base)
            .and_then(|b| b.join(path.trim_start_matches('/')))
            .map_err(|e| ConfigError::InvalidValue(URL_VAR, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_reads_url_and_key() {
        let config = DatabaseConfig::from_lookup(lookup_from(&[
            (URL_VAR, "https://example.supabase.co/"),
            (KEY_VAR, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.url.as_str(), "https://example.supabase.co/");
        assert_eq!(config.key, "secret");
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_missing_values_have_no_fallback() {
        let err = DatabaseConfig::from_lookup(lookup_from(&[(KEY_VAR, "secret")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(URL_VAR)));

        let err = DatabaseConfig::from_lookup(lookup_from(&[
            (URL_VAR, "https://example.supabase.co"),
            (KEY_VAR, "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(KEY_VAR)));
    }

    #[test]
    fn test_rejects_bad_url_and_timeout() {
        let err = DatabaseConfig::from_lookup(lookup_from(&[
            (URL_VAR, "ftp://example.com"),
            (KEY_VAR, "k"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(URL_VAR, _)));

        let err = DatabaseConfig::from_lookup(lookup_from(&[
            (URL_VAR, "https://example.supabase.co"),
            (KEY_VAR, "k"),
            (TIMEOUT_VAR, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(TIMEOUT_VAR, _)));
    }

    #[test]
    fn test_timeout_parsed() {
        let config = DatabaseConfig::from_lookup(lookup_from(&[
            (URL_VAR, "https://example.supabase.co"),
            (KEY_VAR, "k"),
            (TIMEOUT_VAR, "45"),
        ]))
        .unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_rest_url() {
        let config = DatabaseConfig::from_lookup(lookup_from(&[
            (URL_VAR, "https://example.supabase.co"),
            (KEY_VAR, "k"),
        ]))
        .unwrap();

        assert_eq!(
            config.rest_url("financial_records").unwrap().as_str(),
            "https://example.supabase.co/rest/v1/financial_records"
        );
        assert_eq!(
            config.rest_url("/rpc/exec_sql").unwrap().as_str(),
            "https://example.supabase.co/rest/v1/rpc/exec_sql"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = DatabaseConfig::from_lookup(lookup_from(&[
            (URL_VAR, "https://example.supabase.co"),
            (KEY_VAR, "super-secret-key"),
        ]))
        .unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret-key"));
    }
}
