//! Runtime settings from the environment (and an optional `.env` file).
//!
//! Everything is validated up front in [`Settings::from_env`] so that a bad
//! value fails before a browser process is started. Command-line flags are
//! layered on top with [`Settings::apply`].

use crate::error::ConfigError;
use crate::scrapers::paginate::PAGE_PLACEHOLDER;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://score.golfdigest.co.jp/";
pub const DEFAULT_SCORE_DETAIL_URL: &str =
    "https://score.golfdigest.co.jp/member/score_detail.asp?page={page}";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// A value that must never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("**********")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("**********")
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub login_id: String,
    pub password: Secret,
    pub headless: bool,
    /// Upper bound for each browser wait.
    pub timeout: Duration,
    pub debug: bool,
    pub output_dir: PathBuf,
    pub debug_dir: PathBuf,
    pub base_url: Url,
    /// Detail page URL containing `{page}`.
    pub score_detail_url: String,
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub headless: Option<bool>,
    /// `--debug` can only switch debug mode on.
    pub debug: bool,
}

impl Settings {
    /// Load `.env` (if present) and read settings from the process environment.
    #[instrument(level = "debug")]
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => {
                return Err(ConfigError::Invalid {
                    name: ".env",
                    value: String::new(),
                    reason: e.to_string(),
                });
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let login_id = get("GDO_LOGIN_ID").ok_or(ConfigError::Missing("GDO_LOGIN_ID"))?;
        let password = get("GDO_PASSWORD")
            .map(Secret::new)
            .ok_or(ConfigError::Missing("GDO_PASSWORD"))?;

        let headless = get("HEADLESS")
            .map(|v| parse_bool("HEADLESS", &v))
            .transpose()?
            .unwrap_or(true);
        let debug = get("DEBUG")
            .map(|v| parse_bool("DEBUG", &v))
            .transpose()?
            .unwrap_or(false);

        let timeout_ms = match get("TIMEOUT") {
            Some(v) => match v.parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "TIMEOUT",
                        value: v,
                        reason: "expected a positive number of milliseconds".into(),
                    });
                }
            },
            None => DEFAULT_TIMEOUT_MS,
        };

        let base_url = get("GDO_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_http_url("GDO_BASE_URL", &base_url)?;

        let score_detail_url =
            get("GDO_SCORE_DETAIL_URL").unwrap_or_else(|| DEFAULT_SCORE_DETAIL_URL.to_string());
        validate_page_template(&score_detail_url)?;

        Ok(Settings {
            login_id,
            password,
            headless,
            timeout: Duration::from_millis(timeout_ms),
            debug,
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or_else(|| "output".into()),
            debug_dir: get("DEBUG_DIR").map(PathBuf::from).unwrap_or_else(|| "debug".into()),
            base_url,
            score_detail_url,
        })
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
        if let Some(headless) = overrides.headless {
            self.headless = headless;
        }
        self.debug |= overrides.debug;
        self
    }
}

/// Whether debug mode is on, decided before logging is set up so that
/// `DEBUG` in the environment or `.env` raises the log level like `--debug`.
///
/// An unreadable `DEBUG` counts as off here; [`Settings::from_env`] reports it.
pub fn debug_requested(flag: bool) -> bool {
    let _ = dotenvy::dotenv();
    flag || debug_from_lookup(|key| std::env::var(key).ok())
}

fn debug_from_lookup<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup("DEBUG").is_some_and(|v| parse_bool("DEBUG", v.trim()).unwrap_or(false))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

fn parse_http_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    Ok(url)
}

fn validate_page_template(template: &str) -> Result<(), ConfigError> {
    if !template.contains(PAGE_PLACEHOLDER) {
        return Err(ConfigError::Invalid {
            name: "GDO_SCORE_DETAIL_URL",
            value: template.to_string(),
            reason: format!("must contain the {PAGE_PLACEHOLDER} placeholder"),
        });
    }
    parse_http_url("GDO_SCORE_DETAIL_URL", &template.replace(PAGE_PLACEHOLDER, "1"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    const CREDS: [(&str, &str); 2] = [("GDO_LOGIN_ID", "golfer@example.com"), ("GDO_PASSWORD", "hunter2")];

    #[test]
    fn test_defaults() {
        let s = settings(&CREDS).unwrap();
        assert_eq!(s.login_id, "golfer@example.com");
        assert_eq!(s.password.expose(), "hunter2");
        assert!(s.headless);
        assert!(!s.debug);
        assert_eq!(s.timeout, Duration::from_millis(30_000));
        assert_eq!(s.output_dir, PathBuf::from("output"));
        assert_eq!(s.debug_dir, PathBuf::from("debug"));
        assert_eq!(s.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(s.score_detail_url, DEFAULT_SCORE_DETAIL_URL);
    }

    #[test]
    fn test_missing_credentials() {
        let err = settings(&[("GDO_PASSWORD", "x")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GDO_LOGIN_ID")));

        let err = settings(&[("GDO_LOGIN_ID", "a"), ("GDO_PASSWORD", "   ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GDO_PASSWORD")));
    }

    #[test]
    fn test_password_is_masked() {
        let s = settings(&CREDS).unwrap();
        assert_eq!(format!("{}", s.password), "**********");
        let debug = format!("{s:?}");
        assert!(debug.contains("**********"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_env_values() {
        let mut pairs = CREDS.to_vec();
        pairs.extend([
            ("HEADLESS", "False"),
            ("DEBUG", "1"),
            ("TIMEOUT", "5000"),
            ("OUTPUT_DIR", "data"),
        ]);
        let s = settings(&pairs).unwrap();
        assert!(!s.headless);
        assert!(s.debug);
        assert_eq!(s.timeout, Duration::from_secs(5));
        assert_eq!(s.output_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("HEADLESS", "maybe"),
            ("TIMEOUT", "0"),
            ("TIMEOUT", "fast"),
            ("GDO_BASE_URL", "not a url"),
            ("GDO_BASE_URL", "ftp://score.example.com/"),
            ("GDO_SCORE_DETAIL_URL", "https://score.example.com/detail"),
        ] {
            let mut pairs = CREDS.to_vec();
            pairs.push((key, value));
            let err = settings(&pairs).unwrap_err();
            match err {
                ConfigError::Invalid { name, .. } => assert_eq!(name, key),
                other => panic!("{key}={value}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_debug_from_lookup() {
        let lookup = |value: Option<&'static str>| move |key: &str| {
            assert_eq!(key, "DEBUG");
            value.map(String::from)
        };
        assert!(debug_from_lookup(lookup(Some("true"))));
        assert!(debug_from_lookup(lookup(Some(" YES "))));
        assert!(!debug_from_lookup(lookup(Some("off"))));
        assert!(!debug_from_lookup(lookup(Some("sometimes"))));
        assert!(!debug_from_lookup(lookup(None)));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&CREDS).unwrap().apply(Overrides {
            output_dir: Some("elsewhere".into()),
            headless: Some(false),
            debug: true,
        });
        assert_eq!(s.output_dir, PathBuf::from("elsewhere"));
        assert!(!s.headless);
        assert!(s.debug);

        let s = settings(&CREDS).unwrap().apply(Overrides::default());
        assert!(s.headless);
        assert_eq!(s.output_dir, PathBuf::from("output"));
    }
}
