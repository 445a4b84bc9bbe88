//! Error types for configuration, scraping, output and the top-level run.
//!
//! Faults below the "required field" threshold never reach these types: they
//! are absorbed into the record as sentinel values or empty sequences. Every
//! variant here aborts the run before an output file is written.

use std::path::PathBuf;

/// Invalid or missing settings, detected before any browser is launched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    #[error("missing required setting {0} (set it in the environment or a .env file)")]
    Missing(&'static str),

    /// A setting is present but cannot be interpreted.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Faults raised while driving the browser or extracting a round.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The login sequence did not reach the post-login state.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Every lookup expression for a required field came back empty.
    #[error("required field `{field}` not found on {url}")]
    RequiredField { field: &'static str, url: String },

    /// The date text matched but is too short to slice into year/month/day.
    #[error("malformed date text {text:?} on {url}")]
    MalformedDate { url: String, text: String },

    /// Page load kept failing after all retry attempts.
    #[error("fetching {url} failed after {attempts} attempt(s): {source}")]
    Fetch {
        url: String,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },

    /// Launching or talking to the browser process failed.
    #[error("browser error: {0}")]
    Browser(#[source] anyhow::Error),

    /// A lookup expression in the selector table does not parse.
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

impl ScrapeError {
    /// The page URL involved in the fault, when there is one.
    pub fn url(&self) -> Option<&str> {
        match self {
            ScrapeError::RequiredField { url, .. }
            | ScrapeError::MalformedDate { url, .. }
            | ScrapeError::Fetch { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Short name of the fault kind for the terminal message.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Auth(_) => "authentication",
            ScrapeError::RequiredField { .. } | ScrapeError::MalformedDate { .. } => "extraction",
            ScrapeError::Fetch { .. } => "fetch",
            ScrapeError::Browser(_) => "browser",
            ScrapeError::Selector { .. } => "selector",
        }
    }
}

/// Faults while persisting or reading score files.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("YAML error on {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level failure of a command.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Output(#[from] OutputError),

    /// Interrupted by a signal; nothing was written.
    #[error("run cancelled before completion; no output written")]
    Cancelled,
}

impl RunError {
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Config(_) => "configuration",
            RunError::Scrape(e) => e.kind(),
            RunError::Output(_) => "output",
            RunError::Cancelled => "cancelled",
        }
    }
}
