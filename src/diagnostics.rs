//! Failure snapshots for debugging selector breakage.
//!
//! The extractor and the login sequence hand an [`Artifact`] to a
//! [`DiagnosticsSink`] on their fault paths only. Sinks swallow their own
//! errors: a failed snapshot is logged and never changes the outcome of the
//! run.

use chrono::Local;
use headless_chrome::Tab;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// What was on screen when something went wrong.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub url: String,
    pub html: String,
}

pub trait DiagnosticsSink {
    /// Record a failure snapshot under `context` (usually the field name).
    fn capture_failure(&self, context: &str, artifact: Artifact);
}

/// Sink used when debug mode is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;

impl DiagnosticsSink for NoDiagnostics {
    fn capture_failure(&self, _context: &str, _artifact: Artifact) {}
}

/// Writes `{context}_{timestamp}.html`, plus a `.png` screenshot when a
/// browser tab is attached, into the debug directory.
pub struct FileDiagnostics {
    dir: PathBuf,
    tab: Option<Arc<Tab>>,
}

impl FileDiagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileDiagnostics {
            dir: dir.into(),
            tab: None,
        }
    }

    pub fn with_tab(mut self, tab: Arc<Tab>) -> Self {
        self.tab = Some(tab);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_artifacts(&self, context: &str, artifact: &Artifact) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let stem = format!(
            "{}_{}",
            sanitize_context(context),
            Local::now().format("%Y%m%d_%H%M%S")
        );

        let html_path = self.dir.join(format!("{stem}.html"));
        fs::write(&html_path, &artifact.html)?;
        info!(path = %html_path.display(), url = %artifact.url, "Saved failure HTML");

        if let Some(tab) = &self.tab {
            match tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true) {
                Ok(png) => {
                    let png_path = self.dir.join(format!("{stem}.png"));
                    fs::write(&png_path, png)?;
                    info!(path = %png_path.display(), "Saved failure screenshot");
                }
                Err(e) => warn!(error = %e, "Screenshot capture failed"),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDiagnostics")
            .field("dir", &self.dir)
            .field("tab", &self.tab.is_some())
            .finish()
    }
}

impl DiagnosticsSink for FileDiagnostics {
    fn capture_failure(&self, context: &str, artifact: Artifact) {
        if let Err(e) = self.write_artifacts(context, &artifact) {
            warn!(dir = %self.dir.display(), %context, error = %e, "Could not save diagnostics");
        }
    }
}

/// Keep artifact file names portable.
fn sanitize_context(context: &str) -> String {
    context
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
