//! # gdo_score
//!
//! Collects personal golf round records from the GDO score portal and
//! summarizes them.
//!
//! ## Usage
//!
//! ```sh
//! gdo_score scrape -y 2025,2024
//! gdo_score report output/scores_*.json
//! ```
//!
//! ## Architecture
//!
//! `scrape` runs a strictly sequential pipeline:
//! 1. **Settings**: environment + `.env`, validated before anything starts
//! 2. **Browser**: one headless Chromium tab for the whole run
//! 3. **Login**: click/fill/submit sequence with verification
//! 4. **Pagination**: detail pages 1, 2, 3, ... until the history (or the
//!    requested years) is exhausted
//! 5. **Output**: one JSON file, written atomically, only on success
//!
//! `report` reads score files back and prints aggregate statistics.

use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio::task::block_in_place;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analysis;
mod auth;
mod browser;
mod cli;
mod config;
mod diagnostics;
mod error;
mod models;
mod outputs;
mod retry;
mod scrapers;
mod selectors;
mod utils;

use analysis::{Normalizer, Report};
use auth::LoginFlow;
use browser::{BrowserConfig, BrowserSession};
use cli::{Cli, Command, ReportArgs, ScrapeArgs, year_filter};
use config::{Overrides, Settings};
use diagnostics::{DiagnosticsSink, FileDiagnostics, NoDiagnostics};
use error::RunError;
use outputs::json;
use retry::{DEFAULT_ATTEMPTS, RetryFetch};
use scrapers::paginate::{PaginationConfig, Paginator};
use utils::ensure_writable_dir;

/// A failed command plus where its failure snapshots went, if anywhere.
struct Failure {
    error: RunError,
    diagnostics_dir: Option<PathBuf>,
}

impl From<RunError> for Failure {
    fn from(error: RunError) -> Self {
        Failure {
            error,
            diagnostics_dir: None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.error.kind(), self.error)?;
        if let RunError::Scrape(e) = &self.error
            && let Some(url) = e.url()
        {
            write!(f, " [page: {url}]")?;
        }
        if let Some(dir) = &self.diagnostics_dir {
            write!(f, " [diagnostics: {}]", dir.display())?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    let verbose = match &args.command {
        Command::Scrape(a) => config::debug_requested(a.debug),
        Command::Report(_) => false,
    };

    // --- Tracing init ---
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "gdo_score starting up");

    let outcome = match args.command {
        Command::Scrape(a) => scrape(a).await,
        Command::Report(a) => report(a).map_err(Failure::from),
    };

    let elapsed = start_time.elapsed();
    match outcome {
        Ok(()) => {
            info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
            ExitCode::SUCCESS
        }
        Err(failure) => {
            error!(kind = failure.error.kind(), ?elapsed, "{failure}");
            ExitCode::FAILURE
        }
    }
}

async fn scrape(args: ScrapeArgs) -> Result<(), Failure> {
    let settings = Settings::from_env().map_err(RunError::from)?.apply(Overrides {
        output_dir: args.output.clone(),
        headless: args.headless,
        debug: args.debug,
    });
    info!(
        output_dir = %settings.output_dir.display(),
        headless = settings.headless,
        debug = settings.debug,
        years = ?args.year,
        selector_table = selectors::TABLE_VERSION,
        "Settings loaded"
    );

    let diagnostics_dir = settings.debug.then(|| settings.debug_dir.clone());
    collect(&settings, &args)
        .await
        .map_err(|error| Failure { error, diagnostics_dir })
}

async fn collect(settings: &Settings, args: &ScrapeArgs) -> Result<(), RunError> {
    // Fail on an unusable output path before spending minutes in the browser.
    if let Err(e) = ensure_writable_dir(&settings.output_dir).await {
        error!(
            path = %settings.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let browser_config = BrowserConfig {
        headless: settings.headless,
        timeout: settings.timeout,
        wait: args.wait,
        ..BrowserConfig::default()
    };
    let browser = block_in_place(|| BrowserSession::launch(browser_config))?;

    let diagnostics: Box<dyn DiagnosticsSink> = if settings.debug {
        Box::new(FileDiagnostics::new(&settings.debug_dir).with_tab(browser.tab().clone()))
    } else {
        Box::new(NoDiagnostics)
    };

    block_in_place(|| {
        auth::login(
            &browser,
            &LoginFlow::new(settings.timeout),
            settings.base_url.as_str(),
            &settings.login_id,
            &settings.password,
            diagnostics.as_ref(),
        )
    })?;

    let fetcher = RetryFetch::new(browser, DEFAULT_ATTEMPTS, Duration::from_secs(1));
    let mut paginator = Paginator::new(PaginationConfig {
        url_template: settings.score_detail_url.clone(),
        target_years: year_filter(&args.year),
        miss_threshold: args.miss_threshold,
        max_pages: args.max_pages,
    });

    let collected = tokio::select! {
        res = paginator.run(&fetcher, diagnostics.as_ref()) => res?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; discarding collected rounds");
            return Err(RunError::Cancelled);
        }
    };
    info!(
        rounds = collected.records.len(),
        pages = collected.pages_visited,
        stop = ?collected.stop,
        "Scraping finished"
    );

    if collected.records.is_empty() {
        warn!("No rounds matched; nothing written");
        return Ok(());
    }

    let path = json::write_scores(&collected.records, &settings.output_dir, args.filename.as_deref()).await?;
    info!(path = %path.display(), rounds = collected.records.len(), "Scores saved");
    Ok(())
}

fn report(args: ReportArgs) -> Result<(), RunError> {
    let normalizer = match &args.normalize_dir {
        Some(dir) => Normalizer::load(dir)?,
        None => Normalizer::default(),
    };

    let mut records = Vec::new();
    let mut first_err = None;
    let mut loaded_any = false;
    for path in &args.files {
        match json::load_scores(path) {
            Ok(mut file_records) => {
                info!(path = %path.display(), rounds = file_records.len(), "Loaded score file");
                records.append(&mut file_records);
                loaded_any = true;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable score file");
                first_err.get_or_insert(e);
            }
        }
    }
    if !loaded_any && let Some(e) = first_err {
        return Err(e.into());
    }

    let years = year_filter(&args.year);
    let report = Report::build(records, years.as_ref(), &normalizer);
    println!("{}", report.render(args.rolling));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;

    #[test]
    fn test_failure_message_names_kind_url_and_diagnostics() {
        let failure = Failure {
            error: ScrapeError::RequiredField {
                field: "date",
                url: "https://score.example.com/detail?page=7".into(),
            }
            .into(),
            diagnostics_dir: Some(PathBuf::from("debug")),
        };
        let msg = failure.to_string();
        assert!(msg.starts_with("extraction error:"));
        assert!(msg.contains("[page: https://score.example.com/detail?page=7]"));
        assert!(msg.contains("[diagnostics: debug]"));
    }

    #[test]
    fn test_failure_message_without_extras() {
        let failure = Failure::from(RunError::Cancelled);
        assert_eq!(
            failure.to_string(),
            "cancelled error: run cancelled before completion; no output written"
        );
    }

    #[test]
    fn test_report_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(
            &good,
            r#"[{"year":"2025","month":"04","day":"28","golf_place_name":"A",
                "course_former_half":"OUT","course_latter_half":"IN"}]"#,
        )
        .unwrap();
        let args = ReportArgs {
            files: vec![good, dir.path().join("missing.json")],
            year: Vec::new(),
            rolling: 5,
            normalize_dir: None,
        };
        report(args).unwrap();
    }

    #[test]
    fn test_report_fails_when_nothing_loads() {
        let args = ReportArgs {
            files: vec![PathBuf::from("/nonexistent/a.json")],
            year: Vec::new(),
            rolling: 5,
            normalize_dir: None,
        };
        assert!(matches!(report(args), Err(RunError::Output(_))));
    }
}
