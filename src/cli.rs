//! Command-line interface definitions for gdo_score.
//!
//! Credentials and site URLs come from the environment (see
//! [`config`](crate::config)); flags here override the environment for a
//! single run.

use crate::analysis::DEFAULT_ROLLING_WINDOW;
use crate::browser::WaitStrategy;
use crate::scrapers::paginate::{DEFAULT_MAX_PAGES, DEFAULT_MISS_THRESHOLD};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Collect golf round scores from the GDO score portal.
///
/// # Examples
///
/// ```sh
/// # Everything, newest first, into ./output
/// gdo_score scrape
///
/// # Only 2024 and 2025, with a visible browser and failure snapshots
/// gdo_score scrape -y 2025,2024 --headless false -d
///
/// # Summaries over two score files
/// gdo_score report output/scores_20250101120000.json output/scores_20250601120000.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in, walk the score detail pages and write a JSON file
    Scrape(ScrapeArgs),
    /// Print statistics over one or more score files
    Report(ReportArgs),
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Output directory for the score file (overrides OUTPUT_DIR)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run the browser without a window (overrides HEADLESS)
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set,
          value_parser = clap::builder::BoolishValueParser::new())]
    pub headless: Option<bool>,

    /// Verbose logging and failure snapshots in DEBUG_DIR
    #[arg(short, long)]
    pub debug: bool,

    /// Only keep rounds from these years (comma separated)
    #[arg(short, long, value_delimiter = ',', value_name = "YEAR")]
    pub year: Vec<i32>,

    /// Output file name (default: scores_YYYYmmddHHMMSS.json)
    #[arg(short, long)]
    pub filename: Option<String>,

    /// When a page counts as loaded
    #[arg(long, value_enum, default_value = "dom-ready")]
    pub wait: WaitStrategy,

    /// Consecutive older-year rounds before stopping
    #[arg(long, env = "GDO_MISS_THRESHOLD", default_value_t = DEFAULT_MISS_THRESHOLD,
          value_parser = parse_positive::<usize>)]
    pub miss_threshold: usize,

    /// Upper bound on detail pages visited
    #[arg(long, env = "GDO_MAX_PAGES", default_value_t = DEFAULT_MAX_PAGES,
          value_parser = parse_positive::<u32>)]
    pub max_pages: u32,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Score files to merge
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Only include rounds from these years (comma separated)
    #[arg(short, long, value_delimiter = ',', value_name = "YEAR")]
    pub year: Vec<i32>,

    /// Window size for the rolling mean of total score
    #[arg(long, default_value_t = DEFAULT_ROLLING_WINDOW, value_parser = parse_positive::<usize>)]
    pub rolling: usize,

    /// Directory holding golf_place_name_mapping.json / prefecture_mapping.yaml
    #[arg(long, env = "GDO_NORMALIZE_DIR")]
    pub normalize_dir: Option<PathBuf>,
}

/// `None` for an empty list, meaning "every year".
pub fn year_filter(years: &[i32]) -> Option<BTreeSet<i32>> {
    (!years.is_empty()).then(|| years.iter().copied().collect())
}

fn parse_positive<T>(s: &str) -> Result<T, String>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match s.parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(format!("expected a positive integer, got {s:?}")),
    }
}
