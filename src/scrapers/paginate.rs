//! Page-by-page collection of rounds with year filtering.
//!
//! The site lists rounds newest first, one round per detail page. The loop
//! walks pages 1, 2, 3, ... and stops on the first of:
//!
//! - a page showing the no-data marker (end of history),
//! - `miss_threshold` consecutive rounds older than the oldest requested year,
//! - the `max_pages` ceiling.
//!
//! Pages are strictly sequential: whether page N+1 is fetched depends on how
//! page N was classified. A page that is neither a round nor the no-data
//! marker (login redirect, error page) fails the run rather than ending it.

use crate::browser::PageFetcher;
use crate::diagnostics::DiagnosticsSink;
use crate::error::ScrapeError;
use crate::models::RoundRecord;
use crate::scrapers::extract;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_MISS_THRESHOLD: usize = 10;
pub const DEFAULT_MAX_PAGES: u32 = 2000;
pub const PAGE_PLACEHOLDER: &str = "{page}";

#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Detail page URL with a `{page}` placeholder.
    pub url_template: String,
    /// Years to keep; `None` keeps everything.
    pub target_years: Option<BTreeSet<i32>>,
    /// Consecutive older-than-target rounds before giving up.
    pub miss_threshold: usize,
    /// Hard ceiling on pages visited.
    pub max_pages: u32,
}

impl PaginationConfig {
    pub fn new(url_template: impl Into<String>) -> Self {
        PaginationConfig {
            url_template: url_template.into(),
            target_years: None,
            miss_threshold: DEFAULT_MISS_THRESHOLD,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace(PAGE_PLACEHOLDER, &page.to_string())
    }
}

/// What to do with one round under the year filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Outside the filter without implying exhaustion (newer than the newest
    /// target, or in a gap of a non-contiguous filter).
    Skip,
    /// Older than the oldest target.
    Miss,
    /// The miss that reached the threshold.
    Stop,
}

/// Classification result plus the updated miss-counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub verdict: Verdict,
    pub older_year_count: usize,
}

/// Classify a round's year. Pure: the caller owns the counter.
pub fn classify(
    year: i32,
    target_years: Option<&BTreeSet<i32>>,
    older_year_count: usize,
    miss_threshold: usize,
) -> Step {
    let Some(years) = target_years else {
        return Step { verdict: Verdict::Accept, older_year_count };
    };
    let (Some(&min), Some(&max)) = (years.first(), years.last()) else {
        // An empty filter keeps everything.
        return Step { verdict: Verdict::Accept, older_year_count };
    };

    if years.contains(&year) {
        Step { verdict: Verdict::Accept, older_year_count: 0 }
    } else if year < min {
        let count = older_year_count + 1;
        let verdict = if count >= miss_threshold { Verdict::Stop } else { Verdict::Miss };
        Step { verdict, older_year_count: count }
    } else {
        debug!(year, newest = max, "Year outside filter but not older than it");
        Step { verdict: Verdict::Skip, older_year_count }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyState,
    MissThreshold,
    PageLimit,
}

#[derive(Debug)]
pub struct Collected {
    /// Accepted rounds in the order the site served them.
    pub records: Vec<RoundRecord>,
    pub stop: StopReason,
    pub pages_visited: u32,
}

/// Drives fetch + extract across pages and owns the per-run counters.
#[derive(Debug)]
pub struct Paginator {
    config: PaginationConfig,
    page_num: u32,
    older_year_count: usize,
}

impl Paginator {
    pub fn new(config: PaginationConfig) -> Self {
        Paginator {
            config,
            page_num: 1,
            older_year_count: 0,
        }
    }

    pub fn older_year_count(&self) -> usize {
        self.older_year_count
    }

    /// Collect rounds until a stop condition fires.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Loads one detail page per call; retries are its concern.
    /// * `diagnostics` - Receives the page snapshot when extraction fails.
    ///
    /// # Returns
    ///
    /// The accepted rounds in page order, why the loop stopped, and how many
    /// pages were fetched.
    ///
    /// # Errors
    ///
    /// Any fetch or extraction fault, including an expired session, aborts
    /// the whole run; nothing collected so far is returned. A non-numeric
    /// year is a [`ScrapeError::MalformedDate`] only while a year filter is
    /// active.
    #[instrument(level = "info", skip_all, fields(years = ?self.config.target_years))]
    pub async fn run<F: PageFetcher>(
        &mut self,
        fetcher: &F,
        diagnostics: &dyn DiagnosticsSink,
    ) -> Result<Collected, ScrapeError> {
        let mut records = Vec::new();
        let mut pages_visited = 0;

        let stop = loop {
            if self.page_num > self.config.max_pages {
                warn!(max_pages = self.config.max_pages, "Page limit reached; stopping");
                break StopReason::PageLimit;
            }

            let url = self.config.page_url(self.page_num);
            info!(page = self.page_num, %url, "Fetching score page");
            let page = fetcher.fetch(&url).await?;
            pages_visited += 1;

            let Some(record) = extract::read_page(&page.html, &page.url, diagnostics)? else {
                info!(page = self.page_num, "No round data on page; end of history");
                break StopReason::EmptyState;
            };

            // Without a filter the year text is never interpreted.
            let step = match self.config.target_years.as_ref().filter(|ys| !ys.is_empty()) {
                None => Step {
                    verdict: Verdict::Accept,
                    older_year_count: self.older_year_count,
                },
                Some(years) => {
                    let year = record.year_number().ok_or_else(|| ScrapeError::MalformedDate {
                        url: page.url.clone(),
                        text: format!("{}/{}/{}", record.year, record.month, record.day),
                    })?;
                    classify(year, Some(years), self.older_year_count, self.config.miss_threshold)
                }
            };
            self.older_year_count = step.older_year_count;

            match step.verdict {
                Verdict::Accept => {
                    info!(
                        page = self.page_num,
                        date = %format!("{}/{}/{}", record.year, record.month, record.day),
                        place = %record.golf_place_name,
                        "Round collected"
                    );
                    records.push(record);
                }
                Verdict::Skip => {
                    debug!(page = self.page_num, year = %record.year, "Round outside requested years; skipped");
                }
                Verdict::Miss => {
                    debug!(
                        page = self.page_num,
                        year = %record.year,
                        older_year_count = self.older_year_count,
                        "Round older than requested years"
                    );
                }
                Verdict::Stop => {
                    info!(
                        page = self.page_num,
                        threshold = self.config.miss_threshold,
                        "Too many consecutive older rounds; stopping"
                    );
                    break StopReason::MissThreshold;
                }
            }

            self.page_num += 1;
        };

        info!(count = records.len(), ?stop, "Collection finished");
        Ok(Collected {
            records,
            stop,
            pages_visited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::PageSnapshot;
    use crate::diagnostics::NoDiagnostics;
    use crate::scrapers::extract::tests::{LOGIN_PAGE, NO_DATA_PAGE, detail_page};
    use std::cell::RefCell;

    const TEMPLATE: &str = "https://score.example.com/detail?page={page}";

    /// Serves pre-built pages in order; anything past the end shows the
    /// no-data marker.
    struct ScriptedSite {
        pages: Vec<String>,
        requested: RefCell<Vec<String>>,
    }

    impl ScriptedSite {
        fn with_years(years: &[&str]) -> Self {
            let pages = years
                .iter()
                .map(|y| detail_page(&format!("{y}/05/01"), Some("テストゴルフ場(東京都)")))
                .collect();
            ScriptedSite {
                pages,
                requested: RefCell::new(Vec::new()),
            }
        }

        fn requests(&self) -> usize {
            self.requested.borrow().len()
        }
    }

    impl PageFetcher for ScriptedSite {
        async fn fetch(&self, url: &str) -> Result<PageSnapshot, ScrapeError> {
            self.requested.borrow_mut().push(url.to_string());
            let n: usize = url.rsplit('=').next().and_then(|p| p.parse().ok()).unwrap();
            let html = self
                .pages
                .get(n - 1)
                .cloned()
                .unwrap_or_else(|| NO_DATA_PAGE.into());
            Ok(PageSnapshot { url: url.to_string(), html })
        }
    }

    fn years(ys: &[i32]) -> BTreeSet<i32> {
        ys.iter().copied().collect()
    }

    fn config(filter: Option<BTreeSet<i32>>) -> PaginationConfig {
        PaginationConfig {
            target_years: filter,
            ..PaginationConfig::new(TEMPLATE)
        }
    }

    #[test]
    fn test_classify_without_filter() {
        let step = classify(1990, None, 3, 10);
        assert_eq!(step, Step { verdict: Verdict::Accept, older_year_count: 3 });
    }

    #[test]
    fn test_classify_with_filter() {
        let filter = years(&[2024, 2025]);
        assert_eq!(
            classify(2024, Some(&filter), 7, 10),
            Step { verdict: Verdict::Accept, older_year_count: 0 }
        );
        assert_eq!(
            classify(2023, Some(&filter), 7, 10),
            Step { verdict: Verdict::Miss, older_year_count: 8 }
        );
        assert_eq!(
            classify(2023, Some(&filter), 9, 10),
            Step { verdict: Verdict::Stop, older_year_count: 10 }
        );
        assert_eq!(
            classify(2026, Some(&filter), 7, 10),
            Step { verdict: Verdict::Skip, older_year_count: 7 }
        );
    }

    #[test]
    fn test_classify_gap_year_is_skipped() {
        let filter = years(&[2022, 2025]);
        assert_eq!(
            classify(2023, Some(&filter), 4, 10),
            Step { verdict: Verdict::Skip, older_year_count: 4 }
        );
    }

    #[test]
    fn test_page_url() {
        let config = PaginationConfig::new(TEMPLATE);
        assert_eq!(config.page_url(12), "https://score.example.com/detail?page=12");
    }

    #[tokio::test]
    async fn test_no_filter_collects_until_empty_state() {
        let site = ScriptedSite::with_years(&["2025", "2019", "2012"]);
        let mut paginator = Paginator::new(config(None));
        let collected = paginator.run(&site, &NoDiagnostics).await.unwrap();

        assert_eq!(collected.stop, StopReason::EmptyState);
        let got: Vec<_> = collected.records.iter().map(|r| r.year.as_str()).collect();
        assert_eq!(got, vec!["2025", "2019", "2012"]);
        assert_eq!(site.requests(), 4);
    }

    #[tokio::test]
    async fn test_stops_after_ten_consecutive_older_years() {
        let mut ys = vec!["2025", "2024"];
        ys.extend(std::iter::repeat_n("2023", 15));
        let site = ScriptedSite::with_years(&ys);

        let mut paginator = Paginator::new(config(Some(years(&[2024, 2025]))));
        let collected = paginator.run(&site, &NoDiagnostics).await.unwrap();

        assert_eq!(collected.stop, StopReason::MissThreshold);
        let got: Vec<_> = collected.records.iter().map(|r| r.year.as_str()).collect();
        assert_eq!(got, vec!["2025", "2024"]);
        // Two accepted pages plus exactly ten misses.
        assert_eq!(site.requests(), 12);
        assert_eq!(paginator.older_year_count(), 10);
    }

    #[tokio::test]
    async fn test_newer_years_do_not_count_as_misses() {
        // 2026 skips interleaved with 2023 misses: only the 2023s count.
        let mut ys = Vec::new();
        for _ in 0..9 {
            ys.push("2026");
            ys.push("2023");
        }
        ys.push("2025");
        let site = ScriptedSite::with_years(&ys);

        let mut paginator = Paginator::new(config(Some(years(&[2024, 2025]))));
        let collected = paginator.run(&site, &NoDiagnostics).await.unwrap();

        // Nine misses never reach the threshold; the 2025 round is still found.
        assert_eq!(collected.stop, StopReason::EmptyState);
        assert_eq!(collected.records.len(), 1);
        assert_eq!(collected.records[0].year, "2025");
        assert_eq!(paginator.older_year_count(), 0);
    }

    #[tokio::test]
    async fn test_accepted_round_resets_miss_counter() {
        let mut ys = vec!["2024"];
        ys.extend(std::iter::repeat_n("2023", 9));
        ys.push("2024");
        ys.extend(std::iter::repeat_n("2023", 9));
        let site = ScriptedSite::with_years(&ys);

        let mut paginator = Paginator::new(config(Some(years(&[2024]))));
        let collected = paginator.run(&site, &NoDiagnostics).await.unwrap();
        assert_eq!(collected.stop, StopReason::EmptyState);
        assert_eq!(collected.records.len(), 2);
    }

    #[tokio::test]
    async fn test_page_limit_bounds_the_run() {
        let site = ScriptedSite::with_years(&["2025"; 20]);
        let mut paginator = Paginator::new(PaginationConfig {
            max_pages: 5,
            ..config(None)
        });
        let collected = paginator.run(&site, &NoDiagnostics).await.unwrap();
        assert_eq!(collected.stop, StopReason::PageLimit);
        assert_eq!(collected.records.len(), 5);
        assert_eq!(site.requests(), 5);
    }

    #[tokio::test]
    async fn test_extraction_fault_aborts_run() {
        let mut site = ScriptedSite::with_years(&["2025", "2025", "2025"]);
        site.pages[1] = site.pages[1].replace("<p>2025/05/01</p>", "");

        let mut paginator = Paginator::new(config(None));
        let err = paginator.run(&site, &NoDiagnostics).await.unwrap_err();
        match err {
            ScrapeError::RequiredField { field, url } => {
                assert_eq!(field, "date");
                assert!(url.ends_with("page=2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Page 3 is never requested.
        assert_eq!(site.requests(), 2);
    }

    #[tokio::test]
    async fn test_expired_session_aborts_run() {
        let mut site = ScriptedSite::with_years(&["2025", "2025", "2024"]);
        site.pages[1] = LOGIN_PAGE.to_string();

        let mut paginator = Paginator::new(config(None));
        let err = paginator.run(&site, &NoDiagnostics).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Auth(_)));
        assert_eq!(site.requests(), 2);
    }

    #[tokio::test]
    async fn test_bare_page_is_not_end_of_history() {
        let mut site = ScriptedSite::with_years(&["2025", "2025"]);
        site.pages[1] = "<html><body><div id=\"container\"></div></body></html>".into();

        let mut paginator = Paginator::new(config(None));
        let err = paginator.run(&site, &NoDiagnostics).await.unwrap_err();
        assert!(matches!(err, ScrapeError::RequiredField { field: "detail_container", .. }));
    }

    #[tokio::test]
    async fn test_no_filter_accepts_non_numeric_year() {
        let site = ScriptedSite::with_years(&["R07年"]);
        let mut paginator = Paginator::new(config(None));
        let collected = paginator.run(&site, &NoDiagnostics).await.unwrap();
        assert_eq!(collected.stop, StopReason::EmptyState);
        assert_eq!(collected.records.len(), 1);
        assert_eq!(collected.records[0].year, "R07年");
    }

    #[tokio::test]
    async fn test_non_numeric_year_faults() {
        let site = ScriptedSite::with_years(&["20X5"]);
        let mut paginator = Paginator::new(config(Some(years(&[2025]))));
        let err = paginator.run(&site, &NoDiagnostics).await.unwrap_err();
        assert!(matches!(err, ScrapeError::MalformedDate { .. }));
    }
}
