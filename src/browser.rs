//! Browser lifecycle and page fetching.
//!
//! [`PageFetcher`] is the seam between the scraping core and the browser:
//! the pagination loop only ever asks for the HTML behind a URL. The
//! production implementation, [`BrowserSession`], drives one Chromium tab
//! through `headless_chrome` and owns the browser process for the whole run;
//! dropping the session closes the tab and kills the process on every exit
//! path, including faults and cancellation.

use crate::error::ScrapeError;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::block_in_place;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Rendered HTML of one page.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// URL after redirects.
    pub url: String,
    pub html: String,
}

/// Something that can turn a URL into rendered HTML.
pub trait PageFetcher {
    async fn fetch(&self, url: &str) -> Result<PageSnapshot, ScrapeError>;
}

/// When a page counts as ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WaitStrategy {
    /// Navigation finished and the DOM is parsed.
    #[default]
    DomReady,
    /// Additionally wait for `readyState == "complete"` and a short quiet
    /// period so late XHR-rendered rows land.
    NetworkIdle,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: (u32, u32),
    pub user_agent: String,
    pub accept_language: String,
    /// Upper bound for every wait inside the browser.
    pub timeout: Duration,
    pub wait: WaitStrategy,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            headless: true,
            viewport: (1920, 1080),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "ja,en-US;q=0.9,en;q=0.8".to_string(),
            timeout: Duration::from_millis(30_000),
            wait: WaitStrategy::DomReady,
        }
    }
}

const SETTLE_DELAY: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One browser process with one tab, held for the duration of a run.
pub struct BrowserSession {
    // Field order matters: the tab must drop before the browser.
    tab: Arc<Tab>,
    _browser: Browser,
    config: BrowserConfig,
}

impl BrowserSession {
    #[instrument(level = "info", skip_all, fields(headless = config.headless))]
    pub fn launch(config: BrowserConfig) -> Result<Self, ScrapeError> {
        let args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--no-sandbox"),
        ];
        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some(config.viewport))
            .idle_browser_timeout(config.timeout.max(Duration::from_secs(60)))
            .args(args)
            .build()
            .map_err(|e| ScrapeError::Browser(anyhow::anyhow!("invalid launch options: {e}")))?;

        let browser = Browser::new(options).map_err(ScrapeError::Browser)?;
        let tab = browser.new_tab().map_err(ScrapeError::Browser)?;
        tab.set_default_timeout(config.timeout);
        tab.set_user_agent(&config.user_agent, Some(&config.accept_language), None)
            .map_err(ScrapeError::Browser)?;
        if let Err(e) = tab.enable_stealth_mode() {
            warn!(error = %e, "Could not hide automation flags; continuing");
        }

        info!(viewport = ?config.viewport, wait = ?config.wait, "Browser launched");
        Ok(BrowserSession {
            tab,
            _browser: browser,
            config,
        })
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Navigate and wait according to the configured strategy.
    pub fn goto(&self, url: &str) -> anyhow::Result<()> {
        self.tab.navigate_to(url)?.wait_until_navigated()?;
        if self.config.wait == WaitStrategy::NetworkIdle {
            self.wait_for_idle()?;
        }
        Ok(())
    }

    /// Current page HTML.
    pub fn content(&self) -> anyhow::Result<String> {
        self.tab.get_content()
    }

    pub(crate) fn wait_for_idle(&self) -> anyhow::Result<()> {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            let state = self.tab.evaluate("document.readyState", false)?;
            let complete = state
                .value
                .as_ref()
                .and_then(|v| v.as_str())
                .is_some_and(|s| s == "complete");
            if complete {
                break;
            }
            if Instant::now() >= deadline {
                anyhow::bail!("page did not finish loading within {:?}", self.config.timeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        std::thread::sleep(SETTLE_DELAY);
        Ok(())
    }

    fn load(&self, url: &str) -> anyhow::Result<PageSnapshot> {
        self.goto(url)?;
        Ok(PageSnapshot {
            url: self.tab.get_url(),
            html: self.content()?,
        })
    }
}

impl PageFetcher for BrowserSession {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<PageSnapshot, ScrapeError> {
        let t0 = Instant::now();
        // headless_chrome is synchronous; keep the runtime's other tasks
        // (signal handling) alive while we wait on it.
        let res = block_in_place(|| self.load(url));
        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, ok = res.is_ok(), "Page fetched");
        res.map_err(|source| ScrapeError::Fetch {
            url: url.to_string(),
            attempts: 1,
            source,
        })
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(true) {
            debug!(error = %e, "Tab close failed; browser process is killed regardless");
        }
        info!("Browser closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert_eq!(config.viewport, (1920, 1080));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.wait, WaitStrategy::DomReady);
        assert!(config.user_agent.contains("Chrome/"));
    }

    #[test]
    fn test_wait_strategy_names() {
        use clap::ValueEnum;
        let names: Vec<_> = WaitStrategy::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["dom-ready", "network-idle"]);
    }
}
