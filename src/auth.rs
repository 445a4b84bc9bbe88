//! Login to the score portal.
//!
//! The sequence is linear: open the top page, dismiss the campaign modal if
//! one shows up, open the login form, type credentials, submit, and check
//! that the login link is gone. Every failing step captures diagnostics and
//! ends in [`ScrapeError::Auth`].

use crate::browser::BrowserSession;
use crate::config::Secret;
use crate::diagnostics::{Artifact, DiagnosticsSink};
use crate::error::ScrapeError;
use crate::selectors::LOGIN;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The browser operations the login sequence needs.
pub trait LoginPage {
    fn open(&self, url: &str) -> anyhow::Result<()>;
    fn click(&self, selector: &str, timeout: Duration) -> anyhow::Result<()>;
    fn fill(&self, selector: &str, text: &str, timeout: Duration) -> anyhow::Result<()>;
    /// Whether `selector` matches within `timeout`.
    fn is_present(&self, selector: &str, timeout: Duration) -> bool;
    /// Wait for the navigation triggered by the last action.
    fn settle(&self) -> anyhow::Result<()>;
    fn artifact(&self) -> Artifact;
}

/// Timing knobs for [`login`].
#[derive(Debug, Clone)]
pub struct LoginFlow {
    /// Upper bound for each element wait.
    pub timeout: Duration,
    pub modal_timeout: Duration,
    pub verify_timeout: Duration,
    /// Attempts at opening the login form.
    pub click_attempts: usize,
    pub click_backoff: Duration,
}

impl LoginFlow {
    pub fn new(timeout: Duration) -> Self {
        LoginFlow {
            timeout,
            modal_timeout: Duration::from_secs(2),
            verify_timeout: Duration::from_secs(5),
            click_attempts: 3,
            click_backoff: Duration::from_secs(1),
        }
    }
}

#[instrument(level = "info", skip_all, fields(%base_url, login_id = %login_id))]
pub fn login<P: LoginPage>(
    page: &P,
    flow: &LoginFlow,
    base_url: &str,
    login_id: &str,
    password: &Secret,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<(), ScrapeError> {
    let fail = |context: &str, message: String| {
        diagnostics.capture_failure(context, page.artifact());
        ScrapeError::Auth(message)
    };

    info!("Opening score portal");
    page.open(base_url)
        .map_err(|e| fail("top_page_unreachable", format!("could not open {base_url}: {e}")))?;

    if page.is_present(LOGIN.modal_close_button, flow.modal_timeout) {
        match page.click(LOGIN.modal_close_button, flow.modal_timeout) {
            Ok(()) => info!("Closed modal dialog"),
            Err(e) => debug!(error = %e, "Modal vanished before it could be closed"),
        }
    } else {
        debug!("No modal dialog shown");
    }

    info!("Opening login form");
    open_login_form(page, flow).map_err(|e| {
        fail("login_button_not_found", format!("login button not found: {e}"))
    })?;

    info!("Entering credentials");
    page.fill(LOGIN.username_input, login_id, flow.timeout)
        .and_then(|()| page.fill(LOGIN.password_input, password.expose(), flow.timeout))
        .map_err(|e| {
            fail("credential_fields_not_found", format!("credential fields not found: {e}"))
        })?;

    info!("Submitting login form");
    submit(page, flow).map_err(|e| {
        fail("submit_button_not_found", format!("login submit button not found: {e}"))
    })?;

    if page.is_present(LOGIN.login_button, flow.verify_timeout) {
        return Err(fail(
            "login_failed",
            "login link still shown after submitting credentials".into(),
        ));
    }
    info!("Logged in");
    Ok(())
}

fn open_login_form<P: LoginPage>(page: &P, flow: &LoginFlow) -> anyhow::Result<()> {
    let attempts = flow.click_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match page.click(LOGIN.login_button, flow.timeout) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                let delay = flow
                    .click_backoff
                    .saturating_mul(1 << (attempt - 1).min(16))
                    .min(Duration::from_secs(5));
                warn!(attempt, max = attempts, ?delay, error = %e, "Login button click failed; retrying");
                sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// The submit control differs between pages; take the first that exists.
fn submit<P: LoginPage>(page: &P, flow: &LoginFlow) -> anyhow::Result<()> {
    let mut last_err = None;
    for (i, selector) in LOGIN.submit_buttons.iter().enumerate() {
        // Only the first candidate gets the full wait; the form is already loaded.
        let timeout = if i == 0 { flow.timeout } else { flow.modal_timeout };
        match page.click(selector, timeout) {
            Ok(()) => {
                debug!(%selector, "Clicked submit");
                return page.settle();
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no submit selectors configured")))
}

impl LoginPage for BrowserSession {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        self.goto(url)
    }

    fn click(&self, selector: &str, timeout: Duration) -> anyhow::Result<()> {
        self.tab()
            .wait_for_element_with_custom_timeout(selector, timeout)?
            .click()?;
        Ok(())
    }

    fn fill(&self, selector: &str, text: &str, timeout: Duration) -> anyhow::Result<()> {
        let element = self.tab().wait_for_element_with_custom_timeout(selector, timeout)?;
        element.click()?;
        element.type_into(text)?;
        Ok(())
    }

    fn is_present(&self, selector: &str, timeout: Duration) -> bool {
        self.tab()
            .wait_for_element_with_custom_timeout(selector, timeout)
            .is_ok()
    }

    fn settle(&self) -> anyhow::Result<()> {
        self.tab().wait_until_navigated()?;
        self.wait_for_idle()
    }

    fn artifact(&self) -> Artifact {
        Artifact {
            url: self.tab().get_url(),
            html: self.content().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// A page whose elements are a fixed set of selectors.
    struct FakePage {
        present: RefCell<HashSet<&'static str>>,
        /// Clicks on the login button that fail before one succeeds.
        flaky_login_clicks: RefCell<usize>,
        /// Whether submitting makes the login button disappear.
        accept_credentials: bool,
        log: RefCell<Vec<String>>,
    }

    impl FakePage {
        fn new(present: &[&'static str]) -> Self {
            FakePage {
                present: RefCell::new(present.iter().copied().collect()),
                flaky_login_clicks: RefCell::new(0),
                accept_credentials: true,
                log: RefCell::new(Vec::new()),
            }
        }

        fn login_page() -> Self {
            FakePage::new(&[
                LOGIN.login_button,
                LOGIN.username_input,
                LOGIN.password_input,
                LOGIN.submit_buttons[1],
            ])
        }
    }

    impl LoginPage for FakePage {
        fn open(&self, url: &str) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("open {url}"));
            Ok(())
        }

        fn click(&self, selector: &str, _timeout: Duration) -> anyhow::Result<()> {
            if selector == LOGIN.login_button {
                let mut flaky = self.flaky_login_clicks.borrow_mut();
                if *flaky > 0 {
                    *flaky -= 1;
                    anyhow::bail!("timeout");
                }
            }
            if !self.present.borrow().contains(selector) {
                anyhow::bail!("no element {selector}");
            }
            self.log.borrow_mut().push(format!("click {selector}"));
            if LOGIN.submit_buttons.iter().any(|s| *s == selector) && self.accept_credentials {
                self.present.borrow_mut().remove(LOGIN.login_button);
            }
            if selector == LOGIN.modal_close_button {
                self.present.borrow_mut().remove(LOGIN.modal_close_button);
            }
            Ok(())
        }

        fn fill(&self, selector: &str, text: &str, _timeout: Duration) -> anyhow::Result<()> {
            if !self.present.borrow().contains(selector) {
                anyhow::bail!("no element {selector}");
            }
            self.log.borrow_mut().push(format!("fill {selector}={text}"));
            Ok(())
        }

        fn is_present(&self, selector: &str, _timeout: Duration) -> bool {
            self.present.borrow().contains(selector)
        }

        fn settle(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn artifact(&self) -> Artifact {
            Artifact {
                url: "https://score.example.com/".into(),
                html: "<html></html>".into(),
            }
        }
    }

    struct RecordingSink(RefCell<Vec<String>>);

    impl DiagnosticsSink for RecordingSink {
        fn capture_failure(&self, context: &str, _artifact: Artifact) {
            self.0.borrow_mut().push(context.to_string());
        }
    }

    fn flow() -> LoginFlow {
        LoginFlow {
            click_backoff: Duration::ZERO,
            ..LoginFlow::new(Duration::from_millis(10))
        }
    }

    fn run(page: &FakePage, sink: &RecordingSink) -> Result<(), ScrapeError> {
        login(
            page,
            &flow(),
            "https://score.example.com/",
            "golfer@example.com",
            &Secret::new("hunter2"),
            sink,
        )
    }

    #[test]
    fn test_login_success_uses_first_available_submit() {
        let page = FakePage::login_page();
        let sink = RecordingSink(RefCell::new(Vec::new()));
        run(&page, &sink).unwrap();

        let log = page.log.borrow();
        assert_eq!(log[0], "open https://score.example.com/");
        assert!(log.contains(&format!("fill {}=golfer@example.com", LOGIN.username_input)));
        assert!(log.contains(&format!("click {}", LOGIN.submit_buttons[1])));
        assert!(sink.0.borrow().is_empty());
    }

    #[test]
    fn test_modal_is_closed_first() {
        let page = FakePage::login_page();
        page.present.borrow_mut().insert(LOGIN.modal_close_button);
        let sink = RecordingSink(RefCell::new(Vec::new()));
        run(&page, &sink).unwrap();
        assert_eq!(page.log.borrow()[1], format!("click {}", LOGIN.modal_close_button));
    }

    #[test]
    fn test_login_button_click_is_retried() {
        let page = FakePage::login_page();
        *page.flaky_login_clicks.borrow_mut() = 2;
        let sink = RecordingSink(RefCell::new(Vec::new()));
        run(&page, &sink).unwrap();
    }

    #[test]
    fn test_missing_login_button_fails_after_retries() {
        let page = FakePage::login_page();
        *page.flaky_login_clicks.borrow_mut() = 3;
        let sink = RecordingSink(RefCell::new(Vec::new()));
        let err = run(&page, &sink).unwrap_err();
        assert!(matches!(err, ScrapeError::Auth(_)));
        assert_eq!(*sink.0.borrow(), vec!["login_button_not_found".to_string()]);
    }

    #[test]
    fn test_missing_credential_fields() {
        let page = FakePage::new(&[LOGIN.login_button, LOGIN.username_input]);
        let sink = RecordingSink(RefCell::new(Vec::new()));
        run(&page, &sink).unwrap_err();
        assert_eq!(*sink.0.borrow(), vec!["credential_fields_not_found".to_string()]);
    }

    #[test]
    fn test_rejected_credentials() {
        let mut page = FakePage::login_page();
        page.accept_credentials = false;
        let sink = RecordingSink(RefCell::new(Vec::new()));
        let err = run(&page, &sink).unwrap_err();
        assert!(err.to_string().contains("login link still shown"));
        assert_eq!(*sink.0.borrow(), vec!["login_failed".to_string()]);
    }

    #[test]
    fn test_password_not_in_error() {
        let mut page = FakePage::login_page();
        page.accept_credentials = false;
        let sink = RecordingSink(RefCell::new(Vec::new()));
        let err = run(&page, &sink).unwrap_err();
        assert!(!format!("{err:?}").contains("hunter2"));
    }
}
