//! Browser session over the Chrome DevTools Protocol
//!
//! One [`BrowserSession`] owns one Chrome process, the task pumping its
//! CDP events, one page and a throwaway profile directory. Every lookup the
//! suite makes goes through a [`Locator`], and every interaction is
//! preceded by a bounded wait.

use std::future::Future;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::error::{E2eError, E2eResult};

/// Interval between condition checks while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How to find elements on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Css(String),
    XPath(String),
    LinkText(String),
    PartialLinkText(String),
}

/// Compiled form of a [`Locator`]
enum Query {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Locator::XPath(selector.into())
    }

    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Locator::PartialLinkText(text.into())
    }

    fn query(&self) -> Query {
        match self {
            // Ids like `form[My Form]` need CSS escaping; XPath takes them verbatim
            Locator::Id(id) => Query::XPath(format!("//*[@id={}]", xpath_literal(id))),
            Locator::Css(css) => Query::Css(css.clone()),
            Locator::XPath(xpath) => Query::XPath(xpath.clone()),
            Locator::LinkText(text) => Query::XPath(format!(
                "//a[normalize-space(.)={}]",
                xpath_literal(text)
            )),
            Locator::PartialLinkText(text) => Query::XPath(format!(
                "//a[contains(normalize-space(.), {})]",
                xpath_literal(text)
            )),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Id(s) => write!(f, "id={}", s),
            Locator::Css(s) => write!(f, "css={}", s),
            Locator::XPath(s) => write!(f, "xpath={}", s),
            Locator::LinkText(s) => write!(f, "link={}", s),
            Locator::PartialLinkText(s) => write!(f, "partial-link={}", s),
        }
    }
}

/// Quote a string as an XPath 1.0 literal
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// What an element wait requires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitCondition {
    /// Attached to the DOM
    #[default]
    Present,
    /// Attached, displayed and enabled
    Clickable,
}

/// Handle to a running browser with one open page
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    _profile: TempDir,
}

impl BrowserSession {
    /// Launch Chrome with a fresh profile and open a blank page
    pub async fn launch(config: &BrowserConfig) -> E2eResult<Self> {
        let profile = tempfile::Builder::new().prefix("rcsel-chrome-").tempdir()?;

        let mut builder = CdpConfig::builder()
            .user_data_dir(profile.path())
            .window_size(config.window_width, config.window_height);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if config.accept_invalid_certs {
            builder = builder.arg("--ignore-certificate-errors");
        }
        let cdp_config = builder.build().map_err(E2eError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(cdp_config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!("Browser session started (headless: {})", config.headless);

        Ok(Self {
            browser: Some(browser),
            page,
            handler,
            _profile: profile,
        })
    }

    pub async fn goto(&self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    pub async fn current_url(&self) -> E2eResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    pub async fn title(&self) -> E2eResult<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    /// First element matching `locator`, without waiting
    pub async fn find(&self, locator: &Locator) -> E2eResult<Element> {
        let found = match locator.query() {
            Query::Css(css) => self.page.find_element(css).await,
            Query::XPath(xpath) => self.page.find_xpath(xpath).await,
        };
        found.map_err(|e| {
            debug!("Lookup {} failed: {}", locator, e);
            E2eError::ElementNotFound(locator.to_string())
        })
    }

    /// Every element matching `locator`; empty when none match
    pub async fn find_all(&self, locator: &Locator) -> E2eResult<Vec<Element>> {
        let elements = match locator.query() {
            Query::Css(css) => self.page.find_elements(css).await?,
            Query::XPath(xpath) => self.page.find_xpaths(xpath).await?,
        };
        Ok(elements)
    }

    /// Wait until an element matching `locator` satisfies `condition`
    pub async fn wait_for(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        timeout: Duration,
    ) -> E2eResult<Element> {
        poll_until(&locator.to_string(), timeout, || async {
            let Ok(element) = self.find(locator).await else {
                return Ok(None);
            };
            match condition {
                WaitCondition::Present => Ok(Some(element)),
                // A node detached mid-check counts as not clickable yet
                WaitCondition::Clickable => Ok(matches!(is_interactable(&element).await, Ok(true))
                    .then_some(element)),
            }
        })
        .await
    }

    /// Wait until at least one element matches `locator`
    pub async fn wait_for_all(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> E2eResult<Vec<Element>> {
        poll_until(&locator.to_string(), timeout, || async {
            // Lookup failures while the page settles count as no match yet
            let elements = match self.find_all(locator).await {
                Ok(elements) => elements,
                Err(e) => {
                    debug!("Lookup {} failed: {}", locator, e);
                    Vec::new()
                }
            };
            Ok((!elements.is_empty()).then_some(elements))
        })
        .await
    }

    /// Wait until an already-located element is displayed and enabled
    pub async fn wait_until_clickable(&self, element: &Element, timeout: Duration) -> E2eResult<()> {
        poll_until("element to become clickable", timeout, || async {
            Ok(is_interactable(element).await?.then_some(()))
        })
        .await
    }

    /// Wait until the current URL contains `fragment`
    pub async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> E2eResult<String> {
        poll_until(&format!("URL containing {:?}", fragment), timeout, || async {
            let url = self.current_url().await?;
            Ok(url.contains(fragment).then_some(url))
        })
        .await
    }

    /// Run `body` as the body of a function in the page and return its result
    pub async fn execute(&self, body: &str) -> E2eResult<Value> {
        let result = self
            .page
            .evaluate(format!("(() => {{ {} }})()", body))
            .await?;
        Ok(result.value().cloned().unwrap_or_default())
    }

    /// Close the browser. Failures are logged and teardown continues.
    pub async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Failed to reap browser process: {}", e);
            }
        }
        self.handler.abort();
        info!("Browser session closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Poll `check` every [`POLL_INTERVAL`] until it yields a value or `timeout`
/// elapses. Errors from `check` end the wait.
pub async fn poll_until<T, F, Fut>(what: &str, timeout: Duration, mut check: F) -> E2eResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Option<T>>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if start.elapsed() >= timeout {
            return Err(E2eError::Timeout(format!("{} after {:?}", what, timeout)));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Displayed and enabled, as a user could interact with it
pub async fn is_interactable(element: &Element) -> E2eResult<bool> {
    let returns = element
        .call_js_fn(
            "function() { \
                const style = window.getComputedStyle(this); \
                const shown = !!(this.offsetWidth || this.offsetHeight || this.getClientRects().length) \
                    && style.visibility !== 'hidden'; \
                return shown && !this.disabled; \
            }",
            false,
        )
        .await?;
    Ok(returns
        .result
        .value
        .as_ref()
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Option values of a `<select>`, in document order
pub async fn option_values(element: &Element) -> E2eResult<Vec<String>> {
    let returns = element
        .call_js_fn(
            "function() { return JSON.stringify(Array.from(this.options).map(o => o.value)); }",
            false,
        )
        .await?;
    match returns.result.value {
        Some(Value::String(json)) => Ok(serde_json::from_str(&json)?),
        other => Err(E2eError::Script(format!(
            "expected option list, got {:?}",
            other
        ))),
    }
}

/// Select the option with `value` and fire `change`. `false` when absent.
pub async fn select_by_value(element: &Element, value: &str) -> E2eResult<bool> {
    let function = format!(
        "function() {{ \
            const v = {}; \
            if (!Array.from(this.options).some(o => o.value === v)) return false; \
            this.value = v; \
            this.dispatchEvent(new Event('change', {{ bubbles: true }})); \
            return true; \
        }}",
        serde_json::to_string(value)?
    );
    let returns = element.call_js_fn(function, false).await?;
    Ok(returns
        .result
        .value
        .as_ref()
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Attribute value, empty when the attribute is missing
pub async fn attribute(element: &Element, name: &str) -> E2eResult<String> {
    Ok(element.attribute(name).await?.unwrap_or_default())
}

/// Rendered text, trimmed
pub async fn text(element: &Element) -> E2eResult<String> {
    Ok(element
        .inner_text()
        .await?
        .unwrap_or_default()
        .trim()
        .to_string())
}
