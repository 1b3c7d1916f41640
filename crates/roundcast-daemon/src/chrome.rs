//! Headless-Chrome implementation of [`PageProbes`] via the DevTools protocol.
//!
//! Owns the browser for the life of the process. The prediction page keeps
//! rendering on its own; probes are read-only `Runtime.evaluate` calls, so no
//! navigation happens after startup.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::snapshot::{PageProbes, SnapshotError};

const PREV_TEXT_JS: &str = r#"(() => {
  const el = document.querySelector('.swiper-slide-prev');
  return el ? el.textContent : null;
})()"#;

const PREV_COLOR_JS: &str = r#"(() => {
  const el = document.querySelector('.swiper-slide-prev > div > div > div > div > div > div > div:nth-of-type(2) > div');
  return el ? window.getComputedStyle(el).getPropertyValue('color') : null;
})()"#;

const ACTIVE_COLOR_JS: &str = r#"(() => {
  const el = document.querySelector('.swiper-slide-active > div > div > div > div > div > div > div:nth-of-type(1) > div');
  return el ? window.getComputedStyle(el).getPropertyValue('color') : null;
})()"#;

const TIMER_JS: &str = r#"(() => {
  const el = document.querySelector('#__next > div > div > div > div > div > div > div > div > div > div:nth-child(3) > div > div > div > div > div');
  return el ? el.textContent : null;
})()"#;

/// Elements of the risk-disclaimer flow that must be clicked through before
/// the round carousel renders.
const DISCLAIMER_SELECTORS: [&str; 3] = [
    "#responsibility-checkbox",
    "#beta-checkbox",
    "#predictions-risk-disclaimer-continue",
];

const SELECTOR_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct ChromeConfig {
    /// URL of the prediction page to monitor.
    pub page_url: String,
    /// Explicit Chrome binary path; `None` lets chromiumoxide discover one.
    pub chrome_path: Option<PathBuf>,
}

pub struct ChromeProbes {
    page: Page,
    _browser: Browser,
    _handler_task: JoinHandle<()>,
}

impl From<CdpError> for SnapshotError {
    fn from(e: CdpError) -> Self {
        SnapshotError::Probe(e.to_string())
    }
}

impl ChromeProbes {
    /// Launch a headless browser, open the prediction page, and click through
    /// the disclaimer flow. Failure here is fatal to the caller: without a
    /// page there is nothing to poll.
    pub async fn launch(config: ChromeConfig) -> Result<Self, SnapshotError> {
        let mut builder = BrowserConfig::builder().args(vec![
            "--disable-setuid-sandbox",
            "--no-sandbox",
            "--single-process",
            "--no-zygote",
        ]);
        if let Some(path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(SnapshotError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SnapshotError::Launch(e.to_string()))?;

        // The handler must be driven for the CDP connection to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "cdp handler event error");
                }
            }
        });

        tracing::info!(url = %config.page_url, "opening prediction page");
        let page = browser
            .new_page(config.page_url.as_str())
            .await
            .map_err(|e| SnapshotError::Launch(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| SnapshotError::Launch(e.to_string()))?;

        for selector in DISCLAIMER_SELECTORS {
            let element = wait_for_element(&page, selector).await?;
            element
                .click()
                .await
                .map_err(|e| SnapshotError::Launch(e.to_string()))?;
            tracing::debug!(selector = %selector, "dismissed disclaimer element");
        }

        tracing::info!("prediction page ready");
        Ok(Self {
            page,
            _browser: browser,
            _handler_task: handler_task,
        })
    }

    async fn eval_text(&self, js: &str) -> Result<Option<String>, SnapshotError> {
        let result = self.page.evaluate(js).await?;
        result
            .into_value::<Option<String>>()
            .map_err(|e| SnapshotError::Probe(e.to_string()))
    }
}

#[async_trait]
impl PageProbes for ChromeProbes {
    async fn previous_round_text(&self) -> Result<Option<String>, SnapshotError> {
        self.eval_text(PREV_TEXT_JS).await
    }

    async fn previous_round_color(&self) -> Result<Option<String>, SnapshotError> {
        self.eval_text(PREV_COLOR_JS).await
    }

    async fn active_round_color(&self) -> Result<Option<String>, SnapshotError> {
        self.eval_text(ACTIVE_COLOR_JS).await
    }

    async fn timer_text(&self) -> Result<Option<String>, SnapshotError> {
        self.eval_text(TIMER_JS).await
    }
}

/// Poll for a selector until it appears or the wait times out.
async fn wait_for_element(
    page: &Page,
    selector: &str,
) -> Result<chromiumoxide::element::Element, SnapshotError> {
    let deadline = tokio::time::Instant::now() + SELECTOR_WAIT_TIMEOUT;
    loop {
        match page.find_element(selector).await {
            Ok(element) => return Ok(element),
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
            }
            Err(e) => {
                return Err(SnapshotError::Launch(format!(
                    "selector {selector} never appeared: {e}"
                )));
            }
        }
    }
}
