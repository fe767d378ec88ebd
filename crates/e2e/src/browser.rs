//! Chromium lifecycle over the DevTools protocol.
//!
//! One `TestBrowser` is launched per suite; each scenario gets its own
//! [`Page`]. The CDP event handler must be polled continuously, so it runs on
//! a spawned task for as long as the browser lives.

use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::error::{E2eError, E2eResult};
use crate::page::Page;
use crate::wait::WaitConfig;

pub struct TestBrowser {
    inner: Arc<Mutex<Option<Browser>>>,
    handler: JoinHandle<()>,
}

impl TestBrowser {
    /// Launches Chromium with the given options.
    pub async fn launch(config: &BrowserConfig) -> E2eResult<Self> {
        debug!("Launching browser with config: {:?}", config);

        let (browser, mut handler) = Browser::launch(cdp_config(config)?)
            .await
            .map_err(|e| E2eError::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(browser))),
            handler,
        })
    }

    /// Opens a blank tab bound to `base_url`.
    pub async fn new_page(&self, base_url: &str, wait: WaitConfig) -> E2eResult<Page> {
        let guard = self.inner.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| E2eError::BrowserLaunch("browser already closed".to_string()))?;

        let page = browser.new_page("about:blank").await?;
        Ok(Page::new(page, base_url, wait))
    }

    /// Closes the browser. The handler task is stopped even when closing fails.
    pub async fn close(self) -> E2eResult<()> {
        let closed = match self.inner.lock().await.take() {
            Some(mut browser) => {
                debug!("Closing browser");
                let closed = browser.close().await;
                let _ = browser.wait().await;
                closed.map(|_| ())
            }
            None => Ok(()),
        };
        self.handler.abort();
        Ok(closed?)
    }
}

#[cfg(test)]
impl TestBrowser {
    pub(crate) async fn open_tabs(&self) -> usize {
        match self.inner.lock().await.as_ref() {
            Some(browser) => browser.pages().await.map(|p| p.len()).unwrap_or(0),
            None => 0,
        }
    }
}

fn cdp_config(config: &BrowserConfig) -> E2eResult<CdpBrowserConfig> {
    let mut builder = CdpBrowserConfig::builder()
        .window_size(config.window_width, config.window_height)
        .viewport(None);

    if !config.headless {
        builder = builder.with_head();
    }

    // A private profile per launch keeps parallel runs from sharing a
    // ProcessSingleton lock.
    let profile = std::env::temp_dir().join(format!("viewer-e2e-{}", uuid::Uuid::new_v4()));
    builder = builder.user_data_dir(profile);

    for arg in &config.args {
        builder = builder.arg(arg.clone());
    }

    if let Some(path) = &config.chrome_path {
        builder = builder.chrome_executable(path);
    }

    builder
        .build()
        .map_err(|e| E2eError::BrowserLaunch(format!("invalid browser configuration: {e}")))
}
