#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use playwright::api::{Browser, Page, Viewport};
#[cfg(feature = "browser")]
use playwright::Playwright;
#[cfg(feature = "browser")]
use std::time::Duration;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use super::PageFetcher;
#[cfg(feature = "browser")]
use crate::config::ScrapingConfig;
#[cfg(feature = "browser")]
use crate::error::{FetchError, SproutlyError, SproutlyResult};

#[cfg(feature = "browser")]
const CLOSE_MODAL_SCRIPT: &str = r#"(() => {
    const button = document.querySelector('button.big-close');
    if (button) { button.click(); return true; }
    return false;
})()"#;

#[cfg(feature = "browser")]
const OPEN_SHOP_NAV_SCRIPT: &str = r#"(() => {
    const nav = document.querySelector('div[data-nav-menu="shop"]');
    if (!nav) { return false; }
    for (const type of ['mouseenter', 'mouseover']) {
        nav.dispatchEvent(new MouseEvent(type, { bubbles: true }));
    }
    return true;
})()"#;

/// Max scroll steps per page, guards against infinite feeds
#[cfg(feature = "browser")]
const MAX_SCROLL_STEPS: usize = 200;

/// Chromium-backed page fetcher using Playwright
#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    config: ScrapingConfig,
    _playwright: Playwright,
    browser: Browser,
}

// Playwright handles are only touched through async calls on the runtime
#[cfg(feature = "browser")]
unsafe impl Send for BrowserFetcher {}
#[cfg(feature = "browser")]
unsafe impl Sync for BrowserFetcher {}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    /// Launch Chromium with the configured viewport and headless mode
    pub async fn new(config: &ScrapingConfig) -> SproutlyResult<Self> {
        debug!("Initializing browser fetcher");

        let playwright = Playwright::initialize()
            .await
            .map_err(|e| SproutlyError::browser(format!("Failed to start Playwright: {}", e)))?;
        playwright
            .prepare()
            .map_err(|e| SproutlyError::browser(format!("Failed to install Chromium: {}", e)))?;

        let browser = playwright
            .chromium()
            .launcher()
            .headless(config.headless)
            .launch()
            .await
            .map_err(|e| SproutlyError::browser(format!("Failed to launch Chromium: {}", e)))?;

        info!(
            "Chromium launched ({}x{}, headless: {})",
            config.viewport_width, config.viewport_height, config.headless
        );

        Ok(Self {
            config: config.clone(),
            _playwright: playwright,
            browser,
        })
    }

    async fn load(&self, page: &Page, url: &str, wait_budget: Duration) -> Result<String, FetchError> {
        let response = page
            .goto_builder(url)
            .goto()
            .await
            .map_err(|e| FetchError::transient(url, e.to_string()))?;

        if let Some(response) = response {
            if let Ok(status) = response.status() {
                if let Some(err) = FetchError::from_status(url, status as u16) {
                    return Err(err);
                }
            }
        }

        tokio::time::sleep(wait_budget).await;

        // promo modal and shop menu are optional
        if let Ok(true) = page.evaluate::<(), bool>(CLOSE_MODAL_SCRIPT, ()).await {
            debug!("Closed modal on {}", url);
        }
        if let Ok(true) = page.evaluate::<(), bool>(OPEN_SHOP_NAV_SCRIPT, ()).await {
            tokio::time::sleep(self.config.scroll_wait()).await;
        }

        self.scroll_to_end(page, url).await;

        page.content()
            .await
            .map_err(|e| FetchError::transient(url, e.to_string()))
    }

    /// Scroll in viewport-sized steps until the document stops growing
    async fn scroll_to_end(&self, page: &Page, url: &str) {
        let step = self.config.scroll_step().max(1) as i64;
        let mut position = 0i64;

        for _ in 0..MAX_SCROLL_STEPS {
            let height = match page
                .evaluate::<(), i64>("document.body.scrollHeight", ())
                .await
            {
                Ok(height) => height,
                Err(e) => {
                    debug!("Could not read page height on {}: {}", url, e);
                    return;
                }
            };

            if position >= height {
                break;
            }

            position += step;
            let script = format!("window.scrollTo(0, {})", position);
            if page.evaluate::<(), ()>(&script, ()).await.is_err() {
                return;
            }

            tokio::time::sleep(self.config.scroll_wait()).await;
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, wait_budget: Duration) -> Result<String, FetchError> {
        url::Url::parse(url).map_err(|e| FetchError::permanent(url, format!("invalid URL: {}", e)))?;
        debug!("Browser fetching {}", url);

        let context = self
            .browser
            .context_builder()
            .user_agent(&self.config.user_agent)
            .viewport(Some(Viewport {
                width: self.config.viewport_width as i32,
                height: self.config.viewport_height as i32,
            }))
            .build()
            .await
            .map_err(|e| FetchError::transient(url, format!("browser context: {}", e)))?;

        let result = match context.new_page().await {
            Ok(page) => self.load(&page, url, wait_budget).await,
            Err(e) => Err(FetchError::transient(url, format!("new page: {}", e))),
        };

        if let Err(e) = context.close().await {
            warn!("Failed to close browser context: {}", e);
        }

        result
    }

    fn engine(&self) -> &'static str {
        "browser"
    }

    async fn close(&self) {
        info!("Closing Chromium");
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
    }
}

// Stub implementation when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher;

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub async fn new(_config: &crate::config::ScrapingConfig) -> crate::error::SproutlyResult<Self> {
        Err(crate::error::SproutlyError::browser(
            "Browser feature not enabled, rebuild with --features browser or use the http engine",
        ))
    }

}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl super::PageFetcher for BrowserFetcher {
    async fn fetch(
        &self,
        url: &str,
        _wait_budget: std::time::Duration,
    ) -> Result<String, crate::error::FetchError> {
        Err(crate::error::FetchError::permanent(url, "browser feature not enabled"))
    }

    fn engine(&self) -> &'static str {
        "browser"
    }
}
