use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sysinfo::{Pid, System};
use url::Url;

use crate::config::ScraperConfig;
use crate::models::RawListing;
use crate::plugins::traits::{RenderSession, SessionIdentity, SessionLauncher};
use crate::utils::error::{AppError, Result};

/// The browser must outlive the gap between polls; the session supervisor
/// decides when it goes away.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const BROWSER_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-blink-features=AutomationControlled",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

/// Launches one headless Chrome per session.
pub struct ChromeLauncher {
    config: ScraperConfig,
}

impl ChromeLauncher {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    fn launch_options(&self, identity: &SessionIdentity) -> Result<LaunchOptions<'static>> {
        let args: Vec<&'static OsStr> = BROWSER_ARGS.iter().map(OsStr::new).collect();

        let mut launch_options = LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(false)
            .window_size(Some(identity.viewport))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(args)
            .build()
            .map_err(|e| AppError::SessionUnavailable(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &self.config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        Ok(launch_options)
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self, identity: &SessionIdentity) -> Result<ChromeSession> {
        let launch_options = self.launch_options(identity)?;
        let user_agent = identity.user_agent.clone();
        let navigation_timeout = Duration::from_secs(self.config.navigation_timeout_secs);

        let (browser, tab) = tokio::task::spawn_blocking(move || -> Result<(Browser, Arc<Tab>)> {
            let browser = Browser::new(launch_options)
                .map_err(|e| AppError::SessionUnavailable(format!("Failed to launch browser: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| AppError::SessionUnavailable(format!("Failed to create tab: {}", e)))?;

            tab.set_default_timeout(navigation_timeout);
            tab.set_user_agent(&user_agent, Some("en-US,en;q=0.9"), None)
                .map_err(|e| AppError::SessionUnavailable(format!("Failed to set user agent: {}", e)))?;
            tab.enable_stealth_mode()
                .map_err(|e| AppError::SessionUnavailable(format!("Failed to enable stealth mode: {}", e)))?;

            Ok((browser, tab))
        })
        .await??;

        tracing::debug!(pid = ?browser.get_process_id(), "Chrome launched");

        Ok(ChromeSession {
            browser,
            tab,
            user_agent: identity.user_agent.clone(),
            results_selector: self.config.results_selector.clone(),
            navigation_timeout,
        })
    }

    fn kill_process(&self, pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_processes();

        let root = Pid::from_u32(pid);
        if system.process(root).is_none() {
            return false;
        }

        // Children first so renderers are not re-parented to init.
        let mut killed = false;
        for child in descendants(&system, root) {
            if let Some(process) = system.process(child) {
                killed |= process.kill();
            }
        }
        if let Some(process) = system.process(root) {
            killed |= process.kill();
        }
        killed
    }

    fn reap_stray_processes(&self) -> usize {
        let mut system = System::new();
        system.refresh_processes();
        let own_pid = sysinfo::get_current_pid().ok();

        let mut reaped = 0;
        for (pid, process) in system.processes() {
            if Some(*pid) == own_pid {
                continue;
            }
            let name = process.name().to_lowercase();
            let matches = self
                .config
                .reap_process_names
                .iter()
                .any(|candidate| name.contains(&candidate.to_lowercase()));
            if matches && process.kill() {
                tracing::debug!(pid = pid.as_u32(), name = %process.name(), "Killed stray renderer process");
                reaped += 1;
            }
        }
        reaped
    }
}

fn descendants(system: &System, root: Pid) -> Vec<Pid> {
    let mut found = Vec::new();
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) && !found.contains(pid) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }
    found.reverse();
    found
}

/// Rendered search results page.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub html: String,
    pub url: String,
}

pub struct ChromeSession {
    browser: Browser,
    tab: Arc<Tab>,
    user_agent: String,
    results_selector: String,
    navigation_timeout: Duration,
}

#[async_trait]
impl RenderSession for ChromeSession {
    type Page = SearchPage;

    async fn render(&mut self, url: &str) -> Result<SearchPage> {
        let tab = self.tab.clone();
        let url = url.to_string();
        let results_selector = self.results_selector.clone();
        let timeout = self.navigation_timeout;

        tokio::task::spawn_blocking(move || -> Result<SearchPage> {
            tab.navigate_to(&url)
                .map_err(|e| AppError::Scraping(format!("Navigation failed: {}", e)))?;
            tab.wait_until_navigated()
                .map_err(|e| AppError::Scraping(format!("Page load failed: {}", e)))?;

            if let Err(e) = tab.wait_for_element_with_custom_timeout(&results_selector, timeout) {
                tracing::warn!(selector = %results_selector, "Results container did not appear: {}", e);
            }

            let html = tab
                .get_content()
                .map_err(|e| AppError::Scraping(format!("Failed to get page content: {}", e)))?;
            let final_url = match tab.get_url() {
                current if current.is_empty() => url,
                current => current,
            };

            Ok(SearchPage { html, url: final_url })
        })
        .await?
    }

    fn extract_listings(&self, page: &SearchPage) -> Result<Vec<RawListing>> {
        parse_search_results(&page.html, &page.url)
    }

    async fn capture(&mut self, url: &str) -> Result<Vec<u8>> {
        let browser = self.browser.clone();
        let url = url.to_string();
        let user_agent = self.user_agent.clone();
        let timeout = self.navigation_timeout;

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let tab = browser
                .new_tab()
                .map_err(|e| AppError::Scraping(format!("Failed to create tab: {}", e)))?;
            tab.set_default_timeout(timeout);

            let png = tab
                .set_user_agent(&user_agent, Some("en-US,en;q=0.9"), None)
                .and_then(|_| tab.navigate_to(&url).map(|_| ()))
                .and_then(|_| tab.wait_until_navigated().map(|_| ()))
                .and_then(|_| tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true))
                .map_err(|e| AppError::Scraping(format!("Screenshot capture failed: {}", e)));

            let _ = tab.close(true);
            png
        })
        .await?
    }

    fn process_id(&self) -> Option<u32> {
        self.browser.get_process_id()
    }

    async fn close(self) -> Result<()> {
        let Self { browser, tab, .. } = self;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(true) {
                tracing::debug!("Failed to close tab: {}", e);
            }
            // Dropping the last handle terminates the Chrome process.
            drop(browser);
        })
        .await?;
        Ok(())
    }
}

struct ResultSelectors {
    item: Selector,
    title: Selector,
    link: Selector,
    price: Selector,
    image: Selector,
    item_id: Regex,
}

impl ResultSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            item: selector(".s-item, li.s-card")?,
            title: selector(".s-item__title, .s-card__title")?,
            link: selector("a.s-item__link, a.su-link, a[href*=\"/itm/\"]")?,
            price: selector(".s-item__price, .s-card__price")?,
            image: selector("img")?,
            item_id: Regex::new(r"/itm/(?:[^/?#]+/)?(\d+)").map_err(|e| AppError::Parse {
                message: format!("Invalid item id pattern: {}", e),
            })?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::Parse {
        message: format!("Invalid CSS selector '{}': {:?}", css, e),
    })
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts candidate listings from a search results page. Entries without a
/// resolvable item id are dropped; promotional cards are skipped.
pub fn parse_search_results(html: &str, page_url: &str) -> Result<Vec<RawListing>> {
    let selectors = ResultSelectors::new()?;
    let base = Url::parse(page_url).ok();
    let document = Html::parse_document(html);

    let mut listings = Vec::new();
    for item in document.select(&selectors.item) {
        let title = item
            .select(&selectors.title)
            .next()
            .map(text_of)
            .unwrap_or_default();
        if title.contains("Shop on eBay") {
            continue;
        }
        let title = title.strip_prefix("New Listing").unwrap_or(&title).trim().to_string();

        let href = item
            .select(&selectors.link)
            .find_map(|link| link.value().attr("href"))
            .unwrap_or_default();
        let url = match &base {
            Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        };

        let id = item
            .value()
            .attr("data-listingid")
            .map(str::to_string)
            .or_else(|| {
                selectors
                    .item_id
                    .captures(&url)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            });
        let Some(id) = id.filter(|id| !id.trim().is_empty()) else {
            tracing::trace!(title = %title, "Skipping result without an item id");
            continue;
        };

        let price = item.select(&selectors.price).next().map(text_of);
        let image = item.select(&selectors.image).next().and_then(|img| {
            img.value()
                .attr("src")
                .filter(|src| !src.starts_with("data:"))
                .or_else(|| img.value().attr("data-src"))
                .map(str::to_string)
        });

        listings.push(RawListing {
            id,
            title,
            url,
            price,
            image,
        });
    }

    Ok(listings)
}
