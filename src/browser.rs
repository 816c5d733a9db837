//! Thin wrapper around a headless-Chrome session.
//!
//! The storefront crawlers never touch the CDP tab directly; they work
//! through [`Session`], which keeps the browser handle alive, runs
//! small JS snippets and offers the handful of interactions the sites
//! need (navigate, type, click-by-text, measure scroll height).

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{info, warn};

/// Flags every session runs with.
const BASE_ARGS: &[&str] = &["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"];

/// Extra flags for storefronts that fingerprint automation.
const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--window-position=0,0",
];

pub struct Session {
    // Dropping the Browser closes Chrome, so it lives as long as the tab.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl Session {
    /// Starts Chrome with the standard flag set and opens one tab.
    pub fn launch(headless: bool) -> Result<Self> {
        Self::launch_with(headless, BASE_ARGS.to_vec())
    }

    /// Like [`Session::launch`] but with the automation fingerprint
    /// toned down. Kingfood blocks plainly-flagged sessions.
    pub fn launch_stealth(headless: bool) -> Result<Self> {
        let mut args = BASE_ARGS.to_vec();
        args.extend_from_slice(STEALTH_ARGS);
        Self::launch_with(headless, args)
    }

    fn launch_with(headless: bool, args: Vec<&str>) -> Result<Self> {
        let args: Vec<&OsStr> = args.into_iter().map(OsStr::new).collect();
        let browser = Browser::new(LaunchOptions {
            headless,
            window_size: Some((1920, 1080)),
            args,
            ..Default::default()
        })
        .context("failed to launch Chrome")?;
        let tab = browser.new_tab().context("failed to open a browser tab")?;
        Ok(Self { _browser: browser, tab })
    }

    pub fn goto(&self, url: &str) -> Result<()> {
        info!("opening {url}");
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .with_context(|| format!("failed to open {url}"))?;
        Ok(())
    }

    /// Serialized DOM of the current page, lazy-loaded content included.
    pub fn page_html(&self) -> Result<String> {
        self.tab.get_content().context("failed to read the page content")
    }

    /// Runs a JS expression and returns its value, if it produced one.
    pub fn eval(&self, expression: &str) -> Result<Option<Value>> {
        let object = self
            .tab
            .evaluate(expression, false)
            .context("script evaluation failed")?;
        Ok(object.value)
    }

    /// Runs a JS expression expected to answer `true` on success.
    pub fn eval_bool(&self, expression: &str) -> bool {
        match self.eval(expression) {
            Ok(value) => value.and_then(|v| v.as_bool()).unwrap_or(false),
            Err(error) => {
                warn!("script failed: {error:#}");
                false
            }
        }
    }

    pub fn scroll_height(&self) -> f64 {
        self.eval("document.body.scrollHeight")
            .ok()
            .flatten()
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0)
    }

    /// True once `css` matches something, polling up to `timeout`.
    pub fn wait_for(&self, css: &str, timeout: Duration) -> bool {
        self.tab.wait_for_element_with_custom_timeout(css, timeout).is_ok()
    }

    /// Waits for `css`, focuses it and types `text`. Focus goes through
    /// the page's own click handler; CDP clicks miss on these React
    /// storefronts while an element is still mounting.
    pub fn type_into(&self, css: &str, text: &str, timeout: Duration) -> bool {
        if !self.wait_for(css, timeout) {
            return false;
        }
        let focus = format!(
            r#"(() => {{
                const input = document.querySelector({css});
                if (!input) return false;
                input.click();
                input.focus();
                input.value = '';
                return true;
            }})()"#,
            css = js_string(css),
        );
        if !self.eval_bool(&focus) {
            warn!("could not focus {css}");
            return false;
        }
        let typed = self.tab.type_str(text).is_ok();
        if !typed {
            warn!("could not type into {css}");
        }
        typed
    }

    /// Clicks the first element matching `css` whose visible text
    /// contains `needle`, case-insensitively. Returns whether a click
    /// happened. The click runs inside the page so overlay-covered
    /// buttons still receive it.
    pub fn click_with_text(&self, css: &str, needle: &str) -> bool {
        let script = format!(
            r#"(() => {{
                const needle = {needle}.toLowerCase();
                const hit = [...document.querySelectorAll({css})]
                    .find(el => (el.innerText || '').toLowerCase().includes(needle));
                if (!hit) return false;
                hit.scrollIntoView({{block: 'center'}});
                hit.click();
                return true;
            }})()"#,
            needle = js_string(needle),
            css = js_string(css),
        );
        self.eval_bool(&script)
    }

    /// [`Session::click_with_text`] over plain `<button>` elements.
    pub fn click_button_with_text(&self, needle: &str) -> bool {
        self.click_with_text("button", needle)
    }
}

/// Embeds a Rust string as a JS string literal.
pub(crate) fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}
