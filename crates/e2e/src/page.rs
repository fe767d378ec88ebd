//! DOM interaction layer.
//!
//! `Page` wraps a chromiumoxide tab bound to the server's base URL. Queries
//! run as small scripts with JSON-quoted selectors; every `expect_*` method
//! polls until its condition holds or the wait budget runs out, so scenario
//! code never sleeps for a fixed time.

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, Cookie, DeleteCookiesParams,
};
use chromiumoxide::page::{Page as CdpPage, ScreenshotParams};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::client::SessionCredentials;
use crate::encoding::js_string;
use crate::error::{E2eError, E2eResult};
use crate::wait::{poll_until, Probe, WaitConfig};

/// Cookies kept across scenario cases; everything else is cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    preserve_prefixes: Vec<String>,
}

impl CookiePolicy {
    pub fn preserve(prefixes: &[&str]) -> Self {
        Self {
            preserve_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Session cookies of the server under test (`oc*`, `nc*`).
    pub fn session_cookies() -> Self {
        Self::preserve(&["oc", "nc"])
    }

    pub fn preserves(&self, cookie_name: &str) -> bool {
        self.preserve_prefixes
            .iter()
            .any(|prefix| cookie_name.starts_with(prefix.as_str()))
    }
}

/// Snapshot of the first element matching a selector.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ElementState {
    pub count: usize,
    pub visible: bool,
    pub text: Option<String>,
    pub classes: Vec<String>,
}

impl ElementState {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    value: T,
}

pub struct Page {
    inner: CdpPage,
    base_url: String,
    wait: WaitConfig,
}

impl Page {
    pub(crate) fn new(inner: CdpPage, base_url: &str, wait: WaitConfig) -> Self {
        Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            wait,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default wait budget for assertions on this page.
    pub fn wait(&self) -> WaitConfig {
        self.wait
    }

    pub fn url_for(&self, route: &str) -> String {
        resolve_url(&self.base_url, route)
    }

    pub async fn set_viewport(&self, width: u32, height: u32) -> E2eResult<()> {
        self.inner
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            ))
            .await?;
        Ok(())
    }

    /// Navigates and waits for `document.readyState == "complete"`.
    pub async fn visit(&self, route: &str) -> E2eResult<()> {
        let url = self.url_for(route);
        debug!("Visiting {}", url);
        self.inner.goto(url.as_str()).await?;

        poll_until(
            move || async move {
                let state: String = self.evaluate_wrapped("document.readyState").await?;
                Ok(if state == "complete" {
                    Probe::Ready(())
                } else {
                    Probe::Pending(format!("readyState {state}"))
                })
            },
            self.wait,
            "document ready",
        )
        .await
    }

    pub async fn close(self) -> E2eResult<()> {
        self.inner.close().await?;
        Ok(())
    }

    pub async fn current_url(&self) -> E2eResult<String> {
        self.evaluate_wrapped("window.location.href").await
    }

    /// Evaluates a script and deserializes its result.
    pub async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> E2eResult<T> {
        self.inner
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|e| E2eError::Script(e.to_string()))
    }

    // `null`/`undefined` results carry no value over CDP, so expressions are
    // wrapped in an object before they cross the boundary.
    async fn evaluate_wrapped<T: DeserializeOwned>(&self, expression: &str) -> E2eResult<T> {
        let script = format!("(() => ({{ value: ({expression}) }}))()");
        let wrapped: Wrapped<T> = self.evaluate(&script).await?;
        Ok(wrapped.value)
    }

    /// Counts, visibility, text and classes of the first match.
    pub async fn inspect(&self, selector: &str) -> E2eResult<ElementState> {
        let sel = js_string(selector)?;
        let script = format!(
            r#"(() => {{
  const els = Array.from(document.querySelectorAll({sel}));
  const el = els[0];
  if (!el) return {{ count: 0, visible: false, text: null, classes: [] }};
  let visible;
  if (typeof el.checkVisibility === 'function') {{
    visible = el.checkVisibility({{ visibilityProperty: true, opacityProperty: false }});
  }} else {{
    const style = window.getComputedStyle(el);
    visible = style.display !== 'none' && style.visibility !== 'hidden';
  }}
  const rect = el.getBoundingClientRect();
  visible = visible && (rect.width > 0 || rect.height > 0);
  return {{ count: els.length, visible, text: el.textContent, classes: Array.from(el.classList) }};
}})()"#
        );
        self.evaluate(&script).await
    }

    pub async fn attribute(&self, selector: &str, name: &str) -> E2eResult<Option<String>> {
        let expression = format!(
            "(document.querySelector({}) || {{ getAttribute: () => null }}).getAttribute({})",
            js_string(selector)?,
            js_string(name)?
        );
        self.evaluate_wrapped(&expression).await
    }

    /// Reads a property such as `href` (resolved, unlike the attribute).
    pub async fn property(&self, selector: &str, name: &str) -> E2eResult<Option<String>> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); return el ? String(el[{}]) : null; }})()",
            js_string(selector)?,
            js_string(name)?
        );
        self.evaluate_wrapped(&expression).await
    }

    /// Removes the first match; returns whether anything was removed.
    pub async fn remove_element(&self, selector: &str) -> E2eResult<bool> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.remove(); return true; }} return false; }})()",
            js_string(selector)?
        );
        self.evaluate_wrapped(&expression).await
    }

    /// Waits for the element to be visible, then clicks it.
    pub async fn click(&self, selector: &str, wait: WaitConfig) -> E2eResult<()> {
        self.expect_visible(selector, wait).await?;
        debug!("Clicking {}", selector);
        self.inner.find_element(selector).await?.click().await?;
        Ok(())
    }

    /// Waits for the element to be visible, focuses it and types `text`.
    pub async fn type_text(&self, selector: &str, text: &str, wait: WaitConfig) -> E2eResult<()> {
        self.expect_visible(selector, wait).await?;
        let element = self.inner.find_element(selector).await?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    pub async fn screenshot_to(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let png = self
            .inner
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await?;
        tokio::fs::write(path, png).await?;
        debug!("Screenshot saved to {}", path.display());
        Ok(())
    }

    // Cookies

    pub async fn cookies(&self) -> E2eResult<Vec<Cookie>> {
        Ok(self.inner.get_cookies().await?)
    }

    pub async fn clear_cookies(&self) -> E2eResult<()> {
        self.inner.execute(ClearBrowserCookiesParams::default()).await?;
        Ok(())
    }

    /// Deletes every cookie the policy does not preserve.
    pub async fn apply_cookie_policy(&self, policy: &CookiePolicy) -> E2eResult<usize> {
        let doomed: Vec<DeleteCookiesParams> = self
            .cookies()
            .await?
            .into_iter()
            .filter(|c| !policy.preserves(&c.name))
            .map(|c| {
                let mut params = DeleteCookiesParams::new(c.name);
                params.domain = Some(c.domain);
                params.path = Some(c.path);
                params
            })
            .collect();

        let removed = doomed.len();
        if removed > 0 {
            self.inner.delete_cookies(doomed).await?;
        }
        Ok(removed)
    }

    /// Request token and cookies of the logged-in session.
    pub async fn session_credentials(&self) -> E2eResult<SessionCredentials> {
        let request_token: Option<String> = self
            .evaluate_wrapped("(window.OC && window.OC.requestToken) || null")
            .await?;
        let request_token = request_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| E2eError::Script("page exposes no OC.requestToken".to_string()))?;

        let cookie_header = self
            .cookies()
            .await?
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        Ok(SessionCredentials {
            request_token,
            cookie_header,
        })
    }

    // Assertions

    pub async fn expect_exists(&self, selector: &str, wait: WaitConfig) -> E2eResult<ElementState> {
        self.expect_state(selector, wait, "to exist", |s| s.count > 0).await
    }

    pub async fn expect_visible(&self, selector: &str, wait: WaitConfig) -> E2eResult<ElementState> {
        self.expect_state(selector, wait, "to be visible", |s| s.visible).await
    }

    pub async fn expect_hidden(&self, selector: &str, wait: WaitConfig) -> E2eResult<()> {
        self.expect_state(selector, wait, "to be hidden", |s| !s.visible)
            .await
            .map(|_| ())
    }

    pub async fn expect_absent(&self, selector: &str, wait: WaitConfig) -> E2eResult<()> {
        self.expect_state(selector, wait, "to be absent", |s| s.count == 0)
            .await
            .map(|_| ())
    }

    pub async fn expect_count(&self, selector: &str, expected: usize, wait: WaitConfig) -> E2eResult<()> {
        self.expect_state(selector, wait, &format!("to have length {expected}"), |s| {
            s.count == expected
        })
        .await
        .map(|_| ())
    }

    pub async fn expect_text_contains(&self, selector: &str, needle: &str, wait: WaitConfig) -> E2eResult<()> {
        self.expect_state(selector, wait, &format!("to contain {needle:?}"), |s| {
            s.text.as_deref().is_some_and(|t| t.contains(needle))
        })
        .await
        .map(|_| ())
    }

    pub async fn expect_class(
        &self,
        selector: &str,
        class: &str,
        present: bool,
        wait: WaitConfig,
    ) -> E2eResult<()> {
        let expectation = if present {
            format!("to have class {class:?}")
        } else {
            format!("not to have class {class:?}")
        };
        self.expect_state(selector, wait, &expectation, |s| {
            s.count > 0 && s.has_class(class) == present
        })
        .await
        .map(|_| ())
    }

    /// Waits for the attribute to exist and returns its value.
    pub async fn expect_attribute(&self, selector: &str, name: &str, wait: WaitConfig) -> E2eResult<String> {
        self.expect_attribute_matching(selector, name, wait, "to exist", |_| true)
            .await
    }

    pub async fn expect_attribute_contains(
        &self,
        selector: &str,
        name: &str,
        needle: &str,
        wait: WaitConfig,
    ) -> E2eResult<String> {
        self.expect_attribute_matching(selector, name, wait, &format!("to contain {needle:?}"), |v| {
            v.contains(needle)
        })
        .await
    }

    pub async fn expect_attribute_equals(
        &self,
        selector: &str,
        name: &str,
        expected: &str,
        wait: WaitConfig,
    ) -> E2eResult<String> {
        self.expect_attribute_matching(selector, name, wait, &format!("to equal {expected:?}"), |v| {
            v == expected
        })
        .await
    }

    pub async fn expect_url_contains(&self, needle: &str, wait: WaitConfig) -> E2eResult<String> {
        poll_until(
            move || async move {
                let url = self.current_url().await?;
                Ok(if url.contains(needle) {
                    Probe::Ready(url)
                } else {
                    Probe::Pending(format!("url {url}"))
                })
            },
            wait,
            &format!("url to include {needle:?}"),
        )
        .await
        .map_err(assertion)
    }

    async fn expect_state<F>(
        &self,
        selector: &str,
        wait: WaitConfig,
        expectation: &str,
        check: F,
    ) -> E2eResult<ElementState>
    where
        F: Fn(&ElementState) -> bool,
    {
        let check = &check;
        poll_until(
            move || async move {
                let state = self.inspect(selector).await?;
                Ok(if check(&state) {
                    Probe::Ready(state)
                } else {
                    Probe::Pending(describe(&state))
                })
            },
            wait,
            &format!("expected '{selector}' {expectation}"),
        )
        .await
        .map_err(assertion)
    }

    async fn expect_attribute_matching<F>(
        &self,
        selector: &str,
        name: &str,
        wait: WaitConfig,
        expectation: &str,
        check: F,
    ) -> E2eResult<String>
    where
        F: Fn(&str) -> bool,
    {
        let check = &check;
        poll_until(
            move || async move {
                Ok(match self.attribute(selector, name).await? {
                    Some(value) if check(&value) => Probe::Ready(value),
                    Some(value) => Probe::Pending(format!("{name}={value:?}")),
                    None => Probe::Pending(format!("no {name} attribute")),
                })
            },
            wait,
            &format!("expected '{selector}' attribute {name} {expectation}"),
        )
        .await
        .map_err(assertion)
    }
}

/// Resolves a route against the base URL; absolute URLs pass through.
pub fn resolve_url(base_url: &str, route: &str) -> String {
    if route.contains("://") || route.starts_with("about:") || route.starts_with("data:") {
        route.to_string()
    } else if route.starts_with('/') {
        format!("{}{}", base_url, route)
    } else {
        format!("{}/{}", base_url, route)
    }
}

fn describe(state: &ElementState) -> String {
    if state.count == 0 {
        return "no matching element".to_string();
    }
    format!(
        "{} element(s), visible={}, classes=[{}]",
        state.count,
        state.visible,
        state.classes.join(" ")
    )
}

/// Turns a polling timeout into an assertion failure with the same message.
fn assertion(err: E2eError) -> E2eError {
    match err {
        E2eError::Timeout { condition, timeout } => {
            E2eError::AssertionFailed(format!("{condition} within {timeout:?}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_policy_keeps_oc_and_nc_cookies() {
        let policy = CookiePolicy::session_cookies();
        assert!(policy.preserves("oc_sessionPassphrase"));
        assert!(policy.preserves("ocabcdef123"));
        assert!(policy.preserves("nc_session_id"));
        assert!(!policy.preserves("__Host-nc_sameSiteCookielax"));
        assert!(!policy.preserves("cookie_test"));
    }

    #[test]
    fn element_state_parses_probe_output() {
        let state: ElementState = serde_json::from_value(serde_json::json!({
            "count": 2,
            "visible": true,
            "text": "audio.mp3",
            "classes": ["viewer", "modal-mask"]
        }))
        .unwrap();

        assert_eq!(state.count, 2);
        assert!(state.has_class("modal-mask"));
        assert!(!state.has_class("icon-loading"));
        assert_eq!(describe(&state), "2 element(s), visible=true, classes=[viewer modal-mask]");
    }

    #[test]
    fn routes_resolve_against_base_url() {
        let base = "http://localhost:8081";
        assert_eq!(resolve_url(base, "/apps/files"), "http://localhost:8081/apps/files");
        assert_eq!(resolve_url(base, "apps/files"), "http://localhost:8081/apps/files");
        assert_eq!(resolve_url(base, "about:blank"), "about:blank");
        assert_eq!(
            resolve_url(base, "https://other.test/logout?requesttoken=x"),
            "https://other.test/logout?requesttoken=x"
        );
    }

    #[test]
    fn empty_state_is_described_as_missing() {
        assert_eq!(describe(&ElementState::default()), "no matching element");
    }

    #[test]
    fn timeouts_become_assertion_failures() {
        let err = assertion(E2eError::Timeout {
            condition: "expected 'body > .viewer' to be visible".to_string(),
            timeout: std::time::Duration::from_secs(4),
        });
        match err {
            E2eError::AssertionFailed(msg) => assert!(msg.contains("body > .viewer")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
