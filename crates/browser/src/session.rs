use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webwatch_core_types::{
    ExecutionError, ExecutionMetrics, ExecutionResult, ExecutionStatus, ExtractKind, Plan, Step,
    StepAction, StepOutcome, Viewport, WebWatchError,
};

use crate::error::{classify_launch_failure, classify_step_failure};

const DOM_CAPTURE_MAX_BYTES: usize = 100 * 1024;
const PAGE_TEXT_MAX_BYTES: usize = 3 * 1024;

#[derive(Clone, Debug)]
pub struct BrowserSessionConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub headers: HashMap<String, String>,
    pub default_timeout_ms: u64,
    /// Overrides auto-detection of the Chrome/Chromium executable
    /// (`WEBWATCH_CHROME_PATH`, mirroring the teacher's chrome-mode escape
    /// hatch).
    pub chrome_path: Option<String>,
    /// Ambient deadline (§5): cancelled by the orchestrator's timer task when
    /// the invocation's overall deadline elapses, checked between steps.
    pub cancellation: CancellationToken,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            headers: HashMap::new(),
            default_timeout_ms: 30_000,
            chrome_path: std::env::var("WEBWATCH_CHROME_PATH").ok(),
            cancellation: CancellationToken::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturedState {
    pub url: String,
    pub dom: String,
    pub screenshot_base64: Option<String>,
    pub viewport: Viewport,
    pub captured_at: chrono::DateTime<Utc>,
}

/// One logical tab. Owns the underlying `chromiumoxide::Browser` process and
/// its single `Page`; released on every exit path via `stop()`/`Drop`.
pub struct BrowserSession {
    browser: Browser,
    handler: Mutex<Option<JoinHandle<()>>>,
    page: Page,
    config: BrowserSessionConfig,
}

impl BrowserSession {
    /// Idempotent in spirit: callers are expected to hold one session per
    /// invocation and call `start` once. A second call on the same process
    /// still launches its own browser; reuse is the caller's responsibility.
    pub async fn start(config: BrowserSessionConfig) -> Result<Self, WebWatchError> {
        let chrome_path = config
            .chrome_path
            .clone()
            .or_else(|| which::which("chromium").ok().map(|p| p.display().to_string()))
            .or_else(|| which::which("google-chrome").ok().map(|p| p.display().to_string()));

        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport.width, config.viewport.height);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &chrome_path {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|e| classify_launch_failure(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| classify_launch_failure(e.to_string()))?;

        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| classify_launch_failure(e.to_string()))?;

        if let Some(ua) = &config.user_agent {
            let _ = page.set_user_agent(ua.as_str()).await;
        }

        Ok(Self {
            browser,
            handler: Mutex::new(Some(handler_task)),
            page,
            config,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.config.viewport.clone()
    }

    /// Clone of the session's cancellation token, shared with the orchestrator's
    /// deadline timer (§5) so other suspension points (e.g. the interactive
    /// agent's step loop) can observe the same deadline.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.config.cancellation.clone()
    }

    pub async fn current_url(&self) -> Result<String, WebWatchError> {
        self.page
            .url()
            .await
            .map_err(|e| WebWatchError::internal(e.to_string()))?
            .ok_or_else(|| WebWatchError::internal("page has no url"))
    }

    /// Sanitized, truncated page text — scripts/styles stripped (§4.1).
    pub async fn page_text(&self) -> Result<String, WebWatchError> {
        let text: String = self
            .page
            .evaluate(
                "(() => { const c = document.body ? document.body.cloneNode(true) : null; \
                 if (!c) return ''; c.querySelectorAll('script,style').forEach(n => n.remove()); \
                 return c.innerText || ''; })()",
            )
            .await
            .map_err(|e| WebWatchError::internal(e.to_string()))?
            .into_value()
            .unwrap_or_default();
        Ok(truncate_bytes(&text, PAGE_TEXT_MAX_BYTES))
    }

    pub async fn capture_state(&self) -> CapturedState {
        let url = self.current_url().await.unwrap_or_default();
        let dom = self.dom_snapshot().await.unwrap_or_default();
        let screenshot_base64 = self.screenshot(false).await.ok();
        CapturedState {
            url,
            dom,
            screenshot_base64,
            viewport: self.config.viewport.clone(),
            captured_at: Utc::now(),
        }
    }

    async fn dom_snapshot(&self) -> Result<String, WebWatchError> {
        let html: String = self
            .page
            .evaluate("document.body ? document.body.outerHTML : document.documentElement.outerHTML")
            .await
            .map_err(|e| WebWatchError::internal(e.to_string()))?
            .into_value()
            .unwrap_or_default();
        Ok(truncate_bytes(&html, DOM_CAPTURE_MAX_BYTES))
    }

    async fn screenshot(&self, full_page: bool) -> Result<String, WebWatchError> {
        let _ = full_page;
        let bytes = self
            .page
            .screenshot(
                chromiumoxide::page::ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Jpeg)
                    .quality(80)
                    .build(),
            )
            .await
            .map_err(|e| WebWatchError::internal(e.to_string()))?;
        Ok(BASE64.encode(bytes))
    }

    /// Runs a whole plan end to end (§4.1 `execute`).
    pub async fn execute(&self, plan: &Plan) -> ExecutionResult {
        let started = Instant::now();
        let mut logs = Vec::new();
        let mut screenshots = Vec::new();
        let mut extracted: HashMap<String, Value> = HashMap::new();
        let mut retry_count = 0u32;
        let mut completed = 0u32;
        let mut error: Option<ExecutionError> = None;
        let total = plan.steps.len() as u32;
        let mut timed_out = false;

        for step in &plan.steps {
            if self.config.cancellation.is_cancelled() {
                logs.push(format!("deadline elapsed before step {}", step.id));
                timed_out = true;
                break;
            }

            if let Some(condition) = &step.condition {
                match self.eval_condition(condition).await {
                    Ok(false) => {
                        logs.push(format!("step {} skipped (condition false)", step.id));
                        completed += 1;
                        continue;
                    }
                    Err(e) => {
                        logs.push(format!("step {} condition error: {}", step.id, e));
                    }
                    Ok(true) => {}
                }
            }

            let max_retries = step.max_retries(plan.error_handling.retry_count);
            let outcome = self.run_step_with_retries(step, max_retries).await;
            retry_count += outcome.attempts.saturating_sub(1);

            if outcome.skipped {
                logs.push(format!("step {} condition skipped", step.id));
                completed += 1;
                continue;
            }

            if let Some(result) = &outcome.result {
                if let StepAction::Extract { .. } = &step.action {
                    extracted.insert(step.id.clone(), result.clone());
                }
                if let StepAction::Screenshot { .. } = &step.action {
                    if let Some(s) = result.as_str() {
                        screenshots.push(s.to_string());
                    }
                }
            }

            if outcome.success {
                completed += 1;
                logs.push(format!("step {} ok ({} attempt(s))", step.id, outcome.attempts));
            } else if step.optional {
                warn!(step = %step.id, error = ?outcome.error, "optional step failed, continuing");
                logs.push(format!(
                    "step {} failed (optional, skipped): {}",
                    step.id,
                    outcome.error.clone().unwrap_or_default()
                ));
                completed += 1;
            } else {
                logs.push(format!(
                    "step {} failed: {}",
                    step.id,
                    outcome.error.clone().unwrap_or_default()
                ));
                error = Some(ExecutionError {
                    message: outcome.error.clone().unwrap_or_else(|| "step failed".to_string()),
                    step: Some(step.id.clone()),
                    stack: None,
                });
                break;
            }

            if let Some(wait_ms) = step.wait_after_ms {
                sleep(Duration::from_millis(wait_ms)).await;
            }
        }

        let status = if timed_out {
            ExecutionStatus::Timeout
        } else if error.is_some() {
            classify_failure_status(error.as_ref().unwrap())
        } else if completed < total {
            ExecutionStatus::Failed
        } else {
            match self.check_validation(&plan.validation).await {
                Ok(true) => ExecutionStatus::Success,
                Ok(false) => {
                    error = Some(ExecutionError {
                        message: "validation failed".to_string(),
                        step: None,
                        stack: None,
                    });
                    ExecutionStatus::Failed
                }
                Err(e) => {
                    error = Some(ExecutionError {
                        message: e.to_string(),
                        step: None,
                        stack: None,
                    });
                    ExecutionStatus::Failed
                }
            }
        };

        ExecutionResult {
            plan_id: plan.id.clone(),
            task_id: None,
            status,
            extracted_data: extracted,
            screenshots,
            logs,
            error,
            metrics: ExecutionMetrics {
                execution_time_ms: started.elapsed().as_millis() as u64,
                steps_completed: completed,
                steps_total: total,
                retry_count,
            },
            created_at: Utc::now(),
        }
    }

    async fn check_validation(&self, validation: &webwatch_core_types::PlanValidation) -> Result<bool, WebWatchError> {
        for criterion in &validation.success_criteria {
            if !self.eval_condition(criterion).await.unwrap_or(false) {
                debug!(criterion, "success criterion not met");
                return Ok(false);
            }
        }
        for criterion in &validation.failure_criteria {
            // Evaluation errors are treated as falsy, per §4.1.
            if self.eval_condition(criterion).await.unwrap_or(false) {
                debug!(criterion, "failure criterion triggered");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn eval_condition(&self, expr: &str) -> Result<bool, WebWatchError> {
        let value: Value = self
            .page
            .evaluate(expr)
            .await
            .map_err(|e| WebWatchError::internal(e.to_string()))?
            .into_value()
            .unwrap_or(Value::Bool(false));
        Ok(value.as_bool().unwrap_or(!value.is_null() && value != Value::Bool(false)))
    }

    /// Single-step execution used directly by the interactive agent, which
    /// owns tab lifecycle across steps and therefore skips this session's own
    /// cleanup (§9 "shared browser handle").
    pub async fn execute_step(&self, step: &Step) -> StepOutcome {
        self.run_step_with_retries(step, step.max_retries(3)).await
    }

    async fn run_step_with_retries(&self, step: &Step, max_retries: u32) -> StepOutcome {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_err = String::new();
        loop {
            attempts += 1;
            match self.run_step_once(step).await {
                Ok(result) => {
                    return StepOutcome::ok(&step.id, result, started.elapsed().as_millis() as u64, attempts);
                }
                Err(e) => {
                    last_err = classify_step_failure(&step.id, e.to_string()).to_string();
                    if attempts > max_retries {
                        break;
                    }
                    sleep(Duration::from_millis(1000 * attempts as u64)).await;
                }
            }
        }
        StepOutcome::failed(&step.id, last_err, started.elapsed().as_millis() as u64, attempts)
    }

    async fn run_step_once(&self, step: &Step) -> Result<Option<Value>, WebWatchError> {
        match &step.action {
            StepAction::Navigate { url } => {
                self.page
                    .goto(url.as_str())
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                self.page
                    .wait_for_navigation()
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
            StepAction::Click { selector } => {
                let element = self.find_element(selector).await?;
                element
                    .click()
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
            StepAction::Type { selector, value } => {
                let element = self.find_element(selector).await?;
                element
                    .type_str(value.as_str())
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
            StepAction::Select { selector, value } => {
                let script = format!(
                    "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
                     el.value = {val}; el.dispatchEvent(new Event('change', {{bubbles:true}})); return true; }})()",
                    sel = serde_json::to_string(selector).unwrap_or_default(),
                    val = serde_json::to_string(value).unwrap_or_default(),
                );
                let applied: bool = self
                    .page
                    .evaluate(script)
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?
                    .into_value()
                    .unwrap_or(false);
                if !applied {
                    return Err(WebWatchError::browser_execution(
                        format!("selector not found: {}", selector),
                        Some(step.id.clone()),
                    ));
                }
                Ok(None)
            }
            StepAction::Hover { selector } => {
                let element = self.find_element(selector).await?;
                element
                    .hover()
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
            StepAction::KeyPress { key } => {
                self.page
                    .press_key(key.as_str())
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
            StepAction::Scroll { x, y, direction } => {
                let script = match direction.as_deref() {
                    Some("bottom") => "window.scrollTo(0, document.body.scrollHeight)".to_string(),
                    Some("top") => "window.scrollTo(0, 0)".to_string(),
                    _ => format!("window.scrollBy({}, {})", x.unwrap_or(0), y.unwrap_or(400)),
                };
                self.page
                    .evaluate(script)
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
            StepAction::Wait { ms } => {
                sleep(Duration::from_millis(*ms)).await;
                Ok(None)
            }
            StepAction::WaitForSelector { selector, timeout_ms, state } => {
                let timeout = timeout_ms.unwrap_or(10_000).min(10_000);
                let wait_visible = matches!(state, Some(WaitForState::Visible));
                self.wait_for_selector(selector, timeout, wait_visible).await?;
                Ok(None)
            }
            StepAction::Extract { selector, multiple, attribute, kind } => {
                self.extract(selector, *multiple, attribute.as_deref(), kind.unwrap_or_default()).await
            }
            StepAction::Evaluate { script } => {
                let value = self
                    .page
                    .evaluate(script.as_str())
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?
                    .into_value()
                    .unwrap_or(Value::Null);
                Ok(Some(value))
            }
            StepAction::Screenshot { full_page } => {
                let encoded = self.screenshot(*full_page).await?;
                Ok(Some(Value::String(encoded)))
            }
            StepAction::Reload => {
                self.page
                    .reload()
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
            StepAction::GoBack => {
                self.page
                    .evaluate("window.history.back()")
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
            StepAction::GoForward => {
                self.page
                    .evaluate("window.history.forward()")
                    .await
                    .map_err(|e| WebWatchError::internal(e.to_string()))?;
                Ok(None)
            }
        }
    }

    async fn find_element(&self, selector: &str) -> Result<chromiumoxide::element::Element, WebWatchError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| WebWatchError::browser_execution(format!("selector not found: {}", selector), None))
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64, visible: bool) -> Result<(), WebWatchError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                if !visible {
                    return Ok(());
                }
                let box_model = element.bounding_box().await.ok();
                if box_model.is_some() {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(WebWatchError::navigation_timeout(format!(
                    "waitForSelector timed out: {}",
                    selector
                )));
            }
            sleep(Duration::from_millis(150)).await;
        }
    }

    async fn extract(
        &self,
        selector: &str,
        multiple: bool,
        attribute: Option<&str>,
        kind: ExtractKind,
    ) -> Result<Option<Value>, WebWatchError> {
        // "title" selectors read the document title directly and only wait
        // for DOM attachment, never visibility (§4.1 edge case).
        if selector.to_lowercase().contains("title") {
            let title: String = self
                .page
                .evaluate("document.title")
                .await
                .map_err(|e| WebWatchError::internal(e.to_string()))?
                .into_value()
                .unwrap_or_default();
            return Ok(Some(Value::String(title)));
        }

        let extractor = match (kind, attribute) {
            (ExtractKind::Html, _) => "el => el.outerHTML",
            (ExtractKind::Value, _) => "el => el.value ?? el.textContent ?? ''",
            (ExtractKind::Attribute, Some(attr)) => {
                return self.extract_attribute(selector, multiple, attr).await;
            }
            _ => "el => el.textContent ?? ''",
        };

        let script = format!(
            "(() => {{ const nodes = Array.from(document.querySelectorAll({sel})); \
             const fn = {extractor}; const values = nodes.map(fn); \
             return {wrap}; }})()",
            sel = serde_json::to_string(selector).unwrap_or_default(),
            extractor = extractor,
            wrap = if multiple { "values" } else { "values[0] ?? null" },
        );
        let value = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| WebWatchError::internal(e.to_string()))?
            .into_value()
            .unwrap_or(Value::Null);
        Ok(Some(value))
    }

    async fn extract_attribute(&self, selector: &str, multiple: bool, attribute: &str) -> Result<Option<Value>, WebWatchError> {
        let script = format!(
            "(() => {{ const nodes = Array.from(document.querySelectorAll({sel})); \
             const values = nodes.map(el => el.getAttribute({attr})); \
             return {wrap}; }})()",
            sel = serde_json::to_string(selector).unwrap_or_default(),
            attr = serde_json::to_string(attribute).unwrap_or_default(),
            wrap = if multiple { "values" } else { "values[0] ?? null" },
        );
        let value = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| WebWatchError::internal(e.to_string()))?
            .into_value()
            .unwrap_or(Value::Null);
        Ok(Some(value))
    }

    /// Releases the tab, the browser process, and the CDP event-handler task.
    /// Safe to call more than once; runs on every exit path including
    /// timeouts and panics via the caller's guard (§4.1).
    pub async fn stop(&self) {
        let _ = self.page.close().await;
        let mut guard = self.handler.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }
}

fn classify_failure_status(error: &ExecutionError) -> ExecutionStatus {
    if error.message.to_lowercase().contains("timeout") {
        ExecutionStatus::Timeout
    } else {
        ExecutionStatus::Failed
    }
}

fn truncate_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "a".repeat(10);
        assert_eq!(truncate_bytes(&s, 5).len(), 5);
        assert_eq!(truncate_bytes("short", 100), "short");
    }

    #[test]
    fn classifies_timeout_vs_failed() {
        let timeout = ExecutionError {
            message: "Navigation Timeout exceeded".to_string(),
            step: None,
            stack: None,
        };
        assert_eq!(classify_failure_status(&timeout), ExecutionStatus::Timeout);
        let failed = ExecutionError {
            message: "selector not found".to_string(),
            step: None,
            stack: None,
        };
        assert_eq!(classify_failure_status(&failed), ExecutionStatus::Failed);
    }
}
