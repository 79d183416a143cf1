//! One evaluation arm per [`CheckKind`].

use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use super::BrowserSession;
use crate::model::{CheckKind, CheckOutcome, CheckResult, CheckSpec};

pub(super) struct CheckContext<'a> {
    pub http: &'a reqwest::Client,
    pub page_url: &'a url::Url,
    pub timeout: Duration,
    pub poll: Duration,
}

/// Quotes `s` as a JavaScript string literal.
pub fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// JavaScript truthiness of an evaluated value.
pub fn truthy(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

struct Polled {
    satisfied: bool,
    last: Option<serde_json::Value>,
    last_error: Option<String>,
}

impl Polled {
    fn describe_miss(&self, what: &str, timeout: Duration) -> String {
        let mut s = format!("timed out after {}ms waiting for {}", timeout.as_millis(), what);
        if let Some(v) = &self.last {
            s.push_str(&format!(" (last value: {})", v));
        }
        if let Some(e) = &self.last_error {
            s.push_str(&format!(" (last error: {})", e));
        }
        s
    }
}

/// Evaluates `expression` until `pred` holds or the check timeout elapses.
async fn poll_js(
    session: &mut dyn BrowserSession,
    expression: &str,
    ctx: &CheckContext<'_>,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> Polled {
    let deadline = Instant::now() + ctx.timeout;
    let mut polled = Polled {
        satisfied: false,
        last: None,
        last_error: None,
    };
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, session.evaluate(expression)).await {
            Ok(Ok(v)) if pred(&v) => {
                polled.satisfied = true;
                return polled;
            }
            Ok(Ok(v)) => polled.last = Some(v),
            Ok(Err(e)) => polled.last_error = Some(e.to_string()),
            Err(_) => return polled,
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return polled;
        }
        tokio::time::sleep(ctx.poll.min(remaining)).await;
    }
}

fn verdict(polled: Polled, ok: impl Into<String>, what: &str, timeout: Duration) -> (CheckOutcome, String) {
    if polled.satisfied {
        (CheckOutcome::Ok, ok.into())
    } else {
        (CheckOutcome::Fail, polled.describe_miss(what, timeout))
    }
}

pub(super) async fn run_check(
    session: &mut dyn BrowserSession,
    spec: &CheckSpec,
    ctx: &CheckContext<'_>,
) -> CheckResult {
    let started = Instant::now();
    let t = ctx.timeout;

    let (outcome, detail) = match &spec.kind {
        CheckKind::DomExists { selector } => {
            let expr = format!("document.querySelector({}) !== null", js_string(selector));
            let polled = poll_js(session, &expr, ctx, |v| v.as_bool() == Some(true)).await;
            verdict(polled, format!("{} present", selector), &format!("selector {}", selector), t)
        }

        CheckKind::DomText { selector, expected } => {
            let expr = format!(
                "(() => {{ const el = document.querySelector({}); return el ? el.textContent : null; }})()",
                js_string(selector)
            );
            let polled = poll_js(session, &expr, ctx, |v| {
                v.as_str().is_some_and(|text| text.contains(expected.as_str()))
            })
            .await;
            verdict(
                polled,
                format!("{} contains {:?}", selector, expected),
                &format!("{} to contain {:?}", selector, expected),
                t,
            )
        }

        CheckKind::JsTruthy { expression } => {
            let polled = poll_js(session, expression, ctx, truthy).await;
            verdict(polled, "expression is truthy", &format!("`{}` to be truthy", expression), t)
        }

        CheckKind::TitleContains { expected } => {
            let polled = poll_js(session, "document.title", ctx, |v| {
                v.as_str().is_some_and(|title| title.contains(expected.as_str()))
            })
            .await;
            verdict(
                polled,
                format!("title contains {:?}", expected),
                &format!("title to contain {:?}", expected),
                t,
            )
        }

        CheckKind::ContentMatch { pattern } => match Regex::new(pattern) {
            Err(e) => (CheckOutcome::Fail, format!("invalid pattern: {}", e)),
            Ok(re) => {
                let expr = "document.body ? document.body.innerText : ''";
                let polled = poll_js(session, expr, ctx, |v| v.as_str().is_some_and(|text| re.is_match(text))).await;
                let polled = Polled {
                    // Page text can be large; keep the detail short.
                    last: None,
                    ..polled
                };
                verdict(
                    polled,
                    format!("content matches /{}/", pattern),
                    &format!("content to match /{}/", pattern),
                    t,
                )
            }
        },

        CheckKind::HttpStatus { path, expected } => match ctx.page_url.join(path) {
            Err(e) => (CheckOutcome::Fail, format!("invalid path {}: {}", path, e)),
            Ok(target) => match tokio::time::timeout(t, ctx.http.get(target.clone()).send()).await {
                Err(_) => (
                    CheckOutcome::Fail,
                    format!("GET {} timed out after {}ms", target, t.as_millis()),
                ),
                Ok(Err(e)) => (CheckOutcome::Fail, format!("GET {} failed: {}", target, e)),
                Ok(Ok(resp)) if resp.status().as_u16() == *expected => {
                    (CheckOutcome::Ok, format!("GET {} -> {}", target, expected))
                }
                Ok(Ok(resp)) => (
                    CheckOutcome::Fail,
                    format!("GET {} -> {} (expected {})", target, resp.status().as_u16(), expected),
                ),
            },
        },
    };

    CheckResult {
        name: spec.name.clone(),
        kind: spec.kind.label().to_string(),
        outcome,
        detail,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
