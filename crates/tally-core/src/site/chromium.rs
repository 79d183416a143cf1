//! Headless Chromium over CDP.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::RemoteObjectType;
use chromiumoxide::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BrowserBackend, BrowserSession};
use crate::config::SiteConfig;
use crate::errors::SiteError;

fn browser_err(e: impl std::fmt::Display) -> SiteError {
    SiteError::Browser {
        message: e.to_string(),
    }
}

/// `undefined` carries no value and reads as `null`. Any other unreadable
/// result is a browser error rather than a falsy value.
fn decode_value(
    undefined: bool,
    value: serde_json::Result<serde_json::Value>,
) -> Result<serde_json::Value, SiteError> {
    match value {
        Ok(v) => Ok(v),
        Err(_) if undefined => Ok(serde_json::Value::Null),
        Err(e) => Err(SiteError::Browser {
            message: format!("unreadable evaluation result: {}", e),
        }),
    }
}

/// Launches one Chromium process per session with a throwaway profile directory.
#[derive(Debug, Clone, Default)]
pub struct ChromiumBackend {
    executable: Option<PathBuf>,
}

impl ChromiumBackend {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    pub fn from_config(cfg: &SiteConfig) -> Self {
        Self::new(cfg.chrome_executable.as_ref().map(PathBuf::from))
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBackend {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SiteError> {
        let profile = tempfile::Builder::new()
            .prefix("tally-profile-")
            .tempdir()
            .map_err(browser_err)?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-extensions")
            .arg("--no-first-run");
        if let Some(exe) = &self.executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder.build().map_err(browser_err)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                let mut session = ChromiumSession {
                    browser: Some(browser),
                    page: None,
                    handler,
                    _profile: profile,
                };
                session.close().await;
                return Err(browser_err(e));
            }
        };
        debug!(profile = %profile.path().display(), "browser session opened");

        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            page: Some(page),
            handler,
            _profile: profile,
        }))
    }
}

struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: JoinHandle<()>,
    // Removed from disk when the session is dropped.
    _profile: TempDir,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, SiteError> {
        self.page.as_ref().ok_or_else(|| SiteError::Browser {
            message: "session already closed".into(),
        })
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SiteError> {
        let page = self.page()?;
        page.goto(url.to_string()).await.map_err(|e| SiteError::Load {
            message: e.to_string(),
        })?;
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, SiteError> {
        let page = self.page()?;
        let result = page.evaluate(expression).await.map_err(browser_err)?;
        let undefined = matches!(result.object().r#type, RemoteObjectType::Undefined);
        decode_value(undefined, result.into_value::<serde_json::Value>())
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
            let _ = browser.wait().await;
        }
        self.handler.abort();
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
