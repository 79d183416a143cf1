#![allow(dead_code)]
//! Shared doubles for pipeline integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tally_core::errors::{FetchError, SiteError};
use tally_core::model::{CheckSpec, SubmissionRecord, TaskDescriptor, TaskTemplate};
use tally_core::repo::{CommitInfo, RepoEntry, RepoFetcher, RepoRef};
use tally_core::site::{BrowserBackend, BrowserSession};

pub const MIT: &str = "MIT License\n\nCopyright (c) 2025 Student\n\nPermission is hereby granted, free of charge, to any person obtaining a copy\nof this software and associated documentation files (the \"Software\"), to deal\nin the Software without restriction.\n";
pub const README: &str = "# Calculator\n\nA small calculator deployed to Pages.\n\n## Usage\n\nOpen the page and type.";

pub fn issued_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Repository host double holding one revision.
pub struct FakeRepo {
    pub commit_at: DateTime<Utc>,
    pub files: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl FakeRepo {
    pub fn new(commit_at: DateTime<Utc>) -> Self {
        Self {
            commit_at,
            files: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// A well-formed submission: MIT license and a README.
    pub fn complete(commit_at: DateTime<Utc>) -> Self {
        Self::new(commit_at)
            .with_file("LICENSE", MIT)
            .with_file("README.md", README)
    }

    pub fn with_file(mut self, name: &str, content: &str) -> Self {
        self.files.insert(name.to_string(), content.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepoFetcher for FakeRepo {
    async fn commit(&self, _: &RepoRef, _: &str) -> Result<CommitInfo, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CommitInfo {
            author_date: self.commit_at,
            committer_date: self.commit_at,
        })
    }

    async fn root_entries(&self, _: &RepoRef, _: &str) -> Result<Vec<RepoEntry>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut names: Vec<_> = self.files.keys().cloned().collect();
        names.sort();
        Ok(names.into_iter().map(RepoEntry::file).collect())
    }

    async fn file(&self, _: &RepoRef, _: &str, path: &str) -> Result<Option<String>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.get(path).cloned())
    }
}

/// Static model of a rendered page answering the expressions the checker sends.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    pub present: HashSet<String>,
    pub text: HashMap<String, String>,
    pub body: String,
    pub globals: HashMap<String, Value>,
}

impl FakePage {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn with_element(mut self, selector: &str, text: &str) -> Self {
        self.present.insert(selector.to_string());
        self.text.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn with_global(mut self, expression: &str, value: Value) -> Self {
        self.globals.insert(expression.to_string(), value);
        self
    }

    fn selector_in(expression: &str) -> Option<String> {
        let start = expression.find("querySelector(")? + "querySelector(".len();
        let end = start + expression[start..].find(')')?;
        serde_json::from_str(&expression[start..end]).ok()
    }

    fn answer(&self, expression: &str) -> Value {
        if expression == "document.title" {
            return Value::String(self.title.clone());
        }
        if expression.contains("innerText") {
            return Value::String(self.body.clone());
        }
        if let Some(selector) = Self::selector_in(expression) {
            if expression.contains("textContent") {
                return self
                    .text
                    .get(&selector)
                    .map(|t| Value::String(t.clone()))
                    .unwrap_or(Value::Null);
            }
            return Value::Bool(self.present.contains(&selector));
        }
        self.globals.get(expression).cloned().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBehavior {
    Loads,
    Hangs,
}

/// Browser double counting opened and closed sessions.
pub struct FakeBrowser {
    pub page: FakePage,
    pub load: LoadBehavior,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub navigations: Arc<Mutex<Vec<String>>>,
    /// Sessions currently open, and the highest value seen.
    pub live: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    /// Leading `open` calls that fail before the browser starts.
    pub failing_opens: AtomicUsize,
    /// Leading navigations that fail with a load error.
    pub failing_loads: Arc<AtomicUsize>,
    pub open_delay: Duration,
    pub evaluate_delay: Duration,
}

impl FakeBrowser {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            load: LoadBehavior::Loads,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            navigations: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            failing_opens: AtomicUsize::new(0),
            failing_loads: Arc::new(AtomicUsize::new(0)),
            open_delay: Duration::ZERO,
            evaluate_delay: Duration::ZERO,
        }
    }

    pub fn hanging() -> Self {
        Self {
            load: LoadBehavior::Hangs,
            ..Self::new(FakePage::default())
        }
    }

    pub fn failing_opens(self, n: usize) -> Self {
        self.failing_opens.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_loads(self, n: usize) -> Self {
        self.failing_loads.store(n, Ordering::SeqCst);
        self
    }

    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn evaluate_delay(mut self, delay: Duration) -> Self {
        self.evaluate_delay = delay;
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl BrowserBackend for FakeBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SiteError> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if take_one(&self.failing_opens) {
            return Err(SiteError::Browser {
                message: "browser process exited during startup".into(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            page: self.page.clone(),
            load: self.load,
            closed: self.closed.clone(),
            live: self.live.clone(),
            navigations: self.navigations.clone(),
            failing_loads: self.failing_loads.clone(),
            evaluate_delay: self.evaluate_delay,
            is_closed: false,
        }))
    }
}

pub struct FakeSession {
    page: FakePage,
    load: LoadBehavior,
    closed: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    navigations: Arc<Mutex<Vec<String>>>,
    failing_loads: Arc<AtomicUsize>,
    evaluate_delay: Duration,
    is_closed: bool,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SiteError> {
        self.navigations.lock().unwrap().push(url.to_string());
        if self.load == LoadBehavior::Hangs {
            std::future::pending::<()>().await;
        }
        if take_one(&self.failing_loads) {
            return Err(SiteError::Load {
                message: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value, SiteError> {
        if !self.evaluate_delay.is_zero() {
            tokio::time::sleep(self.evaluate_delay).await;
        }
        Ok(self.page.answer(expression))
    }

    async fn close(&mut self) {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub fn task(checks: Vec<CheckSpec>) -> TaskDescriptor {
    let template = TaskTemplate {
        id: "calculator".into(),
        brief: "Build a calculator page".into(),
        checks,
    };
    TaskDescriptor::issue("student@example.com", &template, 1, issued_at())
}

pub fn submission(task: &TaskDescriptor, pages_url: &str) -> SubmissionRecord {
    SubmissionRecord {
        submission_id: format!("{}-r{}", task.task_id, task.round),
        repo_url: "https://github.com/student/calculator".into(),
        commit_sha: "0123456789abcdef0123456789abcdef01234567".into(),
        pages_url: pages_url.to_string(),
        submitted_at: issued_at() + chrono::Duration::hours(2),
        task_ref: task.task_id.clone(),
    }
}
