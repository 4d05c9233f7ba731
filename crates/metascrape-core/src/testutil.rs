//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit and integration tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::{Artifact, CaptureEvent, CaptureKind, CaptureReporter, CaptureState};
use crate::error::AppError;
use crate::gateway::{FetchRequest, FetchResponse};
use crate::traits::{CaptureDriver, CaptureSession, Fetcher};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Canned {
    Respond(u16, Vec<u8>),
    Fail(String),
}

/// Mock fetcher that serves canned responses keyed by exact URL.
///
/// Unrouted URLs answer `404`. Every request is logged, and the highest
/// number of concurrently running fetches is tracked.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, Canned>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `200` and `body`.
    pub fn route(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.route_status(url, 200, body)
    }

    pub fn route_status(self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Respond(status, body.into()));
        self
    }

    /// Fail `url` with a network error.
    pub fn fail(self, url: &str, message: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned::Fail(message.to_string()));
        self
    }

    /// Hold every response for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.urls().iter().filter(|u| u.starts_with(prefix)).count()
    }

    /// Highest number of fetches observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, AppError> {
        let canned = self.routes.lock().unwrap().get(&request.url).cloned();
        self.requests.lock().unwrap().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match canned {
            Some(Canned::Respond(status, body)) => Ok(FetchResponse::new(status, body)),
            Some(Canned::Fail(message)) => Err(AppError::NetworkError(message)),
            None => Ok(FetchResponse::new(404, "not found")),
        }
    }
}

// ---------------------------------------------------------------------------
// MockDriver / MockSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Delivery {
    /// The qualifying event never fires.
    Silent,
    /// Deliver `artifact` after the delay.
    After(Duration, Artifact),
    /// The listener drops its slot without sending.
    Drop,
}

/// Scripted behavior of one mock browser session.
#[derive(Debug, Clone)]
pub struct SessionScript {
    navigate_delay: Option<Duration>,
    navigate_error: Option<String>,
    delivery: Delivery,
}

impl SessionScript {
    pub fn delivers(after: Duration, artifact: Artifact) -> Self {
        Self {
            navigate_delay: None,
            navigate_error: None,
            delivery: Delivery::After(after, artifact),
        }
    }

    pub fn silent() -> Self {
        Self {
            navigate_delay: None,
            navigate_error: None,
            delivery: Delivery::Silent,
        }
    }

    pub fn drops_listener() -> Self {
        Self {
            delivery: Delivery::Drop,
            ..Self::silent()
        }
    }

    pub fn navigate_after(mut self, delay: Duration) -> Self {
        self.navigate_delay = Some(delay);
        self
    }

    pub fn navigate_fails(mut self, message: &str) -> Self {
        self.navigate_error = Some(message.to_string());
        self
    }
}

#[derive(Default)]
struct DriverLog {
    launched: AtomicUsize,
    closed: AtomicUsize,
    cancelled: AtomicUsize,
    navigations: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    armed: Mutex<Vec<CaptureKind>>,
    clicks: Mutex<Vec<String>>,
}

/// Mock capture driver. Sessions follow `script`, except that download
/// listeners follow the script given to [`for_downloads`](Self::for_downloads).
#[derive(Clone)]
pub struct MockDriver {
    script: SessionScript,
    download_script: Option<SessionScript>,
    launch_error: Option<String>,
    log: Arc<DriverLog>,
}

impl MockDriver {
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            download_script: None,
            launch_error: None,
            log: Arc::new(DriverLog::default()),
        }
    }

    pub fn failing_launch(message: &str) -> Self {
        Self {
            launch_error: Some(message.to_string()),
            ..Self::new(SessionScript::silent())
        }
    }

    pub fn for_downloads(mut self, script: SessionScript) -> Self {
        self.download_script = Some(script);
        self
    }

    pub fn launched(&self) -> usize {
        self.log.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.log.closed.load(Ordering::SeqCst)
    }

    /// Listeners that stopped because their token was cancelled.
    pub fn cancelled_listeners(&self) -> usize {
        self.log.cancelled.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.log.navigations.lock().unwrap().clone()
    }

    pub fn armed_kinds(&self) -> Vec<CaptureKind> {
        self.log.armed.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.log.clicks.lock().unwrap().clone()
    }
}

impl CaptureDriver for MockDriver {
    type Session = MockSession;

    async fn launch(&self) -> Result<MockSession, AppError> {
        if let Some(message) = &self.launch_error {
            return Err(AppError::BrowserError(message.clone()));
        }
        self.log.launched.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            script: self.script.clone(),
            download_script: self.download_script.clone(),
            log: Arc::clone(&self.log),
            listeners: Vec::new(),
        })
    }
}

pub struct MockSession {
    script: SessionScript,
    download_script: Option<SessionScript>,
    log: Arc<DriverLog>,
    listeners: Vec<JoinHandle<()>>,
}

impl CaptureSession for MockSession {
    async fn navigate(
        &mut self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), AppError> {
        self.log
            .navigations
            .lock()
            .unwrap()
            .push((url.to_string(), headers.clone()));
        if let Some(delay) = self.script.navigate_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script.navigate_error {
            Some(message) => Err(AppError::BrowserError(message.clone())),
            None => Ok(()),
        }
    }

    async fn listen(
        &mut self,
        kind: &CaptureKind,
        slot: oneshot::Sender<Result<Artifact, AppError>>,
        cancel: CancellationToken,
    ) -> Result<(), AppError> {
        self.log.armed.lock().unwrap().push(kind.clone());

        let script = match (kind, &self.download_script) {
            (CaptureKind::Download { .. }, Some(script)) => script,
            _ => &self.script,
        };
        let log = Arc::clone(&self.log);
        let handle = match script.delivery.clone() {
            Delivery::Silent => tokio::spawn(async move {
                cancel.cancelled().await;
                log.cancelled.fetch_add(1, Ordering::SeqCst);
                drop(slot);
            }),
            Delivery::After(delay, artifact) => tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {
                        let _ = slot.send(Ok(artifact));
                    }
                    () = cancel.cancelled() => {
                        log.cancelled.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }),
            Delivery::Drop => tokio::spawn(async move { drop(slot) }),
        };
        self.listeners.push(handle);
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), AppError> {
        self.log.clicks.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn close(self) -> Result<(), AppError> {
        // Listener tokens are cancelled before close, so these all finish.
        for handle in self.listeners {
            let _ = handle.await;
        }
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Capture reporter that records transitions and releases.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    transitions: Arc<Mutex<Vec<(Uuid, CaptureState, CaptureState)>>>,
    released: Arc<Mutex<Vec<bool>>>,
    launched: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn transitions(&self) -> Vec<(CaptureState, CaptureState)> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .map(|&(_, from, to)| (from, to))
            .collect()
    }

    pub fn released(&self) -> Vec<bool> {
        self.released.lock().unwrap().clone()
    }

    pub fn launched_urls(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    /// Every event in arrival order: `launched`, `{from}->{to}` or `released`.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CaptureReporter for RecordingReporter {
    fn report(&self, event: CaptureEvent<'_>) {
        let label = match event {
            CaptureEvent::Launched { url, .. } => {
                self.launched.lock().unwrap().push(url.to_string());
                "launched".to_string()
            }
            CaptureEvent::Transition {
                session_id,
                from,
                to,
            } => {
                self.transitions.lock().unwrap().push((session_id, from, to));
                format!("{}->{}", from.as_str(), to.as_str())
            }
            CaptureEvent::Released { clean, .. } => {
                self.released.lock().unwrap().push(clean);
                "released".to_string()
            }
        };
        self.events.lock().unwrap().push(label);
    }
}
