//! Browser capture bridge.
//!
//! Some artifacts (a magnet hash returned by an XHR, a torrent file behind a
//! download button) only exist after page scripts run. The bridge drives one
//! short-lived browser session per call through
//!
//! ```text
//! Idle ──navigate, arm listener, click──▶ Listening ──event──▶ Captured ──receive──▶ Delivered
//!   │                                         │
//!   └──────────────── error ──▶ Failed        └──── deadline ──▶ TimedOut
//! ```
//!
//! Launch, navigation, arming, the click and the delivery receive all race a
//! single deadline. When it elapses the shared [`CancellationToken`] is
//! cancelled so listener tasks stop, and the session is closed on every exit
//! path before the call returns.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::traits::{CaptureDriver, CaptureSession};

/// Overall budget for one capture session.
pub const DEFAULT_CAPTURE_DEADLINE: Duration = Duration::from_secs(60);

/// Which browser event qualifies as the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureKind {
    /// The first XHR response with a non-error status. Its body is pulled
    /// through the debugging protocol.
    XhrResponse,
    /// The first completed download. Downloads are allowed into `dir` and
    /// each file is named after its download identifier.
    Download { dir: PathBuf },
}

/// What to load, what to click, and what to wait for.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub url: String,
    /// CSS selector of the element whose click produces the artifact.
    pub trigger: String,
    pub kind: CaptureKind,
    /// Extra request headers applied before navigation.
    pub headers: BTreeMap<String, String>,
}

impl CaptureRequest {
    pub fn new(url: impl Into<String>, trigger: impl Into<String>, kind: CaptureKind) -> Self {
        Self {
            url: url.into(),
            trigger: trigger.into(),
            kind,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

/// The single artifact delivered by a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Full body of the captured response.
    Body(Vec<u8>),
    /// A completed download, identified by the browser's download id.
    Download { guid: String, path: PathBuf },
}

impl Artifact {
    pub fn into_body(self) -> Result<Vec<u8>, AppError> {
        match self {
            Artifact::Body(body) => Ok(body),
            Artifact::Download { guid, .. } => Err(AppError::BrowserError(format!(
                "expected a response body, got download {guid}"
            ))),
        }
    }

    pub fn into_download(self) -> Result<(String, PathBuf), AppError> {
        match self {
            Artifact::Download { guid, path } => Ok((guid, path)),
            Artifact::Body(_) => Err(AppError::BrowserError(
                "expected a download, got a response body".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
    Captured,
    Delivered,
    TimedOut,
    Failed,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Listening => "listening",
            CaptureState::Captured => "captured",
            CaptureState::Delivered => "delivered",
            CaptureState::TimedOut => "timed_out",
            CaptureState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureState::Delivered | CaptureState::TimedOut | CaptureState::Failed
        )
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events emitted by the bridge for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CaptureEvent<'a> {
    Launched {
        session_id: Uuid,
        url: &'a str,
    },
    Transition {
        session_id: Uuid,
        from: CaptureState,
        to: CaptureState,
    },
    Released {
        session_id: Uuid,
        clean: bool,
    },
}

/// Trait for receiving capture events (decoupled logging).
pub trait CaptureReporter: Send + Sync {
    fn report(&self, event: CaptureEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCaptureReporter;

impl CaptureReporter for TracingCaptureReporter {
    fn report(&self, event: CaptureEvent<'_>) {
        match event {
            CaptureEvent::Launched { session_id, url } => {
                tracing::info!(%session_id, %url, "Capture session launched");
            }
            CaptureEvent::Transition {
                session_id,
                from,
                to,
            } => match to {
                CaptureState::TimedOut | CaptureState::Failed => {
                    tracing::warn!(%session_id, %from, %to, "Capture session ended");
                }
                _ => tracing::debug!(%session_id, %from, %to, "Capture state changed"),
            },
            CaptureEvent::Released { session_id, clean } => {
                tracing::info!(%session_id, %clean, "Capture session released");
            }
        }
    }
}

/// Drives capture sessions launched by `D`.
pub struct CaptureBridge<D, R = TracingCaptureReporter> {
    driver: D,
    deadline: Duration,
    reporter: R,
}

impl<D: CaptureDriver> CaptureBridge<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            deadline: DEFAULT_CAPTURE_DEADLINE,
            reporter: TracingCaptureReporter,
        }
    }
}

impl<D: CaptureDriver, R: CaptureReporter> CaptureBridge<D, R> {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_reporter<R2: CaptureReporter>(self, reporter: R2) -> CaptureBridge<D, R2> {
        CaptureBridge {
            driver: self.driver,
            deadline: self.deadline,
            reporter,
        }
    }

    /// Run one session and deliver exactly one artifact, or an error.
    ///
    /// The session is closed before this returns, whatever the outcome.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<Artifact, AppError> {
        let deadline = Deadline::start(self.deadline);
        let mut machine = Machine::new(&self.reporter);

        let mut session = match deadline.bound(self.driver.launch()).await {
            Ok(session) => session,
            Err(e) => {
                machine.end(&e);
                return Err(e);
            }
        };
        self.reporter.report(CaptureEvent::Launched {
            session_id: machine.session_id,
            url: &request.url,
        });

        let outcome = drive(&mut session, request, &deadline, &mut machine).await;
        if let Err(e) = &outcome {
            machine.end(e);
        }

        deadline.token.cancel();
        let clean = match session.close().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = %machine.session_id, error = %e, "Failed to close capture session");
                false
            }
        };
        self.reporter.report(CaptureEvent::Released {
            session_id: machine.session_id,
            clean,
        });
        outcome
    }
}

async fn drive<S: CaptureSession, R: CaptureReporter>(
    session: &mut S,
    request: &CaptureRequest,
    deadline: &Deadline,
    machine: &mut Machine<'_, R>,
) -> Result<Artifact, AppError> {
    deadline
        .bound(session.navigate(&request.url, &request.headers))
        .await?;

    // Armed before the click so the triggered event cannot be missed.
    let (slot, delivery) = oneshot::channel();
    deadline
        .bound(session.listen(&request.kind, slot, deadline.token.child_token()))
        .await?;
    machine.to(CaptureState::Listening);

    deadline.bound(session.click(&request.trigger)).await?;

    let captured = deadline
        .bound(async { delivery.await.map_err(|_| AppError::ListenerClosed) })
        .await?;
    machine.to(CaptureState::Captured);

    let artifact = captured?;
    machine.to(CaptureState::Delivered);
    Ok(artifact)
}

/// One deadline shared by every suspension point of a session.
struct Deadline {
    at: Instant,
    budget: Duration,
    token: CancellationToken,
}

impl Deadline {
    fn start(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
            token: CancellationToken::new(),
        }
    }

    async fn bound<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        tokio::select! {
            outcome = fut => outcome,
            () = tokio::time::sleep_until(self.at) => {
                self.token.cancel();
                Err(AppError::CaptureDeadline(self.budget.as_secs()))
            }
        }
    }
}

struct Machine<'r, R: CaptureReporter> {
    session_id: Uuid,
    state: CaptureState,
    reporter: &'r R,
}

impl<'r, R: CaptureReporter> Machine<'r, R> {
    fn new(reporter: &'r R) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: CaptureState::Idle,
            reporter,
        }
    }

    fn to(&mut self, next: CaptureState) {
        if self.state.is_terminal() {
            return;
        }
        self.reporter.report(CaptureEvent::Transition {
            session_id: self.session_id,
            from: self.state,
            to: next,
        });
        self.state = next;
    }

    fn end(&mut self, error: &AppError) {
        match error {
            AppError::CaptureDeadline(_) => self.to(CaptureState::TimedOut),
            _ => self.to(CaptureState::Failed),
        }
    }
}
