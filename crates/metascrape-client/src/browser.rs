use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams, Headers, RequestId, ResourceType,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use metascrape_core::capture::{Artifact, CaptureKind};
use metascrape_core::config::CaptureConfig;
use metascrape_core::error::AppError;
use metascrape_core::traits::{CaptureDriver, CaptureSession};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Launches a fresh Chromium per capture via the Chrome DevTools Protocol.
///
/// Each session owns its browser process, one tab, the CDP handler task and
/// any listener tasks; [`CaptureSession::close`] tears all of them down.
#[derive(Debug, Clone)]
pub struct ChromiumDriver {
    config: CaptureConfig,
    proxy: Option<String>,
}

impl ChromiumDriver {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            proxy: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    fn browser_config(&self) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        if let Some(bin) = self.find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        builder = if self.config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };

        if let Some(proxy) = &self.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }

        builder
            .arg(format!("--user-agent={}", self.config.user_agent))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))
    }

    /// The configured binary if it exists, else the first well-known install
    /// found. `None` lets `chromiumoxide` do its own lookup.
    ///
    /// The snap wrapper at `/snap/bin/chromium` drops unknown flags, so the
    /// real binary inside the snap is preferred.
    fn find_chrome_binary(&self) -> Option<PathBuf> {
        if let Some(bin) = self.config.chrome_bin.as_ref().filter(|p| p.exists()) {
            return Some(bin.clone());
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }
}

impl CaptureDriver for ChromiumDriver {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession, AppError> {
        let config = self.browser_config()?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                shutdown(browser, handler).await;
                return Err(AppError::BrowserError(format!("Failed to open tab: {e}")));
            }
        };

        Ok(ChromiumSession {
            browser,
            page,
            handler,
            listeners: Vec::new(),
        })
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
}

impl ChromiumSession {
    async fn arm_xhr(
        &mut self,
        slot: oneshot::Sender<Result<Artifact, AppError>>,
        cancel: CancellationToken,
    ) -> Result<(), AppError> {
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to listen for responses: {e}")))?;
        let page = self.page.clone();

        self.listeners.push(tokio::spawn(async move {
            let delivered = tokio::select! {
                () = cancel.cancelled() => return,
                delivered = async {
                    let request_id = first_xhr(&mut responses).await?;
                    Some(pull_body(&page, request_id).await)
                } => delivered,
            };
            // Dropping the slot without a value reports a closed listener.
            if let Some(outcome) = delivered {
                let _ = slot.send(outcome);
            }
        }));
        Ok(())
    }

    async fn arm_download(
        &mut self,
        dir: &Path,
        slot: oneshot::Sender<Result<Artifact, AppError>>,
        cancel: CancellationToken,
    ) -> Result<(), AppError> {
        let dir = std::path::absolute(dir)
            .map_err(|e| AppError::ConfigError(format!("Invalid download directory: {e}")))?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::ConfigError(format!("Cannot create {}: {e}", dir.display()))
        })?;

        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(dir.to_string_lossy())
            .events_enabled(true)
            .build()
            .map_err(AppError::BrowserError)?;
        self.browser
            .execute(behavior)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to allow downloads: {e}")))?;

        let mut begins = self
            .browser
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to listen for downloads: {e}")))?;
        let mut progress = self
            .browser
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to listen for downloads: {e}")))?;

        self.listeners.push(tokio::spawn(async move {
            let delivered = tokio::select! {
                () = cancel.cancelled() => return,
                delivered = async {
                    let begin = begins.next().await?;
                    tracing::debug!(guid = %begin.guid, url = %begin.url, "Download started");
                    completed(&mut progress, &begin.guid, &dir).await
                } => delivered,
            };
            if let Some(outcome) = delivered {
                let _ = slot.send(outcome);
            }
        }));
        Ok(())
    }
}

impl CaptureSession for ChromiumSession {
    async fn navigate(
        &mut self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), AppError> {
        if !headers.is_empty() {
            let headers = Headers::new(serde_json::to_value(headers)?);
            self.page
                .execute(SetExtraHttpHeadersParams::new(headers))
                .await
                .map_err(|e| AppError::BrowserError(format!("Failed to set headers: {e}")))?;
        }

        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to navigate to {url}: {e}")))?;
        Ok(())
    }

    async fn listen(
        &mut self,
        kind: &CaptureKind,
        slot: oneshot::Sender<Result<Artifact, AppError>>,
        cancel: CancellationToken,
    ) -> Result<(), AppError> {
        match kind {
            CaptureKind::XhrResponse => self.arm_xhr(slot, cancel).await,
            CaptureKind::Download { dir } => self.arm_download(dir, slot, cancel).await,
        }
    }

    async fn click(&mut self, selector: &str) -> Result<(), AppError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| AppError::BrowserError(format!("No element matches {selector}: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to click {selector}: {e}")))?;
        Ok(())
    }

    async fn close(self) -> Result<(), AppError> {
        for listener in &self.listeners {
            listener.abort();
        }
        let closed = self.page.close().await;
        shutdown(self.browser, self.handler).await;
        closed.map_err(|e| AppError::BrowserError(format!("Failed to close tab: {e}")))
    }
}

async fn shutdown(mut browser: Browser, handler: JoinHandle<()>) {
    if let Err(e) = browser.close().await {
        tracing::debug!(error = %e, "Browser close failed");
    }
    if let Err(e) = browser.wait().await {
        tracing::debug!(error = %e, "Browser process wait failed");
    }
    handler.abort();
}

/// The request id of the first XHR answered with a non-error status.
async fn first_xhr(responses: &mut EventStream<EventResponseReceived>) -> Option<RequestId> {
    while let Some(event) = responses.next().await {
        if event.r#type == ResourceType::Xhr && event.response.status < 400 {
            tracing::debug!(url = %event.response.url, status = event.response.status, "Captured XHR");
            return Some(event.request_id.clone());
        }
    }
    None
}

async fn pull_body(page: &Page, request_id: RequestId) -> Result<Artifact, AppError> {
    let returns = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .map_err(|e| AppError::BrowserError(format!("Failed to read response body: {e}")))?
        .result;

    let body = if returns.base64_encoded {
        BASE64
            .decode(returns.body)
            .map_err(|e| AppError::ParseError(format!("Invalid base64 body: {e}")))?
    } else {
        returns.body.into_bytes()
    };
    Ok(Artifact::Body(body))
}

async fn completed(
    progress: &mut EventStream<EventDownloadProgress>,
    guid: &str,
    dir: &Path,
) -> Option<Result<Artifact, AppError>> {
    while let Some(event) = progress.next().await {
        if event.guid != guid {
            continue;
        }
        match event.state {
            DownloadProgressState::Completed => {
                return Some(Ok(Artifact::Download {
                    guid: guid.to_string(),
                    path: dir.join(guid),
                }));
            }
            DownloadProgressState::Canceled => {
                return Some(Err(AppError::BrowserError(format!(
                    "download {guid} was canceled"
                ))));
            }
            DownloadProgressState::InProgress => {}
        }
    }
    None
}
