use std::collections::BTreeMap;
use std::future::Future;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::capture::{Artifact, CaptureKind};
use crate::error::AppError;
use crate::gateway::{FetchRequest, FetchResponse};
use crate::models::{Character, Extraction, Field, RecordPatch, Tag};

/// Performs one HTTP request and returns the raw status and body.
///
/// Implementations own the proxy and timeout; adapters supply method, URL,
/// headers, cookies and body per request.
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, AppError>> + Send;
}

/// Site-specific implementation of the per-field extraction capability set.
///
/// The aggregator in [`crate::aggregator`] is written once against this trait:
/// it fetches and parses the root document, calls the synchronous
/// capabilities listed by [`fields`](Self::fields) in order, then resolves
/// each follow-up and merges the resulting patches. Capabilities a site does
/// not list keep their default `Unsupported` implementation.
pub trait SiteAdapter: Send + Sync {
    /// The parsed root document. It is never held across an await point, so
    /// it need not be `Send`.
    type Document;

    /// Work that needs further network round trips, keyed by identifiers
    /// taken from the root document.
    type FollowUp: Send;

    /// Short site identifier used in logs.
    fn site(&self) -> &'static str;

    /// Fetch the root document body. Failure aborts the whole extraction.
    fn fetch_root(&self, uri: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;

    /// Parse the root document. Failure aborts the whole extraction.
    fn parse(&self, uri: &str, body: &[u8]) -> Result<Self::Document, AppError>;

    /// The fixed sequence of synchronous capabilities this site supports.
    fn fields(&self) -> &'static [Field];

    /// Follow-up keys derived from the root document, resolved in order.
    fn follow_ups(&self, _uri: &str, _doc: &Self::Document) -> Vec<Self::FollowUp> {
        Vec::new()
    }

    /// Resolve one follow-up into values and per-field failures.
    fn resolve(&self, follow_up: Self::FollowUp) -> impl Future<Output = RecordPatch> + Send;

    fn extract_name(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::Name))
    }

    fn extract_brand(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::Brand))
    }

    fn extract_release_date(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::ReleaseDate))
    }

    fn extract_link(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::Link))
    }

    fn extract_tags(&self, _doc: &Self::Document) -> Result<Vec<Tag>, AppError> {
        Err(AppError::Unsupported(Field::Tags))
    }

    fn extract_genre(&self, _doc: &Self::Document) -> Result<Vec<String>, AppError> {
        Err(AppError::Unsupported(Field::Genre))
    }

    fn extract_preview(&self, _doc: &Self::Document) -> Result<Vec<String>, AppError> {
        Err(AppError::Unsupported(Field::Preview))
    }

    fn extract_story(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::Story))
    }

    fn extract_characters(&self, _doc: &Self::Document) -> Result<Vec<Character>, AppError> {
        Err(AppError::Unsupported(Field::Characters))
    }

    fn extract_information(&self, _doc: &Self::Document) -> Result<Vec<String>, AppError> {
        Err(AppError::Unsupported(Field::Information))
    }

    fn extract_size(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::Size))
    }

    fn extract_other_info(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::OtherInfo))
    }

    fn extract_walkthrough(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::WalkThrough))
    }

    fn extract_save_data(&self, _doc: &Self::Document) -> Result<String, AppError> {
        Err(AppError::Unsupported(Field::SaveData))
    }

    /// Extract one item. Errors only when the root document cannot be
    /// fetched or parsed; everything else ends up in the failure list.
    fn get_item(&self, uri: &str) -> impl Future<Output = Result<Extraction, AppError>> + Send
    where
        Self: Sized,
    {
        crate::aggregator::harvest(self, uri)
    }
}

/// Launches scripted browser sessions for the capture bridge.
pub trait CaptureDriver: Send + Sync {
    type Session: CaptureSession;

    fn launch(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// One live browser session, owned by a single capture call.
pub trait CaptureSession: Send {
    /// Apply extra request headers and load `url`.
    fn navigate(
        &mut self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Arm a listener for `kind`. The first qualifying artifact (or the error
    /// hit while pulling it) is sent on `slot`; the listener stops when
    /// `cancel` fires.
    fn listen(
        &mut self,
        kind: &CaptureKind,
        slot: oneshot::Sender<Result<Artifact, AppError>>,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Simulate a click on the first element matching `selector`.
    fn click(&mut self, selector: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Release the browser, tab and listener tasks.
    fn close(self) -> impl Future<Output = Result<(), AppError>> + Send;
}
