pub mod aggregator;
pub mod capture;
pub mod config;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod models;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use capture::{
    Artifact, CaptureBridge, CaptureEvent, CaptureKind, CaptureReporter, CaptureRequest,
    CaptureState, TracingCaptureReporter,
};
pub use config::{CaptureConfig, ScraperConfig, SiteConfig};
pub use error::AppError;
pub use fanout::{FanOut, FanOutLimit, fan_out};
pub use gateway::{FetchRequest, FetchResponse, Method};
pub use models::{Category, Character, Extraction, Field, FieldFailure, Record, RecordPatch, Tag, TagItem};
pub use traits::{CaptureDriver, CaptureSession, Fetcher, SiteAdapter};
pub use util::{euc_jp_to_utf8, resolve_url};
