//! HTTP fetcher, Chromium capture driver and the per-site adapters.

#[cfg(feature = "browser")]
pub mod browser;
pub mod fetcher;
pub mod sites;

#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, ChromiumSession};
pub use fetcher::ReqwestFetcher;
pub use sites::{AdapterRegistry, Bangumi, GGBases, GetChu, Site, TwoDFan};
