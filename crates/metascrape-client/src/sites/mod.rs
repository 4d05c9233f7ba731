//! Site adapters, one per upstream source, plus the registry that builds
//! them from a [`ScraperConfig`](metascrape_core::config::ScraperConfig).

pub mod bangumi;
pub mod getchu;
pub mod ggbases;
mod html;
mod intro;
pub mod registry;
pub mod twodfan;

use metascrape_core::config::SiteConfig;
use metascrape_core::error::AppError;
use metascrape_core::gateway::FetchRequest;
use metascrape_core::traits::Fetcher;

pub use bangumi::Bangumi;
pub use getchu::GetChu;
pub use ggbases::GGBases;
pub use registry::{AdapterRegistry, Site};
pub use twodfan::TwoDFan;

/// A GET request carrying the site's default headers and cookies.
pub(crate) fn site_request(site: &SiteConfig, url: &str) -> FetchRequest {
    FetchRequest::get(url)
        .headers(&site.headers)
        .cookies(&site.cookies)
}

/// GET `url` and return the body, failing on transport errors and 4xx/5xx.
pub(crate) async fn get_body<F: Fetcher>(
    fetcher: &F,
    site: &SiteConfig,
    url: &str,
) -> Result<Vec<u8>, AppError> {
    let response = fetcher.fetch(site_request(site, url)).await?;
    Ok(response.error_for_status(url)?.body)
}
