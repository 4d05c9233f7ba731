use std::fmt;
use std::str::FromStr;

use metascrape_core::capture::CaptureBridge;
use metascrape_core::config::{ScraperConfig, SiteConfig};
use metascrape_core::error::AppError;
use metascrape_core::models::Extraction;
use metascrape_core::traits::{CaptureDriver, Fetcher, SiteAdapter};
use url::Url;

use super::{Bangumi, GGBases, GetChu, TwoDFan};

/// The supported upstream sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    TwoDFan,
    Bangumi,
    Getchu,
    GGBases,
}

impl Site {
    pub const ALL: [Site; 4] = [Site::TwoDFan, Site::Bangumi, Site::Getchu, Site::GGBases];

    pub fn as_str(&self) -> &'static str {
        match self {
            Site::TwoDFan => "2dfan",
            Site::Bangumi => "bangumi",
            Site::Getchu => "getchu",
            Site::GGBases => "ggbases",
        }
    }

    /// Guess the site from the host of `uri`.
    pub fn detect(uri: &str) -> Result<Self, AppError> {
        let url = Url::parse(uri).map_err(|e| AppError::ParseError(format!("Invalid URI {uri}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| AppError::ParseError(format!("URI has no host: {uri}")))?;

        if host.contains("2dfan") {
            Ok(Site::TwoDFan)
        } else if host.ends_with("bgm.tv") || host.contains("bangumi") {
            Ok(Site::Bangumi)
        } else if host.ends_with("getchu.com") {
            Ok(Site::Getchu)
        } else if host.contains("ggbases") {
            Ok(Site::GGBases)
        } else {
            Err(AppError::NoMatch(format!("site for host {host}")))
        }
    }

    pub fn config<'a>(&self, config: &'a ScraperConfig) -> &'a SiteConfig {
        match self {
            Site::TwoDFan => &config.twodfan,
            Site::Bangumi => &config.bangumi,
            Site::Getchu => &config.getchu,
            Site::GGBases => &config.ggbases,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "2dfan" | "twodfan" => Ok(Site::TwoDFan),
            "bangumi" | "bgm" => Ok(Site::Bangumi),
            "getchu" => Ok(Site::Getchu),
            "ggbases" => Ok(Site::GGBases),
            _ => Err(format!("Unknown site: {}", s)),
        }
    }
}

/// One adapter per site, built from a single configuration.
pub struct AdapterRegistry<F, D> {
    twodfan: TwoDFan<F>,
    bangumi: Bangumi<F>,
    getchu: GetChu<F>,
    ggbases: GGBases<F, D>,
}

impl<F: Fetcher, D: CaptureDriver> AdapterRegistry<F, D> {
    /// Build every adapter. `fetcher_for` is called once per site so each
    /// can carry its own proxy.
    pub fn new<M>(config: &ScraperConfig, fetcher_for: M, driver: D) -> Result<Self, AppError>
    where
        M: Fn(&SiteConfig) -> Result<F, AppError>,
    {
        let bridge = CaptureBridge::new(driver).with_deadline(config.capture.deadline);
        Ok(Self {
            twodfan: TwoDFan::new(fetcher_for(&config.twodfan)?, config.twodfan.clone()),
            bangumi: Bangumi::new(
                fetcher_for(&config.bangumi)?,
                config.bangumi.clone(),
                config.fan_out,
            ),
            getchu: GetChu::new(fetcher_for(&config.getchu)?, config.getchu.clone()),
            ggbases: GGBases::new(
                fetcher_for(&config.ggbases)?,
                config.ggbases.clone(),
                config.fan_out,
                bridge,
                config.capture.download_dir.clone(),
            ),
        })
    }

    /// Extract `uri` with the adapter for `site`.
    pub async fn get_item(&self, site: Site, uri: &str) -> Result<Extraction, AppError> {
        match site {
            Site::TwoDFan => self.twodfan.get_item(uri).await,
            Site::Bangumi => self.bangumi.get_item(uri).await,
            Site::Getchu => self.getchu.get_item(uri).await,
            Site::GGBases => self.ggbases.get_item(uri).await,
        }
    }

    /// Extract `uri` with the adapter matching its host.
    pub async fn get(&self, uri: &str) -> Result<Extraction, AppError> {
        self.get_item(Site::detect(uri)?, uri).await
    }

    /// Set a default header on one site's adapter.
    pub fn set_header(&mut self, site: Site, name: &str, value: &str) {
        match site {
            Site::TwoDFan => self.twodfan.set_header(name, value),
            Site::Bangumi => self.bangumi.set_header(name, value),
            Site::Getchu => self.getchu.set_header(name, value),
            Site::GGBases => self.ggbases.set_header(name, value),
        }
    }

    pub fn twodfan(&self) -> &TwoDFan<F> {
        &self.twodfan
    }

    pub fn bangumi(&self) -> &Bangumi<F> {
        &self.bangumi
    }

    pub fn getchu(&self) -> &GetChu<F> {
        &self.getchu
    }

    pub fn ggbases(&self) -> &GGBases<F, D> {
        &self.ggbases
    }
}

#[cfg(feature = "browser")]
impl AdapterRegistry<crate::ReqwestFetcher, crate::ChromiumDriver> {
    /// Real HTTP fetchers and a Chromium capture driver.
    pub fn from_config(config: &ScraperConfig) -> Result<Self, AppError> {
        let driver = crate::ChromiumDriver::new(config.capture.clone())
            .with_proxy(config.ggbases.proxy.clone());
        Self::new(
            config,
            |site| crate::ReqwestFetcher::with_options(config.request_timeout, site.proxy.as_deref()),
            driver,
        )
    }
}
