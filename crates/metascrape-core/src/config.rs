use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::DEFAULT_CAPTURE_DEADLINE;
use crate::error::AppError;
use crate::fanout::FanOutLimit;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

pub const BANGUMI_USER_AGENT: &str =
    "dokidokikoi/meta-scraper (https://github.com/dokidokikoi/meta-scraper)";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-site connection settings. Read-only once an adapter is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    /// Base URL with a trailing slash.
    pub domain: String,
    /// `http://`, `https://` or `socks5://` proxy URL.
    pub proxy: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub cookies: Vec<(String, String)>,
}

impl SiteConfig {
    /// A site with the browser-like default headers, referred from its own
    /// domain.
    pub fn browser_like(domain: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("User-Agent".into(), DEFAULT_USER_AGENT.into());
        headers.insert("Referer".into(), domain.into());
        headers.insert("Accept-Language".into(), "zh-CN,zh;q=0.9".into());
        Self {
            domain: domain.into(),
            proxy: None,
            headers,
            cookies: Vec::new(),
        }
    }

    pub fn twodfan() -> Self {
        Self::browser_like("https://2dfan.com/")
    }

    pub fn bangumi() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("User-Agent".into(), BANGUMI_USER_AGENT.into());
        Self {
            domain: "https://api.bgm.tv/".into(),
            proxy: None,
            headers,
            cookies: Vec::new(),
        }
    }

    pub fn getchu() -> Self {
        let mut site = Self::browser_like("https://www.getchu.com/");
        // Skips the age-confirmation interstitial.
        site.cookies
            .push(("getchu_adalt_flag".into(), "getchu.com".into()));
        site
    }

    pub fn ggbases() -> Self {
        Self::browser_like("https://ggbases.dlgal.com/")
    }

    /// Attach a bearer token as the `Authorization` header.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.headers
            .insert("Authorization".into(), format!("Bearer {token}"));
        self
    }
}

/// Browser settings for the capture bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub deadline: Duration,
    /// Where captured downloads land, each named after its download id.
    pub download_dir: PathBuf,
    pub headless: bool,
    /// Explicit Chrome/Chromium binary. Auto-detected when unset.
    pub chrome_bin: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_CAPTURE_DEADLINE,
            download_dir: std::env::temp_dir().join("metascrape-downloads"),
            headless: true,
            chrome_bin: None,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

/// Everything needed to build the adapter registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScraperConfig {
    pub twodfan: SiteConfig,
    pub bangumi: SiteConfig,
    pub getchu: SiteConfig,
    pub ggbases: SiteConfig,
    pub fan_out: FanOutLimit,
    pub request_timeout: Duration,
    pub capture: CaptureConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            twodfan: SiteConfig::twodfan(),
            bangumi: SiteConfig::bangumi(),
            getchu: SiteConfig::getchu(),
            ggbases: SiteConfig::ggbases(),
            fan_out: FanOutLimit::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            capture: CaptureConfig::default(),
        }
    }
}

impl ScraperConfig {
    /// Read configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `METASCRAPE_PROXY`: proxy for every site
    /// - `METASCRAPE_DOWNLOAD_DIR`: capture download directory
    /// - `METASCRAPE_HEADLESS`: `true`/`false` (default `true`)
    /// - `METASCRAPE_CAPTURE_DEADLINE_SECS`: capture deadline (default 60)
    /// - `METASCRAPE_FAN_OUT_CONCURRENCY`: fan-out width (default 10)
    /// - `BANGUMI_TOKEN`: bearer token for the Bangumi API
    /// - `CHROME_BIN`: browser binary for captures
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(proxy) = var("METASCRAPE_PROXY") {
            config.set_proxy(&proxy)?;
        }

        if let Some(dir) = var("METASCRAPE_DOWNLOAD_DIR") {
            config.capture.download_dir = PathBuf::from(dir);
        }

        if let Some(raw) = var("METASCRAPE_HEADLESS") {
            config.capture.headless = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(AppError::ConfigError(format!(
                        "Invalid METASCRAPE_HEADLESS '{raw}': expected true or false"
                    )));
                }
            };
        }

        if let Some(raw) = var("METASCRAPE_CAPTURE_DEADLINE_SECS") {
            let secs = parse_positive("METASCRAPE_CAPTURE_DEADLINE_SECS", &raw)?;
            config.capture.deadline = Duration::from_secs(secs);
        }

        if let Some(raw) = var("METASCRAPE_FAN_OUT_CONCURRENCY") {
            let width = parse_positive("METASCRAPE_FAN_OUT_CONCURRENCY", &raw)?;
            config.fan_out.concurrency = usize::try_from(width).map_err(|_| {
                AppError::ConfigError(format!("METASCRAPE_FAN_OUT_CONCURRENCY '{raw}' is too large"))
            })?;
        }

        if let Some(token) = var("BANGUMI_TOKEN") {
            config.bangumi = config.bangumi.with_bearer(token.trim());
        }

        if let Some(bin) = var("CHROME_BIN") {
            config.capture.chrome_bin = Some(PathBuf::from(bin));
        }

        Ok(config)
    }

    /// Route every site through `proxy`.
    pub fn set_proxy(&mut self, proxy: &str) -> Result<(), AppError> {
        validate_proxy(proxy)?;
        for site in self.sites_mut() {
            site.proxy = Some(proxy.to_string());
        }
        Ok(())
    }

    fn sites_mut(&mut self) -> [&mut SiteConfig; 4] {
        [
            &mut self.twodfan,
            &mut self.bangumi,
            &mut self.getchu,
            &mut self.ggbases,
        ]
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64, AppError> {
    let parsed: u64 = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {key} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    Ok(parsed)
}

fn validate_proxy(proxy: &str) -> Result<(), AppError> {
    let parsed = url::Url::parse(proxy)
        .map_err(|e| AppError::ConfigError(format!("Invalid proxy URL '{proxy}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" | "socks5" | "socks5h" => Ok(()),
        other => Err(AppError::ConfigError(format!(
            "Unsupported proxy scheme '{other}': use http, https or socks5"
        ))),
    }
}
