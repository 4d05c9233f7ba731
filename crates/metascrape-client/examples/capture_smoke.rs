/// Smoke-test for `ChromiumDriver` behind a `CaptureBridge`.
///
/// Launches Chromium, opens a listing's magnet endpoint, clicks the magnet
/// button and prints the XHR body the page received.
///
/// Run with:
///   cargo run --example capture_smoke -- <listing id>
use metascrape_client::ChromiumDriver;
use metascrape_core::capture::{CaptureBridge, CaptureKind, CaptureRequest};
use metascrape_core::config::ScraperConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let id = std::env::args().nth(1).unwrap_or_else(|| "119583".to_string());
    let config = ScraperConfig::from_env()?;

    let driver = ChromiumDriver::new(config.capture.clone()).with_proxy(config.ggbases.proxy.clone());
    let bridge = CaptureBridge::new(driver).with_deadline(config.capture.deadline);

    let request = CaptureRequest::new(
        format!("{}magnet.so?id={id}", config.ggbases.domain),
        ".dbutton[bt='3']",
        CaptureKind::XhrResponse,
    );

    println!("Capturing {} ...", request.url);
    let body = bridge.capture(&request).await?.into_body()?;
    assert!(!body.is_empty(), "captured an empty response body");

    println!("OK, captured {} bytes", body.len());
    println!("{}", String::from_utf8_lossy(&body));
    Ok(())
}
