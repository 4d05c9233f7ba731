use std::time::Duration;

use metascrape_client::{AdapterRegistry, Site};
use metascrape_core::capture::Artifact;
use metascrape_core::config::ScraperConfig;
use metascrape_core::error::AppError;
use metascrape_core::testutil::{MockDriver, MockFetcher, SessionScript};
use serde_json::json;

fn registry(fetcher: &MockFetcher) -> AdapterRegistry<MockFetcher, MockDriver> {
    let driver = MockDriver::new(SessionScript::delivers(
        Duration::from_millis(1),
        Artifact::Body(b"{}".to_vec()),
    ));
    AdapterRegistry::new(&ScraperConfig::default(), |_| Ok(fetcher.clone()), driver).unwrap()
}

#[tokio::test]
async fn get_dispatches_by_host() {
    let uri = "https://api.bgm.tv/v0/subjects/7";
    let subject = json!({"id": 7, "name": "Seven", "infobox": [], "tags": []});
    let fetcher = MockFetcher::new()
        .route(uri, subject.to_string())
        .route("https://api.bgm.tv/v0/subjects/7/characters", "[]");
    let registry = registry(&fetcher);

    let extraction = registry.get(uri).await.unwrap();

    assert_eq!(extraction.record.name, "Seven");
    assert_eq!(extraction.record.origin(), uri);
    assert_eq!(
        fetcher.urls(),
        vec![uri, "https://api.bgm.tv/v0/subjects/7/characters"]
    );
}

#[tokio::test]
async fn unknown_host_is_rejected_before_fetching() {
    let fetcher = MockFetcher::new();
    let registry = registry(&fetcher);

    let err = registry.get("https://example.com/item/1").await.unwrap_err();

    assert!(matches!(err, AppError::NoMatch(_)));
    assert!(fetcher.urls().is_empty());
}

#[tokio::test]
async fn explicit_site_overrides_detection() {
    let uri = "https://mirror.example/subjects/4566";
    let fetcher = MockFetcher::new().route(uri, "<html><body><div class=\"navbar\"><h3>Mirror</h3></div></body></html>");
    let registry = registry(&fetcher);

    let extraction = registry.get_item(Site::TwoDFan, uri).await.unwrap();

    assert_eq!(extraction.record.name, "Mirror");
}

#[tokio::test]
async fn header_override_applies_to_one_site() {
    let bangumi = "https://api.bgm.tv/v0/subjects/7";
    let twodfan = "https://2dfan.com/subjects/1";
    let fetcher = MockFetcher::new()
        .route(bangumi, json!({"id": 7, "name": "Seven"}).to_string())
        .route(twodfan, "<html></html>");
    let mut registry = registry(&fetcher);
    registry.set_header(Site::Bangumi, "Authorization", "Bearer abc");

    registry.get(bangumi).await.unwrap();
    registry.get(twodfan).await.unwrap();

    for request in fetcher.requests() {
        let auth = request.headers.get("Authorization").map(String::as_str);
        if request.url.starts_with("https://api.bgm.tv/") {
            assert_eq!(auth, Some("Bearer abc"));
        } else {
            assert_eq!(auth, None);
        }
    }
}

#[test]
fn fetcher_factory_error_propagates() {
    let result = AdapterRegistry::<MockFetcher, MockDriver>::new(
        &ScraperConfig::default(),
        |_| Err(AppError::ConfigError("bad proxy".into())),
        MockDriver::new(SessionScript::silent()),
    );

    assert!(matches!(result, Err(AppError::ConfigError(_))));
}
