use std::time::Duration;

use metascrape_client::Bangumi;
use metascrape_core::config::{BANGUMI_USER_AGENT, SiteConfig};
use metascrape_core::error::AppError;
use metascrape_core::fanout::FanOutLimit;
use metascrape_core::models::Field;
use metascrape_core::testutil::MockFetcher;
use metascrape_core::traits::SiteAdapter;
use serde_json::json;

use crate::integration::common::failed_fields;

const SUBJECT: &str = "https://api.bgm.tv/v0/subjects/100";
const CAST: &str = "https://api.bgm.tv/v0/subjects/100/characters";

fn subject() -> String {
    json!({
        "id": 100,
        "name": "Test Game",
        "summary": "A story about testing.",
        "images": {"large": "https://lain.bgm.tv/pic/cover/l/100.jpg"},
        "infobox": [
            {"key": "中文名", "value": "测试游戏"},
            {"key": "游戏类型", "value": "AVG"},
            {"key": "开发", "value": [{"v": "Studio A"}, {"v": "Studio B"}]},
            {"key": "发行日期", "value": "2020-01-01"}
        ],
        "tags": [{"name": "ADV", "count": 10}, {"name": "恋爱", "count": 3}]
    })
    .to_string()
}

/// A subject with `cast` characters, each with a bio.
fn fetcher_with_cast(cast: u64) -> MockFetcher {
    let list: Vec<_> = (1..=cast)
        .map(|id| json!({"id": id, "name": format!("C{id}"), "relation": "主角"}))
        .collect();
    let mut fetcher = MockFetcher::new()
        .route(SUBJECT, subject())
        .route(CAST, serde_json::to_string(&list).unwrap());
    for id in 1..=cast {
        let bio = json!({
            "id": id,
            "name": format!("C{id}"),
            "summary": format!("Bio {id}"),
            "images": {"large": format!("https://lain.bgm.tv/crt/l/{id}.jpg")}
        });
        fetcher = fetcher.route(
            &format!("https://api.bgm.tv/v0/characters/{id}"),
            bio.to_string(),
        );
    }
    fetcher
}

#[tokio::test]
async fn subject_fields_with_missing_infobox_key() {
    let fetcher = fetcher_with_cast(2);
    let adapter = Bangumi::new(fetcher, SiteConfig::bangumi(), FanOutLimit::default());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();
    let record = &extraction.record;

    assert_eq!(record.origin(), SUBJECT);
    assert_eq!(record.name, "Test Game");
    assert_eq!(record.story, "A story about testing.");
    assert_eq!(record.preview, vec!["https://lain.bgm.tv/pic/cover/l/100.jpg"]);
    assert_eq!(record.genre, vec!["AVG"]);
    assert_eq!(record.brand, "Studio A、Studio B");
    assert_eq!(record.release_date, "2020-01-01");
    assert_eq!(record.tags[0].items.len(), 2);
    assert_eq!(record.tags[0].items[1].name, "恋爱");

    // No "website" entry.
    assert!(record.link.is_empty());
    assert_eq!(failed_fields(&extraction), vec![Field::Link]);
    let failure = extraction.failures_for(Field::Link).next().unwrap();
    assert!(matches!(failure.error, AppError::NoMatch(_)));
}

#[tokio::test]
async fn characters_keep_list_order() {
    let fetcher = fetcher_with_cast(3).with_delay(Duration::from_millis(5));
    let adapter = Bangumi::new(fetcher, SiteConfig::bangumi(), FanOutLimit::default());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();
    let names: Vec<&str> = extraction
        .record
        .characters
        .iter()
        .map(|c| c.name.as_str())
        .collect();

    assert_eq!(names, vec!["C1", "C2", "C3"]);
    assert_eq!(extraction.record.characters[1].introduction, "Bio 2");
    assert_eq!(
        extraction.record.characters[1].avatar,
        "https://lain.bgm.tv/crt/l/2.jpg"
    );
}

#[tokio::test]
async fn only_first_ten_characters_are_looked_up() {
    let fetcher = fetcher_with_cast(12);
    let adapter = Bangumi::new(fetcher.clone(), SiteConfig::bangumi(), FanOutLimit::default());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();

    assert_eq!(extraction.record.characters.len(), 10);
    assert_eq!(fetcher.count("https://api.bgm.tv/v0/characters/"), 10);
    assert_eq!(extraction.record.characters[9].name, "C10");
}

#[tokio::test]
async fn character_lookups_respect_concurrency() {
    let fetcher = fetcher_with_cast(8).with_delay(Duration::from_millis(20));
    let adapter = Bangumi::new(fetcher.clone(), SiteConfig::bangumi(), FanOutLimit::new(3));

    let extraction = adapter.get_item(SUBJECT).await.unwrap();

    assert_eq!(extraction.record.characters.len(), 8);
    assert!(fetcher.peak_in_flight() <= 3, "peak {}", fetcher.peak_in_flight());
}

#[tokio::test]
async fn failed_bio_is_recorded_and_others_kept() {
    let fetcher = fetcher_with_cast(3).route_status("https://api.bgm.tv/v0/characters/2", 500, "");
    let adapter = Bangumi::new(fetcher, SiteConfig::bangumi(), FanOutLimit::default());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();
    let names: Vec<&str> = extraction
        .record
        .characters
        .iter()
        .map(|c| c.name.as_str())
        .collect();

    assert_eq!(names, vec!["C1", "C3"]);
    assert_eq!(extraction.failures_for(Field::Characters).count(), 1);
}

#[tokio::test]
async fn missing_cast_list_is_a_characters_failure() {
    let fetcher = MockFetcher::new().route(SUBJECT, subject());
    let adapter = Bangumi::new(fetcher, SiteConfig::bangumi(), FanOutLimit::default());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();

    assert!(extraction.record.characters.is_empty());
    let failure = extraction.failures_for(Field::Characters).next().unwrap();
    assert!(matches!(failure.error, AppError::HttpError(_)));
}

#[tokio::test]
async fn bearer_token_and_user_agent_sent() {
    let fetcher = fetcher_with_cast(1);
    let site = SiteConfig::bangumi().with_bearer("secret");
    let adapter = Bangumi::new(fetcher.clone(), site, FanOutLimit::default());

    adapter.get_item(SUBJECT).await.unwrap();

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 3);
    for request in requests {
        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer secret")
        );
        assert_eq!(
            request.headers.get("User-Agent").map(String::as_str),
            Some(BANGUMI_USER_AGENT)
        );
    }
}

#[tokio::test]
async fn malformed_root_is_fatal() {
    let fetcher = MockFetcher::new().route(SUBJECT, "<html>not json</html>");
    let adapter = Bangumi::new(fetcher, SiteConfig::bangumi(), FanOutLimit::default());

    let err = adapter.get_item(SUBJECT).await.unwrap_err();
    assert!(matches!(err, AppError::SerializationError(_)));
}
