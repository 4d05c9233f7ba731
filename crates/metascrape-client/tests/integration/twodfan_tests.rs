use metascrape_client::TwoDFan;
use metascrape_core::config::SiteConfig;
use metascrape_core::error::AppError;
use metascrape_core::models::Field;
use metascrape_core::testutil::MockFetcher;
use metascrape_core::traits::SiteAdapter;

use crate::integration::common::{failed_fields, init_tracing};

const SUBJECT: &str = "https://2dfan.com/subjects/4566";
const TOPIC: &str = "https://2dfan.com/topics/4566";

const SUBJECT_PAGE: &str = r#"<html><body>
<div class="navbar"><h3>サクラノ詩</h3></div>
<div class="block-content collapse in"><div class="span8"><div class="media">
  <a href="/subjects/4566"><img src="https://img.2dfan.com/cover.jpg"></a>
  <div class="media-body control-group">
    <p class="tags">品牌：<a href="/brands/1">枕</a></p>
    <p class="tags">发售日期：2015-10-23</p>
  </div>
</div></div></div>
<div id="sidebar"><div class="block-content collapse in tags">
  <a href="/tags/1">剧情</a><a href="/tags/2">美少女</a>
</div></div>
<div id="resources"><span>游戏介绍</span><span>下载</span></div>
</body></html>"#;

const TOPIC_PAGE_ONE: &str = r#"<html><body>
<div id="topic-content">
  <h4>故事介绍</h4>
  <p>A quiet town.</p>
  <p><img src="https://img.2dfan.com/s1.jpg"></p>
</div>
<div id="content-pagination"><div class="pagination"><ul>
  <li>«</li><li>1</li><li>2</li><li>3</li><li>»</li>
</ul></div></div>
</body></html>"#;

const TOPIC_PAGE_TWO: &str = r#"<html><body>
<div id="topic-content">
  <p>Something happens.</p>
  <h4>人物介绍</h4>
  <p><strong>Alice</strong></p>
  <p><img src="https://img.2dfan.com/alice.jpg"></p>
</div>
</body></html>"#;

const TOPIC_PAGE_THREE: &str = r#"<html><body>
<div id="topic-content">
  <p>The heroine.</p>
</div>
</body></html>"#;

fn site_fetcher() -> MockFetcher {
    MockFetcher::new()
        .route(SUBJECT, SUBJECT_PAGE)
        .route(TOPIC, TOPIC_PAGE_ONE)
        .route("https://2dfan.com/topics/4566/page/2", TOPIC_PAGE_TWO)
        .route("https://2dfan.com/topics/4566/page/3", TOPIC_PAGE_THREE)
}

#[tokio::test]
async fn subject_page_fields_and_introduction() {
    init_tracing();
    let fetcher = site_fetcher();
    let adapter = TwoDFan::new(fetcher.clone(), SiteConfig::twodfan());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();
    let record = &extraction.record;

    assert!(extraction.is_complete(), "{:?}", extraction.failures);
    assert_eq!(record.origin(), SUBJECT);
    assert_eq!(record.name, "サクラノ詩");
    assert_eq!(record.brand, "枕");
    assert_eq!(record.release_date, "2015-10-23");
    assert_eq!(record.walkthrough, "https://2dfan.com/subjects/4566/walkthroughs");

    let tags: Vec<&str> = record.tags[0].items.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tags, vec!["剧情", "美少女"]);

    // Cover first, then the synopsis images.
    assert_eq!(
        record.preview,
        vec!["https://img.2dfan.com/cover.jpg", "https://img.2dfan.com/s1.jpg"]
    );
    assert_eq!(record.story, "A quiet town.\nSomething happens.");
    assert_eq!(record.characters.len(), 1);
    assert_eq!(record.characters[0].name, "Alice");
    assert_eq!(record.characters[0].avatar, "https://img.2dfan.com/alice.jpg");
    assert_eq!(record.characters[0].introduction, "The heroine.");
    assert_eq!(
        record.information,
        vec![
            TOPIC,
            "https://2dfan.com/topics/4566/page/2",
            "https://2dfan.com/topics/4566/page/3",
        ]
    );
}

#[tokio::test]
async fn pagination_fetches_pages_between_first_and_last_link() {
    let fetcher = site_fetcher();
    let adapter = TwoDFan::new(fetcher.clone(), SiteConfig::twodfan());

    adapter.get_item(SUBJECT).await.unwrap();

    // Five list items: four links, so pages 2 and 3 beyond the first.
    assert_eq!(fetcher.count(TOPIC), 3);
    assert_eq!(fetcher.count("https://2dfan.com/topics/4566/page/"), 2);
}

#[tokio::test]
async fn failed_topic_page_stops_the_walk() {
    let fetcher = MockFetcher::new()
        .route(SUBJECT, SUBJECT_PAGE)
        .route(TOPIC, TOPIC_PAGE_ONE)
        .fail("https://2dfan.com/topics/4566/page/2", "connection reset")
        .route("https://2dfan.com/topics/4566/page/3", TOPIC_PAGE_THREE);
    let adapter = TwoDFan::new(fetcher.clone(), SiteConfig::twodfan());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();

    assert_eq!(failed_fields(&extraction), vec![Field::Story]);
    assert_eq!(extraction.record.story, "A quiet town.");
    assert_eq!(extraction.record.name, "サクラノ詩");
    assert_eq!(fetcher.count("https://2dfan.com/topics/4566/page/3"), 0);
}

#[tokio::test]
async fn no_introduction_resource_skips_topic() {
    let page = SUBJECT_PAGE.replace("游戏介绍", "补丁");
    let fetcher = MockFetcher::new().route(SUBJECT, page);
    let adapter = TwoDFan::new(fetcher.clone(), SiteConfig::twodfan());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();

    assert!(extraction.is_complete());
    assert!(extraction.record.story.is_empty());
    assert_eq!(fetcher.urls(), vec![SUBJECT]);
}

#[tokio::test]
async fn missing_elements_are_recorded_not_fatal() {
    let fetcher = MockFetcher::new().route(SUBJECT, "<html><body><p>maintenance</p></body></html>");
    let adapter = TwoDFan::new(fetcher, SiteConfig::twodfan());

    let extraction = adapter.get_item(SUBJECT).await.unwrap();

    assert_eq!(
        failed_fields(&extraction),
        vec![Field::Name, Field::Brand, Field::ReleaseDate, Field::Tags, Field::Preview]
    );
    assert_eq!(
        extraction.record.walkthrough,
        "https://2dfan.com/subjects/4566/walkthroughs"
    );
}

#[tokio::test]
async fn root_fetch_failure_is_fatal() {
    let fetcher = MockFetcher::new().route_status(SUBJECT, 503, "busy");
    let adapter = TwoDFan::new(fetcher.clone(), SiteConfig::twodfan());

    let err = adapter.get_item(SUBJECT).await.unwrap_err();

    assert!(matches!(err, AppError::HttpError(_)));
    assert_eq!(fetcher.urls(), vec![SUBJECT]);
}

#[tokio::test]
async fn requests_carry_site_headers() {
    let fetcher = site_fetcher();
    let mut adapter = TwoDFan::new(fetcher.clone(), SiteConfig::twodfan());
    adapter.set_header("X-Test", "1");

    adapter.get_item(SUBJECT).await.unwrap();

    for request in fetcher.requests() {
        assert_eq!(request.headers.get("Referer").map(String::as_str), Some("https://2dfan.com/"));
        assert_eq!(request.headers.get("X-Test").map(String::as_str), Some("1"));
    }
}
