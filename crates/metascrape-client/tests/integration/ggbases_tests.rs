use std::path::PathBuf;
use std::time::Duration;

use metascrape_client::GGBases;
use metascrape_core::capture::{Artifact, CaptureBridge, CaptureKind};
use metascrape_core::config::SiteConfig;
use metascrape_core::error::AppError;
use metascrape_core::fanout::FanOutLimit;
use metascrape_core::models::Field;
use metascrape_core::testutil::{MockDriver, MockFetcher, SessionScript};
use metascrape_core::traits::SiteAdapter;

use crate::integration::common::{failed_fields, init_tracing};

const LISTING: &str = "https://ggbases.dlgal.com/view.so?id=119583";
const COVER: &str = "https://ggbases.dlgal.com/cover/119583";

const LISTING_PAGE: &str = r#"<html><body>
<h1 id="atitle">Test Listing</h1>
<table id="touch"><tbody>
  <tr><td>r1</td></tr>
  <tr><td>r2</td></tr>
  <tr><td>r3</td></tr>
  <tr><td>r4</td></tr>
  <tr><td>发布 <span>2021-05-01</span></td><td>大小 <span>2.1GB</span></td></tr>
  <tr><td>r6</td></tr>
  <tr><td><a id="showCoverBtn" href="/cover/119583"><span>查看封面(3)</span></a><a href="/save/119583">存档</a><a href="/guide/119583">攻略</a></td></tr>
</tbody></table>
<table id="extagstable"><tbody>
  <tr><td>分类</td><td>标签</td></tr>
  <tr><td><a href="/t/female">female</a></td><td><a title="female:maid"><span>maid</span></a><a><span>glasses</span></a></td></tr>
  <tr><td><a href="/t/genre">genre</a></td><td><a title="genre:rpg"><span>rpg</span></a></td></tr>
</tbody></table>
<div id="description"><div markdown-text="">A <b>long</b> description.</div></div>
</body></html>"#;

fn preview_page(index: usize) -> String {
    format!(
        r#"<html><body><table><tr><td id="showpictd"><img src="/img/119583/{index}.jpg"></td></tr></table></body></html>"#
    )
}

fn listing_fetcher() -> MockFetcher {
    let mut fetcher = MockFetcher::new().route(LISTING, LISTING_PAGE);
    for index in 0..3 {
        fetcher = fetcher.route(&format!("{COVER}/{index}"), preview_page(index));
    }
    fetcher
}

fn torrent_path() -> PathBuf {
    std::env::temp_dir().join("metascrape-tests").join("7f3c-guid")
}

fn delivering_driver() -> MockDriver {
    MockDriver::new(SessionScript::delivers(
        Duration::from_millis(10),
        Artifact::Body(br#"{"hash":"0123abcd"}"#.to_vec()),
    ))
    .for_downloads(SessionScript::delivers(
        Duration::from_millis(10),
        Artifact::Download {
            guid: "7f3c-guid".into(),
            path: torrent_path(),
        },
    ))
}

fn adapter(fetcher: MockFetcher, driver: MockDriver, deadline: Duration) -> GGBases<MockFetcher, MockDriver> {
    GGBases::new(
        fetcher,
        SiteConfig::ggbases(),
        FanOutLimit::default(),
        CaptureBridge::new(driver).with_deadline(deadline),
        std::env::temp_dir().join("metascrape-tests"),
    )
}

#[tokio::test]
async fn listing_fields_previews_and_captures() {
    init_tracing();
    let fetcher = listing_fetcher();
    let driver = delivering_driver();
    let adapter = adapter(fetcher.clone(), driver.clone(), Duration::from_secs(5));

    let extraction = adapter.get_item(LISTING).await.unwrap();
    let record = &extraction.record;

    assert!(extraction.is_complete(), "{:?}", extraction.failures);
    assert_eq!(record.origin(), LISTING);
    assert_eq!(record.name, "Test Listing");
    assert_eq!(record.release_date, "2021-05-01");
    assert_eq!(record.size, "2.1GB");
    assert_eq!(record.save_data, "https://ggbases.dlgal.com/save/119583");
    assert_eq!(record.walkthrough, "https://ggbases.dlgal.com/guide/119583");
    assert_eq!(record.other_info, "A <b>long</b> description.");

    assert_eq!(record.tags.len(), 2);
    assert_eq!(record.tags[0].category.name, "female");
    assert_eq!(record.tags[0].items[0].identity, "female:maid");
    assert_eq!(record.tags[0].items[0].name, "maid");
    assert_eq!(record.tags[0].items[1].identity, "glasses");
    assert_eq!(record.tags[1].items[0].name, "rpg");

    assert_eq!(
        record.preview,
        vec![
            "https://ggbases.dlgal.com/img/119583/0.jpg",
            "https://ggbases.dlgal.com/img/119583/1.jpg",
            "https://ggbases.dlgal.com/img/119583/2.jpg",
        ]
    );
    assert_eq!(fetcher.count(COVER), 3);

    assert_eq!(record.magnet, "magnet:?xt=urn:btih:0123abcd");
    assert_eq!(record.bt_file, torrent_path().display().to_string());
}

#[tokio::test]
async fn captures_use_their_own_sessions() {
    let driver = delivering_driver();
    let adapter = adapter(listing_fetcher(), driver.clone(), Duration::from_secs(5));

    adapter.get_item(LISTING).await.unwrap();

    assert_eq!(driver.launched(), 2);
    assert_eq!(driver.closed(), 2);

    let navigations = driver.navigations();
    assert_eq!(navigations[0].0, "https://ggbases.dlgal.com/magnet.so?id=119583");
    assert_eq!(navigations[1].0, "https://ggbases.dlgal.com/down.so?id=119583");
    assert_eq!(
        navigations[0].1.get("X-Forwarded-For").map(String::as_str),
        Some("https://ggbases.dlgal.com/")
    );

    assert_eq!(driver.clicks(), vec![".dbutton[bt='3']", ".dbutton[bt='1']"]);
    let kinds = driver.armed_kinds();
    assert_eq!(kinds[0], CaptureKind::XhrResponse);
    assert!(matches!(kinds[1], CaptureKind::Download { .. }));
}

#[tokio::test]
async fn capture_deadline_is_a_field_failure() {
    let driver = MockDriver::new(SessionScript::silent());
    let adapter = adapter(listing_fetcher(), driver.clone(), Duration::from_millis(50));

    let extraction = adapter.get_item(LISTING).await.unwrap();

    assert_eq!(extraction.record.name, "Test Listing");
    assert_eq!(extraction.record.preview.len(), 3);
    assert!(extraction.record.magnet.is_empty());
    assert!(extraction.record.bt_file.is_empty());
    assert_eq!(failed_fields(&extraction), vec![Field::Magnet, Field::BtFile]);
    for failure in &extraction.failures {
        assert!(matches!(failure.error, AppError::CaptureDeadline(_)));
    }

    // Every session released, every listener stopped.
    assert_eq!(driver.launched(), 2);
    assert_eq!(driver.closed(), 2);
    assert_eq!(driver.cancelled_listeners(), 2);
}

#[tokio::test]
async fn browser_launch_failure_keeps_http_fields() {
    let driver = MockDriver::failing_launch("no chrome");
    let adapter = adapter(listing_fetcher(), driver, Duration::from_secs(5));

    let extraction = adapter.get_item(LISTING).await.unwrap();

    assert_eq!(extraction.record.size, "2.1GB");
    assert_eq!(failed_fields(&extraction), vec![Field::Magnet, Field::BtFile]);
    assert!(extraction.failures.iter().all(|f| f.error.is_capture()));
}

#[tokio::test]
async fn empty_magnet_hash_is_missing() {
    let driver = MockDriver::new(SessionScript::delivers(
        Duration::from_millis(1),
        Artifact::Body(br#"{"hash":""}"#.to_vec()),
    ))
    .for_downloads(SessionScript::delivers(
        Duration::from_millis(1),
        Artifact::Download {
            guid: "g".into(),
            path: torrent_path(),
        },
    ));
    let adapter = adapter(listing_fetcher(), driver, Duration::from_secs(5));

    let extraction = adapter.get_item(LISTING).await.unwrap();

    let failure = extraction.failures_for(Field::Magnet).next().unwrap();
    assert!(matches!(failure.error, AppError::Missing(_)));
    assert!(!extraction.record.bt_file.is_empty());
}

#[tokio::test]
async fn missing_id_skips_captures() {
    let uri = "https://ggbases.dlgal.com/view.so";
    let fetcher = listing_fetcher().route(uri, LISTING_PAGE);
    let driver = delivering_driver();
    let adapter = adapter(fetcher, driver.clone(), Duration::from_secs(5));

    let extraction = adapter.get_item(uri).await.unwrap();

    assert_eq!(failed_fields(&extraction), vec![Field::Magnet, Field::BtFile]);
    assert_eq!(driver.launched(), 0);
}

#[tokio::test]
async fn failed_preview_page_keeps_the_rest() {
    let fetcher = listing_fetcher().route_status(&format!("{COVER}/1"), 500, "");
    let adapter = adapter(fetcher, delivering_driver(), Duration::from_secs(5));

    let extraction = adapter.get_item(LISTING).await.unwrap();

    assert_eq!(
        extraction.record.preview,
        vec![
            "https://ggbases.dlgal.com/img/119583/0.jpg",
            "https://ggbases.dlgal.com/img/119583/2.jpg",
        ]
    );
    assert_eq!(failed_fields(&extraction), vec![Field::Preview]);
}

#[tokio::test]
async fn preview_fetches_are_capped() {
    let page = LISTING_PAGE.replace("查看封面(3)", "查看封面(5000)");
    let mut fetcher = MockFetcher::new().route(LISTING, page);
    for index in 0..20 {
        fetcher = fetcher.route(&format!("{COVER}/{index}"), preview_page(index));
    }
    let adapter = adapter(fetcher.clone(), delivering_driver(), Duration::from_secs(5));

    let extraction = adapter.get_item(LISTING).await.unwrap();

    assert!(extraction.is_complete(), "{:?}", extraction.failures);
    assert_eq!(fetcher.count(COVER), 10);
    assert_eq!(extraction.record.preview.len(), 10);
    assert_eq!(
        extraction.record.preview[9],
        "https://ggbases.dlgal.com/img/119583/9.jpg"
    );
}
