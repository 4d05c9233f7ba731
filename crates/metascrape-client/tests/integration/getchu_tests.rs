use metascrape_client::GetChu;
use metascrape_core::config::SiteConfig;
use metascrape_core::models::Field;
use metascrape_core::testutil::MockFetcher;
use metascrape_core::traits::SiteAdapter;

use crate::integration::common::failed_fields;

const PRODUCT: &str = "https://www.getchu.com/soft.phtml?id=1000";

const PRODUCT_PAGE: &str = r#"<html><head><meta charset="EUC-JP"></head><body>
<h1 id="soft-title">春色ノスタルジア</h1>
<table id="soft_table"><tbody>
<tr><td><a class="highslide" href="./brandnew/1000/c1000package.jpg"><img src="./brandnew/1000/c1000package_s.jpg"></a></td></tr>
<tr><td><table><tbody>
  <tr><td>ブランド：</td><td><a href="http://brand.example/">テストブランド</a> (ブランド作品一覧)</td></tr>
  <tr><td>定価：</td><td>8,800円</td></tr>
  <tr><td>発売日：</td><td><a href="/all/month_title.html?year=2021">2021/05/28</a></td></tr>
  <tr><td>メディア：</td><td>DVD-ROM</td></tr>
  <tr><td>ジャンル：</td><td>学園恋愛ADV</td></tr>
</tbody></table></td></tr>
</tbody></table>
<div class="tabletitle">サンプル画像</div>
<div class="tablebody"><a href="./brandnew/1000/sample1.jpg"><img src="./brandnew/1000/sample1_s.jpg"></a><a href="./brandnew/1000/sample2.jpg"><img></a></div>
<div class="tabletitle">ストーリー</div>
<div class="tablebody">桜の咲く町の物語。</div>
<div class="tabletitle">キャラクター</div>
<table><tbody>
<tr><td><img src="./brandnew/1000/chara1.jpg"></td><td><h2 class="chara-name">花子</h2><dl><dd>ヒロイン</dd></dl></td><td><img src="./brandnew/1000/chara1b.jpg"></td></tr>
<tr><td colspan="3"><hr></td></tr>
<tr><td><img src="./brandnew/1000/chara2.jpg"></td><td><h2 class="chara-name">太郎</h2><dl><dd>主人公</dd></dl></td></tr>
</tbody></table>
</body></html>"#;

fn euc_jp(page: &str) -> Vec<u8> {
    let (bytes, _, unmappable) = encoding_rs::EUC_JP.encode(page);
    assert!(!unmappable);
    bytes.into_owned()
}

#[tokio::test]
async fn decodes_euc_jp_product_page() {
    let fetcher = MockFetcher::new().route(PRODUCT, euc_jp(PRODUCT_PAGE));
    let adapter = GetChu::new(fetcher, SiteConfig::getchu());

    let extraction = adapter.get_item(PRODUCT).await.unwrap();
    let record = &extraction.record;

    assert!(extraction.is_complete(), "{:?}", extraction.failures);
    assert_eq!(record.origin(), PRODUCT);
    assert_eq!(record.name, "春色ノスタルジア");
    assert_eq!(record.brand, "テストブランド");
    assert_eq!(record.link, "http://brand.example/");
    assert_eq!(record.release_date, "2021/05/28");
    assert_eq!(record.genre, vec!["学園恋愛ADV"]);
    assert_eq!(record.story, "桜の咲く町の物語。");
}

#[tokio::test]
async fn image_urls_are_absolute() {
    let fetcher = MockFetcher::new().route(PRODUCT, euc_jp(PRODUCT_PAGE));
    let adapter = GetChu::new(fetcher, SiteConfig::getchu());

    let record = adapter.get_item(PRODUCT).await.unwrap().record;

    assert_eq!(
        record.preview,
        vec![
            "https://www.getchu.com/brandnew/1000/c1000package.jpg",
            "https://www.getchu.com/brandnew/1000/sample1.jpg",
            "https://www.getchu.com/brandnew/1000/sample2.jpg",
        ]
    );

    assert_eq!(record.characters.len(), 2);
    let hanako = &record.characters[0];
    assert_eq!(hanako.name, "花子");
    assert_eq!(hanako.introduction, "ヒロイン");
    assert_eq!(hanako.avatar, "https://www.getchu.com/brandnew/1000/chara1.jpg");
    assert_eq!(hanako.images, vec!["https://www.getchu.com/brandnew/1000/chara1b.jpg"]);

    let taro = &record.characters[1];
    assert_eq!(taro.name, "太郎");
    assert!(taro.images.is_empty());
}

#[tokio::test]
async fn sends_age_confirmation_cookie() {
    let fetcher = MockFetcher::new().route(PRODUCT, euc_jp(PRODUCT_PAGE));
    let adapter = GetChu::new(fetcher.clone(), SiteConfig::getchu());

    adapter.get_item(PRODUCT).await.unwrap();

    let request = &fetcher.requests()[0];
    assert_eq!(
        request.cookie_header().as_deref(),
        Some("getchu_adalt_flag=getchu.com")
    );
}

#[tokio::test]
async fn missing_sections_are_recorded() {
    let page = "<html><body><h1 id=\"soft-title\">タイトル</h1></body></html>";
    let fetcher = MockFetcher::new().route(PRODUCT, euc_jp(page));
    let adapter = GetChu::new(fetcher, SiteConfig::getchu());

    let extraction = adapter.get_item(PRODUCT).await.unwrap();

    assert_eq!(extraction.record.name, "タイトル");
    assert_eq!(
        failed_fields(&extraction),
        vec![
            Field::Preview,
            Field::Genre,
            Field::Brand,
            Field::ReleaseDate,
            Field::Link,
            Field::Story,
            Field::Characters,
        ]
    );
}
