use std::convert::Infallible;

use metascrape_core::config::SiteConfig;
use metascrape_core::error::AppError;
use metascrape_core::models::{Character, Field, RecordPatch};
use metascrape_core::traits::{Fetcher, SiteAdapter};
use metascrape_core::util::{euc_jp_to_utf8, resolve_url};
use scraper::{ElementRef, Html};

use super::html;

const SPEC_TABLE: &str = "#soft_table tr:nth-child(2) table";

/// Getchu product pages (`{domain}soft.phtml?id={id}`), served as EUC-JP.
///
/// Everything is on the product page, so there are no follow-ups.
pub struct GetChu<F> {
    fetcher: F,
    site: SiteConfig,
}

impl<F: Fetcher> GetChu<F> {
    pub fn new(fetcher: F, site: SiteConfig) -> Self {
        Self { fetcher, site }
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.site.headers.insert(name.into(), value.into());
    }

    fn absolute(&self, href: &str) -> String {
        resolve_url(&self.site.domain, href)
    }

    /// The block following the section title containing `title`.
    fn section<'a>(&self, doc: &'a Html, title: &str) -> Result<ElementRef<'a>, AppError> {
        html::all(doc.root_element(), "div.tabletitle")?
            .into_iter()
            .find(|heading| html::text(*heading).contains(title))
            .and_then(html::next_element)
            .ok_or_else(|| AppError::NoMatch(format!("section {title}")))
    }

    fn spec_cell(&self, doc: &Html, row: usize) -> Result<String, AppError> {
        html::first_text(
            doc.root_element(),
            &format!("{SPEC_TABLE} tr:nth-child({row}) td:nth-child(2)"),
        )
    }

    fn brand_anchor<'a>(&self, doc: &'a Html) -> Result<ElementRef<'a>, AppError> {
        html::first(
            doc.root_element(),
            &format!("{SPEC_TABLE} tr:nth-child(1) td:nth-child(2) a:nth-child(1)"),
        )
    }
}

impl<F: Fetcher> SiteAdapter for GetChu<F> {
    type Document = Html;
    type FollowUp = Infallible;

    fn site(&self) -> &'static str {
        "getchu"
    }

    async fn fetch_root(&self, uri: &str) -> Result<Vec<u8>, AppError> {
        super::get_body(&self.fetcher, &self.site, uri).await
    }

    fn parse(&self, _uri: &str, body: &[u8]) -> Result<Html, AppError> {
        Ok(Html::parse_document(&euc_jp_to_utf8(body)))
    }

    fn fields(&self) -> &'static [Field] {
        &[
            Field::Name,
            Field::Preview,
            Field::Genre,
            Field::Brand,
            Field::ReleaseDate,
            Field::Link,
            Field::Story,
            Field::Characters,
        ]
    }

    async fn resolve(&self, follow_up: Infallible) -> RecordPatch {
        match follow_up {}
    }

    fn extract_name(&self, doc: &Html) -> Result<String, AppError> {
        html::first_text(doc.root_element(), "#soft-title")
    }

    /// Package images followed by the sample gallery, as absolute URLs.
    fn extract_preview(&self, doc: &Html) -> Result<Vec<String>, AppError> {
        let mut images: Vec<String> = html::all(doc.root_element(), "#soft_table a.highslide")?
            .into_iter()
            .filter_map(|a| a.value().attr("href"))
            .map(|href| self.absolute(href))
            .collect();

        if let Ok(gallery) = self.section(doc, "サンプル画像") {
            images.extend(
                html::all(gallery, "a")?
                    .into_iter()
                    .filter_map(|a| a.value().attr("href"))
                    .map(|href| self.absolute(href)),
            );
        }

        if images.is_empty() {
            return Err(AppError::Missing("package or sample images".into()));
        }
        Ok(images)
    }

    fn extract_genre(&self, doc: &Html) -> Result<Vec<String>, AppError> {
        Ok(vec![self.spec_cell(doc, 5)?])
    }

    fn extract_brand(&self, doc: &Html) -> Result<String, AppError> {
        let brand = html::text(self.brand_anchor(doc)?);
        if brand.is_empty() {
            return Err(AppError::Missing("brand name".into()));
        }
        Ok(brand)
    }

    fn extract_release_date(&self, doc: &Html) -> Result<String, AppError> {
        html::first_text(
            doc.root_element(),
            &format!("{SPEC_TABLE} tr:nth-child(3) td:nth-child(2) a"),
        )
    }

    /// The brand's official site.
    fn extract_link(&self, doc: &Html) -> Result<String, AppError> {
        html::attr(self.brand_anchor(doc)?, "href")
    }

    fn extract_story(&self, doc: &Html) -> Result<String, AppError> {
        let story = html::text(self.section(doc, "ストーリー")?);
        if story.is_empty() {
            return Err(AppError::Missing("story text".into()));
        }
        Ok(story)
    }

    fn extract_characters(&self, doc: &Html) -> Result<Vec<Character>, AppError> {
        let table = self.section(doc, "キャラクター")?;
        let mut cast = Vec::new();

        for row in html::all(table, "tr")? {
            // Separator rows.
            if html::first(row, "hr").is_ok() {
                continue;
            }
            let src = |css: &str| {
                html::first(row, css)
                    .ok()
                    .and_then(|img| img.value().attr("src"))
                    .map(|src| self.absolute(src))
            };
            cast.push(Character {
                name: html::first(row, "td:nth-child(2) h2.chara-name")
                    .map(html::text)
                    .unwrap_or_default(),
                introduction: html::first(row, "td:nth-child(2) dd")
                    .map(html::text)
                    .unwrap_or_default(),
                avatar: src("td:nth-child(1) img").unwrap_or_default(),
                images: src("td:nth-child(3) img").into_iter().collect(),
            });
        }
        Ok(cast)
    }
}
