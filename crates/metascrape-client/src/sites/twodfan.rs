use metascrape_core::config::SiteConfig;
use metascrape_core::error::AppError;
use metascrape_core::models::{Field, RecordPatch, Tag, TagItem};
use metascrape_core::traits::{Fetcher, SiteAdapter};
use scraper::Html;
use url::Url;

use super::html;
use super::intro::{self, IntroWalker};

const FACTS: &str = r#"div[class="media-body control-group"] p.tags"#;
const TAGS: &str = r#"#sidebar div[class="block-content collapse in tags"] a"#;
const COVER: &str = r#"div[class="block-content collapse in"] div.span8 div.media a img"#;
const RESOURCES: &str = "#resources span";

/// 2dfan subject pages (`{domain}subjects/{id}`).
pub struct TwoDFan<F> {
    fetcher: F,
    site: SiteConfig,
}

pub struct SubjectPage {
    html: Html,
    id: Option<String>,
}

pub enum TwoDFanFollowUp {
    /// Walk the introduction topic of this subject.
    Introduction { id: String },
}

impl<F: Fetcher> TwoDFan<F> {
    pub fn new(fetcher: F, site: SiteConfig) -> Self {
        Self { fetcher, site }
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.site.headers.insert(name.into(), value.into());
    }

    fn topic_url(&self, id: &str, page: usize) -> String {
        if page <= 1 {
            format!("{}topics/{id}", self.site.domain)
        } else {
            format!("{}topics/{id}/page/{page}", self.site.domain)
        }
    }

    /// Text of the first fact line mentioning `label`.
    fn fact(&self, page: &SubjectPage, label: &str) -> Result<String, AppError> {
        html::all(page.html.root_element(), FACTS)?
            .into_iter()
            .map(html::text)
            .find(|line| line.contains(label))
            .ok_or_else(|| AppError::NoMatch(format!("fact line {label}")))
    }

    async fn walk_introduction(&self, id: &str) -> RecordPatch {
        let mut walker = IntroWalker::default();
        let mut patch = RecordPatch::default();

        let first = self.topic_url(id, 1);
        let links = match super::get_body(&self.fetcher, &self.site, &first).await {
            Ok(body) => {
                let doc = html::parse(&body);
                match walker.walk(&first, &doc) {
                    Ok(()) => intro::page_links(&doc),
                    Err(e) => {
                        patch.fail(Field::Story, e);
                        0
                    }
                }
            }
            Err(e) => {
                patch.fail(Field::Story, e);
                0
            }
        };

        tracing::debug!(%id, links, "Walking introduction topic");

        for page in 2..links {
            let url = self.topic_url(id, page);
            let walked = match super::get_body(&self.fetcher, &self.site, &url).await {
                Ok(body) => walker.walk(&url, &html::parse(&body)),
                Err(e) => Err(e),
            };
            if let Err(e) = walked {
                tracing::warn!(%url, error = %e, "Introduction walk stopped");
                patch.fail(Field::Story, e);
                break;
            }
        }

        let intro = walker.finish();
        patch.story = intro.story;
        patch.characters = intro.characters;
        patch.preview = intro.preview;
        patch.information = intro.pages;
        patch
    }
}

impl<F: Fetcher> SiteAdapter for TwoDFan<F> {
    type Document = SubjectPage;
    type FollowUp = TwoDFanFollowUp;

    fn site(&self) -> &'static str {
        "2dfan"
    }

    async fn fetch_root(&self, uri: &str) -> Result<Vec<u8>, AppError> {
        super::get_body(&self.fetcher, &self.site, uri).await
    }

    fn parse(&self, uri: &str, body: &[u8]) -> Result<SubjectPage, AppError> {
        Ok(SubjectPage {
            html: html::parse(body),
            id: subject_id(uri),
        })
    }

    fn fields(&self) -> &'static [Field] {
        &[
            Field::Name,
            Field::Brand,
            Field::ReleaseDate,
            Field::Tags,
            Field::Preview,
            Field::WalkThrough,
        ]
    }

    fn follow_ups(&self, _uri: &str, page: &SubjectPage) -> Vec<TwoDFanFollowUp> {
        let Some(id) = &page.id else {
            return Vec::new();
        };
        let has_intro = html::all(page.html.root_element(), RESOURCES)
            .unwrap_or_default()
            .into_iter()
            .any(|span| html::text(span).contains("介绍"));

        if has_intro {
            vec![TwoDFanFollowUp::Introduction { id: id.clone() }]
        } else {
            Vec::new()
        }
    }

    async fn resolve(&self, follow_up: TwoDFanFollowUp) -> RecordPatch {
        match follow_up {
            TwoDFanFollowUp::Introduction { id } => self.walk_introduction(&id).await,
        }
    }

    fn extract_name(&self, page: &SubjectPage) -> Result<String, AppError> {
        html::first_text(page.html.root_element(), "div.navbar h3")
    }

    fn extract_brand(&self, page: &SubjectPage) -> Result<String, AppError> {
        let sel = html::selector(FACTS)?;
        let line = page
            .html
            .select(&sel)
            .find(|line| html::text(*line).contains("品牌"))
            .ok_or_else(|| AppError::NoMatch("fact line 品牌".into()))?;
        html::first_text(line, "a")
    }

    fn extract_release_date(&self, page: &SubjectPage) -> Result<String, AppError> {
        let line = self.fact(page, "发售日期")?;
        Ok(line.replacen("发售日期：", "", 1).trim().to_string())
    }

    fn extract_tags(&self, page: &SubjectPage) -> Result<Vec<Tag>, AppError> {
        let items: Vec<TagItem> = html::all(page.html.root_element(), TAGS)?
            .into_iter()
            .map(|a| TagItem::named(html::text(a)))
            .collect();
        if items.is_empty() {
            return Err(AppError::Missing(TAGS.into()));
        }
        Ok(vec![Tag::uncategorized(items)])
    }

    /// The cover image; inline synopsis images are appended by the
    /// introduction walk.
    fn extract_preview(&self, page: &SubjectPage) -> Result<Vec<String>, AppError> {
        let img = html::first(page.html.root_element(), COVER)?;
        Ok(vec![html::attr(img, "src")?])
    }

    fn extract_walkthrough(&self, page: &SubjectPage) -> Result<String, AppError> {
        let id = page
            .id
            .as_deref()
            .ok_or_else(|| AppError::Missing("subject id".into()))?;
        Ok(format!("{}subjects/{id}/walkthroughs", self.site.domain))
    }
}

/// Last non-empty path segment of the subject URI.
fn subject_id(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}
