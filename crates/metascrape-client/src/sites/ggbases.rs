use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use metascrape_core::capture::{CaptureBridge, CaptureKind, CaptureRequest};
use metascrape_core::config::SiteConfig;
use metascrape_core::error::AppError;
use metascrape_core::fanout::{FanOutLimit, fan_out};
use metascrape_core::models::{Category, Field, RecordPatch, Tag, TagItem};
use metascrape_core::traits::{CaptureDriver, Fetcher, SiteAdapter};
use metascrape_core::util::resolve_url;
use regex::Regex;
use scraper::Html;
use serde_json::Value;
use url::Url;

use super::html;

const LINKS_CELL: &str = "#touch tbody>tr:nth-child(7)>td";
const MAGNET_TRIGGER: &str = ".dbutton[bt='3']";
const TORRENT_TRIGGER: &str = ".dbutton[bt='1']";
const MAX_PREVIEWS: usize = 10;

static PREVIEW_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)").expect("preview count pattern should compile"));

/// GGBases listings (`{domain}view.so?id={id}`).
///
/// The listing and its preview pages are plain HTTP. The magnet hash and the
/// torrent file only appear after page scripts run, so those go through the
/// capture bridge.
pub struct GGBases<F, D> {
    fetcher: F,
    site: SiteConfig,
    fan_out: FanOutLimit,
    bridge: CaptureBridge<D>,
    download_dir: PathBuf,
}

pub struct Listing {
    html: Html,
    id: Option<String>,
}

/// Where the preview pages live: `{link}/0` .. `{link}/{count - 1}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewPlan {
    pub link: String,
    pub count: usize,
}

pub enum GGBasesFollowUp {
    Previews(PreviewPlan),
    Magnet { id: String },
    Torrent { id: String },
    /// A follow-up that could not be planned from the listing.
    Unavailable(Field, AppError),
}

impl<F: Fetcher, D: CaptureDriver> GGBases<F, D> {
    pub fn new(
        fetcher: F,
        site: SiteConfig,
        fan_out: FanOutLimit,
        bridge: CaptureBridge<D>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            site,
            fan_out: fan_out.with_max_items(MAX_PREVIEWS),
            bridge,
            download_dir,
        }
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.site.headers.insert(name.into(), value.into());
    }

    fn absolute(&self, href: &str) -> String {
        resolve_url(&self.site.domain, href)
    }

    fn capture_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Accept-Language".into(), "zh-cn,zh;q=0.5".into());
        headers.insert("X-Forwarded-For".into(), self.site.domain.clone());
        headers
    }

    fn preview_plan(&self, listing: &Listing) -> Result<PreviewPlan, AppError> {
        let button = html::first(listing.html.root_element(), &format!("{LINKS_CELL} #showCoverBtn"))?;
        let link = self.absolute(&html::attr(button, "href")?);
        let label = html::first(button, "span").map(html::text).unwrap_or_default();
        let count =
            preview_count(&label).ok_or_else(|| AppError::Missing("preview count".into()))?;
        Ok(PreviewPlan {
            link,
            count: count.min(MAX_PREVIEWS),
        })
    }

    async fn previews(&self, plan: PreviewPlan) -> RecordPatch {
        let joined = fan_out(0..plan.count, self.fan_out, |index| {
            let url = format!("{}/{index}", plan.link.trim_end_matches('/'));
            let request = super::site_request(&self.site, &url);
            let fetcher = self.fetcher.clone();
            let domain = self.site.domain.clone();
            async move {
                let response = fetcher.fetch(request).await?.error_for_status(&url)?;
                let src = {
                    let page = html::parse(&response.body);
                    let img = html::first(page.root_element(), "#showpictd img")?;
                    html::attr(img, "src")?
                };
                Ok::<_, AppError>((index, resolve_url(&domain, &src)))
            }
        })
        .await;

        let mut images = joined.values;
        images.sort_by_key(|&(index, _)| index);

        let mut patch = RecordPatch {
            preview: images.into_iter().map(|(_, src)| src).collect(),
            ..RecordPatch::default()
        };
        for error in joined.errors {
            patch.fail(Field::Preview, error);
        }
        patch
    }

    async fn magnet(&self, id: &str) -> Result<String, AppError> {
        let request = CaptureRequest::new(
            format!("{}magnet.so?id={id}", self.site.domain),
            MAGNET_TRIGGER,
            CaptureKind::XhrResponse,
        )
        .with_headers(self.capture_headers());

        let body = self.bridge.capture(&request).await?.into_body()?;
        let reply: Value = serde_json::from_slice(&body)?;
        let hash = reply["hash"]
            .as_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::Missing("hash".into()))?;
        Ok(format!("magnet:?xt=urn:btih:{hash}"))
    }

    async fn torrent(&self, id: &str) -> Result<String, AppError> {
        let request = CaptureRequest::new(
            format!("{}down.so?id={id}", self.site.domain),
            TORRENT_TRIGGER,
            CaptureKind::Download {
                dir: self.download_dir.clone(),
            },
        )
        .with_headers(self.capture_headers());

        let (guid, path) = self.bridge.capture(&request).await?.into_download()?;
        tracing::info!(%id, %guid, path = %path.display(), "Torrent downloaded");
        Ok(path.display().to_string())
    }
}

impl<F: Fetcher, D: CaptureDriver> SiteAdapter for GGBases<F, D> {
    type Document = Listing;
    type FollowUp = GGBasesFollowUp;

    fn site(&self) -> &'static str {
        "ggbases"
    }

    async fn fetch_root(&self, uri: &str) -> Result<Vec<u8>, AppError> {
        super::get_body(&self.fetcher, &self.site, uri).await
    }

    fn parse(&self, uri: &str, body: &[u8]) -> Result<Listing, AppError> {
        Ok(Listing {
            html: html::parse(body),
            id: listing_id(uri),
        })
    }

    fn fields(&self) -> &'static [Field] {
        &[
            Field::Name,
            Field::Tags,
            Field::ReleaseDate,
            Field::Size,
            Field::SaveData,
            Field::WalkThrough,
            Field::OtherInfo,
        ]
    }

    fn follow_ups(&self, _uri: &str, listing: &Listing) -> Vec<GGBasesFollowUp> {
        let mut follow_ups = vec![match self.preview_plan(listing) {
            Ok(plan) => GGBasesFollowUp::Previews(plan),
            Err(e) => GGBasesFollowUp::Unavailable(Field::Preview, e),
        }];

        match &listing.id {
            Some(id) => {
                follow_ups.push(GGBasesFollowUp::Magnet { id: id.clone() });
                follow_ups.push(GGBasesFollowUp::Torrent { id: id.clone() });
            }
            None => {
                for field in [Field::Magnet, Field::BtFile] {
                    follow_ups.push(GGBasesFollowUp::Unavailable(
                        field,
                        AppError::Missing("id query parameter".into()),
                    ));
                }
            }
        }
        follow_ups
    }

    async fn resolve(&self, follow_up: GGBasesFollowUp) -> RecordPatch {
        match follow_up {
            GGBasesFollowUp::Previews(plan) => self.previews(plan).await,
            GGBasesFollowUp::Magnet { id } => match self.magnet(&id).await {
                Ok(magnet) => RecordPatch {
                    magnet: Some(magnet),
                    ..RecordPatch::default()
                },
                Err(e) => RecordPatch::failed(Field::Magnet, e),
            },
            GGBasesFollowUp::Torrent { id } => match self.torrent(&id).await {
                Ok(path) => RecordPatch {
                    bt_file: Some(path),
                    ..RecordPatch::default()
                },
                Err(e) => RecordPatch::failed(Field::BtFile, e),
            },
            GGBasesFollowUp::Unavailable(field, error) => RecordPatch::failed(field, error),
        }
    }

    fn extract_name(&self, listing: &Listing) -> Result<String, AppError> {
        html::first_text(listing.html.root_element(), "#atitle")
    }

    /// One tag group per row of the tag table; the first row is a header.
    fn extract_tags(&self, listing: &Listing) -> Result<Vec<Tag>, AppError> {
        let rows = html::all(listing.html.root_element(), "#extagstable tbody tr")?;
        if rows.is_empty() {
            return Err(AppError::Missing("#extagstable".into()));
        }

        let mut tags = Vec::new();
        for row in rows.into_iter().skip(1) {
            let name = html::first(row, "td:nth-child(1)>a")
                .map(html::text)
                .unwrap_or_default();
            let items = html::all(row, "td:nth-child(2) a")?
                .into_iter()
                .map(|a| {
                    let name = html::first(a, "span").map(html::text).unwrap_or_default();
                    let identity = a
                        .value()
                        .attr("title")
                        .map(str::to_string)
                        .unwrap_or_else(|| name.clone());
                    TagItem { identity, name }
                })
                .collect();
            tags.push(Tag {
                category: Category {
                    identity: name.clone(),
                    name,
                },
                items,
            });
        }
        Ok(tags)
    }

    fn extract_release_date(&self, listing: &Listing) -> Result<String, AppError> {
        html::first_text(
            listing.html.root_element(),
            "#touch tbody tr:nth-child(5) td:nth-child(1) span",
        )
    }

    fn extract_size(&self, listing: &Listing) -> Result<String, AppError> {
        html::first_text(
            listing.html.root_element(),
            "#touch tbody tr:nth-child(5) td:nth-child(2) span",
        )
    }

    fn extract_save_data(&self, listing: &Listing) -> Result<String, AppError> {
        let a = html::first(listing.html.root_element(), &format!("{LINKS_CELL} a:nth-child(2)"))?;
        Ok(self.absolute(&html::attr(a, "href")?))
    }

    fn extract_walkthrough(&self, listing: &Listing) -> Result<String, AppError> {
        let a = html::first(listing.html.root_element(), &format!("{LINKS_CELL} a:nth-child(3)"))?;
        Ok(self.absolute(&html::attr(a, "href")?))
    }

    /// The description block as HTML.
    fn extract_other_info(&self, listing: &Listing) -> Result<String, AppError> {
        let block = html::first(listing.html.root_element(), "#description div[markdown-text]")?;
        Ok(block.inner_html().trim().to_string())
    }
}

/// The number in a cover button label such as `封面(12)`.
fn preview_count(label: &str) -> Option<usize> {
    PREVIEW_COUNT.captures(label)?[1].parse().ok()
}

fn listing_id(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}
