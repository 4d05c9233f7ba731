use metascrape_core::config::SiteConfig;
use metascrape_core::error::AppError;
use metascrape_core::fanout::{FanOutLimit, fan_out};
use metascrape_core::models::{Character, Field, RecordPatch, Tag, TagItem};
use metascrape_core::traits::{Fetcher, SiteAdapter};
use serde_json::Value;

/// Only the first few cast entries get a bio lookup.
const MAX_CHARACTERS: usize = 10;

/// Bangumi API v0 subjects (`{domain}v0/subjects/{id}`).
pub struct Bangumi<F> {
    fetcher: F,
    site: SiteConfig,
    fan_out: FanOutLimit,
}

pub enum BangumiFollowUp {
    Characters { subject_id: String },
}

impl<F: Fetcher> Bangumi<F> {
    pub fn new(fetcher: F, site: SiteConfig, fan_out: FanOutLimit) -> Self {
        Self {
            fetcher,
            site,
            fan_out: fan_out.with_max_items(MAX_CHARACTERS),
        }
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.site.headers.insert(name.into(), value.into());
    }

    async fn characters(&self, subject_id: &str) -> RecordPatch {
        let list_url = format!("{}v0/subjects/{subject_id}/characters", self.site.domain);
        let ids = match self.cast_ids(&list_url).await {
            Ok(ids) => ids,
            Err(e) => return RecordPatch::failed(Field::Characters, e),
        };

        let joined = fan_out(ids.into_iter().enumerate(), self.fan_out, |(index, id)| {
            let url = format!("{}v0/characters/{id}", self.site.domain);
            let request = super::site_request(&self.site, &url);
            let fetcher = self.fetcher.clone();
            async move {
                let response = fetcher.fetch(request).await?.error_for_status(&url)?;
                let bio: Value = serde_json::from_slice(&response.body)?;
                Ok::<_, AppError>((index, character(&bio)))
            }
        })
        .await;

        let mut cast = joined.values;
        cast.sort_by_key(|&(index, _)| index);

        let mut patch = RecordPatch {
            characters: cast.into_iter().map(|(_, c)| c).collect(),
            ..RecordPatch::default()
        };
        for error in joined.errors {
            patch.fail(Field::Characters, error);
        }
        patch
    }

    async fn cast_ids(&self, url: &str) -> Result<Vec<String>, AppError> {
        let body = super::get_body(&self.fetcher, &self.site, url).await?;
        let list: Value = serde_json::from_slice(&body)?;
        let entries = list
            .as_array()
            .ok_or_else(|| AppError::ParseError(format!("expected a cast list from {url}")))?;
        Ok(entries
            .iter()
            .filter_map(|entry| json_string(&entry["id"]))
            .collect())
    }
}

impl<F: Fetcher> SiteAdapter for Bangumi<F> {
    type Document = Value;
    type FollowUp = BangumiFollowUp;

    fn site(&self) -> &'static str {
        "bangumi"
    }

    async fn fetch_root(&self, uri: &str) -> Result<Vec<u8>, AppError> {
        super::get_body(&self.fetcher, &self.site, uri).await
    }

    fn parse(&self, _uri: &str, body: &[u8]) -> Result<Value, AppError> {
        Ok(serde_json::from_slice(body)?)
    }

    fn fields(&self) -> &'static [Field] {
        &[
            Field::Name,
            Field::Preview,
            Field::Genre,
            Field::Brand,
            Field::ReleaseDate,
            Field::Link,
            Field::Tags,
            Field::Story,
        ]
    }

    fn follow_ups(&self, _uri: &str, doc: &Value) -> Vec<BangumiFollowUp> {
        json_string(&doc["id"])
            .map(|subject_id| BangumiFollowUp::Characters { subject_id })
            .into_iter()
            .collect()
    }

    async fn resolve(&self, follow_up: BangumiFollowUp) -> RecordPatch {
        match follow_up {
            BangumiFollowUp::Characters { subject_id } => self.characters(&subject_id).await,
        }
    }

    fn extract_name(&self, doc: &Value) -> Result<String, AppError> {
        required_str(doc, "/name")
    }

    fn extract_preview(&self, doc: &Value) -> Result<Vec<String>, AppError> {
        Ok(vec![required_str(doc, "/images/large")?])
    }

    fn extract_genre(&self, doc: &Value) -> Result<Vec<String>, AppError> {
        Ok(vec![infobox(doc, "游戏类型", |key| key == "游戏类型")?])
    }

    fn extract_brand(&self, doc: &Value) -> Result<String, AppError> {
        infobox(doc, "开发", |key| key.contains("开发"))
    }

    fn extract_release_date(&self, doc: &Value) -> Result<String, AppError> {
        infobox(doc, "发行日期", |key| key == "发行日期")
    }

    fn extract_link(&self, doc: &Value) -> Result<String, AppError> {
        infobox(doc, "website", |key| key == "website")
    }

    fn extract_tags(&self, doc: &Value) -> Result<Vec<Tag>, AppError> {
        let tags = doc["tags"]
            .as_array()
            .ok_or_else(|| AppError::Missing("tags".into()))?;
        let items = tags
            .iter()
            .filter_map(|tag| tag["name"].as_str())
            .map(TagItem::named)
            .collect();
        Ok(vec![Tag::uncategorized(items)])
    }

    fn extract_story(&self, doc: &Value) -> Result<String, AppError> {
        required_str(doc, "/summary")
    }
}

fn required_str(doc: &Value, pointer: &str) -> Result<String, AppError> {
    doc.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Missing(pointer.trim_start_matches('/').replace('/', ".")))
}

/// Value of the first infobox entry whose key satisfies `matches`.
///
/// Values are either a plain string or a list of `{"v": ...}` objects, which
/// are joined with `、`.
fn infobox(doc: &Value, label: &str, matches: impl Fn(&str) -> bool) -> Result<String, AppError> {
    let entries = doc["infobox"]
        .as_array()
        .ok_or_else(|| AppError::Missing("infobox".into()))?;
    let entry = entries
        .iter()
        .find(|entry| entry["key"].as_str().is_some_and(&matches))
        .ok_or_else(|| AppError::NoMatch(format!("infobox key {label}")))?;

    Ok(match &entry["value"] {
        Value::String(value) => value.clone(),
        Value::Array(values) => values
            .iter()
            .filter_map(|v| v["v"].as_str())
            .collect::<Vec<_>>()
            .join("、"),
        other => other.to_string(),
    })
}

fn character(bio: &Value) -> Character {
    let field = |pointer: &str| {
        bio.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Character {
        name: field("/name"),
        introduction: field("/summary"),
        avatar: field("/images/large"),
        images: Vec::new(),
    }
}

/// Ids arrive as numbers, occasionally as strings.
fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
