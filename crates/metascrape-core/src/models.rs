use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AppError;

/// A grouping label for tags (e.g. a classification axis such as "genre").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Category {
    pub identity: String,
    pub name: String,
}

/// A single value under a [`Category`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagItem {
    pub identity: String,
    pub name: String,
}

impl TagItem {
    /// A tag item whose identity is its display name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            identity: name.clone(),
            name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub category: Category,
    pub items: Vec<TagItem>,
}

impl Tag {
    /// A tag group for sites that have no category axis.
    pub fn uncategorized(items: Vec<TagItem>) -> Self {
        Self {
            category: Category::default(),
            items,
        }
    }
}

/// A cast member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Character {
    pub name: String,
    pub introduction: String,
    pub avatar: String,
    pub images: Vec<String>,
}

/// Every field of a [`Record`] that an extractor can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Brand,
    ReleaseDate,
    Link,
    Story,
    Size,
    Magnet,
    BtFile,
    OtherInfo,
    WalkThrough,
    SaveData,
    Preview,
    Genre,
    Information,
    Tags,
    Characters,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Brand => "brand",
            Field::ReleaseDate => "release_date",
            Field::Link => "link",
            Field::Story => "story",
            Field::Size => "size",
            Field::Magnet => "magnet",
            Field::BtFile => "bt_file",
            Field::OtherInfo => "other_info",
            Field::WalkThrough => "walkthrough",
            Field::SaveData => "save_data",
            Field::Preview => "preview",
            Field::Genre => "genre",
            Field::Information => "information",
            Field::Tags => "tags",
            Field::Characters => "characters",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(Field::Name),
            "brand" => Ok(Field::Brand),
            "release_date" => Ok(Field::ReleaseDate),
            "link" => Ok(Field::Link),
            "story" => Ok(Field::Story),
            "size" => Ok(Field::Size),
            "magnet" => Ok(Field::Magnet),
            "bt_file" => Ok(Field::BtFile),
            "other_info" => Ok(Field::OtherInfo),
            "walkthrough" => Ok(Field::WalkThrough),
            "save_data" => Ok(Field::SaveData),
            "preview" => Ok(Field::Preview),
            "genre" => Ok(Field::Genre),
            "information" => Ok(Field::Information),
            "tags" => Ok(Field::Tags),
            "characters" => Ok(Field::Characters),
            _ => Err(format!("Unknown field: {}", s)),
        }
    }
}

/// The normalized output of one adapter extraction.
///
/// `origin` is fixed at construction; every other field starts empty and is
/// filled independently. Scalars are only written while still empty and
/// sequences are only appended to, so a populated value is never replaced by
/// a later extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    origin: String,
    pub name: String,
    pub brand: String,
    pub release_date: String,
    pub link: String,
    pub story: String,
    pub size: String,
    pub magnet: String,
    pub bt_file: String,
    pub other_info: String,
    pub walkthrough: String,
    pub save_data: String,
    pub preview: Vec<String>,
    pub genre: Vec<String>,
    pub information: Vec<String>,
    pub tags: Vec<Tag>,
    pub characters: Vec<Character>,
}

impl Record {
    /// Start a record for `origin`. An empty origin is rejected.
    pub fn new(origin: impl Into<String>) -> Result<Self, AppError> {
        let origin = origin.into();
        if origin.trim().is_empty() {
            return Err(AppError::Generic("record origin must not be empty".into()));
        }
        Ok(Self {
            origin,
            name: String::new(),
            brand: String::new(),
            release_date: String::new(),
            link: String::new(),
            story: String::new(),
            size: String::new(),
            magnet: String::new(),
            bt_file: String::new(),
            other_info: String::new(),
            walkthrough: String::new(),
            save_data: String::new(),
            preview: Vec::new(),
            genre: Vec::new(),
            information: Vec::new(),
            tags: Vec::new(),
            characters: Vec::new(),
        })
    }

    /// The source URI this record was extracted from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Fold a patch into the record and return the failures it carried.
    pub fn merge(&mut self, patch: RecordPatch) -> Vec<FieldFailure> {
        let RecordPatch {
            name,
            brand,
            release_date,
            link,
            story,
            size,
            magnet,
            bt_file,
            other_info,
            walkthrough,
            save_data,
            preview,
            genre,
            information,
            tags,
            characters,
            failures,
        } = patch;

        for (field, slot, value) in [
            (Field::Name, &mut self.name, name),
            (Field::Brand, &mut self.brand, brand),
            (Field::ReleaseDate, &mut self.release_date, release_date),
            (Field::Link, &mut self.link, link),
            (Field::Story, &mut self.story, story),
            (Field::Size, &mut self.size, size),
            (Field::Magnet, &mut self.magnet, magnet),
            (Field::BtFile, &mut self.bt_file, bt_file),
            (Field::OtherInfo, &mut self.other_info, other_info),
            (Field::WalkThrough, &mut self.walkthrough, walkthrough),
            (Field::SaveData, &mut self.save_data, save_data),
        ] {
            if let Some(value) = value {
                if !slot.fill(value) {
                    tracing::debug!(%field, "Kept earlier value");
                }
            }
        }

        self.preview.fill(preview);
        self.genre.fill(genre);
        self.information.fill(information);
        self.tags.fill(tags);
        self.characters.fill(characters);

        failures
    }
}

/// A field value that can be written into a [`Record`] without overwriting.
pub trait Slot {
    /// Write `value` into the slot. Returns false if an existing value was
    /// kept instead.
    fn fill(&mut self, value: Self) -> bool;
}

impl Slot for String {
    fn fill(&mut self, value: Self) -> bool {
        if self.is_empty() {
            *self = value;
            true
        } else {
            value.is_empty() || *self == value
        }
    }
}

impl<T> Slot for Vec<T> {
    fn fill(&mut self, value: Self) -> bool {
        self.extend(value);
        true
    }
}

/// Values and failures produced by one follow-up, merged into a record by
/// the aggregator.
#[derive(Debug, Default)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub release_date: Option<String>,
    pub link: Option<String>,
    pub story: Option<String>,
    pub size: Option<String>,
    pub magnet: Option<String>,
    pub bt_file: Option<String>,
    pub other_info: Option<String>,
    pub walkthrough: Option<String>,
    pub save_data: Option<String>,
    pub preview: Vec<String>,
    pub genre: Vec<String>,
    pub information: Vec<String>,
    pub tags: Vec<Tag>,
    pub characters: Vec<Character>,
    pub failures: Vec<FieldFailure>,
}

impl RecordPatch {
    /// A patch carrying a single failure.
    pub fn failed(field: Field, error: AppError) -> Self {
        Self {
            failures: vec![FieldFailure { field, error }],
            ..Self::default()
        }
    }

    pub fn fail(&mut self, field: Field, error: AppError) {
        self.failures.push(FieldFailure { field, error });
    }
}

/// A non-fatal extraction failure for one field.
#[derive(Debug)]
pub struct FieldFailure {
    pub field: Field,
    pub error: AppError,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}

/// The result of one `get_item` call: a best-effort record plus the
/// diagnostics collected while building it.
#[derive(Debug)]
pub struct Extraction {
    pub record: Record,
    pub failures: Vec<FieldFailure>,
}

impl Extraction {
    /// True if no extractor reported a failure.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures recorded for one field.
    pub fn failures_for(&self, field: Field) -> impl Iterator<Item = &FieldFailure> {
        self.failures.iter().filter(move |f| f.field == field)
    }
}
