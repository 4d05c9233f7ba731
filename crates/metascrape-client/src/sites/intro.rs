//! Accumulator for the multi-page introduction topics on 2dfan.
//!
//! A topic's `#topic-content` is a flat run of headings, paragraphs and
//! images. `h4` headings open and close sections; the open section collects
//! whatever follows until the next heading, across page boundaries.

use metascrape_core::error::AppError;
use metascrape_core::models::Character;
use scraper::{ElementRef, Html, Node};

use super::html;

pub(crate) const CONTENT: &str = "#topic-content";
pub(crate) const PAGINATION: &str = "#content-pagination div.pagination ul li";

const SYNOPSIS_HEADING: &str = "故事介绍";
const CAST_HEADING: &str = "人物介绍";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Section {
    #[default]
    Closed,
    Synopsis,
    Cast,
}

/// What a finished walk produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Introduction {
    pub story: Option<String>,
    pub characters: Vec<Character>,
    pub preview: Vec<String>,
    pub pages: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct IntroWalker {
    section: Section,
    buffer: String,
    story: Option<String>,
    character: Option<Character>,
    characters: Vec<Character>,
    preview: Vec<String>,
    pages: Vec<String>,
}

/// Number of page links in the pagination control, excluding the leading
/// previous-page arrow. The last link is the next-page arrow, so the topic
/// has pages `1..links`.
pub(crate) fn page_links(doc: &Html) -> usize {
    html::all(doc.root_element(), PAGINATION)
        .map(|items| items.len())
        .unwrap_or(0)
        .saturating_sub(1)
}

impl IntroWalker {
    /// Accumulate one topic page fetched from `url`.
    pub fn walk(&mut self, url: &str, doc: &Html) -> Result<(), AppError> {
        let content = html::first(doc.root_element(), CONTENT)?;
        self.pages.push(url.to_string());

        for child in content.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        self.element(el);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Close the open section; the end of the last page terminates it.
    pub fn finish(mut self) -> Introduction {
        self.close();
        Introduction {
            story: self.story,
            characters: self.characters,
            preview: self.preview,
            pages: self.pages,
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        if el.value().name() == "h4" {
            self.heading(&html::text(el));
            return;
        }

        if self.section == Section::Cast {
            if let Some(name) = character_name(el) {
                self.start_character(name);
                return;
            }
        }

        let images = html::image_sources(el);
        if !images.is_empty() {
            self.images(images);
        }
        self.text(&el.text().collect::<String>());
    }

    fn heading(&mut self, title: &str) {
        self.close();
        self.section = if title.contains(SYNOPSIS_HEADING) {
            Section::Synopsis
        } else if title.contains(CAST_HEADING) {
            Section::Cast
        } else {
            Section::Closed
        };
    }

    fn close(&mut self) {
        match self.section {
            Section::Synopsis => {
                let text = std::mem::take(&mut self.buffer);
                let text = text.trim();
                if !text.is_empty() {
                    match &mut self.story {
                        Some(story) => {
                            story.push('\n');
                            story.push_str(text);
                        }
                        None => self.story = Some(text.to_string()),
                    }
                }
            }
            Section::Cast => self.flush_character(),
            Section::Closed => {}
        }
        self.section = Section::Closed;
    }

    fn text(&mut self, raw: &str) {
        let text = raw.trim();
        if text.is_empty() {
            return;
        }
        match self.section {
            Section::Synopsis => {
                self.buffer.push_str(text);
                self.buffer.push('\n');
            }
            Section::Cast => {
                if let Some(character) = &mut self.character {
                    if !character.introduction.is_empty() {
                        character.introduction.push('\n');
                    }
                    character.introduction.push_str(text);
                }
            }
            Section::Closed => {}
        }
    }

    fn images(&mut self, sources: Vec<String>) {
        match self.section {
            // Not deduplicated.
            Section::Synopsis => self.preview.extend(sources),
            Section::Cast => {
                if let Some(character) = &mut self.character {
                    let mut sources = sources.into_iter();
                    if character.avatar.is_empty() {
                        character.avatar = sources.next().unwrap_or_default();
                    }
                    character.images.extend(sources);
                }
            }
            Section::Closed => {}
        }
    }

    fn start_character(&mut self, name: String) {
        self.flush_character();
        self.character = Some(Character {
            name,
            ..Character::default()
        });
    }

    fn flush_character(&mut self) {
        if let Some(character) = self.character.take() {
            self.characters.push(character);
        }
    }
}

/// A `<strong>`, or a block whose entire text is one `<strong>`, names a
/// character.
fn character_name(el: ElementRef<'_>) -> Option<String> {
    let strong = if el.value().name() == "strong" {
        el
    } else {
        html::first(el, "strong").ok()?
    };
    let name = html::text(strong);
    if name.is_empty() || name != html::text(el) {
        return None;
    }
    Some(name)
}
