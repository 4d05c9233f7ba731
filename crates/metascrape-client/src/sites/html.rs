//! Small selector helpers over `scraper` that report misses as [`AppError`].

use metascrape_core::error::AppError;
use scraper::{ElementRef, Html, Selector};

pub(crate) fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ParseError(format!("bad selector {css}: {e}")))
}

/// First element under `root` matching `css`.
pub(crate) fn first<'a>(root: ElementRef<'a>, css: &str) -> Result<ElementRef<'a>, AppError> {
    let sel = selector(css)?;
    root.select(&sel)
        .next()
        .ok_or_else(|| AppError::Missing(css.to_string()))
}

/// Every element under `root` matching `css`, in document order.
pub(crate) fn all<'a>(root: ElementRef<'a>, css: &str) -> Result<Vec<ElementRef<'a>>, AppError> {
    let sel = selector(css)?;
    Ok(root.select(&sel).collect())
}

pub(crate) fn text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first match, which must be non-empty.
pub(crate) fn first_text(root: ElementRef<'_>, css: &str) -> Result<String, AppError> {
    let value = text(first(root, css)?);
    if value.is_empty() {
        return Err(AppError::Missing(format!("text of {css}")));
    }
    Ok(value)
}

pub(crate) fn attr(el: ElementRef<'_>, name: &str) -> Result<String, AppError> {
    el.value()
        .attr(name)
        .map(str::to_string)
        .ok_or_else(|| AppError::Missing(format!("{name} attribute on <{}>", el.value().name())))
}

/// The next sibling that is an element, skipping text and comments.
pub(crate) fn next_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

/// `src` of `el` itself if it is an `<img>`, plus every nested `<img>`.
pub(crate) fn image_sources(el: ElementRef<'_>) -> Vec<String> {
    let mut sources = Vec::new();
    if el.value().name() == "img" {
        sources.extend(el.value().attr("src").map(str::to_string));
    }
    if let Ok(images) = all(el, "img") {
        sources.extend(
            images
                .into_iter()
                .filter_map(|img| img.value().attr("src").map(str::to_string)),
        );
    }
    sources
}

pub(crate) fn parse(body: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(body))
}
