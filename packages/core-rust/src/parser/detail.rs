//! Gallery detail and large preview page parsers.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::error::ParseError;
use super::list::element_text;
use super::url::parse_archive_url;
use crate::types::{ArchiveInfo, GalleryDetail, LargePreview, PreviewSet};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static SEL_SUBJECT: LazyLock<Selector> = LazyLock::new(|| selector(".subject"));
static SEL_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static SEL_THUMB: LazyLock<Selector> = LazyLock::new(|| selector(".image-thumb"));
static SEL_UPLOADER: LazyLock<Selector> = LazyLock::new(|| selector(".itu"));
static SEL_POSTED: LazyLock<Selector> = LazyLock::new(|| selector(".info"));
static SEL_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static SEL_PREVIEW: LazyLock<Selector> = LazyLock::new(|| selector(".gdtl"));
static SEL_PREVIEW_IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));

static THUMB_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"url\((.*)\)").expect("thumb pattern is valid"));

// ---------------------------------------------------------------------------
// Detail
// ---------------------------------------------------------------------------

/// Parse a gallery detail page.
///
/// The title is mandatory (`.subject`, falling back to the first `h1`).
/// Thumbnail, uploader and posted text default to empty strings; archive links
/// are collected from every anchor whose `href` has the `/archives/<id>` shape.
///
/// # Errors
///
/// Returns [`ParseError::Structure`] when no title can be found.
pub fn parse_gallery_detail(body: &str) -> Result<GalleryDetail, ParseError> {
    let document = Html::parse_document(body);

    let title = first_text(&document, &SEL_SUBJECT)
        .or_else(|| first_text(&document, &SEL_HEADING))
        .filter(|title| !title.is_empty())
        .ok_or_else(|| ParseError::structure("Can't parse gallery detail title", body))?;

    let thumb = document
        .select(&SEL_THUMB)
        .next()
        .and_then(|el| el.value().attr("style"))
        .and_then(|style| THUMB_SRC.captures(style))
        .map(|caps| caps[1].trim_matches(['\'', '"']).to_string())
        .unwrap_or_else(|| {
            warn!("Can't parse gallery detail thumb");
            String::new()
        });

    let archives = document.select(&SEL_LINK).filter_map(parse_archive).collect();

    Ok(GalleryDetail {
        title,
        thumb,
        uploader: first_text(&document, &SEL_UPLOADER).unwrap_or_default(),
        posted: first_text(&document, &SEL_POSTED).unwrap_or_default(),
        archives,
    })
}

fn parse_archive(link: ElementRef<'_>) -> Option<ArchiveInfo> {
    let uid = parse_archive_url(link.value().attr("href")?)?;
    Some(ArchiveInfo {
        uid,
        title: element_text(link),
        visited: link.value().classes().any(|class| class == "visited"),
    })
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).next().map(element_text)
}

// ---------------------------------------------------------------------------
// Large previews
// ---------------------------------------------------------------------------

/// Parse the large preview tiles of a detail page.
///
/// Tiles lacking an image, a link or a numeric `alt` index are skipped.
///
/// # Errors
///
/// Returns [`ParseError::Structure`] when the page has no preview tiles at all.
pub fn parse_large_preview_set(body: &str) -> Result<PreviewSet, ParseError> {
    let document = Html::parse_document(body);

    let mut tiles = document.select(&SEL_PREVIEW).peekable();
    if tiles.peek().is_none() {
        return Err(ParseError::structure("Can't parse large preview set", body));
    }

    let previews = tiles
        .filter_map(|tile| {
            let preview = parse_preview(tile);
            if preview.is_none() {
                warn!("Can't parse large preview tile");
            }
            preview
        })
        .collect();

    Ok(PreviewSet { previews })
}

fn parse_preview(tile: ElementRef<'_>) -> Option<LargePreview> {
    let page_url = tile.select(&SEL_LINK).next()?.value().attr("href")?;
    let img = tile.select(&SEL_PREVIEW_IMG).next()?;
    let position = img.value().attr("alt")?.trim().parse::<u32>().ok()?;
    Some(LargePreview {
        index: position.checked_sub(1)?,
        image_url: img.value().attr("src")?.to_string(),
        page_url: page_url.to_string(),
    })
}
