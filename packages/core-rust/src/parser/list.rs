//! Listing page parser.
//!
//! A listing page is decoded with a best-partial-result policy: each item field
//! is extracted independently, optional fields fall back to the defaults of
//! [`GalleryInfo::default`], and only a missing identity field (title, gid +
//! token) drops the item. The page itself fails only when its page-count
//! indicator is missing and the body is not the known empty result.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{error, warn};

use super::error::ParseError;
use super::language::simple_language;
use super::url::parse_detail_url;
use crate::types::{GalleryInfo, ListingPage, LIST_THUMB_HEIGHT, LIST_THUMB_WIDTH};

/// Marker text the site renders for a search without results.
pub const NO_HITS_MARKER: &str = "No hits found</p>";

/// Second rating offset that marks a half star.
const HALF_STAR_OFFSET: u32 = 21;

/// Pixel height of one rating star sprite row.
const STAR_OFFSET_STEP: u32 = 16;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static SEL_STAT: LazyLock<Selector> = LazyLock::new(|| selector(".stat"));
static SEL_ITEM: LazyLock<Selector> = LazyLock::new(|| selector(".list"));
static SEL_CATEGORY: LazyLock<Selector> = LazyLock::new(|| selector(".cat"));
static SEL_POSTED: LazyLock<Selector> = LazyLock::new(|| selector(".info"));
static SEL_THUMB: LazyLock<Selector> = LazyLock::new(|| selector(".image-thumb"));
static SEL_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(".subject"));
static SEL_RATING: LazyLock<Selector> = LazyLock::new(|| selector(".it4r"));
static SEL_UPLOADER: LazyLock<Selector> = LazyLock::new(|| selector(".itu"));

static PAGES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)페이지").expect("pages pattern is valid"));
static RATING_OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)px").expect("rating pattern is valid"));
static THUMB_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"url\((.*)\)").expect("thumb pattern is valid"));
static LINK_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(.*)'").expect("link pattern is valid"));

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// Parse a listing page into its page count and item records.
///
/// # Errors
///
/// Returns [`ParseError::Structure`] when the page-count indicator is absent
/// and the body does not contain [`NO_HITS_MARKER`].
pub fn parse_gallery_list(body: &str) -> Result<ListingPage, ParseError> {
    let document = Html::parse_document(body);

    let Some(pages) = parse_pages(&document) else {
        if body.contains(NO_HITS_MARKER) {
            return Ok(ListingPage::empty());
        }
        error!("Can't parse gallery list pages");
        return Err(ParseError::structure("Can't parse gallery list pages", body));
    };

    let items = document
        .select(&SEL_ITEM)
        .filter_map(parse_gallery_info)
        .collect();

    Ok(ListingPage { pages, items })
}

fn parse_pages(document: &Html) -> Option<u32> {
    let stat = document.select(&SEL_STAT).next()?;
    let text = element_text(stat);
    PAGES.captures(&text)?[1].parse().ok()
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// How the absence of a field affects the enclosing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    /// Keep the default value and carry on.
    Optional,
    /// Drop the whole item.
    Mandatory,
}

/// One entry of the per-item extraction table.
///
/// `extract` writes into the record and returns `true` on success. On failure
/// it must leave the record's default untouched.
struct Field {
    name: &'static str,
    requirement: Requirement,
    extract: fn(ElementRef<'_>, &mut GalleryInfo) -> bool,
}

/// Extraction order is significant: cheap optional fields first, then the
/// identity fields, then the remaining optional fields.
const FIELDS: [Field; 7] = [
    Field {
        name: "category",
        requirement: Requirement::Optional,
        extract: extract_category,
    },
    Field {
        name: "posted",
        requirement: Requirement::Optional,
        extract: extract_posted,
    },
    Field {
        name: "thumb",
        requirement: Requirement::Optional,
        extract: extract_thumb,
    },
    Field {
        name: "title",
        requirement: Requirement::Mandatory,
        extract: extract_title,
    },
    Field {
        name: "link",
        requirement: Requirement::Mandatory,
        extract: extract_link,
    },
    Field {
        name: "rating",
        requirement: Requirement::Optional,
        extract: extract_rating,
    },
    Field {
        name: "uploader",
        requirement: Requirement::Optional,
        extract: extract_uploader,
    },
];

/// Decode one listing fragment, or `None` when an identity field is missing.
#[must_use]
pub fn parse_gallery_info(fragment: ElementRef<'_>) -> Option<GalleryInfo> {
    let mut info = GalleryInfo::default();

    for field in &FIELDS {
        if (field.extract)(fragment, &mut info) {
            continue;
        }
        match field.requirement {
            Requirement::Optional => {
                warn!(field = field.name, "Can't parse gallery info field, using default");
            }
            Requirement::Mandatory => {
                error!(field = field.name, "Can't parse gallery info field, dropping item");
                return None;
            }
        }
    }

    info.simple_language = simple_language(&info.title).map(str::to_string);
    Some(info)
}

fn extract_category(fragment: ElementRef<'_>, info: &mut GalleryInfo) -> bool {
    let Some(text) = child_text(fragment, &SEL_CATEGORY) else {
        return false;
    };
    if !text.is_empty() {
        info.category = text;
    }
    true
}

fn extract_posted(fragment: ElementRef<'_>, info: &mut GalleryInfo) -> bool {
    let Some(text) = child_text(fragment, &SEL_POSTED) else {
        return false;
    };
    info.posted = text;
    true
}

fn extract_thumb(fragment: ElementRef<'_>, info: &mut GalleryInfo) -> bool {
    let Some(thumb) = fragment.select(&SEL_THUMB).next() else {
        return false;
    };
    let style = thumb.value().attr("style").unwrap_or_default();
    let Some(caps) = THUMB_SRC.captures(style) else {
        return false;
    };
    info.thumb = caps[1].trim_matches(['\'', '"']).to_string();
    info.thumb_width = LIST_THUMB_WIDTH;
    info.thumb_height = LIST_THUMB_HEIGHT;
    true
}

/// The title element must be present; its text may be empty.
fn extract_title(fragment: ElementRef<'_>, info: &mut GalleryInfo) -> bool {
    match child_text(fragment, &SEL_TITLE) {
        Some(title) => {
            info.title = title;
            true
        }
        None => false,
    }
}

fn extract_link(fragment: ElementRef<'_>, info: &mut GalleryInfo) -> bool {
    let onclick = fragment.value().attr("onclick").unwrap_or_default();
    let Some(detail) = LINK_SRC
        .captures(onclick)
        .and_then(|caps| parse_detail_url(&caps[1]))
    else {
        return false;
    };
    info.gid = detail.gid;
    info.token = detail.token;
    true
}

fn extract_rating(fragment: ElementRef<'_>, info: &mut GalleryInfo) -> bool {
    let Some(rating) = fragment
        .select(&SEL_RATING)
        .next()
        .and_then(|el| parse_rating(el.value().attr("style").unwrap_or_default()))
    else {
        return false;
    };
    info.rating = rating;
    true
}

fn extract_uploader(fragment: ElementRef<'_>, info: &mut GalleryInfo) -> bool {
    let Some(text) = child_text(fragment, &SEL_UPLOADER) else {
        return false;
    };
    info.uploader = text;
    true
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode a star rating from the sprite offsets of an inline style.
///
/// Only the first two `NNpx` values count. The rating is `5 - first / 16`
/// using integer division, lowered by half a star when the second offset is
/// 21. Returns `None` when fewer than two offsets are present.
#[must_use]
pub fn parse_rating(style: &str) -> Option<f32> {
    let mut offsets = RATING_OFFSET
        .captures_iter(style)
        .map(|caps| caps[1].parse::<u32>().ok());
    let first = offsets.next()??;
    let second = offsets.next()??;

    let stars_lost = u16::try_from(first / STAR_OFFSET_STEP).ok()?;
    let whole = 5.0 - f32::from(stars_lost);
    if second == HALF_STAR_OFFSET {
        Some(whole - 0.5)
    } else {
        Some(whole)
    }
}

/// Whitespace-normalised text of the first descendant matching `selector`.
fn child_text(fragment: ElementRef<'_>, selector: &Selector) -> Option<String> {
    fragment.select(selector).next().map(element_text)
}

/// Text content of `element` with runs of whitespace collapsed to one space.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
