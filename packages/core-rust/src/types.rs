//! Decoded domain records handed to callers on the success path.
//!
//! Every record is built fresh per parse call and is immutable once returned.
//! Optional fields carry documented defaults instead of `Option`, so consumers
//! can render a partially-parsed listing without special-casing.

use serde::{Deserialize, Serialize};

/// Category assigned when the listing fragment carries no category element.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Rating assigned when the rating style cannot be decoded ("no rating").
pub const NO_RATING: f32 = -1.0;

/// Declared thumbnail width for listing thumbnails, in pixels.
pub const LIST_THUMB_WIDTH: u32 = 150;

/// Declared thumbnail height for listing thumbnails, in pixels.
pub const LIST_THUMB_HEIGHT: u32 = 240;

/// One entry of a listing page.
///
/// `title`, `gid` and `token` are the identity fields: a fragment lacking any
/// of them never becomes a `GalleryInfo`. Everything else falls back to the
/// defaults produced by [`GalleryInfo::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryInfo {
    /// Numeric gallery identifier.
    pub gid: u64,
    /// Access token paired with `gid`.
    pub token: String,
    /// Display title.
    pub title: String,
    /// Category label, [`UNKNOWN_CATEGORY`] when absent.
    pub category: String,
    /// Posted-date text exactly as rendered by the site.
    pub posted: String,
    /// Thumbnail URL, empty when absent.
    pub thumb: String,
    /// Declared thumbnail width, 0 when the thumbnail is absent.
    pub thumb_width: u32,
    /// Declared thumbnail height, 0 when the thumbnail is absent.
    pub thumb_height: u32,
    /// Rating in `0.0..=5.0`, or [`NO_RATING`].
    pub rating: f32,
    /// Uploader name, empty when absent.
    pub uploader: String,
    /// Short language code derived from the title tags (`"EN"`, `"ZH"`, ...).
    pub simple_language: Option<String>,
}

impl Default for GalleryInfo {
    fn default() -> Self {
        Self {
            gid: 0,
            token: String::new(),
            title: String::new(),
            category: UNKNOWN_CATEGORY.to_string(),
            posted: String::new(),
            thumb: String::new(),
            thumb_width: 0,
            thumb_height: 0,
            rating: NO_RATING,
            uploader: String::new(),
            simple_language: None,
        }
    }
}

impl GalleryInfo {
    /// Returns `true` when the rating was decoded from the page.
    #[must_use]
    pub fn has_rating(&self) -> bool {
        self.rating >= 0.0
    }
}

/// Result of parsing one listing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingPage {
    /// Total number of pages the listing spans. 0 for an empty result set.
    pub pages: u32,
    /// Items in document order. Fragments missing identity fields are absent.
    pub items: Vec<GalleryInfo>,
}

impl ListingPage {
    /// The page returned for a search with no hits.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Identity decoded from a gallery detail link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetailUrl {
    pub gid: u64,
    pub token: String,
}

/// A downloadable archive linked from a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Archive identifier taken from the `/archives/<id>` path.
    pub uid: String,
    /// Link text.
    pub title: String,
    /// Whether the site marks the archive as already visited.
    pub visited: bool,
}

/// Decoded gallery detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryDetail {
    pub title: String,
    pub thumb: String,
    pub uploader: String,
    pub posted: String,
    pub archives: Vec<ArchiveInfo>,
}

/// One large preview tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargePreview {
    /// Zero-based page index within the gallery.
    pub index: u32,
    pub image_url: String,
    /// URL of the reader page this preview links to.
    pub page_url: String,
}

/// Decoded large preview page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSet {
    pub previews: Vec<LargePreview>,
}

/// Rating state returned by the site after a rate call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateResult {
    /// New average rating.
    pub rating: f32,
    /// Number of ratings the average is built from.
    pub rating_count: u32,
}
