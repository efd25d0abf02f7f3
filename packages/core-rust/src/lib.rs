//! Gallery Core — decoded records and tolerant parsers for listing, detail,
//! preview, sign-in and rate documents.

pub mod parser;
pub mod types;

pub use parser::ParseError;
pub use types::{
    ArchiveInfo, DetailUrl, GalleryDetail, GalleryInfo, LargePreview, ListingPage, PreviewSet,
    RateResult, NO_RATING, UNKNOWN_CATEGORY,
};
