//! Tolerant markup decoders.
//!
//! - [`list`]: listing pages, with per-field defaults and item-level drops
//! - [`detail`]: gallery detail and large preview pages
//! - [`account`]: sign-in form response and rate API answer
//! - [`url`]: detail-link and archive-link sub-parsers
//! - [`language`]: language tag detection for titles

pub mod account;
pub mod detail;
pub mod error;
pub mod language;
pub mod list;
pub mod url;

pub use account::{parse_rate, parse_sign_in};
pub use detail::{parse_gallery_detail, parse_large_preview_set};
pub use error::ParseError;
pub use language::simple_language;
pub use list::{parse_gallery_info, parse_gallery_list, parse_rating, NO_HITS_MARKER};
pub use url::{parse_archive_url, parse_detail_url};
