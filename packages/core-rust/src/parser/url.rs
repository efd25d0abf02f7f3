//! URL-shape sub-parsers.
//!
//! Both parsers search anywhere in the input, so they accept absolute URLs,
//! site-relative paths and inline handler payloads alike. Neither fails: a
//! non-matching input yields `None`.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::DetailUrl;

static DETAIL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:g|mpv)/(\d+)/([0-9a-f]{10})").expect("detail url pattern is valid")
});

static ARCHIVE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/archives/(.+)").expect("archive url pattern is valid"));

/// Extract `gid` and `token` from a gallery detail link such as
/// `https://site/g/618395/0439fa3666/`.
#[must_use]
pub fn parse_detail_url(url: &str) -> Option<DetailUrl> {
    let caps = DETAIL_URL.captures(url)?;
    let gid = caps[1].parse::<u64>().ok()?;
    Some(DetailUrl {
        gid,
        token: caps[2].to_string(),
    })
}

/// Extract the archive id from a path of the shape `/archives/<id>`.
///
/// Returns everything after the `/archives/` segment, e.g.
/// `http://host/archives/IE3Q3_TFzaE` yields `IE3Q3_TFzaE`.
#[must_use]
pub fn parse_archive_url(url: &str) -> Option<String> {
    ARCHIVE_URL.captures(url).map(|caps| caps[1].to_string())
}
