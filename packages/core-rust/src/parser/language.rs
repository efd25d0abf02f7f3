//! Simple language detection from bracketed title tags.

use std::sync::LazyLock;

use regex::Regex;

static BRACKET_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\[(]([^\[\]()]+)[\])]").expect("bracket tag pattern is valid")
});

/// Language names recognised inside title tags, with their short codes.
const LANGUAGES: &[(&str, &str)] = &[
    ("english", "EN"),
    ("eng", "EN"),
    ("chinese", "ZH"),
    ("中国翻訳", "ZH"),
    ("spanish", "ES"),
    ("korean", "KO"),
    ("한국어", "KO"),
    ("russian", "RU"),
    ("french", "FR"),
    ("portuguese", "PT"),
    ("thai", "TH"),
    ("german", "DE"),
    ("italian", "IT"),
    ("vietnamese", "VI"),
    ("polish", "PL"),
    ("hungarian", "HU"),
    ("dutch", "NL"),
];

/// Derive a short language code from tags such as `[English]` or
/// `(Korean Translated)` in a gallery title.
///
/// The first tag whose leading word names a known language wins.
#[must_use]
pub fn simple_language(title: &str) -> Option<&'static str> {
    BRACKET_TAG.captures_iter(title).find_map(|caps| {
        let tag = caps[1].trim().to_lowercase();
        let word = tag.split_whitespace().next()?;
        LANGUAGES
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, code)| *code)
    })
}
