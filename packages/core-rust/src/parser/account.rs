//! Lightweight decoders for the sign-in form response and the rate API.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::error::ParseError;
use crate::types::RateResult;

static SIGNED_IN_AS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"You are now logged in as: (.+?)<").expect("sign-in pattern is valid")
});

static SIGN_IN_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)The error returned was:</h4>\s*<p>(.+?)</p>")
        .expect("sign-in error pattern is valid")
});

/// Decode the sign-in response into the signed-in user name.
///
/// # Errors
///
/// Returns [`ParseError::Remote`] with the site's message when the site
/// rejected the credentials, and [`ParseError::Structure`] when the body has
/// neither a success nor an error marker.
pub fn parse_sign_in(body: &str) -> Result<String, ParseError> {
    if let Some(caps) = SIGNED_IN_AS.captures(body) {
        return Ok(caps[1].trim().to_string());
    }
    if let Some(caps) = SIGN_IN_ERROR.captures(body) {
        return Err(ParseError::Remote {
            message: caps[1].trim().to_string(),
        });
    }
    Err(ParseError::structure("Can't parse sign in", body))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RateResponse {
    Rated { rating_avg: f32, rating_cnt: u32 },
    Failed { error: String },
}

/// Decode the JSON answer of the rate API.
///
/// # Errors
///
/// Returns [`ParseError::Remote`] when the API reports an error and
/// [`ParseError::Json`] when the body matches neither response shape.
pub fn parse_rate(body: &str) -> Result<RateResult, ParseError> {
    match serde_json::from_str::<RateResponse>(body)? {
        RateResponse::Rated {
            rating_avg,
            rating_cnt,
        } => Ok(RateResult {
            rating: rating_avg,
            rating_count: rating_cnt,
        }),
        RateResponse::Failed { error } => Err(ParseError::Remote { message: error }),
    }
}
