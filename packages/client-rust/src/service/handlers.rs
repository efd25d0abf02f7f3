//! Registry handlers, one per operation kind.
//!
//! The page-fetching kinds share the same request shape (a GET of a site
//! URL) and differ only in the parser used to decode the body, so they are
//! generated by `page_handler!`. Sign-in and rate carry their own argument
//! validation.

use std::sync::Arc;

use gallery_core::parser::{
    parse_gallery_detail, parse_gallery_list, parse_large_preview_set, parse_rate, parse_sign_in,
};
use serde_json::json;

use super::operation::{
    Operation, OperationError, OperationKind, OperationResponse, PageArgs, RateArgs,
};
use super::registry::OperationHandler;
use crate::config::SiteConfig;
use crate::fetch::FetchRequest;

fn wrong_handler(handler: OperationKind, op: &Operation) -> OperationError {
    OperationError::WrongHandler {
        handler,
        kind: op.kind(),
    }
}

fn invalid(kind: OperationKind, reason: impl Into<String>) -> OperationError {
    OperationError::Argument {
        kind,
        reason: reason.into(),
    }
}

fn page_request(
    site: &SiteConfig,
    kind: OperationKind,
    args: &PageArgs,
) -> Result<FetchRequest, OperationError> {
    let url = args.url.trim();
    if url.is_empty() {
        return Err(invalid(kind, "url must not be empty"));
    }
    Ok(FetchRequest::get(site.resolve(url)))
}

// ---------------------------------------------------------------------------
// Page handlers
// ---------------------------------------------------------------------------

/// Generate a handler that GETs a page URL and decodes it with `$parse`.
macro_rules! page_handler {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:ident, $parse:path, $response:ident
    ) => {
        $(#[$meta])*
        pub struct $name {
            site: Arc<SiteConfig>,
        }

        impl $name {
            #[must_use]
            pub fn new(site: Arc<SiteConfig>) -> Self {
                Self { site }
            }
        }

        impl OperationHandler for $name {
            fn kind(&self) -> OperationKind {
                OperationKind::$kind
            }

            fn prepare(&self, op: &Operation) -> Result<FetchRequest, OperationError> {
                let Operation::$kind(args) = op else {
                    return Err(wrong_handler(self.kind(), op));
                };
                page_request(&self.site, self.kind(), args)
            }

            fn decode(&self, body: &str) -> Result<OperationResponse, OperationError> {
                Ok(OperationResponse::$response($parse(body)?))
            }
        }
    };
}

page_handler!(
    /// Fetches and decodes a listing page.
    GalleryListHandler, GalleryList, parse_gallery_list, GalleryList
);

page_handler!(
    /// Fetches and decodes a gallery detail page.
    GalleryDetailHandler, GalleryDetail, parse_gallery_detail, GalleryDetail
);

page_handler!(
    /// Fetches and decodes the large preview tiles of a detail page.
    LargePreviewSetHandler, LargePreviewSet, parse_large_preview_set, LargePreviewSet
);

// ---------------------------------------------------------------------------
// SignInHandler
// ---------------------------------------------------------------------------

/// Posts the sign-in form and extracts the signed-in user name.
pub struct SignInHandler {
    site: Arc<SiteConfig>,
}

impl SignInHandler {
    #[must_use]
    pub fn new(site: Arc<SiteConfig>) -> Self {
        Self { site }
    }
}

impl OperationHandler for SignInHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::SignIn
    }

    fn prepare(&self, op: &Operation) -> Result<FetchRequest, OperationError> {
        let Operation::SignIn(args) = op else {
            return Err(wrong_handler(self.kind(), op));
        };
        if args.username.is_empty() {
            return Err(invalid(self.kind(), "username must not be empty"));
        }
        if args.password.is_empty() {
            return Err(invalid(self.kind(), "password must not be empty"));
        }

        let fields = [
            ("CookieDate", "1"),
            ("b", "d"),
            ("bt", "1-1"),
            ("UserName", args.username.as_str()),
            ("PassWord", args.password.as_str()),
            ("ipb_login_submit", "Login!"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Ok(FetchRequest::post_form(self.site.sign_in_url.clone(), fields))
    }

    fn decode(&self, body: &str) -> Result<OperationResponse, OperationError> {
        Ok(OperationResponse::SignedIn {
            username: parse_sign_in(body)?,
        })
    }
}

// ---------------------------------------------------------------------------
// RateGalleryHandler
// ---------------------------------------------------------------------------

/// Posts a rating to the JSON API and returns the new average.
pub struct RateGalleryHandler {
    site: Arc<SiteConfig>,
}

impl RateGalleryHandler {
    #[must_use]
    pub fn new(site: Arc<SiteConfig>) -> Self {
        Self { site }
    }

    /// Validate the rating and convert it to the API's half-star units.
    fn half_stars(&self, args: &RateArgs) -> Result<u8, OperationError> {
        let rating = args.rating;
        if !rating.is_finite() || !(0.5..=5.0).contains(&rating) {
            return Err(invalid(self.kind(), format!("rating {rating} is out of range")));
        }
        let doubled = rating * 2.0;
        if doubled.fract() != 0.0 {
            return Err(invalid(self.kind(), format!("rating {rating} is not a half-star step")));
        }
        // 1..=10 after the checks above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(doubled as u8)
    }
}

impl OperationHandler for RateGalleryHandler {
    fn kind(&self) -> OperationKind {
        OperationKind::RateGallery
    }

    fn prepare(&self, op: &Operation) -> Result<FetchRequest, OperationError> {
        let Operation::RateGallery(args) = op else {
            return Err(wrong_handler(self.kind(), op));
        };
        if args.token.is_empty() {
            return Err(invalid(self.kind(), "token must not be empty"));
        }
        let rating = self.half_stars(args)?;

        let body = json!({
            "method": "rategallery",
            "gid": args.gid,
            "token": args.token,
            "rating": rating,
        });
        Ok(FetchRequest::post_json(self.site.api_url.clone(), body))
    }

    fn decode(&self, body: &str) -> Result<OperationResponse, OperationError> {
        Ok(OperationResponse::Rated(parse_rate(body)?))
    }
}
