//! Operation descriptors, responses and errors.

use std::fmt;

use gallery_core::{GalleryDetail, ListingPage, ParseError, PreviewSet, RateResult};

use crate::fetch::TransportError;

/// Identifier of a remote operation. Selects the registry handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    SignIn,
    GalleryList,
    GalleryDetail,
    LargePreviewSet,
    RateGallery,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::SignIn,
        Self::GalleryList,
        Self::GalleryDetail,
        Self::LargePreviewSet,
        Self::RateGallery,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::GalleryList => "gallery_list",
            Self::GalleryDetail => "gallery_detail",
            Self::LargePreviewSet => "large_preview_set",
            Self::RateGallery => "rate_gallery",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub struct SignInArgs {
    pub username: String,
    pub password: String,
}

// Keep the password out of logs and panic messages.
impl fmt::Debug for SignInArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInArgs")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Arguments of the page-fetching operations: the page URL, absolute or
/// relative to the configured site root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArgs {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateArgs {
    pub gid: u64,
    pub token: String,
    /// Star rating in `0.5..=5.0`, in half-star steps.
    pub rating: f32,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A remote operation with its typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    SignIn(SignInArgs),
    GalleryList(PageArgs),
    GalleryDetail(PageArgs),
    LargePreviewSet(PageArgs),
    RateGallery(RateArgs),
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::SignIn(_) => OperationKind::SignIn,
            Self::GalleryList(_) => OperationKind::GalleryList,
            Self::GalleryDetail(_) => OperationKind::GalleryDetail,
            Self::LargePreviewSet(_) => OperationKind::LargePreviewSet,
            Self::RateGallery(_) => OperationKind::RateGallery,
        }
    }

    #[must_use]
    pub fn sign_in(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::SignIn(SignInArgs {
            username: username.into(),
            password: password.into(),
        })
    }

    #[must_use]
    pub fn gallery_list(url: impl Into<String>) -> Self {
        Self::GalleryList(PageArgs { url: url.into() })
    }

    #[must_use]
    pub fn gallery_detail(url: impl Into<String>) -> Self {
        Self::GalleryDetail(PageArgs { url: url.into() })
    }

    #[must_use]
    pub fn large_preview_set(url: impl Into<String>) -> Self {
        Self::LargePreviewSet(PageArgs { url: url.into() })
    }

    #[must_use]
    pub fn rate_gallery(gid: u64, token: impl Into<String>, rating: f32) -> Self {
        Self::RateGallery(RateArgs {
            gid,
            token: token.into(),
            rating,
        })
    }
}

// ---------------------------------------------------------------------------
// Response / errors
// ---------------------------------------------------------------------------

/// Successful payload delivered to `Callback::on_success`.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResponse {
    SignedIn { username: String },
    GalleryList(ListingPage),
    GalleryDetail(GalleryDetail),
    LargePreviewSet(PreviewSet),
    Rated(RateResult),
}

/// Failures delivered to `Callback::on_failure`. Cancellation is not an error
/// and never appears here.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("invalid arguments for {kind}: {reason}")]
    Argument { kind: OperationKind, reason: String },
    #[error("no handler registered for {kind}")]
    UnknownOperation { kind: OperationKind },
    #[error("handler for {handler} cannot serve {kind}")]
    WrongHandler {
        handler: OperationKind,
        kind: OperationKind,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Structure(#[from] ParseError),
    /// A handler panicked while the operation was running.
    #[error("{kind} panicked: {message}")]
    Panicked { kind: OperationKind, message: String },
    #[error("dispatcher is shut down")]
    ShutDown,
}
