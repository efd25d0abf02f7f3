//! Page-level decode errors.

/// Maximum number of body characters kept on a [`ParseError::Structure`].
const BODY_EXCERPT_CHARS: usize = 512;

/// Errors raised when a document cannot be decoded into the expected shape.
///
/// Field-level anomalies never produce a `ParseError`; they are absorbed by the
/// per-field defaults. Only page-level structure problems escalate.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The document lacks a structural element the decoder requires.
    #[error("{context}")]
    Structure {
        context: &'static str,
        /// Leading excerpt of the offending body, for diagnostics.
        body: String,
    },
    /// The site answered with an explicit error message.
    #[error("site returned an error: {message}")]
    Remote { message: String },
    /// A JSON API response did not match the expected schema.
    #[error("malformed JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParseError {
    /// Build a structure error carrying an excerpt of `body`.
    #[must_use]
    pub fn structure(context: &'static str, body: &str) -> Self {
        Self::Structure {
            context,
            body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
        }
    }
}
