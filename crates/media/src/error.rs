//! Errors raised while resolving, probing, fetching and decoding media.

/// Failure anywhere between a source reference and a decoded texture
///
/// Cloneable so one failed decode can be handed to every requester waiting on
/// it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("invalid media url '{0}'")]
    InvalidUrl(String),
    #[error("failed to resolve {url}: {reason}")]
    Resolution { url: String, reason: String },
    #[error("could not determine content type of {0}")]
    ContentTypeUnknown(String),
    #[error("unsupported media type '{0}'")]
    UnsupportedMediaType(String),
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl MediaError {
    pub(crate) fn fetch(url: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(url: &str, reason: impl ToString) -> Self {
        Self::Decode {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn resolution(url: &str, reason: impl ToString) -> Self {
        Self::Resolution {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
