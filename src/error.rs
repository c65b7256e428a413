//! Ingestion error taxonomy.
//!
//! [`IngestError`] is the central error type of the ingestion pipeline.
//! Hardware clients never see these errors: the HTTP layer always
//! acknowledges with `{"status":"Ok"}`, and every variant is reported
//! through structured logs instead, keyed by [`IngestError::error_code`].

/// Errors raised while decoding, authenticating or persisting a hub request.
///
/// # Error Code Ranges
///
/// | Range     | Category          |
/// |-----------|-------------------|
/// | 1000–1999 | Wire format       |
/// | 2000–2999 | Routing / Identity |
/// | 3000–3999 | Persistence       |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// Parameter name is not of the form `f<digits>`.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// Request target does not carry a well-formed credential or payload.
    #[error("invalid request shape: {0}")]
    InvalidRequestShape(String),

    /// A payload token is not a single non-empty `key=value` pair.
    #[error("invalid pair: {0}")]
    InvalidPair(String),

    /// Request path does not name a known ingestion route.
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    /// Pairs are well-formed but do not decode under the route's rules.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// The credential pair (or a local id) resolves to no persistent identity.
    #[error("no identity match: {0}")]
    NoIdentityMatch(String),

    /// Storage backend failure.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl IngestError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequestShape(_) => 1001,
            Self::InvalidPair(_) => 1002,
            Self::MalformedKey(_) => 1003,
            Self::ParseFailure(_) => 1004,
            Self::UnknownRoute(_) => 2001,
            Self::NoIdentityMatch(_) => 2002,
            Self::PersistenceFailure(_) => 3001,
        }
    }

    /// Returns a stable, snake-case name for the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedKey(_) => "malformed_key",
            Self::InvalidRequestShape(_) => "invalid_request_shape",
            Self::InvalidPair(_) => "invalid_pair",
            Self::UnknownRoute(_) => "unknown_route",
            Self::ParseFailure(_) => "parse_failure",
            Self::NoIdentityMatch(_) => "no_identity_match",
            Self::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        assert_eq!(IngestError::MalformedKey("x".into()).error_code() / 1000, 1);
        assert_eq!(IngestError::UnknownRoute("/v2".into()).error_code() / 1000, 2);
        assert_eq!(
            IngestError::PersistenceFailure("down".into()).error_code() / 1000,
            3
        );
    }

    #[test]
    fn display_includes_context() {
        let err = IngestError::InvalidPair("f100".to_string());
        assert_eq!(err.to_string(), "invalid pair: f100");
        assert_eq!(err.kind(), "invalid_pair");
    }
}
