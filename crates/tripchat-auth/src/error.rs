use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    Signature,
    #[error("invalid token claims: {0}")]
    InvalidClaims(String),
    #[error("token authority misconfigured: {0}")]
    Misconfigured(String),
    #[error("secret generation failed: {0}")]
    Entropy(String),
    #[error("failed to persist rotated secret: {0}")]
    Persist(String),
}

impl TokenError {
    /// Errors that mean the presented token is unusable, as opposed to a
    /// fault in the authority itself.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::Malformed | Self::Signature | Self::InvalidClaims(_)
        )
    }
}

pub(crate) fn from_jwt(err: &jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::Signature,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::MissingAlgorithm => TokenError::Malformed,
        ErrorKind::Json(e) => TokenError::InvalidClaims(e.to_string()),
        ErrorKind::MissingRequiredClaim(claim) => {
            TokenError::InvalidClaims(format!("missing claim '{claim}'"))
        }
        ErrorKind::ImmatureSignature => TokenError::InvalidClaims("token not yet valid".into()),
        ErrorKind::InvalidIssuer => TokenError::InvalidClaims("unexpected issuer".into()),
        _ => TokenError::InvalidClaims(err.to_string()),
    }
}
