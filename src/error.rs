//! Error taxonomy for sign-in attempts and the HTTP surface.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Failures reported by (or on behalf of) a signer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("signer unavailable: {0}")]
    Unavailable(String),

    #[error("sign-in request declined by signer")]
    Declined,

    /// The signer answered with something structurally unusable.
    #[error("signer protocol error: {0}")]
    Protocol(String),

    #[error("signer did not respond within {0:?}")]
    Timeout(Duration),

    #[error("sign-in attempt cancelled")]
    Cancelled,
}

/// Response could not be checked at all, as opposed to checked and rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed public key")]
    MalformedPublicKey,

    #[error("malformed signature")]
    MalformedSignature,
}

/// Terminal failure of one sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("sign-in verification failed")]
    VerificationFailed,

    #[error("sign-in response could not be verified: {0}")]
    Malformed(#[from] VerifyError),

    #[error("could not build challenge: {0}")]
    Challenge(#[from] ChallengeError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("domain is required")]
    MissingDomain,

    #[error("{0} must not contain a line break")]
    LineBreak(&'static str),

    #[error("expiration time is out of range")]
    ExpirationOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid/unknown nonce")]
    UnknownNonce,

    #[error("expired nonce")]
    Expired,

    #[error("challenge has no nonce")]
    MissingNonce,

    #[error("challenge expiry is out of range")]
    ExpiryOutOfRange,

    #[error("too many pending challenges")]
    Full,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing/invalid {0}")]
    BadRequest(String),

    #[error(transparent)]
    Challenge(#[from] StoreError),

    #[error("challenge does not match the issued one")]
    ChallengeMismatch,

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Logged in full, reported to the client as "internal".
    #[error("internal")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Challenge(StoreError::UnknownNonce) => "unknown_nonce",
            ApiError::Challenge(StoreError::Expired) => "expired_nonce",
            ApiError::Challenge(StoreError::Full) => "challenge_capacity",
            ApiError::Challenge(StoreError::MissingNonce | StoreError::ExpiryOutOfRange) => "internal",
            ApiError::ChallengeMismatch => "challenge_mismatch",
            ApiError::Auth(AuthError::VerificationFailed) => "verification_failed",
            ApiError::Auth(AuthError::Malformed(_)) => "malformed_response",
            ApiError::Auth(AuthError::Challenge(_)) => "bad_challenge",
            ApiError::Auth(AuthError::Signer(SignerError::Unavailable(_))) => "signer_unavailable",
            ApiError::Auth(AuthError::Signer(SignerError::Declined)) => "signer_declined",
            ApiError::Auth(AuthError::Signer(SignerError::Protocol(_))) => "signer_protocol",
            ApiError::Auth(AuthError::Signer(SignerError::Timeout(_))) => "signer_timeout",
            ApiError::Auth(AuthError::Signer(SignerError::Cancelled)) => "cancelled",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::Challenge(StoreError::UnknownNonce | StoreError::Expired)
            | ApiError::ChallengeMismatch
            | ApiError::Auth(AuthError::Malformed(_)) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::VerificationFailed) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::Signer(SignerError::Unavailable(_))) => StatusCode::CONFLICT,
            ApiError::Auth(AuthError::Signer(SignerError::Declined)) => StatusCode::FORBIDDEN,
            ApiError::Auth(AuthError::Signer(SignerError::Timeout(_))) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Auth(AuthError::Signer(SignerError::Cancelled))
            | ApiError::Challenge(StoreError::Full) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Auth(AuthError::Signer(SignerError::Protocol(_))) => StatusCode::BAD_GATEWAY,
            ApiError::Auth(AuthError::Challenge(_))
            | ApiError::Challenge(StoreError::MissingNonce | StoreError::ExpiryOutOfRange)
            | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub fn bad<E: std::fmt::Display>(what: &str) -> impl FnOnce(E) -> ApiError + '_ {
    move |e| ApiError::BadRequest(format!("{what}: {e}"))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!("{e:#}");
        }
        let status = self.status_code();
        let body = Json(ApiErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn verification_failure_is_unauthorized() {
        let response = ApiError::Auth(AuthError::VerificationFailed).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error_code"], "verification_failed");
    }

    #[tokio::test]
    async fn expired_nonce_is_bad_request() {
        let response = ApiError::from(StoreError::Expired).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn full_store_is_unavailable() {
        let err = ApiError::from(StoreError::Full);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "challenge_capacity");
    }

    #[test]
    fn bad_helper_names_the_field() {
        let err = bad::<&str>("signature_b64")("invalid length");
        assert_eq!(err.to_string(), "missing/invalid signature_b64: invalid length");
    }
}
