use crate::headers::presets;
use crate::signer::SignerError;
use crate::verifier::VerifyError;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

/// OAuth 2.0 / OIDC protocol error body (RFC 6749 §5.2).
///
/// Every terminal error on a protocol endpoint is served as this JSON shape
/// with the status code conventional for the error kind.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OpError {
    /// Protocol error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// HTTP status the error is served with
    #[serde(skip)]
    pub status_code: StatusCode,
}

impl OpError {
    /// Create a new OpError with an error code, description and status code
    pub fn new(error: &str, description: &str, status_code: StatusCode) -> Self {
        Self {
            error: error.to_string(),
            error_description: Some(description.to_string()),
            status_code,
        }
    }

    /// Create an invalid_request error (400)
    pub fn invalid_request(description: &str) -> Self {
        Self::new("invalid_request", description, StatusCode::BAD_REQUEST)
    }

    /// Create an invalid_grant error (400)
    pub fn invalid_grant(description: &str) -> Self {
        Self::new("invalid_grant", description, StatusCode::BAD_REQUEST)
    }

    /// Create an invalid_client error (401)
    pub fn invalid_client(description: &str) -> Self {
        Self::new("invalid_client", description, StatusCode::UNAUTHORIZED)
    }

    /// Create an invalid_token error for bearer-authenticated endpoints (401)
    pub fn invalid_token(description: &str) -> Self {
        Self::new("invalid_token", description, StatusCode::UNAUTHORIZED)
    }

    /// Create an unauthorized_client error (403)
    pub fn unauthorized_client(description: &str) -> Self {
        Self::new("unauthorized_client", description, StatusCode::FORBIDDEN)
    }

    /// Create an unsupported_grant_type error (400)
    pub fn unsupported_grant_type() -> Self {
        Self::new(
            "unsupported_grant_type",
            "Supported grant types: authorization_code, urn:ietf:params:oauth:grant-type:jwt-bearer",
            StatusCode::BAD_REQUEST,
        )
    }

    /// Create a server_error (500)
    pub fn server_error(description: &str) -> Self {
        Self::new("server_error", description, StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<VerifyError> for OpError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::KeyFetch(_) => Self::server_error("Verification keys are unavailable"),
            other => Self::invalid_grant(&other.to_string()),
        }
    }
}

impl From<SignerError> for OpError {
    fn from(err: SignerError) -> Self {
        Self::server_error(&err.to_string())
    }
}

impl IntoResponse for OpError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let mut response = (status_code, Json(self)).into_response();
        // Error bodies of the token endpoint must not be cached either
        presets::no_store().apply(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            OpError::invalid_request("x").status_code,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OpError::invalid_client("x").status_code,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            OpError::unauthorized_client("x").status_code,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            OpError::server_error("x").status_code,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_serialization_skips_status() {
        let err = OpError::invalid_grant("assertion has expired");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "invalid_grant");
        assert_eq!(json["error_description"], "assertion has expired");
        assert!(json.get("status_code").is_none());
    }
}
