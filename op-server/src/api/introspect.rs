//! Token introspection (RFC 7662).
//!
//! Tokens that cannot be resolved, for any reason, answer `{"active": false}`
//! with status 200; details never leak to the caller.

use super::token::authenticate_client;
use crate::errors::OpError;
use crate::models::{join_scopes, Audience, IntrospectionParams, IntrospectionResponse, StoredToken};
use crate::openapi::TOKEN_TAG;
use crate::provider::Provider;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Form, Router};
use http::HeaderMap;

/// Resolve an access token of either format to its stored record.
///
/// Opaque tokens are the sealed `{id}:{subject}` form and are tried first;
/// anything else is treated as a signed JWT whose `jti` must still exist in
/// storage, so revoked tokens stay dead even while their signature holds.
pub(crate) async fn resolve_access_token(
    provider: &Provider,
    token: &str,
) -> Option<StoredToken> {
    if let Ok(plaintext) = provider.cipher().decrypt(token) {
        let (token_id, subject) = plaintext.split_once(':')?;
        let stored = provider.storage().token_by_id(token_id).await.ok()?;
        if stored.subject != subject || stored.is_expired() {
            return None;
        }
        return Some(stored);
    }

    let claims = provider.access_token_verifier().verify(token).await.ok()?;
    let stored = provider.storage().token_by_id(&claims.jti).await.ok()?;
    if stored.subject != claims.sub || stored.is_expired() {
        return None;
    }
    Some(stored)
}

#[utoipa::path(
    post,
    path = "/oauth/introspect",
    tag = TOKEN_TAG,
    request_body(content = IntrospectionParams, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Introspection result, inactive for unresolvable tokens", body = IntrospectionResponse),
        (status = 401, description = "Caller authentication failed", body = OpError)
    )
)]
async fn introspect(
    State(provider): State<Provider>,
    headers: HeaderMap,
    form: Result<Form<IntrospectionParams>, FormRejection>,
) -> Result<IntrospectionResponse, OpError> {
    let Form(params) =
        form.map_err(|rejection| OpError::invalid_request(&rejection.to_string()))?;
    authenticate_client(
        &provider,
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;

    let Some(token) = params.token.as_deref() else {
        return Err(OpError::invalid_request("token is required"));
    };
    let Some(stored) = resolve_access_token(&provider, token).await else {
        return Ok(IntrospectionResponse::inactive());
    };

    Ok(IntrospectionResponse {
        active: true,
        scope: join_scopes(&stored.scopes),
        client_id: stored.client_id,
        sub: Some(stored.subject),
        aud: Some(Audience::from(stored.audience)),
        iss: Some(provider.issuer().to_string()),
        exp: Some(stored.expires_at.timestamp()),
        iat: Some(stored.issued_at.timestamp()),
    })
}

pub(crate) fn router(provider: &Provider) -> Router<Provider> {
    let introspection_path = provider.endpoints().introspection.path().to_string();
    Router::new().route(&introspection_path, post(introspect))
}
