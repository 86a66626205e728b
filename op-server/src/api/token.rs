//! Token endpoint: authorization-code redemption and the JWT bearer grant
//! (RFC 6749 §4.1.3, RFC 7523 §2.1).

use crate::errors::OpError;
use crate::models::{
    join_scopes, parse_scopes, AccessTokenClaims, AccessTokenFormat, AccessTokenResponse,
    Audience, Client, IdTokenClaims, TokenParams, TokenRequest, GRANT_TYPE_JWT_BEARER,
};
use crate::openapi::TOKEN_TAG;
use crate::provider::Provider;
use crate::storage::StorageError;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Form, Router};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use log::debug;
use sha2::{Digest, Sha256};

const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
pub(crate) const TOKEN_TYPE_BEARER: &str = "bearer";

#[utoipa::path(
    post,
    path = "/oauth/token",
    tag = TOKEN_TAG,
    request_body(content = TokenParams, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = AccessTokenResponse),
        (status = 400, description = "Malformed or unredeemable request", body = OpError),
        (status = 401, description = "Client authentication failed", body = OpError),
        (status = 403, description = "None of the requested scopes are granted", body = OpError)
    )
)]
async fn token(
    State(provider): State<Provider>,
    headers: HeaderMap,
    form: Result<Form<TokenParams>, FormRejection>,
) -> Result<AccessTokenResponse, OpError> {
    let Form(params) =
        form.map_err(|rejection| OpError::invalid_request(&rejection.to_string()))?;
    let Some(grant_type) = params.grant_type.as_deref() else {
        return Err(OpError::invalid_request("grant_type is required"));
    };

    match grant_type {
        GRANT_TYPE_AUTHORIZATION_CODE => {
            exchange_authorization_code(&provider, &headers, &params).await
        }
        GRANT_TYPE_JWT_BEARER => exchange_jwt_profile(&provider, &params).await,
        _ => Err(OpError::unsupported_grant_type()),
    }
}

/// Resolve the calling client: HTTP Basic credentials take precedence over
/// form credentials, and a bare `client_id` only passes for public clients.
pub(crate) async fn authenticate_client(
    provider: &Provider,
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<Client, OpError> {
    let storage = provider.storage();
    if let Some((client_id, client_secret)) = basic_credentials(headers) {
        return storage
            .authenticate_client(&client_id, &client_secret)
            .await
            .map_err(|_| OpError::invalid_client("client authentication failed"));
    }

    match (form_client_id, form_client_secret) {
        (Some(client_id), Some(client_secret)) => storage
            .authenticate_client(client_id, client_secret)
            .await
            .map_err(|_| OpError::invalid_client("client authentication failed")),
        (Some(client_id), None) => {
            let client = storage
                .client_by_id(client_id)
                .await
                .map_err(|_| OpError::invalid_client("client authentication failed"))?;
            if client.is_public() {
                Ok(client)
            } else {
                Err(OpError::invalid_client(
                    "confidential clients must send their secret",
                ))
            }
        }
        _ => Err(OpError::invalid_client("client credentials are missing")),
    }
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    Some((client_id.to_string(), client_secret.to_string()))
}

fn storage_error(err: StorageError) -> OpError {
    match err {
        StorageError::ScopesRefused(_) => OpError::unauthorized_client(&err.to_string()),
        StorageError::NotFound(_) => OpError::invalid_grant(&err.to_string()),
        StorageError::BadCredentials => OpError::invalid_client(&err.to_string()),
        StorageError::Unavailable(_) => OpError::server_error(&err.to_string()),
    }
}

/// `at_hash` for the ID token: base64url of the left half of the SHA-256
/// digest of the access token (OIDC Core §3.1.3.6, for RS256).
fn at_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

async fn exchange_authorization_code(
    provider: &Provider,
    headers: &HeaderMap,
    params: &TokenParams,
) -> Result<AccessTokenResponse, OpError> {
    let client = authenticate_client(
        provider,
        headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;
    let Some(code) = params.code.as_deref() else {
        return Err(OpError::invalid_request("code is required"));
    };

    let storage = provider.storage();
    let request_id = provider
        .cipher()
        .decrypt(code)
        .map_err(|_| OpError::invalid_grant("the authorization code is not valid"))?;
    let request = storage
        .auth_request_by_code(code)
        .await
        .map_err(|_| OpError::invalid_grant("the authorization code is not valid"))?;
    if request.id != request_id {
        return Err(OpError::invalid_grant("the authorization code is not valid"));
    }
    if request.client_id != client.id {
        return Err(OpError::invalid_grant(
            "the authorization code was issued to another client",
        ));
    }
    match params.redirect_uri.as_deref() {
        Some(redirect_uri) if redirect_uri == request.redirect_uri => {}
        _ => {
            return Err(OpError::invalid_grant(
                "redirect_uri does not match the authorization request",
            ))
        }
    }
    match (&request.code_challenge, params.code_verifier.as_deref()) {
        (Some(challenge), Some(verifier)) => {
            if !challenge.verify(verifier) {
                return Err(OpError::invalid_grant("the code verifier does not match"));
            }
        }
        (Some(_), None) => return Err(OpError::invalid_grant("a code verifier is required")),
        (None, _) => {}
    }
    let subject = request
        .subject
        .as_deref()
        .filter(|_| request.done)
        .ok_or_else(|| OpError::invalid_grant("the authorization request is not finished"))?;

    let token_request = TokenRequest {
        subject: subject.to_string(),
        issuer: client.id.clone(),
        audience: vec![client.id.clone()],
        scopes: request.scopes.clone(),
    };
    let (token_id, expires_at) = storage
        .create_access_token(&token_request)
        .await
        .map_err(storage_error)?;
    let now = Utc::now();

    let access_token = match client.access_token_format {
        AccessTokenFormat::Opaque => provider
            .cipher()
            .encrypt(&format!("{token_id}:{subject}"))
            .map_err(|_| OpError::server_error("the access token could not be issued"))?,
        AccessTokenFormat::Jwt => {
            let claims = AccessTokenClaims {
                iss: provider.issuer().to_string(),
                sub: subject.to_string(),
                aud: Audience::from(token_request.audience.clone()),
                exp: expires_at.timestamp(),
                iat: now.timestamp(),
                jti: token_id.clone(),
                scope: join_scopes(&request.scopes),
                client_id: Some(client.id.clone()),
            };
            provider.signer().sign(&claims).await?
        }
    };

    let expires_in = (expires_at - now).num_seconds();
    if expires_in < 0 {
        return Err(OpError::server_error("the token expiry is already in the past"));
    }

    let id_token = if request.scopes.iter().any(|scope| scope == "openid") {
        let claims = IdTokenClaims {
            iss: provider.issuer().to_string(),
            sub: subject.to_string(),
            aud: Audience::from(client.id.as_str()),
            exp: (now + chrono::Duration::seconds(client.id_token_ttl as i64)).timestamp(),
            iat: now.timestamp(),
            nonce: request.nonce.clone(),
            at_hash: Some(at_hash(&access_token)),
        };
        Some(provider.signer().sign(&claims).await?)
    } else {
        None
    };

    // Codes are single use; the request is gone once redeemed
    storage
        .delete_auth_request(&request.id)
        .await
        .map_err(storage_error)?;
    debug!("Issued tokens for {} via authorization code", client.id);

    Ok(AccessTokenResponse {
        access_token,
        token_type: TOKEN_TYPE_BEARER.to_string(),
        expires_in: expires_in as u64,
        id_token,
        scope: join_scopes(&request.scopes),
    })
}

async fn exchange_jwt_profile(
    provider: &Provider,
    params: &TokenParams,
) -> Result<AccessTokenResponse, OpError> {
    let Some(assertion) = params.assertion.as_deref() else {
        return Err(OpError::invalid_request("assertion is required"));
    };

    let claims = provider.jwt_profile_verifier().verify(assertion).await?;
    let requested = parse_scopes(params.scope.as_deref());
    let granted = provider
        .storage()
        .validate_jwt_profile_scopes(&claims.iss, requested)
        .await
        .map_err(storage_error)?;

    let token_request = TokenRequest {
        subject: claims.sub.clone(),
        issuer: claims.iss.clone(),
        audience: vec![provider.issuer().to_string()],
        scopes: granted.clone(),
    };
    let (token_id, expires_at) = provider
        .storage()
        .create_access_token(&token_request)
        .await
        .map_err(storage_error)?;
    let access_token = provider
        .cipher()
        .encrypt(&format!("{token_id}:{}", claims.sub))
        .map_err(|_| OpError::server_error("the access token could not be issued"))?;

    let expires_in = (expires_at - Utc::now()).num_seconds();
    if expires_in < 0 {
        return Err(OpError::server_error("the token expiry is already in the past"));
    }
    debug!("Issued token for {} via jwt-bearer assertion", claims.iss);

    Ok(AccessTokenResponse {
        access_token,
        token_type: TOKEN_TYPE_BEARER.to_string(),
        expires_in: expires_in as u64,
        id_token: None,
        scope: join_scopes(&granted),
    })
}

pub(crate) fn router(provider: &Provider) -> Router<Provider> {
    let token_path = provider.endpoints().token.path().to_string();
    Router::new().route(&token_path, post(token))
}
