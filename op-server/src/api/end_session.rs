//! RP-initiated logout (OIDC RP-Initiated Logout 1.0).
//!
//! A verified `id_token_hint` terminates the subject's session; the
//! post-logout redirect is honored only when it is registered for a
//! determinable client, falling back to the configured default target.

use crate::errors::OpError;
use crate::models::{EndSessionParams, IdTokenClaims};
use crate::openapi::SESSION_TAG;
use crate::provider::Provider;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use log::info;
use serde_json::json;
use url::Url;

async fn end_session_get(
    State(provider): State<Provider>,
    query: Result<Query<EndSessionParams>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(params)) => end_session(provider, params).await,
        Err(rejection) => OpError::invalid_request(&rejection.to_string()).into_response(),
    }
}

/// End-session endpoint, also accepting POST forms
#[utoipa::path(
    get,
    path = "/end_session",
    tag = SESSION_TAG,
    responses(
        (status = 200, description = "Session ended, no redirect target configured"),
        (status = 303, description = "Redirect to the post-logout target"),
        (status = 400, description = "Hint or redirect target cannot be validated", body = OpError)
    )
)]
async fn end_session_post(
    State(provider): State<Provider>,
    form: Result<Form<EndSessionParams>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(params)) => end_session(provider, params).await,
        Err(rejection) => OpError::invalid_request(&rejection.to_string()).into_response(),
    }
}

async fn end_session(provider: Provider, params: EndSessionParams) -> Response {
    let hint_claims: Option<IdTokenClaims> = match params.id_token_hint.as_deref() {
        Some(hint) => match provider.id_token_hint_verifier().verify(hint).await {
            Ok(claims) => Some(claims),
            Err(err) => {
                return OpError::invalid_request(&format!(
                    "the id_token_hint could not be verified: {err}"
                ))
                .into_response();
            }
        },
        None => None,
    };

    if let Some(claims) = &hint_claims {
        if let Err(err) = provider.storage().terminate_session(&claims.sub).await {
            return OpError::server_error(&err.to_string()).into_response();
        }
        info!("Ended session for subject {}", claims.sub);
    }

    let target = match params.post_logout_redirect_uri {
        Some(requested) => {
            // The target must be registered for a client we can determine,
            // either named outright or taken from the hint audience.
            let client_id = params.client_id.clone().or_else(|| {
                hint_claims
                    .as_ref()
                    .and_then(|claims| claims.aud.primary().map(str::to_string))
            });
            let Some(client_id) = client_id else {
                return OpError::invalid_request(
                    "a client_id or id_token_hint is required to validate the redirect",
                )
                .into_response();
            };
            let Ok(client) = provider.storage().client_by_id(&client_id).await else {
                return OpError::invalid_request("client is not registered").into_response();
            };
            if !client.post_logout_redirect_uris.contains(&requested) {
                return OpError::invalid_request(
                    "post_logout_redirect_uri is not registered for this client",
                )
                .into_response();
            }
            Some(requested)
        }
        None => provider.config().default_post_logout_redirect.clone(),
    };

    match target {
        Some(target) => {
            let Ok(mut url) = Url::parse(&target) else {
                return OpError::server_error("the post-logout redirect target is not a valid URL")
                    .into_response();
            };
            if let Some(state) = params.state.as_deref() {
                url.query_pairs_mut().append_pair("state", state);
            }
            Redirect::to(url.as_str()).into_response()
        }
        None => Json(json!({"status": "signed_out"})).into_response(),
    }
}

pub(crate) fn router(provider: &Provider) -> Router<Provider> {
    let end_session_path = provider.endpoints().end_session.path().to_string();
    Router::new().route(&end_session_path, get(end_session_get).post(end_session_post))
}
