//! OpenID Provider discovery document.

use crate::endpoints::DISCOVERY_PATH;
use crate::headers::presets;
use crate::models::ProviderMetadata;
use crate::openapi::DISCOVERY_TAG;
use crate::provider::Provider;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

/// Provider metadata (OIDC Discovery 1.0). Reflects the endpoint registry
/// sealed at construction, overrides included.
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = DISCOVERY_TAG,
    responses(
        (status = 200, description = "Provider metadata", body = ProviderMetadata)
    )
)]
async fn discovery(State(provider): State<Provider>) -> Response {
    let mut response = Json(provider.metadata().clone()).into_response();
    presets::public_cache(3600).apply(&mut response);
    response
}

pub(crate) fn router() -> Router<Provider> {
    Router::new().route(DISCOVERY_PATH, get(discovery))
}
