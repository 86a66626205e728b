//! Published verification keys (JWKS).

use crate::errors::OpError;
use crate::headers::presets;
use crate::openapi::DISCOVERY_TAG;
use crate::provider::Provider;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::error;

/// Key set relying parties verify our signatures against. Served from the
/// path recorded in the endpoint registry and advertised as `jwks_uri`.
#[utoipa::path(
    get,
    path = "/keys",
    tag = DISCOVERY_TAG,
    responses(
        (status = 200, description = "JSON Web Key Set"),
        (status = 500, description = "Key material could not be fetched", body = OpError)
    )
)]
async fn key_set(State(provider): State<Provider>) -> Result<Response, OpError> {
    let key_set = provider.storage().key_set().await.map_err(|err| {
        error!("Failed to fetch the key set: {}", err);
        OpError::server_error("key material is unavailable")
    })?;

    let mut response = Json(key_set).into_response();
    presets::public_cache(300).apply(&mut response);
    Ok(response)
}

pub(crate) fn router(provider: &Provider) -> Router<Provider> {
    Router::new().route(provider.endpoints().keys.path(), get(key_set))
}
