//! HTTP surface of the provider.

pub(crate) mod authorize;
pub(crate) mod discovery;
pub(crate) mod end_session;
pub(crate) mod health;
pub(crate) mod introspect;
pub(crate) mod keys;
pub(crate) mod token;
pub(crate) mod userinfo;

use crate::provider::Provider;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::Router;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Combine all protocol routes into a single router. Endpoint paths come
/// from the provider's sealed registry, so overrides recorded at build time
/// are the only paths that exist.
pub(super) fn router(provider: &Provider) -> Router<Provider> {
    Router::new()
        .merge(health::router())
        .merge(discovery::router())
        .merge(keys::router(provider))
        .merge(introspect::router(provider))
        .merge(userinfo::router(provider))
        .merge(intercepted_routes(provider))
        .layer(cors_layer())
}

/// The interactive endpoints, wrapped by the registered interceptor chain.
/// Discovery, keys, introspection, userinfo, and the health probes stay
/// outside the chain.
fn intercepted_routes(provider: &Provider) -> Router<Provider> {
    let mut router = Router::new()
        .merge(authorize::router(provider))
        .merge(token::router(provider))
        .merge(end_session::router(provider));

    // A layer wraps everything added before it, so walking the registration
    // order backwards leaves the first-registered interceptor outermost.
    for interceptor in provider.interceptors().iter().rev() {
        let interceptor = interceptor.clone();
        router = router.layer(middleware::from_fn(
            move |request: Request, next: Next| {
                let interceptor = interceptor.clone();
                async move { interceptor.intercept(request, next).await }
            },
        ));
    }
    router
}

/// Browser-facing endpoints reflect the caller's origin and allow
/// credentialed requests.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
