use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const DISCOVERY_TAG: &str = "Discovery API";
pub(crate) const AUTHORIZATION_TAG: &str = "Authorization API";
pub(crate) const TOKEN_TAG: &str = "Token API";
pub(crate) const SESSION_TAG: &str = "Session API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = DISCOVERY_TAG, description = "OpenID Connect discovery endpoints"),
        (name = AUTHORIZATION_TAG, description = "Authorization-code flow endpoints"),
        (name = TOKEN_TAG, description = "Token issuance, introspection, and userinfo endpoints"),
        (name = SESSION_TAG, description = "RP-initiated logout endpoints"),
    ),
    info(
        title = "OpenID Provider API",
        description = "OAuth 2.0 / OpenID Connect provider",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
