//! Userinfo endpoint (OIDC Core §5.3). Claims are shaped by the scopes the
//! access token was granted with.

use super::introspect::resolve_access_token;
use crate::errors::OpError;
use crate::models::UserinfoClaims;
use crate::openapi::TOKEN_TAG;
use crate::provider::Provider;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use http::header::AUTHORIZATION;
use http::HeaderMap;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[utoipa::path(
    get,
    path = "/userinfo",
    tag = TOKEN_TAG,
    responses(
        (status = 200, description = "Claims for the token's subject", body = UserinfoClaims),
        (status = 401, description = "Missing or inactive bearer token", body = OpError)
    )
)]
async fn userinfo(
    State(provider): State<Provider>,
    headers: HeaderMap,
) -> Result<UserinfoClaims, OpError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| OpError::invalid_token("a bearer access token is required"))?;
    let stored = resolve_access_token(&provider, token)
        .await
        .ok_or_else(|| OpError::invalid_token("the access token is not active"))?;

    provider
        .storage()
        .userinfo(&stored.subject, &stored.scopes)
        .await
        .map_err(|err| OpError::server_error(&err.to_string()))
}

pub(crate) fn router(provider: &Provider) -> Router<Provider> {
    let userinfo_path = provider.endpoints().userinfo.path().to_string();
    Router::new().route(&userinfo_path, get(userinfo).post(userinfo))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{
        TestFixture, TEST_CLIENT_ID, TEST_CLIENT_SECRET, TEST_REDIRECT_URI, TEST_SUBJECT,
    };
    use axum::body::Body;
    use http::header::AUTHORIZATION;
    use http::{Method, Request, StatusCode};

    async fn obtain_user_token(fixture: &TestFixture, scope: &str) -> String {
        let (code, _) = fixture.obtain_auth_code(TEST_CLIENT_ID, scope, &[]).await;
        let response = fixture
            .post_form_with_basic_auth(
                "/oauth/token",
                &[
                    ("grant_type", "authorization_code"),
                    ("code", &code),
                    ("redirect_uri", TEST_REDIRECT_URI),
                ],
                TEST_CLIENT_ID,
                TEST_CLIENT_SECRET,
            )
            .await;
        response.assert_ok();
        response.json["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_claims_follow_the_token_scopes() {
        let fixture = TestFixture::new().await;
        let token = obtain_user_token(&fixture, "openid email").await;

        let response = fixture.get_with_bearer("/userinfo", &token).await;
        response.assert_ok();
        assert_eq!(response.json["sub"], TEST_SUBJECT);
        assert_eq!(response.json["email"], "alice@example.com");
        assert_eq!(response.json["email_verified"], true);
        // No profile scope, no profile claims
        assert!(response.json.get("name").is_none());
        assert!(response
            .header("cache-control")
            .unwrap()
            .contains("no-store"));
    }

    #[tokio::test]
    async fn test_profile_scope_reveals_the_name() {
        let fixture = TestFixture::new().await;
        let token = obtain_user_token(&fixture, "openid profile").await;

        let response = fixture.get_with_bearer("/userinfo", &token).await;
        response.assert_ok();
        assert_eq!(response.json["name"], "Alice Example");
        assert!(response.json.get("email").is_none());
    }

    #[tokio::test]
    async fn test_missing_bearer_token_is_unauthorized() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/userinfo").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_inactive_token_is_unauthorized() {
        let fixture = TestFixture::new().await;
        let response = fixture.get_with_bearer("/userinfo", "stale-token").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_post_is_accepted_as_well() {
        let fixture = TestFixture::new().await;
        let token = obtain_user_token(&fixture, "openid").await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/userinfo")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = fixture.send(request).await;
        response.assert_ok();
        assert_eq!(response.json["sub"], TEST_SUBJECT);
    }
}
