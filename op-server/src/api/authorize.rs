//! Authorization-code flow: entry point and resume callback.
//!
//! The provider does not render a login UI. `/authorize` validates the
//! request, persists it, and hands the user agent to the client's registered
//! login service; the login service completes authentication out of band and
//! sends the user agent back to `/authorize/callback?id=...`, where the code
//! is minted.

use crate::errors::OpError;
use crate::models::{
    parse_scopes, random_id, AuthRequest, AuthorizationParams, CodeChallenge, CodeChallengeMethod,
};
use crate::openapi::AUTHORIZATION_TAG;
use crate::provider::Provider;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use chrono::Utc;
use http::StatusCode;
use log::debug;
use serde::Deserialize;
use url::Url;

/// Authorization endpoint (RFC 6749 §4.1.1), also accepting POST forms
#[utoipa::path(
    get,
    path = "/authorize",
    tag = AUTHORIZATION_TAG,
    responses(
        (status = 303, description = "Redirect to the login service, or to the client with an error"),
        (status = 400, description = "Request cannot be validated against the client", body = OpError)
    )
)]
async fn authorize_get(
    State(provider): State<Provider>,
    query: Result<Query<AuthorizationParams>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(params)) => begin_authorization(provider, params).await,
        Err(rejection) => OpError::invalid_request(&rejection.to_string()).into_response(),
    }
}

async fn authorize_post(
    State(provider): State<Provider>,
    form: Result<Form<AuthorizationParams>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(params)) => begin_authorization(provider, params).await,
        Err(rejection) => OpError::invalid_request(&rejection.to_string()).into_response(),
    }
}

async fn begin_authorization(provider: Provider, params: AuthorizationParams) -> Response {
    let storage = provider.storage();

    let Ok(client) = storage.client_by_id(&params.client_id).await else {
        return OpError::invalid_request("client is not registered").into_response();
    };

    // The redirect target is only trusted once it matches the registration;
    // before that, errors are answered directly (RFC 6749 §4.1.2.1).
    if !client.redirect_uris.contains(&params.redirect_uri) {
        return OpError::invalid_request("redirect_uri is not registered for this client")
            .into_response();
    }
    let redirect_uri = params.redirect_uri.as_str();
    let state = params.state.as_deref();

    if params.response_type != "code" {
        return error_redirect(
            redirect_uri,
            "unsupported_response_type",
            "only the code response type is supported",
            state,
        );
    }

    let scopes = parse_scopes(params.scope.as_deref());
    if !scopes.iter().any(|scope| scope == "openid") {
        return error_redirect(
            redirect_uri,
            "invalid_scope",
            "the openid scope is required",
            state,
        );
    }

    let code_challenge = match extract_code_challenge(&provider, &params) {
        Ok(challenge) => challenge,
        Err(description) => {
            return error_redirect(redirect_uri, "invalid_request", &description, state)
        }
    };
    if client.is_public() && code_challenge.is_none() {
        return error_redirect(
            redirect_uri,
            "invalid_request",
            "public clients must send a PKCE code challenge",
            state,
        );
    }

    let request = AuthRequest {
        id: random_id("authreq"),
        client_id: client.id.clone(),
        redirect_uri: params.redirect_uri.clone(),
        scopes,
        state: params.state.clone(),
        nonce: params.nonce.clone(),
        code_challenge,
        subject: None,
        done: false,
        created_at: Utc::now(),
    };
    let request_id = request.id.clone();
    if storage.save_auth_request(request).await.is_err() {
        return error_redirect(
            redirect_uri,
            "server_error",
            "the authorization request could not be stored",
            state,
        );
    }

    // Hand the user agent to the external login service
    let Ok(mut login_url) = Url::parse(&client.login_url) else {
        return error_redirect(
            redirect_uri,
            "server_error",
            "the client login URL is not valid",
            state,
        );
    };
    login_url
        .query_pairs_mut()
        .append_pair("authRequestID", &request_id);
    debug!("Authorization request {} handed to login", request_id);
    Redirect::to(login_url.as_str()).into_response()
}

fn extract_code_challenge(
    provider: &Provider,
    params: &AuthorizationParams,
) -> Result<Option<CodeChallenge>, String> {
    let Some(challenge) = &params.code_challenge else {
        if params.code_challenge_method.is_some() {
            return Err("code_challenge_method without a code_challenge".to_string());
        }
        return Ok(None);
    };
    let method = match params.code_challenge_method.as_deref() {
        None | Some("plain") => CodeChallengeMethod::Plain,
        Some("S256") => {
            if !provider.config().code_challenge_s256 {
                return Err("the S256 code challenge method is not enabled".to_string());
            }
            CodeChallengeMethod::S256
        }
        Some(other) => return Err(format!("unknown code challenge method {other}")),
    };
    Ok(Some(CodeChallenge {
        challenge: challenge.clone(),
        method,
    }))
}

/// Protocol error delivered to the client's registered redirect URI.
fn error_redirect(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    let Ok(mut url) = Url::parse(redirect_uri) else {
        return OpError::server_error("the registered redirect URI is not a valid URL")
            .into_response();
    };
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("error", error);
        pairs.append_pair("error_description", description);
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    Redirect::to(url.as_str()).into_response()
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: Option<String>,
}

/// Resume point after external login; mints and delivers the code
#[utoipa::path(
    get,
    path = "/authorize/callback",
    tag = AUTHORIZATION_TAG,
    responses(
        (status = 303, description = "Redirect to the client with code and state"),
        (status = 404, description = "Missing or unknown authorization request id", body = OpError)
    )
)]
async fn callback(State(provider): State<Provider>, Query(params): Query<CallbackQuery>) -> Response {
    let Some(id) = params.id else {
        return OpError::new(
            "invalid_request",
            "the id query parameter is missing",
            StatusCode::NOT_FOUND,
        )
        .into_response();
    };

    let storage = provider.storage();
    let request = match storage.auth_request_by_id(&id).await {
        Ok(request) => request,
        Err(_) => {
            return OpError::new(
                "invalid_request",
                "unknown authorization request",
                StatusCode::NOT_FOUND,
            )
            .into_response();
        }
    };

    let state = request.state.as_deref();
    if !request.done || request.subject.is_none() {
        return error_redirect(
            &request.redirect_uri,
            "access_denied",
            "the authorization request is not finished",
            state,
        );
    }

    // The code is the sealed request id; redemption decrypts it and checks
    // it against the stored request.
    let Ok(code) = provider.cipher().encrypt(&request.id) else {
        return error_redirect(
            &request.redirect_uri,
            "server_error",
            "the authorization code could not be issued",
            state,
        );
    };
    if storage.save_auth_code(&code, &request.id).await.is_err() {
        return error_redirect(
            &request.redirect_uri,
            "server_error",
            "the authorization code could not be stored",
            state,
        );
    }

    let Ok(mut url) = Url::parse(&request.redirect_uri) else {
        return OpError::server_error("the registered redirect URI is not a valid URL")
            .into_response();
    };
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("code", &code);
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    Redirect::to(url.as_str()).into_response()
}

pub(crate) fn router(provider: &Provider) -> Router<Provider> {
    let authorization_path = provider.endpoints().authorization.path().to_string();
    let callback_path = provider.endpoints().callback_path();
    Router::new()
        .route(&authorization_path, get(authorize_get).post(authorize_post))
        .route(&callback_path, get(callback))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{
        TestFixture, TestResponse, TEST_CLIENT_ID, TEST_LOGIN_URL, TEST_REDIRECT_URI,
    };
    use http::header::LOCATION;
    use http::StatusCode;
    use url::Url;

    fn location_param(response: &TestResponse, name: &str) -> Option<String> {
        let location = response.header(LOCATION.as_str())?;
        let url = Url::parse(location).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.to_string())
    }

    #[tokio::test]
    async fn test_authorize_redirects_to_login() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .get(&format!(
                "/authorize?response_type=code&client_id={TEST_CLIENT_ID}\
                 &redirect_uri=http%3A%2F%2Fclient.example%2Fauth%2Fcallback&scope=openid"
            ))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        let location = response.header(LOCATION.as_str()).unwrap();
        assert!(location.starts_with(TEST_LOGIN_URL));
        assert!(location_param(&response, "authRequestID").is_some());
    }

    #[tokio::test]
    async fn test_unknown_client_is_answered_directly() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .get(&format!(
                "/authorize?response_type=code&client_id=ghost\
                 &redirect_uri=http%3A%2F%2Fclient.example%2Fauth%2Fcallback&scope=openid"
            ))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unregistered_redirect_uri_is_answered_directly() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .get(&format!(
                "/authorize?response_type=code&client_id={TEST_CLIENT_ID}\
                 &redirect_uri=http%3A%2F%2Fevil.example%2Fsteal&scope=openid"
            ))
            .await;

        // Never redirect to an unvalidated target
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unsupported_response_type_redirects_with_error() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .get(&format!(
                "/authorize?response_type=token&client_id={TEST_CLIENT_ID}\
                 &redirect_uri=http%3A%2F%2Fclient.example%2Fauth%2Fcallback&scope=openid&state=xyz"
            ))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        let location = response.header(LOCATION.as_str()).unwrap();
        assert!(location.starts_with(TEST_REDIRECT_URI));
        assert_eq!(
            location_param(&response, "error").as_deref(),
            Some("unsupported_response_type")
        );
        assert_eq!(location_param(&response, "state").as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_missing_openid_scope_redirects_with_error() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .get(&format!(
                "/authorize?response_type=code&client_id={TEST_CLIENT_ID}\
                 &redirect_uri=http%3A%2F%2Fclient.example%2Fauth%2Fcallback&scope=profile"
            ))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(
            location_param(&response, "error").as_deref(),
            Some("invalid_scope")
        );
    }

    #[tokio::test]
    async fn test_callback_without_id_is_not_found() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/authorize/callback").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_callback_with_unknown_id_is_not_found() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/authorize/callback?id=authreq-unknown").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_callback_before_login_finishes_denies_access() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .get(&format!(
                "/authorize?response_type=code&client_id={TEST_CLIENT_ID}\
                 &redirect_uri=http%3A%2F%2Fclient.example%2Fauth%2Fcallback&scope=openid"
            ))
            .await;
        let id = location_param(&response, "authRequestID").unwrap();

        // Resume without completing the login
        let response = fixture.get(&format!("/authorize/callback?id={id}")).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(
            location_param(&response, "error").as_deref(),
            Some("access_denied")
        );
    }

    #[tokio::test]
    async fn test_code_and_state_are_delivered_to_the_client() {
        let fixture = TestFixture::new().await;
        let (code, state) = fixture
            .obtain_auth_code(TEST_CLIENT_ID, "openid", &[("state", "abc123")])
            .await;
        assert!(!code.is_empty());
        assert_eq!(state.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_authorization_path_is_configurable() {
        let fixture = TestFixture::with_builder(|builder| {
            builder.with_authorization_endpoint("/custom/auth")
        })
        .await;

        let response = fixture
            .get(&format!(
                "/custom/auth?response_type=code&client_id={TEST_CLIENT_ID}\
                 &redirect_uri=http%3A%2F%2Fclient.example%2Fauth%2Fcallback&scope=openid"
            ))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        let id = location_param(&response, "authRequestID").unwrap();

        // The callback moved along with the authorization path
        fixture
            .storage
            .complete_auth_request(&id, crate::test_utils::TEST_SUBJECT)
            .await
            .unwrap();
        let response = fixture.get(&format!("/custom/auth/callback?id={id}")).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(location_param(&response, "code").is_some());

        // The old path no longer exists
        fixture
            .get("/authorize?response_type=code")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_code_challenge_method_is_rejected() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .get(&format!(
                "/authorize?response_type=code&client_id={TEST_CLIENT_ID}\
                 &redirect_uri=http%3A%2F%2Fclient.example%2Fauth%2Fcallback&scope=openid\
                 &code_challenge=abc&code_challenge_method=S999"
            ))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(
            location_param(&response, "error").as_deref(),
            Some("invalid_request")
        );
    }
}
