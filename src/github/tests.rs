use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap};
use reqwest::{Method, StatusCode};

use super::{
    API_BASE, DEFAULT_REDIRECT_URL, GitHubService, ServiceError, ServiceWithAccessTokenConfig,
    ServiceWithOAuth2Config, contents_path, repo_path,
};
use crate::auth::oauth2::OAuth2Error;
use crate::auth::{MemoryTokenSource, Token};
use crate::http::{HttpResponse, RequestConfig, Transport};

#[derive(Default)]
struct RecordingTransport {
    responses: Mutex<VecDeque<anyhow::Result<(StatusCode, String)>>>,
    requests: Mutex<Vec<RequestConfig>>,
}

impl RecordingTransport {
    fn respond(self, status: StatusCode, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok((status, body.to_string())));
        self
    }

    fn fail(self, message: &'static str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message)));
        self
    }

    fn requests(&self) -> Vec<RequestConfig> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: RequestConfig) -> anyhow::Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok((StatusCode::OK, "{}".to_string())))?;
        Ok(HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: body.into_bytes(),
        })
    }
}

fn token_service(transport: RecordingTransport) -> (GitHubService, Arc<RecordingTransport>) {
    let transport = Arc::new(transport);
    let service = GitHubService::access_token_with_transport(
        ServiceWithAccessTokenConfig {
            access_token: "ghp_static".to_string(),
        },
        transport.clone(),
    )
    .expect("service builds");
    (service, transport)
}

fn oauth2_config(client_id: &str) -> ServiceWithOAuth2Config {
    ServiceWithOAuth2Config {
        client_id: client_id.to_string(),
        client_secret: None,
        token_source: Arc::new(MemoryTokenSource::with_token(Token {
            access_token: "gho_oauth".to_string(),
            token_type: "bearer".to_string(),
            refresh_token: None,
            scope: "repo".to_string(),
            expires_at: None,
        })),
        redirect_url: None,
        refresh_margin: None,
    }
}

fn oauth2_service(transport: RecordingTransport) -> (GitHubService, Arc<RecordingTransport>) {
    let transport = Arc::new(transport);
    let service =
        GitHubService::oauth2_with_transport(oauth2_config("client-123"), transport.clone())
            .expect("service builds");
    (service, transport)
}

const REPO_JSON: &str = r#"{
    "id": 1296269,
    "name": "Hello-World",
    "full_name": "octocat/Hello-World",
    "owner": {"login": "octocat", "id": 1, "type": "User"},
    "private": false,
    "description": null,
    "topics": ["octocat", "api"],
    "default_branch": "main",
    "license": {"key": "mit", "name": "MIT License", "spdx_id": "MIT"},
    "permissions": {"admin": false, "push": true, "pull": true}
}"#;

const LISTING_JSON: &str = r#"[
    {"type": "dir", "name": "src", "path": "src", "sha": "a1", "size": 0,
     "url": "u", "download_url": null,
     "_links": {"self": "s", "git": "g", "html": "h"}},
    {"type": "file", "name": "README.md", "path": "README.md", "sha": "b2", "size": 42,
     "url": "u2", "download_url": "https://raw.githubusercontent.com/octocat/Hello-World/main/README.md",
     "_links": {"self": "s2"}}
]"#;

#[test]
fn repo_and_contents_paths_insert_identifiers_verbatim() {
    assert_eq!(repo_path("octocat", "Hello-World"), "repos/octocat/Hello-World");
    assert_eq!(repo_path("a%20b", "c"), "repos/a%20b/c");
    assert_eq!(
        contents_path("octocat", "Hello-World", "docs/guide.md"),
        "repos/octocat/Hello-World/contents/docs/guide.md"
    );
    assert_eq!(
        contents_path("octocat", "Hello-World", ""),
        "repos/octocat/Hello-World/contents/"
    );
}

#[test]
fn access_token_constructor_rejects_empty_token_without_network() {
    let transport = Arc::new(RecordingTransport::default());
    let error = GitHubService::access_token_with_transport(
        ServiceWithAccessTokenConfig {
            access_token: String::new(),
        },
        transport.clone(),
    )
    .err()
    .expect("config error");

    assert!(matches!(error, ServiceError::Config(_)));
    assert!(transport.requests().is_empty());

    let error = GitHubService::new_with_access_token(ServiceWithAccessTokenConfig {
        access_token: "  ".to_string(),
    })
    .err()
    .expect("config error");
    assert!(matches!(error, ServiceError::Config(_)));
}

#[test]
fn oauth2_constructor_rejects_empty_client_id_without_network() {
    let transport = Arc::new(RecordingTransport::default());
    let error = GitHubService::oauth2_with_transport(oauth2_config(""), transport.clone())
        .err()
        .expect("config error");

    assert!(matches!(error, ServiceError::Config(_)));
    assert!(transport.requests().is_empty());

    let error = GitHubService::new_with_oauth2(oauth2_config(""))
        .err()
        .expect("config error");
    assert!(matches!(error, ServiceError::Config(_)));
}

#[test]
fn oauth2_constructor_rejects_bad_redirect_url() {
    let mut config = oauth2_config("client-123");
    config.redirect_url = Some("::nope".to_string());

    let error =
        GitHubService::oauth2_with_transport(config, Arc::new(RecordingTransport::default()))
            .err()
            .expect("config error");
    assert!(matches!(error, ServiceError::Config(_)));
}

#[tokio::test]
async fn get_repo_requests_repo_url_with_static_token_headers() {
    let (service, transport) =
        token_service(RecordingTransport::default().respond(StatusCode::OK, REPO_JSON));

    let repo = service
        .get_repo("octocat", "Hello-World")
        .await
        .expect("repo loads");

    assert_eq!(repo.id, 1296269);
    assert_eq!(repo.full_name, "octocat/Hello-World");
    assert_eq!(repo.owner.login, "octocat");
    assert_eq!(repo.owner.user_type, "User");
    assert_eq!(repo.description, None);
    assert_eq!(repo.topics, vec!["octocat".to_string(), "api".to_string()]);
    assert_eq!(
        repo.license.and_then(|license| license.spdx_id).as_deref(),
        Some("MIT")
    );
    assert!(repo.permissions.is_some_and(|permissions| permissions.push && !permissions.admin));
    assert_eq!(repo.stargazers_count, 0);
    assert!(repo.organization.is_none());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(
        requests[0].url,
        format!("{API_BASE}/repos/octocat/Hello-World")
    );
    assert_eq!(requests[0].headers[ACCEPT], "application/vnd.github+json");
    assert_eq!(requests[0].headers[AUTHORIZATION], "Bearer ghp_static");
    assert_eq!(requests[0].headers["x-github-api-version"], "2022-11-28");
}

#[tokio::test]
async fn get_contents_decodes_listing_in_order() {
    let (service, transport) =
        token_service(RecordingTransport::default().respond(StatusCode::OK, LISTING_JSON));

    let entries = service
        .get_contents("octocat", "Hello-World", "")
        .await
        .expect("listing loads");

    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_dir());
    assert_eq!(entries[0].links.git.as_deref(), Some("g"));
    assert_eq!(entries[1].name, "README.md");
    assert_eq!(entries[1].size, 42);
    assert_eq!(entries[1].links.self_url, "s2");
    assert_eq!(entries[1].links.html, None);
    assert_eq!(
        transport.requests()[0].url,
        format!("{API_BASE}/repos/octocat/Hello-World/contents/")
    );
}

#[tokio::test]
async fn get_contents_wraps_single_file_in_a_vec() {
    let (service, _transport) = token_service(RecordingTransport::default().respond(
        StatusCode::OK,
        r#"{"type":"file","name":"a.txt","path":"dir/a.txt","size":3,"encoding":"base64","content":"YWJj\n"}"#,
    ));

    let entries = service
        .get_contents("octocat", "Hello-World", "dir/a.txt")
        .await
        .expect("file loads");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "dir/a.txt");
    assert_eq!(entries[0].encoding.as_deref(), Some("base64"));
}

#[tokio::test]
async fn api_message_overrides_generic_error() {
    let (service, _transport) = token_service(
        RecordingTransport::default().respond(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#),
    );

    let error = service
        .get_repo("octocat", "missing")
        .await
        .expect_err("request fails");

    assert_eq!(error.to_string(), "Not Found");
    assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn empty_api_message_keeps_generic_error() {
    let (service, _transport) = token_service(
        RecordingTransport::default().respond(StatusCode::SERVICE_UNAVAILABLE, r#"{"message":""}"#),
    );

    let error = service
        .get_repo("octocat", "Hello-World")
        .await
        .expect_err("request fails");

    assert!(matches!(error, ServiceError::Http(_)));
    assert!(error.to_string().starts_with("HTTP status 503 Service Unavailable"));
}

#[tokio::test]
async fn errors_do_not_leak_into_following_calls() {
    let (service, _transport) = token_service(
        RecordingTransport::default()
            .respond(StatusCode::FORBIDDEN, r#"{"message":"API rate limit exceeded"}"#)
            .respond(StatusCode::INTERNAL_SERVER_ERROR, ""),
    );

    let first = service
        .get_repo("octocat", "Hello-World")
        .await
        .expect_err("first fails");
    let second = service
        .get_repo("octocat", "Hello-World")
        .await
        .expect_err("second fails");

    assert_eq!(first.to_string(), "API rate limit exceeded");
    assert!(second.error_response().is_none());
    assert_ne!(second.to_string(), "API rate limit exceeded");
}

#[tokio::test]
async fn transport_failure_is_surfaced() {
    let (service, _transport) =
        token_service(RecordingTransport::default().fail("connection reset"));

    let error = service
        .get_repo("octocat", "Hello-World")
        .await
        .expect_err("request fails");

    assert!(matches!(error, ServiceError::Http(_)));
    assert_eq!(error.status(), None);
}

#[tokio::test]
async fn success_with_wrong_shape_is_a_decode_error() {
    let (service, _transport) =
        token_service(RecordingTransport::default().respond(StatusCode::OK, "not json"));

    let error = service
        .get_repo("octocat", "Hello-World")
        .await
        .expect_err("decode fails");

    assert!(matches!(error, ServiceError::Decode { .. }));
}

#[tokio::test]
async fn success_body_with_message_is_not_an_error() {
    let (service, _transport) = token_service(
        RecordingTransport::default().respond(StatusCode::OK, r#"{"message":"hello","id":7}"#),
    );

    let repo = service
        .get_repo("octocat", "Hello-World")
        .await
        .expect("2xx succeeds");
    assert_eq!(repo.id, 7);
}

#[tokio::test]
async fn oauth2_mode_uses_stored_token_and_accept_header() {
    let (service, transport) =
        oauth2_service(RecordingTransport::default().respond(StatusCode::OK, REPO_JSON));

    service
        .get_repo("octocat", "Hello-World")
        .await
        .expect("repo loads");

    let requests = transport.requests();
    assert_eq!(requests[0].headers[ACCEPT], "application/vnd.github+json");
    assert_eq!(requests[0].headers[AUTHORIZATION], "Bearer gho_oauth");
    assert_eq!(requests[0].headers["x-github-api-version"], "2022-11-28");
    assert_eq!(service.api_call_count(), 1);
    service.api_reset();
    assert_eq!(service.api_call_count(), 0);
}

#[tokio::test]
async fn oauth2_mode_enriches_errors_the_same_way() {
    let (service, _transport) = oauth2_service(
        RecordingTransport::default()
            .respond(StatusCode::UNAUTHORIZED, r#"{"message":"Bad credentials"}"#),
    );

    let error = service
        .get_contents("octocat", "Hello-World", "src")
        .await
        .expect_err("request fails");
    assert_eq!(error.to_string(), "Bad credentials");
}

#[tokio::test]
async fn oauth2_mode_without_token_fails_before_request() {
    let transport = Arc::new(RecordingTransport::default());
    let mut config = oauth2_config("client-123");
    config.token_source = Arc::new(MemoryTokenSource::new());
    let service =
        GitHubService::oauth2_with_transport(config, transport.clone()).expect("service builds");

    let error = service
        .get_repo("octocat", "Hello-World")
        .await
        .expect_err("no token");

    assert!(matches!(error, ServiceError::OAuth2(OAuth2Error::NoToken)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn authorization_methods_require_oauth2_mode() {
    let (service, _transport) = token_service(RecordingTransport::default());

    assert!(matches!(
        service.authorize_url("repo", None),
        Err(ServiceError::Config(_))
    ));
    assert!(matches!(
        service.validate_token().await,
        Err(ServiceError::Config(_))
    ));
    assert!(matches!(
        service.get_token_from_code("/oauth/redirect?code=x", None).await,
        Err(ServiceError::Config(_))
    ));
    assert_eq!(service.api_key(), None);
    assert_eq!(service.api_name(), "GitHub");
}

#[test]
fn oauth2_mode_uses_default_redirect_url() {
    let (service, _transport) = oauth2_service(RecordingTransport::default());

    let url = service
        .authorize_url("repo", Some("state-1"))
        .expect("authorize url");

    assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
    let encoded = DEFAULT_REDIRECT_URL
        .replace(':', "%3A")
        .replace('/', "%2F");
    assert!(url.contains(&format!("redirect_uri={encoded}")));
    assert!(url.contains("state=state-1"));
    assert_eq!(service.api_key(), Some("client-123"));
}

#[tokio::test]
async fn api_base_override_is_used_for_urls() {
    let (service, transport) =
        token_service(RecordingTransport::default().respond(StatusCode::OK, "[]"));
    let service = service.with_api_base("https://ghe.example.test/api/v3/");

    let entries = service
        .get_contents("acme", "tools", "bin")
        .await
        .expect("listing loads");

    assert!(entries.is_empty());
    assert_eq!(
        transport.requests()[0].url,
        "https://ghe.example.test/api/v3/repos/acme/tools/contents/bin"
    );
}
