use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::auth::Token;
use crate::auth::TokenSource;
use crate::auth::oauth2::{OAuth2Config, OAuth2Service};
use crate::http::{HttpService, ReqwestTransport, RequestConfig, Transport};

mod contents;
mod error;
mod repos;
mod types;

pub use contents::contents_path;
pub use error::*;
pub use repos::repo_path;
pub use types::*;

pub const API_NAME: &str = "GitHub";
pub const API_BASE: &str = "https://api.github.com";
pub const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
pub const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
/// Used when [`ServiceWithOAuth2Config::redirect_url`] is left unset.
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:8080/oauth/redirect";
pub const MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

pub struct ServiceWithOAuth2Config {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub token_source: Arc<dyn TokenSource>,
    /// Defaults to [`DEFAULT_REDIRECT_URL`].
    pub redirect_url: Option<String>,
    pub refresh_margin: Option<Duration>,
}

pub struct ServiceWithAccessTokenConfig {
    pub access_token: String,
}

enum Authorization {
    OAuth2(OAuth2Service),
    AccessToken { token: String, http: HttpService },
}

impl Authorization {
    fn label(&self) -> &'static str {
        match self {
            Self::OAuth2(_) => "oauth2",
            Self::AccessToken { .. } => "access-token",
        }
    }
}

/// A decoded success response.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub data: T,
}

pub struct GitHubService {
    authorization: Authorization,
    api_base: String,
}

impl GitHubService {
    pub fn new_with_oauth2(config: ServiceWithOAuth2Config) -> ServiceResult<Self> {
        // Checked before the reqwest client is built.
        validate_client_id(&config)?;
        let transport = reqwest_transport()?;
        Self::oauth2_with_transport(config, transport)
    }

    pub fn oauth2_with_transport(
        config: ServiceWithOAuth2Config,
        transport: Arc<dyn Transport>,
    ) -> ServiceResult<Self> {
        validate_client_id(&config)?;

        let oauth2_config = OAuth2Config {
            client_id: config.client_id,
            client_secret: config.client_secret,
            redirect_url: config
                .redirect_url
                .unwrap_or_else(|| DEFAULT_REDIRECT_URL.to_string()),
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            token_http_method: Method::POST,
            refresh_margin: config.refresh_margin,
            token_source: config.token_source,
        };
        let oauth2 = OAuth2Service::new(oauth2_config, HttpService::new(transport))?;

        Ok(Self {
            authorization: Authorization::OAuth2(oauth2),
            api_base: API_BASE.to_string(),
        })
    }

    pub fn new_with_access_token(config: ServiceWithAccessTokenConfig) -> ServiceResult<Self> {
        // Checked before the reqwest client is built.
        validate_access_token(&config)?;
        let transport = reqwest_transport()?;
        Self::access_token_with_transport(config, transport)
    }

    pub fn access_token_with_transport(
        config: ServiceWithAccessTokenConfig,
        transport: Arc<dyn Transport>,
    ) -> ServiceResult<Self> {
        validate_access_token(&config)?;

        Ok(Self {
            authorization: Authorization::AccessToken {
                token: config.access_token,
                http: HttpService::new(transport),
            },
            api_base: API_BASE.to_string(),
        })
    }

    /// Points the service at another API origin, e.g. a GitHub Enterprise host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    /// Sends `request` with the versioned media type and the credentials of
    /// the configured mode, decoding a success body into `T`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        mut request: RequestConfig,
    ) -> ServiceResult<ApiResponse<T>> {
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE));
        request
            .headers
            .insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
        let method = request.method.clone();
        let url = request.url.clone();
        tracing::debug!(%method, %url, mode = self.authorization.label(), "github request");

        let result = match &self.authorization {
            Authorization::OAuth2(oauth2) => oauth2
                .http_request(request)
                .await
                .map_err(ServiceError::from),
            Authorization::AccessToken { token, http } => {
                let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    ServiceError::Config("access token is not a valid header value".to_string())
                })?;
                request.headers.insert(AUTHORIZATION, value);
                http.http_request(request).await.map_err(ServiceError::from)
            }
        };

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%method, %url, status = ?error.status(), %error, "github request failed");
                return Err(error);
            }
        };

        let data = serde_json::from_slice(&response.body)
            .map_err(|source| ServiceError::Decode { url, source })?;
        Ok(ApiResponse {
            status: response.status,
            headers: response.headers,
            data,
        })
    }

    pub fn authorize_url(&self, scope: &str, state: Option<&str>) -> ServiceResult<String> {
        Ok(self.oauth2()?.authorize_url(scope, None, None, state))
    }

    pub async fn get_token_from_code(
        &self,
        callback: &str,
        expected_state: Option<&str>,
    ) -> ServiceResult<Token> {
        Ok(self
            .oauth2()?
            .get_token_from_code(callback, expected_state)
            .await?)
    }

    pub async fn validate_token(&self) -> ServiceResult<Token> {
        Ok(self.oauth2()?.validate_token().await?)
    }

    pub fn api_name(&self) -> &'static str {
        API_NAME
    }

    /// The OAuth2 client id; `None` in access-token mode.
    pub fn api_key(&self) -> Option<&str> {
        match &self.authorization {
            Authorization::OAuth2(oauth2) => Some(oauth2.client_id()),
            Authorization::AccessToken { .. } => None,
        }
    }

    pub fn api_call_count(&self) -> u64 {
        match &self.authorization {
            Authorization::OAuth2(oauth2) => oauth2.api_call_count(),
            Authorization::AccessToken { http, .. } => http.api_call_count(),
        }
    }

    pub fn api_reset(&self) {
        match &self.authorization {
            Authorization::OAuth2(oauth2) => oauth2.api_reset(),
            Authorization::AccessToken { http, .. } => http.api_reset(),
        }
    }

    fn oauth2(&self) -> ServiceResult<&OAuth2Service> {
        match &self.authorization {
            Authorization::OAuth2(oauth2) => Ok(oauth2),
            Authorization::AccessToken { .. } => Err(ServiceError::Config(
                "operation requires OAuth2 authorization".to_string(),
            )),
        }
    }
}

fn validate_client_id(config: &ServiceWithOAuth2Config) -> ServiceResult<()> {
    if config.client_id.trim().is_empty() {
        return Err(ServiceError::Config("client id not provided".to_string()));
    }
    Ok(())
}

fn validate_access_token(config: &ServiceWithAccessTokenConfig) -> ServiceResult<()> {
    if config.access_token.trim().is_empty() {
        return Err(ServiceError::Config("access token not provided".to_string()));
    }
    Ok(())
}

fn reqwest_transport() -> ServiceResult<Arc<dyn Transport>> {
    let transport = ReqwestTransport::new()
        .map_err(|error| ServiceError::Config(format!("failed to build HTTP client: {error}")))?;
    Ok(Arc::new(transport))
}

#[cfg(test)]
mod tests;
