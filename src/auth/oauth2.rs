//! OAuth2 authorization-code flow against a single provider.
//!
//! The helper owns the provider endpoints and the token source. It builds the
//! authorize URL, exchanges callback codes for tokens, refreshes tokens that
//! are about to expire and executes requests with the bearer token attached.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Url};
use serde::Deserialize;
use thiserror::Error;

use super::{Token, TokenSource, now_epoch};
use crate::http::{HttpError, HttpResponse, HttpService, RequestConfig};

pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub token_http_method: Method,
    pub refresh_margin: Option<Duration>,
    pub token_source: Arc<dyn TokenSource>,
}

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("invalid OAuth2 configuration: {0}")]
    Config(String),
    #[error("invalid callback request: {0}")]
    Callback(String),
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("authorization code missing from callback")]
    MissingCode,
    #[error("callback state does not match the expected state")]
    StateMismatch,
    #[error("no OAuth2 token available, authorize first")]
    NoToken,
    #[error("OAuth2 token expired and has no refresh token")]
    Expired,
    #[error("unreadable token endpoint response")]
    TokenResponse(#[source] serde_json::Error),
    #[error("token storage failed")]
    Storage(#[source] anyhow::Error),
    #[error(transparent)]
    Http(#[from] HttpError),
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn error_message(&self) -> Option<String> {
        let error = self.error.as_deref().filter(|error| !error.is_empty())?;
        match self.error_description.as_deref() {
            Some(description) if !description.is_empty() => {
                Some(format!("{error}: {description}"))
            }
            _ => Some(error.to_string()),
        }
    }

    fn into_token(self, now: i64) -> Result<Token, OAuth2Error> {
        if let Some(message) = self.error_message() {
            return Err(OAuth2Error::Authorization(message));
        }
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                OAuth2Error::Authorization("token endpoint returned no access_token".to_string())
            })?;

        Ok(Token {
            access_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
            scope: self.scope.unwrap_or_default(),
            expires_at: self.expires_in.map(|seconds| now.saturating_add(seconds)),
        })
    }
}

pub struct OAuth2Service {
    client_id: String,
    client_secret: Option<String>,
    redirect_url: Url,
    auth_url: Url,
    token_url: Url,
    token_http_method: Method,
    refresh_margin: Duration,
    token_source: Arc<dyn TokenSource>,
    http: HttpService,
}

impl OAuth2Service {
    pub fn new(config: OAuth2Config, http: HttpService) -> Result<Self, OAuth2Error> {
        if config.client_id.trim().is_empty() {
            return Err(OAuth2Error::Config("client id not provided".to_string()));
        }

        Ok(Self {
            client_id: config.client_id,
            client_secret: config.client_secret.filter(|secret| !secret.is_empty()),
            redirect_url: parse_url("redirect url", &config.redirect_url)?,
            auth_url: parse_url("authorize url", &config.auth_url)?,
            token_url: parse_url("token url", &config.token_url)?,
            token_http_method: config.token_http_method,
            refresh_margin: config.refresh_margin.unwrap_or(DEFAULT_REFRESH_MARGIN),
            token_source: config.token_source,
            http,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_url(&self) -> &str {
        self.redirect_url.as_str()
    }

    pub fn authorize_url(
        &self,
        scope: &str,
        access_type: Option<&str>,
        prompt: Option<&str>,
        state: Option<&str>,
    ) -> String {
        let mut url = self.auth_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", self.redirect_url.as_str())
                .append_pair("response_type", "code")
                .append_pair("scope", scope);
            if let Some(access_type) = access_type {
                pairs.append_pair("access_type", access_type);
            }
            if let Some(prompt) = prompt {
                pairs.append_pair("prompt", prompt);
            }
            if let Some(state) = state {
                pairs.append_pair("state", state);
            }
        }
        url.to_string()
    }

    /// Exchanges the code carried by an OAuth2 callback for a token and stores it.
    ///
    /// `callback` is either the absolute callback URL or the request target
    /// (`/oauth/redirect?code=...`) as received by the redirect listener.
    pub async fn get_token_from_code(
        &self,
        callback: &str,
        expected_state: Option<&str>,
    ) -> Result<Token, OAuth2Error> {
        let code = self.callback_code(callback, expected_state)?;
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let token = self.request_token(&params).await?;
        self.token_source
            .set_token(&token)
            .map_err(OAuth2Error::Storage)?;
        tracing::info!(scope = %token.scope, "obtained OAuth2 token from authorization code");
        Ok(token)
    }

    /// Returns a usable token, refreshing it when it is within the refresh margin.
    pub async fn validate_token(&self) -> Result<Token, OAuth2Error> {
        let token = self
            .token_source
            .token()
            .map_err(OAuth2Error::Storage)?
            .ok_or(OAuth2Error::NoToken)?;

        let now = now_epoch();
        if !token.needs_refresh(now, self.refresh_margin) {
            return Ok(token);
        }

        if let Some(refresh_token) = token.refresh_token.clone() {
            return self.refresh(&token, &refresh_token).await;
        }
        if token.is_expired(now) {
            return Err(OAuth2Error::Expired);
        }
        Ok(token)
    }

    pub async fn http_request(
        &self,
        mut request: RequestConfig,
    ) -> Result<HttpResponse, OAuth2Error> {
        let token = self.validate_token().await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
            .map_err(|_| {
                OAuth2Error::Config("stored access token is not a valid header value".to_string())
            })?;
        request.headers.insert(AUTHORIZATION, value);
        Ok(self.http.http_request(request).await?)
    }

    pub fn api_call_count(&self) -> u64 {
        self.http.api_call_count()
    }

    pub fn api_reset(&self) {
        self.http.api_reset();
    }

    fn callback_code(
        &self,
        callback: &str,
        expected_state: Option<&str>,
    ) -> Result<String, OAuth2Error> {
        let url = self
            .redirect_url
            .join(callback.trim())
            .map_err(|error| OAuth2Error::Callback(error.to_string()))?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        let callback_error = TokenResponse {
            error,
            error_description: description,
            ..TokenResponse::default()
        };
        if let Some(message) = callback_error.error_message() {
            return Err(OAuth2Error::Authorization(message));
        }
        if let Some(expected) = expected_state {
            if state.as_deref() != Some(expected) {
                return Err(OAuth2Error::StateMismatch);
            }
        }
        code.filter(|code| !code.is_empty())
            .ok_or(OAuth2Error::MissingCode)
    }

    async fn refresh(&self, current: &Token, refresh_token: &str) -> Result<Token, OAuth2Error> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let mut token = self.request_token(&params).await?;
        if token.refresh_token.is_none() {
            token.refresh_token = current.refresh_token.clone();
        }
        self.token_source
            .set_token(&token)
            .map_err(OAuth2Error::Storage)?;
        tracing::debug!(expires_at = ?token.expires_at, "refreshed OAuth2 token");
        Ok(token)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<Token, OAuth2Error> {
        let form = encode_form(params);
        let request = if self.token_http_method == Method::GET {
            let mut url = self.token_url.clone();
            url.query_pairs_mut().extend_pairs(params.iter().copied());
            RequestConfig::get(url.as_str())
        } else {
            RequestConfig::new(self.token_http_method.clone(), self.token_url.as_str())
                .header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
                .body(form.into_bytes())
        };
        let request = request.header(ACCEPT, HeaderValue::from_static("application/json"));

        let body = match self.http.http_request(request).await {
            Ok(response) => response.body,
            Err(HttpError::Status { body, status, url }) => {
                let payload: TokenResponse = serde_json::from_slice(&body).unwrap_or_default();
                if let Some(message) = payload.error_message() {
                    return Err(OAuth2Error::Authorization(message));
                }
                return Err(HttpError::Status { status, url, body }.into());
            }
            Err(error) => return Err(error.into()),
        };

        let payload: TokenResponse =
            serde_json::from_slice(&body).map_err(OAuth2Error::TokenResponse)?;
        payload.into_token(now_epoch())
    }
}

fn parse_url(name: &str, raw: &str) -> Result<Url, OAuth2Error> {
    Url::parse(raw).map_err(|error| OAuth2Error::Config(format!("invalid {name} {raw:?}: {error}")))
}

fn encode_form(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<String>>()
        .join("&")
}
