use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::oauth2::OAuth2Error;
use crate::http::HttpError;

/// The JSON body GitHub sends with a failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorResponse {
    pub message: String,
    pub documentation_url: Option<String>,
    /// Validation details. GitHub sends objects or plain strings here.
    pub errors: Vec<serde_json::Value>,
}

impl ErrorResponse {
    /// Decodes an error body, keeping `message` even when other fields have
    /// an unexpected shape.
    pub fn from_body(body: &[u8]) -> Self {
        if let Ok(response) = serde_json::from_slice::<Self>(body) {
            return response;
        }
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_default();
        Self {
            message,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),
    /// A failed request whose body carried a message; displays as that message.
    #[error("{message}")]
    Api {
        status: StatusCode,
        message: String,
        response: ErrorResponse,
    },
    #[error(transparent)]
    Http(HttpError),
    #[error(transparent)]
    OAuth2(OAuth2Error),
    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(error) | Self::OAuth2(OAuth2Error::Http(error)) => error.status(),
            _ => None,
        }
    }

    pub fn error_response(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Api { response, .. } => Some(response),
            _ => None,
        }
    }
}

impl From<HttpError> for ServiceError {
    /// Prefers the message from the API's error body over the generic status text.
    fn from(error: HttpError) -> Self {
        if let HttpError::Status { status, body, .. } = &error {
            let response = ErrorResponse::from_body(body);
            if !response.message.is_empty() {
                return Self::Api {
                    status: *status,
                    message: response.message.clone(),
                    response,
                };
            }
        }
        Self::Http(error)
    }
}

impl From<OAuth2Error> for ServiceError {
    fn from(error: OAuth2Error) -> Self {
        match error {
            OAuth2Error::Http(error) => error.into(),
            OAuth2Error::Config(message) => Self::Config(message),
            other => Self::OAuth2(other),
        }
    }
}
