use std::env;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub mod oauth2;

const DEFAULT_HOST: &str = "github.com";
const DEFAULT_SERVICE: &str = "repokit";
const OAUTH_ACCOUNT: &str = "github.com:oauth2";
const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// An OAuth2 token as returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
    /// Unix seconds. `None` means the token does not expire.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Token {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn needs_refresh(&self, now: i64, margin: Duration) -> bool {
        let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
        self.expires_at
            .is_some_and(|expires_at| now.saturating_add(margin) >= expires_at)
    }
}

pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}

/// Persistence for the OAuth2 token between runs.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Result<Option<Token>>;
    fn set_token(&self, token: &Token) -> Result<()>;
    fn clear_token(&self) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryTokenSource {
    token: Mutex<Option<Token>>,
}

impl MemoryTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: Token) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl TokenSource for MemoryTokenSource {
    fn token(&self) -> Result<Option<Token>> {
        let token = self
            .token
            .lock()
            .map_err(|_| anyhow!("token lock poisoned"))?;
        Ok(token.clone())
    }

    fn set_token(&self, token: &Token) -> Result<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| anyhow!("token lock poisoned"))?;
        *slot = Some(token.clone());
        Ok(())
    }

    fn clear_token(&self) -> Result<bool> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| anyhow!("token lock poisoned"))?;
        Ok(slot.take().is_some())
    }
}

/// Stores the OAuth2 token as JSON in the OS keyring.
pub struct KeyringTokenSource {
    account: String,
}

impl KeyringTokenSource {
    pub fn new() -> Self {
        Self {
            account: OAUTH_ACCOUNT.to_string(),
        }
    }
}

impl Default for KeyringTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource for KeyringTokenSource {
    fn token(&self) -> Result<Option<Token>> {
        let raw = match read_keyring(&self.account)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let token = serde_json::from_str(&raw)
            .with_context(|| "Failed to parse OAuth2 token stored in keyring")?;
        Ok(Some(token))
    }

    fn set_token(&self, token: &Token) -> Result<()> {
        let raw = serde_json::to_string(token)?;
        keyring_entry(&self.account)?.set_password(&raw)?;
        Ok(())
    }

    fn clear_token(&self) -> Result<bool> {
        delete_keyring(&self.account)
    }
}

/// Where a static access token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenMethod {
    Config,
    Env,
    Keyring,
    Prompt,
}

impl AccessTokenMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Env => "env",
            Self::Keyring => "keyring",
            Self::Prompt => "prompt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub method: AccessTokenMethod,
}

pub trait AccessTokenSources {
    fn env_token(&self) -> Result<Option<String>>;
    fn keyring_token(&self) -> Result<Option<String>>;
    fn prompt_token(&self) -> Result<String>;
    fn store_token(&self, token: &str) -> Result<()>;
    fn clear_token(&self) -> Result<bool>;
}

pub fn clear_access_token<S: AccessTokenSources>(sources: &S) -> Result<bool> {
    sources.clear_token()
}

/// Resolves a personal access token: config, then environment, then keyring,
/// then an interactive prompt whose answer is stored for next time.
pub fn resolve_access_token<S: AccessTokenSources>(
    sources: &S,
    configured: Option<&str>,
) -> Result<AccessToken> {
    if let Some(value) = configured.and_then(normalize_token) {
        return Ok(AccessToken {
            value,
            method: AccessTokenMethod::Config,
        });
    }

    if let Some(value) = sources.env_token()? {
        return Ok(AccessToken {
            value,
            method: AccessTokenMethod::Env,
        });
    }

    if let Some(value) = sources.keyring_token()? {
        return Ok(AccessToken {
            value,
            method: AccessTokenMethod::Keyring,
        });
    }

    let token = sources.prompt_token()?;
    sources.store_token(&token)?;
    Ok(AccessToken {
        value: token,
        method: AccessTokenMethod::Prompt,
    })
}

pub struct SystemAuth;

impl SystemAuth {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessTokenSources for SystemAuth {
    fn env_token(&self) -> Result<Option<String>> {
        match env::var(TOKEN_ENV) {
            Ok(value) => Ok(normalize_token(&value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn keyring_token(&self) -> Result<Option<String>> {
        let token = read_keyring(DEFAULT_HOST)?;
        Ok(token.as_deref().and_then(normalize_token))
    }

    fn prompt_token(&self) -> Result<String> {
        let prompt = format!(
            "Paste a GitHub Personal Access Token for {}: ",
            DEFAULT_HOST
        );
        let raw = rpassword::prompt_password(prompt)?;
        normalize_token(&raw).context("Token cannot be empty")
    }

    fn store_token(&self, token: &str) -> Result<()> {
        keyring_entry(DEFAULT_HOST)?.set_password(token)?;
        Ok(())
    }

    fn clear_token(&self) -> Result<bool> {
        delete_keyring(DEFAULT_HOST)
    }
}

fn keyring_entry(account: &str) -> Result<keyring::Entry> {
    let entry = keyring::Entry::new(DEFAULT_SERVICE, account)
        .with_context(|| "Failed to initialize keyring entry")?;
    Ok(entry)
}

fn read_keyring(account: &str) -> Result<Option<String>> {
    match keyring_entry(account)?.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn delete_keyring(account: &str) -> Result<bool> {
    match keyring_entry(account)?.delete_password() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(error) => Err(error.into()),
    }
}

fn normalize_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(trimmed.to_string())
}
