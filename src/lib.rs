//! Typed client for the GitHub repository and contents endpoints.
//!
//! [`github::GitHubService`] authenticates either through the OAuth2
//! authorization-code flow or with a static access token, and reports API
//! failures with the message from GitHub's error body.

pub mod auth;
pub mod config;
pub mod github;
pub mod http;
pub mod logging;
