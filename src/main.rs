mod cli;

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use repokit::auth::{
    KeyringTokenSource, SystemAuth, TokenSource, clear_access_token, now_epoch,
    resolve_access_token,
};
use repokit::config::{Config, config_path};
use repokit::github::{
    Contents, GitHubService, Repo, ServiceWithAccessTokenConfig, ServiceWithOAuth2Config,
};
use repokit::logging::init_logging;

use crate::cli::{CliCommand, USAGE, parse_args};

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let command = parse_args(&args)?;
    match command {
        CliCommand::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        CliCommand::AuthReset => return handle_auth_reset(),
        _ => {}
    }

    let config = Config::load()?;
    let service = build_service(&config, requires_oauth2(&command))?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(&service, command))
}

fn requires_oauth2(command: &CliCommand) -> bool {
    matches!(
        command,
        CliCommand::AuthUrl { .. } | CliCommand::AuthCode { .. } | CliCommand::AuthValidate
    )
}

fn build_service(config: &Config, requires_oauth2: bool) -> Result<GitHubService> {
    let service = match config.oauth2() {
        Some(settings) => {
            tracing::debug!(client_id = %settings.client_id, "using OAuth2 authorization");
            GitHubService::new_with_oauth2(ServiceWithOAuth2Config {
                client_id: settings.client_id.clone(),
                client_secret: settings.client_secret.clone(),
                token_source: Arc::new(KeyringTokenSource::new()),
                redirect_url: settings.redirect_url.clone(),
                refresh_margin: settings.refresh_margin(),
            })?
        }
        None if requires_oauth2 => bail!(
            "auth commands need an [oauth2] client_id in {}",
            config_path().display()
        ),
        None => {
            let token = resolve_access_token(&SystemAuth::new(), config.access_token.as_deref())?;
            tracing::debug!(source = token.method.label(), "using access token");
            GitHubService::new_with_access_token(ServiceWithAccessTokenConfig {
                access_token: token.value,
            })?
        }
    };

    Ok(match config.api_base.as_deref() {
        Some(api_base) => service.with_api_base(api_base),
        None => service,
    })
}

async fn run(service: &GitHubService, command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Repo { owner, repo } => {
            let repo = service.get_repo(&owner, &repo).await?;
            print_repo(&repo);
        }
        CliCommand::Contents { owner, repo, path } => {
            let entries = service.get_contents(&owner, &repo, &path).await?;
            print_contents(&entries);
        }
        CliCommand::AuthUrl { scope, state } => {
            println!("{}", service.authorize_url(&scope, state.as_deref())?);
        }
        CliCommand::AuthCode { callback, state } => {
            let token = service
                .get_token_from_code(&callback, state.as_deref())
                .await?;
            println!("Token stored (scope: {}).", display_scope(&token.scope));
        }
        CliCommand::AuthValidate => {
            let token = service.validate_token().await?;
            match token.expires_at {
                Some(expires_at) => println!(
                    "Token valid, expires in {}s.",
                    expires_at.saturating_sub(now_epoch())
                ),
                None => println!("Token valid, no expiry."),
            }
        }
        CliCommand::Help | CliCommand::AuthReset => {}
    }
    tracing::debug!(calls = service.api_call_count(), "done");
    Ok(())
}

fn handle_auth_reset() -> Result<()> {
    let cleared_token = clear_access_token(&SystemAuth::new())?;
    let cleared_oauth2 = KeyringTokenSource::new().clear_token()?;
    if cleared_token || cleared_oauth2 {
        println!("Stored credentials removed from keychain.");
        return Ok(());
    }

    println!("No stored credentials found.");
    Ok(())
}

fn print_repo(repo: &Repo) {
    println!("{}", repo.full_name);
    if let Some(description) = repo.description.as_deref().filter(|text| !text.is_empty()) {
        println!("  {}", description);
    }
    println!(
        "  visibility: {}  default branch: {}",
        if repo.private { "private" } else { "public" },
        repo.default_branch
    );
    println!(
        "  stars: {}  forks: {}  open issues: {}",
        repo.stargazers_count, repo.forks_count, repo.open_issues_count
    );
    if let Some(license) = repo.license.as_ref() {
        println!("  license: {}", license.name);
    }
    println!("  {}", repo.html_url);
}

fn print_contents(entries: &[Contents]) {
    for entry in entries {
        let marker = if entry.is_dir() { "/" } else { "" };
        println!("{:<9} {:>10}  {}{}", entry.content_type, entry.size, entry.path, marker);
    }
}

fn display_scope(scope: &str) -> &str {
    if scope.is_empty() { "none" } else { scope }
}
