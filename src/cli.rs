use anyhow::{Result, bail};

const DEFAULT_SCOPE: &str = "repo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Repo {
        owner: String,
        repo: String,
    },
    Contents {
        owner: String,
        repo: String,
        path: String,
    },
    AuthUrl {
        scope: String,
        state: Option<String>,
    },
    AuthCode {
        callback: String,
        state: Option<String>,
    },
    AuthValidate,
    AuthReset,
    Help,
}

pub const USAGE: &str = "\
usage:
  repokit repo <owner> <repo>
  repokit contents <owner> <repo> [path]
  repokit auth url [scope] [state]
  repokit auth code <callback-url> [state]
  repokit auth validate
  repokit auth reset";

pub fn parse_args(args: &[String]) -> Result<CliCommand> {
    let words = args.iter().skip(1).map(String::as_str).collect::<Vec<&str>>();

    match words.as_slice() {
        [] | ["help"] | ["-h"] | ["--help"] => Ok(CliCommand::Help),
        ["repo", owner, repo] => Ok(CliCommand::Repo {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }),
        ["contents", owner, repo] => Ok(CliCommand::Contents {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: String::new(),
        }),
        ["contents", owner, repo, path] => Ok(CliCommand::Contents {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.trim_start_matches('/').to_string(),
        }),
        ["auth", "url"] => Ok(CliCommand::AuthUrl {
            scope: DEFAULT_SCOPE.to_string(),
            state: None,
        }),
        ["auth", "url", scope] => Ok(CliCommand::AuthUrl {
            scope: scope.to_string(),
            state: None,
        }),
        ["auth", "url", scope, state] => Ok(CliCommand::AuthUrl {
            scope: scope.to_string(),
            state: Some(state.to_string()),
        }),
        ["auth", "code", callback] => Ok(CliCommand::AuthCode {
            callback: callback.to_string(),
            state: None,
        }),
        ["auth", "code", callback, state] => Ok(CliCommand::AuthCode {
            callback: callback.to_string(),
            state: Some(state.to_string()),
        }),
        ["auth", "validate"] => Ok(CliCommand::AuthValidate),
        ["auth", "reset"] => Ok(CliCommand::AuthReset),
        _ => bail!("unrecognized arguments: {}\n{}", words.join(" "), USAGE),
    }
}
