//! Command-line commands

use std::collections::HashMap;

use crate::deploy::fsm::Action;
use crate::errors::ConsoleError;
use crate::models::deployment::{DeploymentId, Environment};

/// One invocation of the console
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Version,
    Login { username: String, password: String },
    Logout,
    Status(DeploymentId),
    Watch(DeploymentId),
    Issue { deployment_id: DeploymentId, action: Action },
    Logs(DeploymentId),
}

/// Parse `--key=value` and `--flag` arguments
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> HashMap<String, String> {
    let mut cli_args = HashMap::new();
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }
    cli_args
}

impl Command {
    pub fn from_args(cli_args: &HashMap<String, String>) -> Result<Self, ConsoleError> {
        if cli_args.contains_key("version") {
            return Ok(Command::Version);
        }
        if cli_args.contains_key("login") {
            return Ok(Command::Login {
                username: required(cli_args, "username")?.to_string(),
                password: required(cli_args, "password")?.to_string(),
            });
        }
        if cli_args.contains_key("logout") {
            return Ok(Command::Logout);
        }
        if let Some(name) = cli_args.get("action") {
            let environment = match cli_args.get("environment") {
                Some(value) => value.parse::<Environment>().map_err(ConsoleError::ValidationError)?,
                None => Environment::default(),
            };
            let action = Action::parse(
                name,
                cli_args.get("deploy-path").cloned(),
                environment,
            )
            .map_err(ConsoleError::ValidationError)?;
            return Ok(Command::Issue {
                deployment_id: deployment_id(cli_args)?,
                action,
            });
        }
        if cli_args.contains_key("status") {
            return Ok(Command::Status(deployment_id(cli_args)?));
        }
        if cli_args.contains_key("watch") {
            return Ok(Command::Watch(deployment_id(cli_args)?));
        }
        if cli_args.contains_key("logs") {
            return Ok(Command::Logs(deployment_id(cli_args)?));
        }
        Err(ConsoleError::ValidationError(
            "no command given, expected one of --status, --watch, --action, --logs, --login, --logout, --version"
                .to_string(),
        ))
    }
}

fn required<'a>(cli_args: &'a HashMap<String, String>, key: &str) -> Result<&'a str, ConsoleError> {
    cli_args
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConsoleError::ValidationError(format!("--{} is required", key)))
}

fn deployment_id(cli_args: &HashMap<String, String>) -> Result<DeploymentId, ConsoleError> {
    let raw = required(cli_args, "deployment")?;
    raw.parse()
        .map_err(|_| ConsoleError::ValidationError(format!("invalid deployment id: {}", raw)))
}
