//! aquarest - command line access to an Aqua instance
//!
//! Thin front end over `aquarest-client`: every subcommand maps to one client
//! operation and prints the JSON result. Unset options fall back to the
//! `AQUA_*` environment variables.
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::debug;
use serde_json::Value;

use aquarest_client::{AquaClient, ClientError, Query, RestClient};
use aquarest_common::{ClientConfig, LoginCredentials};

mod display;

#[derive(Parser, Debug)]
#[command(author, version, about = "Query an Aqua instance", long_about = None)]
struct Cli {
    /// Instance base URL (or set AQUA_INSTANCE)
    #[arg(long, global = true)]
    instance: Option<String>,

    /// Port that replaces the one in the instance URL (or set AQUA_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Maximum items requested per page (or set AQUA_PER_PAGE_MAX)
    #[arg(long, global = true)]
    per_page_max: Option<u32>,

    /// Log target URLs of outgoing requests
    #[arg(long, global = true)]
    debug: bool,

    /// Verify TLS certificates
    #[arg(long, global = true)]
    verify_tls: bool,

    /// Bearer token to use instead of logging in
    #[arg(long, env = "AQUA_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Login user name
    #[arg(long, env = "AQUA_USERNAME", global = true)]
    username: Option<String>,

    /// Login password
    #[arg(long, env = "AQUA_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a single GET
    Get(PathArgs),
    /// Issue a single POST
    Post {
        /// Endpoint path, e.g. /api/v2/images
        path: String,
        /// JSON body; `{}` when omitted
        #[arg(long)]
        body: Option<String>,
    },
    /// Fetch every item of a list endpoint, walking all pages
    All(PathArgs),
    /// Report whether an endpoint is paginated
    Analyze(PathArgs),
    /// Log in and report success
    Login,
}

#[derive(Args, Debug)]
struct PathArgs {
    /// Endpoint path, e.g. /api/v2/images
    path: String,

    /// Query parameter as key=value; repeat for more
    #[arg(short = 'q', long = "query", value_parser = parse_pair)]
    query: Vec<(String, String)>,
}

impl PathArgs {
    fn query(&self) -> Query {
        self.query.iter().cloned().collect()
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("Invalid AQUA_* environment")?;

    if let Some(instance) = &cli.instance {
        config.set_instance(instance)?;
    }
    if cli.port.is_some() {
        config.port = cli.port;
    }
    if let Some(per_page_max) = cli.per_page_max {
        config.set_per_page_max(per_page_max)?;
    }
    config.debug |= cli.debug;
    config.verify_tls |= cli.verify_tls;

    if config.instance.is_none() {
        bail!("No instance configured; pass --instance or set AQUA_INSTANCE");
    }
    Ok(config)
}

fn credentials(cli: &Cli) -> Option<LoginCredentials> {
    match (&cli.username, &cli.password) {
        (Some(username), Some(password)) => Some(LoginCredentials::new(username, password)),
        _ => None,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    debug!("using {config:?}");
    let client = AquaClient::new(config)?;

    if matches!(cli.command, Command::Login) {
        let creds = credentials(&cli)
            .context("Login needs --username and --password (or AQUA_USERNAME/AQUA_PASSWORD)")?;
        client.login(&creds).await?;
        display::status_ok("Login succeeded");
        return Ok(());
    }

    if let Some(token) = &cli.token {
        client.set_token(token.as_str()).await?;
    } else if let Some(creds) = credentials(&cli) {
        client.login(&creds).await?;
    } else {
        display::status_warn("No token or credentials given; sending unauthenticated requests");
    }

    match &cli.command {
        Command::Get(args) => {
            let response = client.get(&args.path, args.query()).await?;
            display::print_json(&response)?;
        }
        Command::Post { path, body } => {
            let body: Value = match body {
                Some(raw) => serde_json::from_str(raw).context("--body is not valid JSON")?,
                None => Value::Object(serde_json::Map::new()),
            };
            let response = client.post(path, body).await?;
            display::print_json(&response)?;
        }
        Command::All(args) => {
            let items = client.get_all(&args.path, &args.query()).await?;
            display::print_json(&items)?;
            display::status_ok(&format!("{} item(s)", items.len()));
        }
        Command::Analyze(args) => {
            let analysis = client.analyze(&args.path, &args.query()).await?;
            display::print_json(&analysis)?;
        }
        Command::Login => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(ClientError::AuthenticationFailed(_)) = err.downcast_ref::<ClientError>() {
                display::status_error(&format!("{err}; check the credentials"));
            } else {
                display::status_error(&format!("{err:#}"));
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair("registry=Docker Hub").unwrap(),
            ("registry".to_string(), "Docker Hub".to_string())
        );
        assert_eq!(
            parse_pair("filter=a=b").unwrap(),
            ("filter".to_string(), "a=b".to_string())
        );
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "aquarest",
            "--instance",
            "https://aqua.example.com",
            "all",
            "/api/v2/images",
            "-q",
            "registry=Docker Hub",
            "-q",
            "scope=prod",
        ])
        .unwrap();

        assert!(matches!(
            &cli.command,
            Command::All(args) if args.path == "/api/v2/images" && args.query().len() == 2
        ));
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::try_parse_from([
            "aquarest",
            "get",
            "/",
            "--instance",
            "https://aqua.example.com",
            "--port",
            "8443",
            "--per-page-max",
            "250",
            "--verify-tls",
        ])
        .unwrap();

        let config = build_config(&cli).unwrap();
        assert_eq!(config.port, Some(8443));
        assert_eq!(config.per_page_max, 250);
        assert!(config.verify_tls);
    }

    #[test]
    fn test_cli_rejects_malformed_query() {
        let result = Cli::try_parse_from(["aquarest", "get", "/", "-q", "oops"]);
        assert!(result.is_err());
    }
}
