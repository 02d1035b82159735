//! Paginated Listing Demo
//!
//! Logs in to an Aqua instance and fetches every item of a list endpoint,
//! whatever the number of pages. Prints the pagination analysis first, then a
//! count and the first few items.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example list_all -- \
//!     --instance https://aqua.example.com \
//!     --username administrator --password 'Password1!'
//!
//! # A different endpoint, smaller pages, with request tracing
//! RUST_LOG=debug cargo run --example list_all -- \
//!     --instance https://aqua.example.com --token eyJhbGciOi... \
//!     --path /api/v1/hosts --per-page-max 200 --debug
//! ```

use anyhow::{Context, Result};
use clap::Parser;

use aquarest_client::{AquaClient, Query};
use aquarest_common::{ClientConfig, LoginCredentials};

#[derive(Parser, Debug)]
#[command(author, version, about = "Aqua paginated listing demo")]
struct Args {
    /// Instance base URL
    #[arg(long, default_value = "https://localhost:8443")]
    instance: String,

    /// Endpoint to list
    #[arg(long, default_value = "/api/v2/images")]
    path: String,

    /// Bearer token; takes precedence over username/password
    #[arg(long)]
    token: Option<String>,

    /// Login user name
    #[arg(long, default_value = "administrator")]
    username: String,

    /// Login password
    #[arg(long)]
    password: Option<String>,

    /// Maximum items per page
    #[arg(long, default_value_t = aquarest_common::DEFAULT_PER_PAGE_MAX)]
    per_page_max: u32,

    /// Number of items to print
    #[arg(long, default_value_t = 3)]
    show: usize,

    /// Trace outgoing request URLs
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = ClientConfig::new()
        .with_instance(&args.instance)?
        .with_per_page_max(args.per_page_max)?
        .with_debug(args.debug);
    let client = AquaClient::new(config)?;

    if let Some(token) = &args.token {
        client.set_token(token.as_str()).await?;
    } else {
        let password = args
            .password
            .context("--password is required when no --token is given")?;
        client
            .login(&LoginCredentials::new(&args.username, password))
            .await
            .context("login failed")?;
        println!("Logged in as {}", args.username);
    }

    let query = Query::new();
    let analysis = client.analyze(&args.path, &query).await?;
    println!(
        "{}: paginated={} type={} count={}",
        args.path,
        analysis.supported,
        serde_json::to_string(&analysis.kind)?,
        analysis.count
    );

    let items = client.get_all(&args.path, &query).await?;
    println!("Fetched {} item(s)", items.len());

    for item in items.iter().take(args.show) {
        println!("{}", serde_json::to_string_pretty(item)?);
    }

    Ok(())
}
