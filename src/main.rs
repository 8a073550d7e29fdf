mod config;
mod connection;
mod dispatcher;
mod error;
mod mongo;
mod profiles;
mod query;
mod server;
mod tools;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connection::ConnectionRegistry;
use mongo::MongoConnector;
use profiles::ProfileStore;

/// Backend process for a `MongoDB` browser GUI.
///
/// Exposes connection management, collection browsing, and ad-hoc query
/// execution as MCP tools over JSON-RPC 2.0 on stdin/stdout. Connection
/// profiles are persisted locally; live connections are held only for the
/// lifetime of the process.
#[derive(Parser)]
#[command(name = "mongodb-browser-mcp-rs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MongoDB browser backend (MCP server over stdio)", long_about = None)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments (handles --version and --help automatically)
    let _cli = Cli::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mongodb_browser_mcp_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::Config::load()?;
    tracing::info!(
        "Configuration loaded from {:?}",
        config::Config::config_file()?
    );

    let profiles = ProfileStore::new(config.profiles_file()?);
    tracing::info!("Profile store: {:?}", profiles.path());

    let registry = Arc::new(ConnectionRegistry::new(
        Box::new(MongoConnector::from_config(&config)),
        profiles,
    ));

    let mcp_server = server::McpServer::new(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config,
        registry.clone(),
    );
    mcp_server.run().await?;

    // Transport is gone; sweep whatever connections are still live.
    registry.close_all().await;

    Ok(())
}
