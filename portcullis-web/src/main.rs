//! Portcullis Web Server
//!
//! Session login, registration and role-gated pages.

use anyhow::Context;
use clap::Parser;
use portcullis_core::init_logging;
use portcullis_web::{PortcullisServerBuilder, WebConfig};
use std::path::PathBuf;

/// Portcullis Web Server - session-based login with role-gated pages
#[derive(Parser)]
#[command(name = "portcullis-web")]
#[command(about = "Session-based authentication front end")]
#[command(version)]
struct Args {
    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Database URL for credential storage (e.g. sqlite://portcullis.db?mode=rwc)
    #[arg(long)]
    database_url: Option<String>,

    /// TOML file with session, registration and logging settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mark cookies Secure (serve behind TLS)
    #[arg(long)]
    secure_cookies: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Create web configuration, command line wins over the environment
    let mut config = WebConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.secure_cookies |= args.secure_cookies;
    if args.database_url.is_some() {
        config.database_url = args.database_url;
    }
    if args.config.is_some() {
        config.config_path = args.config;
    }

    let mut settings = config
        .load_settings()
        .context("Failed to load Portcullis settings")?;
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }
    init_logging(&settings.logging).context("Failed to initialize logging")?;

    // Print startup information
    println!("Starting Portcullis Web Server");
    println!("Server: http://{}", config.address());
    match &config.database_url {
        Some(url) => println!("Database: {}", url),
        None => println!("Database: in-memory (identities are lost on restart)"),
    }
    if settings.bootstrap_admin.is_none() {
        println!("No bootstrap administrator configured; /admin is unreachable until one exists");
    }

    let server = PortcullisServerBuilder::new()
        .config(config)
        .settings(settings)
        .build()
        .await
        .context("Failed to build server")?;

    server.start().await.context("Server failed")?;

    println!("Server shut down gracefully");
    Ok(())
}
