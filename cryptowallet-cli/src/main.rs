//! cryptowallet-cli - Command-line client for cryptowallet
//!
//! Provides both a REPL and one-shot command execution.

mod client;
mod repl;

use clap::Parser;
use client::Client;
use colored::Colorize;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cryptowallet-cli")]
#[command(about = "Command-line client for the cryptowallet server")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, env = "CRYPTOWALLET_SERVER", default_value = "127.0.0.1:8888")]
    server: SocketAddr,

    /// Send these request lines in order and print each response, then exit.
    /// Example: -e "login alice pw" -e "get-wallet-summary"
    #[arg(short, long = "exec")]
    exec: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut client = Client::connect(cli.server).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    if cli.exec.is_empty() {
        return repl::run(client).await;
    }

    // One-shot: same session for every line, so login carries over
    for line in &cli.exec {
        match client.send(line).await {
            Ok(lines) => println!("{}", lines.join("\n")),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
        if client::is_disconnect(line) {
            return Ok(());
        }
    }

    client.close().await?;
    Ok(())
}
