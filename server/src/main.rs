use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use shared::DEFAULT_ROUND_SECONDS;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Length of a round in seconds
    #[arg(short, long, default_value_t = DEFAULT_ROUND_SECONDS)]
    round_seconds: f32,

    /// File the best score is persisted in
    #[arg(short, long, default_value = "best_score.json")]
    best_score_file: PathBuf,

    /// Items spawned at the start of each round
    #[arg(short, long, default_value = "10")]
    spawn_count: usize,

    /// Wait for a client to start the first round
    #[arg(long)]
    no_auto_start: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        max_clients: args.max_clients,
        round_seconds: args.round_seconds,
        auto_start: !args.no_auto_start,
        best_score_path: args.best_score_file,
        spawn_count: args.spawn_count,
        ..ServerConfig::default()
    }
    .with_tick_rate(args.tick_rate);

    info!(
        "Starting server on {} at {}Hz ({}s rounds)",
        config.bind_addr, args.tick_rate, config.round_seconds
    );

    let mut server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
