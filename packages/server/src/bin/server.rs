//! ClubKnight lobby server.
//!
//! Accepts WebSocket connections on `/ws`, holds them in a bounded waiting
//! pool until they log in, and promotes authenticated players into the lobby.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin clubknight-server
//! cargo run --bin clubknight-server -- --port 3000 --lobby-capacity 20 --seed-token alice:ABCDEF
//! ```

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use clap::Parser;
use clubknight_server::{
    config::{
        DEFAULT_LOBBY_CAPACITY, DEFAULT_SCHEDULER_INTERVAL_MS, DEFAULT_WAIT_CAPACITY,
        DEFAULT_WAIT_TIMEOUT_MS, LobbyConfig,
    },
    infrastructure::auth::InMemoryAuthStore,
    ui::Server,
    usecase::spawn_lobby,
};
use clubknight_shared::{logger::setup_logger, time::SystemClock};

/// Lifetime of tokens seeded from the command line
const SEED_TOKEN_TTL_HOURS: i64 = 1;

#[derive(Parser, Debug)]
#[command(name = "clubknight-server")]
#[command(about = "Lobby server with bounded admission", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Waiting slots for connections that have not been admitted yet
    #[arg(long, default_value_t = DEFAULT_WAIT_CAPACITY)]
    wait_capacity: usize,

    /// Lobby seats
    #[arg(long, default_value_t = DEFAULT_LOBBY_CAPACITY)]
    lobby_capacity: usize,

    /// Delay between admission ticks, in milliseconds
    #[arg(long, default_value_t = DEFAULT_SCHEDULER_INTERVAL_MS)]
    scheduler_interval_ms: u64,

    /// Close waiting connections that have not logged in after this many milliseconds (0 disables)
    #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT_MS)]
    wait_timeout_ms: u64,

    /// Auth record to preload, as NETID:TOKEN (repeatable)
    #[arg(long = "seed-token", value_parser = parse_seed_token)]
    seed_tokens: Vec<(String, String)>,
}

fn parse_seed_token(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((netid, token)) if !netid.is_empty() && !token.is_empty() => {
            Ok((netid.to_string(), token.to_string()))
        }
        _ => Err(format!("expected NETID:TOKEN, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    setup_logger(&[env!("CARGO_PKG_NAME"), "tower_http"], "debug");

    let args = Args::parse();

    let config = LobbyConfig::new(
        args.wait_capacity,
        args.lobby_capacity,
        args.scheduler_interval_ms,
        args.wait_timeout_ms,
    )?;
    tracing::info!("Lobby configuration: {:?}", config);

    let auth = Arc::new(InMemoryAuthStore::new());
    let expire = (Utc::now() + TimeDelta::hours(SEED_TOKEN_TTL_HOURS)).timestamp_millis();
    for (netid, token) in &args.seed_tokens {
        auth.add_auth(netid, token, expire).await;
    }

    let (lobby, tasks) = spawn_lobby(config, auth, Arc::new(SystemClock));

    Server::new(lobby).run(args.host, args.port).await?;

    if let Err(e) = tasks.dispatcher.await {
        tracing::error!("Lobby dispatcher task failed: {}", e);
    }
    tasks.scheduler.abort();

    Ok(())
}
