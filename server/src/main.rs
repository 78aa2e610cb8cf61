use clap::Parser;
use log::{error, info};
use server::config::{self, ServerConfig};
use server::console::{self, Command, Reply};
use server::network::Server;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the listener to
    #[arg(short = 'H', long, default_value = config::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Maximum players connected across all rooms
    #[arg(short, long, default_value_t = config::DEFAULT_MAX_PLAYERS)]
    max_players: usize,

    /// Slots per room
    #[arg(short, long, default_value_t = config::DEFAULT_ROOM_CAPACITY)]
    room_capacity: usize,

    /// Size of each read from a client, in bytes
    #[arg(long, default_value_t = shared::DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Per-read timeout in milliseconds
    #[arg(long, default_value = "500")]
    read_timeout_ms: u64,

    /// Per-send timeout in milliseconds
    #[arg(long, default_value = "1000")]
    send_timeout_ms: u64,

    /// Silence in milliseconds after which a player is dropped
    #[arg(long, default_value = "5000")]
    liveness_timeout_ms: u64,

    /// Room loop spacing in milliseconds
    #[arg(short, long, default_value = "50")]
    tick_ms: u64,

    /// Start listening immediately instead of waiting for `start`
    #[arg(short, long)]
    listen: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            max_players: self.max_players,
            room_capacity: self.room_capacity,
            buffer_size: self.buffer_size,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            liveness_timeout: Duration::from_millis(self.liveness_timeout_ms),
            tick_interval: Duration::from_millis(self.tick_ms),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let autostart = args.listen;
    let server = Server::new(args.into_config())?;

    info!(
        "Server configured for {} players in rooms of {}",
        server.config().max_players,
        server.config().room_capacity
    );
    if autostart {
        let addr = server.begin_listening().await?;
        println!("Listening on {addr}");
    }
    println!("Commands: start, stop, userinfo, rooms, exit");

    tokio::select! {
        result = run_console(&server) => {
            if let Err(e) = result {
                error!("Console failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down...");
        }
    }

    if server.is_listening() {
        server.stop()?;
    }
    Ok(())
}

/// Reads commands from stdin until `exit` or end of input
async fn run_console(server: &Server) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match console::execute(server, Command::parse(&line)).await {
            Reply::Output(text) if text.is_empty() => {}
            Reply::Output(text) => println!("{text}"),
            Reply::Exit => break,
        }
    }
    Ok(())
}
