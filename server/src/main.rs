use clap::Parser;
use log::info;
use server::config::game_config;
use server::engine::Engine;
use server::network::Server;
use server::store::{FileStore, GameStore, MemoryStore};
use shared::{COLOR_SEQUENCE_LEN, DEFAULT_COLORS, DEFAULT_PORT, MAX_PLAYTIME, MAX_TRIALS};

/// Main-method of the application.
/// Parses command-line arguments, opens the store and runs the game server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Address to bind both sockets to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Port for both the datagram and the stream channel
        #[clap(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Directory holding GAMES/ and SCORES/
        #[clap(short, long, default_value = ".")]
        data_dir: String,
        /// Log every request and reply
        #[clap(short, long)]
        verbose: bool,
        /// Keep games and scores in memory only
        #[clap(long)]
        in_memory: bool,
        /// Attempts allowed per game
        #[clap(long, default_value_t = MAX_TRIALS)]
        max_trials: u32,
        /// Largest time budget a player may ask for, in seconds
        #[clap(long, default_value_t = MAX_PLAYTIME)]
        max_playtime: u32,
        /// Symbols a secret is drawn from
        #[clap(long, default_value = DEFAULT_COLORS)]
        colors: String,
        /// Symbols per secret
        #[clap(long, default_value_t = COLOR_SEQUENCE_LEN)]
        code_len: usize,
    }

    // Parse command line arguments
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let rules = game_config(&args.colors, args.code_len, args.max_trials, args.max_playtime)?;
    let address = format!("{}:{}", args.host, args.port);

    if args.in_memory {
        info!("Keeping games in memory");
        serve(&address, Engine::new(MemoryStore::new(), rules), args.verbose).await
    } else {
        let store = FileStore::open(&args.data_dir)?;
        info!("Storing games under {}", store.root().display());
        serve(&address, Engine::new(store, rules), args.verbose).await
    }
}

async fn serve<S: GameStore + 'static>(
    address: &str,
    engine: Engine<S>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::bind(address, address, engine, verbose).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
