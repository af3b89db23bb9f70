use clap::Parser;
use log::{error, info, warn};
use server::network::Server;
use server::store::ConfigStore;
use std::path::PathBuf;

/// Parses command-line arguments, loads the store and runs the server until
/// interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Address to bind to
        #[clap(short = 'H', long)]
        host: Option<String>,
        /// Port to listen on
        #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
        port: u16,
        /// Settings and win-list file
        #[clap(short, long)]
        config: Option<PathBuf>,
    }

    env_logger::init();
    let args = Args::parse();

    let store = ConfigStore::new(args.config.unwrap_or_else(ConfigStore::default_path));
    let settings = store.load()?;
    if let Err(e) = settings.check() {
        warn!("{}; games cannot start until this is fixed", e);
    }

    let host = args.host.unwrap_or_else(|| {
        if settings.ipv6_only { "::" } else { "0.0.0.0" }.to_string()
    });
    let address = if host.contains(':') {
        format!("[{}]:{}", host, args.port)
    } else {
        format!("{}:{}", host, args.port)
    };

    let mut server = Server::new(&address, store, settings).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                handle.shutdown();
            }
            Err(e) => error!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    server.run().await
}
