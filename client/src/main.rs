use clap::Parser;
use client::engine::EngineOptions;
use client::input::KEY_HELP;
use client::network::{Client, ClientOptions};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Nickname to play as
    nick: String,

    /// Server host name or address
    server: String,

    /// Server port
    #[arg(short = 'p', long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Register in tetrifast mode (no delay after a piece locks)
    #[arg(long)]
    fast: bool,

    /// Lock hard-dropped pieces immediately
    #[arg(long)]
    noslide: bool,

    /// Allow one row of slide after a hard drop (overrides --noslide)
    #[arg(long)]
    slide: bool,

    /// Behave like the Windows client; implies --noslide
    #[arg(long)]
    windows: bool,

    /// Send the registration line without the legacy obfuscation
    #[arg(long)]
    plain: bool,

    /// Print the own field after every change
    #[arg(long)]
    fields: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let noslide = (args.noslide || args.windows) && !args.slide;
    let options = ClientOptions {
        nick: args.nick,
        server: args.server,
        port: args.port,
        engine: EngineOptions {
            fast: args.fast,
            noslide,
            windows: args.windows,
        },
        plain: args.plain,
        draw_fields: args.fields,
    };

    info!("Starting client...");
    info!("{}", KEY_HELP);

    let mut client = Client::connect(&options).await?;
    if let Err(e) = client.run().await {
        error!("{}", e);
        return Err(e);
    }

    Ok(())
}
