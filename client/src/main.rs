use clap::Parser;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless arena client", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Seed for the scripted input; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Disconnect after this many seconds
    #[arg(short = 'd', long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Input seed: {}", seed);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let mut client = client::network::Client::new(&args.server, args.fake_ping, seed).await?;
    client.run(args.duration.map(Duration::from_secs)).await?;

    Ok(())
}
