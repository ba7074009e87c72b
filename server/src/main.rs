use clap::Parser;
use log::info;
use server::config::Args;
use server::network::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let tick_rate = args.tick_rate;
    let max_clients = args.max_clients;
    let config = args.into_config()?;

    info!("Starting server...");
    info!(
        "Tick rate: {}Hz, max clients: {}, client timeout: {}s",
        tick_rate,
        max_clients,
        config.client_timeout.as_secs()
    );

    let mut server = Server::new(config).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received");
                shutdown.shutdown();
            }
            Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
