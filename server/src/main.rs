use std::sync::atomic::AtomicBool;

use clap::Parser;
use dbglink::peer::Engine;
use log::info;

/// Debug engine emulator answering the host side of the link.
#[derive(Debug, Parser)]
#[command(name = "server", version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:20000")]
    bind: String,

    /// Largest packet size the engine accepts
    #[arg(long, default_value_t = 1024)]
    packlen: usize,

    /// Send a notification before every Nth reply (0 = never)
    #[arg(long, default_value_t = 0)]
    notify_every: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut engine = Engine::bind(cli.bind.as_str(), cli.packlen, cli.notify_every)?;
    info!("Engine ready on {}", engine.local_addr()?);

    // Runs until the process is killed.
    let stop = AtomicBool::new(false);
    engine.serve_until(&stop)?;

    let stats = engine.stats();
    info!("Served {} connects, {} replies", stats.connects, stats.replies);
    Ok(())
}
