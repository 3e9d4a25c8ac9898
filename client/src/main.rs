use std::time::Instant;

use clap::{Parser, Subcommand};
use dbglink::{Connection, Established, LineConfig};
use log::{info, warn};

/// Talks to a debug engine over the reliable UDP link.
#[derive(Debug, Parser)]
#[command(name = "client", version)]
struct Cli {
    /// Engine host name or IPv4 address
    #[arg(long)]
    node: Option<String>,

    /// Engine UDP port
    #[arg(long)]
    port: Option<u16>,

    /// Local port to bind (0 = any)
    #[arg(long)]
    host_port: Option<u16>,

    /// Requested packet size including the header
    #[arg(long)]
    packlen: Option<usize>,

    /// Receive timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Extra KEY=value settings, applied last
    #[arg(long = "set", value_name = "KEY=value")]
    settings: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect, report the negotiated packet size and disconnect
    Ping,

    /// Send a message and print the reply
    Send {
        /// Message text
        text: String,
    },

    /// Resynchronize sequence numbers
    Sync,

    /// Print pending notifications
    Notify,
}

impl Cli {
    /// Collects every flag as a `KEY=value` setting.
    fn settings(&self) -> Vec<String> {
        let mut settings = Vec::new();
        if let Some(node) = &self.node {
            settings.push(format!("NODE={node}"));
        }
        if let Some(port) = self.port {
            settings.push(format!("PORT={port}"));
        }
        if let Some(port) = self.host_port {
            settings.push(format!("HOSTPORT={port}"));
        }
        if let Some(len) = self.packlen {
            settings.push(format!("PACKLEN={len}"));
        }
        if let Some(secs) = self.timeout {
            settings.push(format!("TIMEOUT={secs}"));
        }
        settings.extend(self.settings.iter().cloned());
        settings
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = LineConfig::new();
    for setting in cli.settings() {
        config.apply(&setting)?;
    }

    info!("Connecting to {}:{}...", config.node, config.port);
    let mut line = Connection::udp(config);
    let start = Instant::now();
    if line.connect()? == Established::New {
        info!(
            "Connected in {:.2} ms, packet size {}",
            start.elapsed().as_secs_f64() * 1000.0,
            line.packet_size()
        );
    }

    let result = run(&mut line, cli.command);
    if let Err(e) = &result {
        warn!("Command failed: {}", e);
    }

    let stats = *line.stats();
    line.disconnect();
    info!(
        "Packets sent {} received {}, retransmissions {}",
        stats.packets_sent, stats.packets_received, stats.retransmissions
    );
    result
}

fn run(line: &mut Connection, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Ping => {
            println!("packet size {}", line.packet_size());
        }
        Command::Send { text } => {
            let start = Instant::now();
            line.transmit(text.as_bytes())?;
            let reply = line.receive()?;
            info!("Reply of {} bytes in {:.2} ms", reply.len(), start.elapsed().as_secs_f64() * 1000.0);
            println!("{}", String::from_utf8_lossy(&reply));
        }
        Command::Sync => {
            line.sync()?;
            println!("receive seq {}, transmit seq {}", line.receive_seq(), line.transmit_seq());
        }
        Command::Notify => {
            let notifications = line.drain_notifications()?;
            if notifications.is_empty() {
                println!("no notifications");
            }
            for notification in notifications {
                println!("kind {} payload {:02x?}", notification.kind(), notification.payload());
            }
        }
    }
    Ok(())
}
