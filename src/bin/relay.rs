//! gyro-relay: WebSocket fan-out relay for phone orientation samples.
//!
//! Every message a peer sends on the WebSocket path is forwarded verbatim to
//! all connected peers. Plain HTTP requests are served from `--static-dir`
//! (where the phone controller page lives).
//!
//! Usage:
//!   gyro-relay --port 8080 --static-dir public
//!   Open http://<LAN-IP>:8080/controller.html on the phone

use clap::Parser;
use gyro_relay::{RelayConfig, RelayServer};
use std::path::PathBuf;
use std::time::Duration;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "gyro-relay", version, about = "Relay phone orientation to every connected client")]
struct Args {
    /// TOML config file; flags and GYRO_RELAY_* variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Path that accepts WebSocket upgrades.
    #[arg(long)]
    ws_path: Option<String>,

    /// Directory served over plain HTTP.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RelayConfig::load(path).unwrap_or_else(|e| {
            eprintln!("Failed to load {}: {}", path.display(), e);
            std::process::exit(1);
        }),
        None => RelayConfig::default(),
    };
    config.apply_env();
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ws_path) = args.ws_path {
        config.ws_path = ws_path;
    }
    if let Some(dir) = args.static_dir {
        config.static_dir = Some(dir);
    }

    let ws_path = config.ws_path.clone();
    let server = RelayServer::bind(config).unwrap_or_else(|e| {
        eprintln!("Failed to start relay: {}", e);
        std::process::exit(1);
    });

    let addr = server.local_addr();
    eprintln!();
    eprintln!("  Relay running on http://{}", addr);
    eprintln!("  WebSocket:  ws://<your-computer-LAN-IP>:{}{}", addr.port(), ws_path);
    eprintln!();

    let mut last = server.broadcaster().stats();
    loop {
        std::thread::sleep(STATS_INTERVAL);
        let stats = server.broadcaster().stats();
        if stats != last {
            let rate = (stats.messages_relayed - last.messages_relayed) as f64
                / STATS_INTERVAL.as_secs_f64();
            log::info!(
                "{:.1} msg/s, {} client(s), {} accepted, {} dropped",
                rate,
                stats.connected,
                stats.total_accepted,
                stats.dropped_peers
            );
            last = stats;
        }
    }
}
