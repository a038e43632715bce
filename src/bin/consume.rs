//! gyro-consume: headless orientation consumer.
//!
//! Connects to a relay (or polls a controller page), runs the smoothing
//! filter at a fixed frame rate and prints the rotation it would apply.
//!
//! Usage:
//!   gyro-consume --host 192.168.0.18
//!   gyro-consume --url https://example.github.io/controller --marker "Orientation:"
//! Press Ctrl+C to stop.

use clap::Parser;
use gyro_relay::{ConsumerConfig, OrientationConsumer, PartialParse, TransportConfig};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "gyro-consume", version, about = "Print the smoothed phone orientation")]
struct Args {
    /// TOML config file; flags override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Relay host for the WebSocket transport.
    #[arg(long, conflicts_with = "url")]
    host: Option<String>,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    #[arg(long, default_value = "/ws")]
    path: String,

    /// Poll this page instead of using WebSocket.
    #[arg(long)]
    url: Option<String>,

    /// Text preceding `[x, y, z, w]` in the polled page.
    #[arg(long, default_value = "Orientation:")]
    marker: String,

    /// Keep previous components when a polled field fails to parse.
    #[arg(long)]
    lenient: bool,

    /// Smoothing rate in 1/s.
    #[arg(long)]
    rate: Option<f32>,

    /// Euler offset in degrees: x,y,z.
    #[arg(long, value_delimiter = ',', num_args = 3)]
    offset: Option<Vec<f32>>,

    /// Render ticks per second.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Log every ignored message and failed poll.
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> gyro_relay::Result<ConsumerConfig> {
    let mut config = match &args.config {
        Some(path) => ConsumerConfig::load(path)?,
        None => ConsumerConfig::default(),
    };
    config.apply_env();

    if let Some(url) = &args.url {
        config.transport = TransportConfig::HttpPoll {
            url: url.clone(),
            marker: args.marker.clone(),
            interval_ms: 16,
            request_timeout_ms: 2000,
            partial_parse: if args.lenient {
                PartialParse::Lenient
            } else {
                PartialParse::Strict
            },
        };
    } else if let Some(host) = &args.host {
        config.transport = TransportConfig::websocket(host.clone(), args.port, args.path.clone());
    }
    if let Some(rate) = args.rate {
        config.smoothing_rate = rate;
    }
    if let Some(offset) = &args.offset {
        config.euler_offset_deg = [offset[0], offset[1], offset[2]];
    }
    config.verbose |= args.verbose;
    config.validate()?;
    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args).unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });

    let mut consumer = OrientationConsumer::from_config(&config).unwrap_or_else(|e| {
        eprintln!("Failed to create consumer: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = consumer.start() {
        eprintln!("Failed to start consumer: {}", e);
        std::process::exit(1);
    }

    eprintln!("Consuming {:?} (Ctrl+C to stop)...", config.transport);

    let frame = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    let mut last_tick = Instant::now();
    let mut last_report = Instant::now();

    loop {
        std::thread::sleep(frame);
        let now = Instant::now();
        let rotation = consumer.tick_duration(now - last_tick);
        last_tick = now;

        if now.duration_since(last_report) >= Duration::from_millis(500) {
            last_report = now;
            let euler = consumer.filter().current_euler_deg();
            println!(
                "state={:<12} samples={:<8} quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]  euler=[{:+7.1}, {:+7.1}, {:+7.1}]",
                consumer.connection_state().to_string(),
                consumer.shared().samples_received(),
                rotation.x,
                rotation.y,
                rotation.z,
                rotation.w,
                euler.x,
                euler.y,
                euler.z,
            );
        }
    }
}
