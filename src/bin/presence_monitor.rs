//! Presence Monitor
//!
//! Connects to an RTU-over-TCP converter, polls the given sensors and prints
//! every connectivity and presence change until Ctrl-C.
//!
//! Usage: cargo run --bin presence_monitor -- --host 192.168.1.100 --addresses 1,3-5
//! Log level follows `RUST_LOG` (default `info`).

use std::time::Duration;

use clap::Parser;
use presence_gateway::{
    parse_addresses, GatewayConfig, PresenceGateway, SensorType, DEFAULT_PORT,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Presence sensor monitor over Modbus RTU/TCP
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Converter host name or IP
    #[arg(long)]
    host: String,

    /// Converter TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Sensor addresses, e.g. "1,2,3" or "1,3-5,7"
    #[arg(long, default_value = "1")]
    addresses: String,

    /// Seconds for one full polling rotation (0.5-60)
    #[arg(long, default_value_t = 1.0)]
    poll_interval: f64,

    /// Sensor variant: fmcw or ir
    #[arg(long, default_value = "fmcw")]
    sensor_type: SensorType,

    /// Log every packet as hex at info level
    #[arg(long)]
    packet_logging: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addresses = parse_addresses(&args.addresses);
    if addresses.is_empty() {
        return Err(format!("No valid addresses in '{}'", args.addresses).into());
    }

    let config = GatewayConfig::new(args.host, args.port, addresses)
        .with_poll_interval(Duration::try_from_secs_f64(args.poll_interval)?)
        .with_sensor_type(args.sensor_type)
        .with_packet_logging(args.packet_logging);

    println!("{}", presence_gateway::info());
    println!("  Endpoint: {}", config.endpoint());
    println!("  Sensors:  {} ({})", config.sensor_type, config.sensor_type.description());
    println!("  Devices:  {:?}", config.device_addresses);
    println!("  Poll:     {:?}", config.poll_interval);

    let gateway = PresenceGateway::new(config)?;

    gateway.register_online_callback(|online| {
        println!("[link] {}", if online { "online" } else { "offline" });
    });
    for &address in gateway.device_addresses() {
        gateway.register_presence_callback(address, move |present| {
            println!(
                "[sensor {:>3}] {}",
                address,
                if present { "occupied" } else { "vacant" }
            );
        })?;
    }

    gateway.start()?;
    tokio::signal::ctrl_c().await?;
    println!("\nStopping...");
    gateway.stop().await;

    let stats = gateway.stats();
    println!("Statistics:");
    println!("  Frames received:  {}", stats.frames_received);
    println!("  CRC errors:       {}", stats.crc_errors);
    println!("  Commands sent:    {}", stats.commands_sent);
    println!("  Commands dropped: {}", stats.commands_dropped);
    println!("  Delivery rate:    {:.1}%", stats.delivery_rate() * 100.0);
    println!("  Connections:      {} ({} lost)", stats.connections, stats.disconnects);

    Ok(())
}
