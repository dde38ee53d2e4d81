//! # Presence Gateway - Modbus RTU/TCP Presence Sensor Gateway
//!
//! **Version:** 0.1.0
//! **License:** MIT
//!
//! Keeps a persistent TCP connection to an RS-485 converter with one or more
//! presence sensors behind it (FMCW radar and PIR units speaking Modbus RTU),
//! polls each sensor's status register in round-robin and publishes presence
//! and connectivity changes to callbacks.
//!
//! ## Features
//!
//! - **Stream reassembly**: RTU frames recovered from arbitrary TCP chunking,
//!   with CRC-16 validation and byte-wise resynchronization
//! - **Paced transmit queue**: bounded FIFO, minimum spacing between commands
//! - **Fair polling**: every device once per poll interval
//! - **Self-healing link**: automatic reconnect with a fixed back-off
//! - **Built-in Monitoring**: frame, drop and connection counters
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Use |
//! |------|----------|-----|
//! | 0x03 | Read Holding Registers | Presence status poll |
//! | 0x06 | Write Single Register | Sensor settings |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use presence_gateway::{GatewayConfig, GatewayResult, PresenceGateway};
//!
//! #[tokio::main]
//! async fn main() -> GatewayResult<()> {
//!     let config = GatewayConfig::from_address_list("192.168.1.100", "1,3-5");
//!     let gateway = PresenceGateway::new(config)?;
//!
//!     gateway.register_online_callback(|online| println!("online: {}", online));
//!     for &address in gateway.device_addresses() {
//!         gateway.register_presence_callback(address, move |present| {
//!             println!("sensor {}: {}", address, present);
//!         })?;
//!     }
//!
//!     gateway.start()?;
//!     tokio::signal::ctrl_c().await.ok();
//!     gateway.stop().await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Protocol modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Protocol constants, register map and timing defaults
pub mod constants;

/// CRC-16/MODBUS
pub mod checksum;

/// Response frames and stream reassembly
pub mod frame;

/// Request encoding
pub mod command;

/// Hex packet logging
pub mod logging;

// ============================================================================
// Runtime modules
// ============================================================================

/// Gateway configuration
pub mod config;

/// Connection supervisor and transport seam
pub mod connection;

/// Paced transmit queue
pub mod transmit;

/// Round-robin poll scheduler
pub mod poll;

/// Ordered callback lists
pub mod observer;

/// Counters and snapshots
pub mod stats;

/// Gateway facade
pub mod gateway;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime ===
pub use tokio;

// === Gateway API ===
pub use config::{parse_addresses, DeviceAddress, GatewayConfig, SensorType};
pub use connection::{ConnectionState, Connector, TcpConnector};
pub use gateway::PresenceGateway;

// === Error handling ===
pub use error::{GatewayError, GatewayResult};

// === Protocol ===
pub use command::{Command, CommandBuilder};
pub use frame::{Frame, FrameAssembler};

// === Monitoring ===
pub use stats::GatewayStats;

// === Register map ===
pub use constants::{
    DEFAULT_PORT, REG_DELAY, REG_DEVICE_ADDRESS, REG_LIGHT_THRESHOLD, REG_SENSITIVITY, REG_STATUS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Presence Gateway v{} - Modbus RTU/TCP presence sensor gateway",
        VERSION
    )
}
