//! Packet logging helpers
//!
//! Raw traffic is logged as spaced uppercase hex. With packet logging enabled
//! every chunk goes out at `info`, otherwise at `debug`.

use tracing::{debug, info};

/// Format raw bytes as hex string for packet logging
pub fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log packet with direction
pub fn log_packet(direction: &str, data: &[u8], packet_logging: bool) {
    if packet_logging {
        info!("[MODBUS-RTU] {} {}", direction, format_hex_packet(data));
    } else {
        debug!("[MODBUS-RTU] {} {}", direction, format_hex_packet(data));
    }
}
