//! # Gateway Configuration
//!
//! Connection endpoint, device set and timing for one gateway instance.
//!
//! ## Accepted ranges
//!
//! - **Device addresses**: 1-247, at least one, deduplicated and sorted
//! - **Poll interval**: 0.5 s to 60 s for one full rotation over all devices
//! - **Sensor type**: descriptive only, both variants share one protocol

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_COMMAND_SPACING_MS, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DEQUEUE_TIMEOUT_MS,
    DEFAULT_MAX_BUFFERED_BYTES, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RECONNECT_INTERVAL_MS, MAX_DEVICE_ADDRESS, MAX_POLL_INTERVAL_MS, MAX_SIZED_FRAME_LEN,
    MIN_DEVICE_ADDRESS, MIN_POLL_DELAY_MS, MIN_POLL_INTERVAL_MS,
};
use crate::error::{GatewayError, GatewayResult};

/// Modbus slave unit identifier (1-247)
pub type DeviceAddress = u8;

/// Sensor hardware variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SensorType {
    /// Millimeter wave radar (MSA203D/MSA237D)
    #[default]
    Fmcw,
    /// Passive infrared (MSA236D/MSA238D)
    Ir,
}

impl SensorType {
    /// Configuration key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fmcw => "fmcw",
            Self::Ir => "ir",
        }
    }

    /// Human-readable description with model numbers
    pub fn description(&self) -> &'static str {
        match self {
            Self::Fmcw => "FMCW millimeter wave radar (MSA203D/MSA237D)",
            Self::Ir => "Passive infrared PIR (MSA236D/MSA238D)",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fmcw" | "radar" | "mmwave" => Ok(Self::Fmcw),
            "ir" | "pir" => Ok(Self::Ir),
            other => Err(GatewayError::configuration(format!(
                "Unknown sensor type: {}",
                other
            ))),
        }
    }
}

/// Parse an address list such as `"1,2,3"`, `"1-5"` or `"1,3-5,7"`
///
/// Whitespace is ignored, malformed parts are skipped, values outside 1-247
/// are dropped, and the result is deduplicated and sorted. An empty result
/// means nothing usable was given.
///
/// # Example
///
/// ```rust
/// use presence_gateway::config::parse_addresses;
///
/// assert_eq!(parse_addresses("7, 1-3,3"), vec![1, 2, 3, 7]);
/// assert!(parse_addresses("0,300").is_empty());
/// ```
pub fn parse_addresses(input: &str) -> Vec<DeviceAddress> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut addresses: Vec<u32> = Vec::new();

    for part in compact.split(',') {
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
                // Clamp so that a huge range does not allocate
                let end = end.min(MAX_DEVICE_ADDRESS as u32);
                addresses.extend(start..=end);
            }
        } else if let Ok(addr) = part.parse::<u32>() {
            addresses.push(addr);
        }
    }

    normalize_addresses(
        addresses
            .into_iter()
            .filter(|a| (MIN_DEVICE_ADDRESS as u32..=MAX_DEVICE_ADDRESS as u32).contains(a))
            .map(|a| a as DeviceAddress),
    )
}

fn normalize_addresses(addresses: impl IntoIterator<Item = DeviceAddress>) -> Vec<DeviceAddress> {
    let mut addresses: Vec<DeviceAddress> = addresses.into_iter().collect();
    addresses.sort_unstable();
    addresses.dedup();
    addresses
}

/// Configuration of one gateway instance
///
/// # Example
///
/// ```rust
/// use presence_gateway::{GatewayConfig, SensorType};
/// use std::time::Duration;
///
/// let config = GatewayConfig::new("192.168.1.100", 8899, [5, 3, 3])
///     .with_poll_interval(Duration::from_secs(2))
///     .with_sensor_type(SensorType::Ir);
///
/// assert_eq!(config.device_addresses, vec![3, 5]);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Converter host name or IP
    pub host: String,
    /// Converter TCP port
    pub port: u16,
    /// Polled slave addresses, sorted and deduplicated
    pub device_addresses: Vec<DeviceAddress>,
    /// Time for one full rotation over all addresses
    pub poll_interval: Duration,
    /// Sensor variant
    pub sensor_type: SensorType,
    /// Delay between reconnect attempts
    pub reconnect_interval: Duration,
    /// Upper bound on one connect attempt
    pub connect_timeout: Duration,
    /// Minimum spacing between transmitted commands
    pub command_spacing: Duration,
    /// Transmit loop dequeue wait
    pub dequeue_timeout: Duration,
    /// Floor for the per-device poll delay
    pub min_poll_delay: Duration,
    /// Transmit queue capacity
    pub queue_capacity: usize,
    /// Receive buffer cap
    pub max_buffered_bytes: usize,
    /// Log every packet at info level
    pub packet_logging: bool,
}

impl GatewayConfig {
    /// Create a configuration with default timing
    pub fn new(
        host: impl Into<String>,
        port: u16,
        device_addresses: impl IntoIterator<Item = DeviceAddress>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            device_addresses: normalize_addresses(device_addresses),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            sensor_type: SensorType::default(),
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            command_spacing: Duration::from_millis(DEFAULT_COMMAND_SPACING_MS),
            dequeue_timeout: Duration::from_millis(DEFAULT_DEQUEUE_TIMEOUT_MS),
            min_poll_delay: Duration::from_millis(MIN_POLL_DELAY_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            packet_logging: false,
        }
    }

    /// Create a configuration on the default port from an address list string
    pub fn from_address_list(host: impl Into<String>, addresses: &str) -> Self {
        Self::new(host, DEFAULT_PORT, parse_addresses(addresses))
    }

    /// Set poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set poll interval in seconds.
    pub fn with_poll_interval_secs(self, secs: f64) -> Self {
        // Out-of-range input is caught by validate()
        let interval = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
        self.with_poll_interval(interval)
    }

    /// Set sensor type.
    pub fn with_sensor_type(mut self, sensor_type: SensorType) -> Self {
        self.sensor_type = sensor_type;
        self
    }

    /// Set reconnect interval.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set minimum spacing between commands.
    pub fn with_command_spacing(mut self, spacing: Duration) -> Self {
        self.command_spacing = spacing;
        self
    }

    /// Set transmit dequeue timeout.
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Set per-device poll delay floor.
    pub fn with_min_poll_delay(mut self, delay: Duration) -> Self {
        self.min_poll_delay = delay;
        self
    }

    /// Set transmit queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set receive buffer cap.
    pub fn with_max_buffered_bytes(mut self, max: usize) -> Self {
        self.max_buffered_bytes = max;
        self
    }

    /// Enable or disable packet logging.
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// `host:port` for log records
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `address` is in the configured set
    pub fn has_device(&self, address: DeviceAddress) -> bool {
        self.device_addresses.binary_search(&address).is_ok()
    }

    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> GatewayResult<()> {
        if self.host.trim().is_empty() {
            return Err(GatewayError::configuration("Host must not be empty"));
        }
        if self.port == 0 {
            return Err(GatewayError::configuration("Port must not be 0"));
        }
        if self.device_addresses.is_empty() {
            return Err(GatewayError::configuration(
                "At least one device address is required",
            ));
        }
        if let Some(bad) = self
            .device_addresses
            .iter()
            .find(|a| !(MIN_DEVICE_ADDRESS..=MAX_DEVICE_ADDRESS).contains(*a))
        {
            return Err(GatewayError::configuration(format!(
                "Device address {} outside {}-{}",
                bad, MIN_DEVICE_ADDRESS, MAX_DEVICE_ADDRESS
            )));
        }
        let min = Duration::from_millis(MIN_POLL_INTERVAL_MS);
        let max = Duration::from_millis(MAX_POLL_INTERVAL_MS);
        if self.poll_interval < min || self.poll_interval > max {
            return Err(GatewayError::configuration(format!(
                "Poll interval {:?} outside {:?}-{:?}",
                self.poll_interval, min, max
            )));
        }
        if self.queue_capacity == 0 {
            return Err(GatewayError::configuration(
                "Queue capacity must be at least 1",
            ));
        }
        if self.max_buffered_bytes < MAX_SIZED_FRAME_LEN {
            return Err(GatewayError::configuration(format!(
                "Receive buffer cap must be at least {} bytes",
                MAX_SIZED_FRAME_LEN
            )));
        }
        if self.dequeue_timeout.is_zero() {
            return Err(GatewayError::configuration(
                "Dequeue timeout must be non-zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
