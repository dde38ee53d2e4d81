//! Protocol constants, register map and timing defaults
//!
//! Frame sizes follow the Modbus RTU serial line definition:
//! - Maximum RTU ADU: 256 bytes (address + PDU + CRC)
//! - Maximum PDU size: 253 bytes

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum RTU frame size (address + PDU + CRC)
pub const MAX_RTU_FRAME_SIZE: usize = 1 + MAX_PDU_SIZE + 2;

/// Length of the trailing CRC-16 field
pub const CRC_LEN: usize = 2;

/// Shortest byte sequence that can carry a CRC check
/// Format: Address(1) + Function(1) + CRC(2) = 4 bytes
pub const MIN_FRAME_LEN: usize = 4;

/// Minimum buffered bytes before the assembler tries to size a frame
///
/// Calculation:
/// - Exception response: Address(1) + Function(1) + Code(1) + CRC(2) = 5 bytes
/// - Shortest register response header plus CRC is also 5 bytes
pub const MIN_RESPONSE_LEN: usize = 5;

/// Exception response length: Address(1) + Function|0x80(1) + Code(1) + CRC(2)
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// Read response header: Address(1) + Function(1) + Byte Count(1)
pub const READ_RESPONSE_HEADER_LEN: usize = 3;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Device Address Range
// ============================================================================

/// Lowest assignable slave address
pub const MIN_DEVICE_ADDRESS: u8 = 1;

/// Highest assignable slave address (248-255 are reserved)
pub const MAX_DEVICE_ADDRESS: u8 = 247;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

// ============================================================================
// Sensor Register Map
// ============================================================================

/// Presence status (0 = no person, non-zero = person detected)
pub const REG_STATUS: u16 = 0x0000;

/// Hold delay after the last detection
pub const REG_DELAY: u16 = 0x0001;

/// Detection sensitivity
pub const REG_SENSITIVITY: u16 = 0x0002;

/// Ambient light threshold
pub const REG_LIGHT_THRESHOLD: u16 = 0x0003;

/// Device Modbus address
pub const REG_DEVICE_ADDRESS: u16 = 0x0004;

// ============================================================================
// Connection and Timing Defaults
// ============================================================================

/// Default TCP port of the serial-to-Ethernet converter
pub const DEFAULT_PORT: u16 = 8899;

/// Default time for one full polling rotation (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Shortest accepted poll interval (milliseconds)
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

/// Longest accepted poll interval (milliseconds)
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Floor for the per-device delay inside one rotation (milliseconds)
pub const MIN_POLL_DELAY_MS: u64 = 100;

/// Delay between reconnect attempts (milliseconds)
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5000;

/// Upper bound on a single connect attempt (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Minimum spacing between two transmitted commands (milliseconds)
pub const DEFAULT_COMMAND_SPACING_MS: u64 = 50;

/// Dequeue wait of the transmit loop before it re-checks (milliseconds)
pub const DEFAULT_DEQUEUE_TIMEOUT_MS: u64 = 1000;

/// Capacity of the transmit queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Longest frame the assembler can size: a register read with byte count 255
pub const MAX_SIZED_FRAME_LEN: usize = READ_RESPONSE_HEADER_LEN + u8::MAX as usize + CRC_LEN;

/// Cap on unconsumed receive bytes before the buffer is discarded
///
/// Must hold the longest sizeable frame, or that frame can never complete.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = MAX_SIZED_FRAME_LEN;

/// Size of one socket read
pub const READ_CHUNK_SIZE: usize = 512;
