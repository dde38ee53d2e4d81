//! Modbus RTU request encoding
//!
//! A [`Command`] is a complete request ADU: slave address, function code,
//! big-endian fields and the little-endian CRC. Commands are immutable once
//! built and cheap to clone.

use bytes::Bytes;
use tracing::debug;

use crate::checksum;
use crate::config::DeviceAddress;
use crate::constants::{FC_READ_HOLDING_REGISTERS, FC_WRITE_SINGLE_REGISTER, REG_STATUS};

/// Encoded request ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    bytes: Bytes,
}

impl Command {
    /// Raw bytes including the CRC
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Target slave address
    #[inline]
    pub fn address(&self) -> DeviceAddress {
        self.bytes[0]
    }

    /// Function code
    #[inline]
    pub fn function_code(&self) -> u8 {
        self.bytes[1]
    }

    /// Encoded length
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: a built command carries at least address, function and CRC
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Get human-readable function code description
    pub fn function_code_description(fc: u8) -> &'static str {
        match fc & 0x7F {
            FC_READ_HOLDING_REGISTERS => "Read Holding Registers",
            FC_WRITE_SINGLE_REGISTER => "Write Single Register",
            _ => "Unknown Function",
        }
    }
}

impl AsRef<[u8]> for Command {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Command builder - fluent API
pub struct CommandBuilder {
    buf: Vec<u8>,
}

impl CommandBuilder {
    /// Start a request for `address` with function code `fc`
    #[inline]
    pub fn new(address: DeviceAddress, fc: u8) -> Self {
        let mut buf = Vec::with_capacity(8);
        buf.push(address);
        buf.push(fc);
        Self { buf }
    }

    /// Add a byte
    #[inline]
    pub fn byte(mut self, b: u8) -> Self {
        self.buf.push(b);
        self
    }

    /// Add u16 in big-endian
    #[inline]
    pub fn word(mut self, value: u16) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Append the CRC and freeze the command
    pub fn build(mut self) -> Command {
        checksum::append(&mut self.buf);
        debug!(
            "Command built: slave={} FC={:02X} ({}), total_len={}",
            self.buf[0],
            self.buf[1],
            Command::function_code_description(self.buf[1]),
            self.buf.len()
        );
        Command {
            bytes: Bytes::from(self.buf),
        }
    }
}

/// Build a read holding registers request (FC03)
///
/// # Arguments
/// * `address` - Slave address
/// * `start_register` - First register to read
/// * `count` - Number of registers
pub fn read_holding_registers(address: DeviceAddress, start_register: u16, count: u16) -> Command {
    CommandBuilder::new(address, FC_READ_HOLDING_REGISTERS)
        .word(start_register)
        .word(count)
        .build()
}

/// Build a write single register request (FC06)
///
/// # Arguments
/// * `address` - Slave address
/// * `register` - Register to write
/// * `value` - Register value
pub fn write_single_register(address: DeviceAddress, register: u16, value: u16) -> Command {
    CommandBuilder::new(address, FC_WRITE_SINGLE_REGISTER)
        .word(register)
        .word(value)
        .build()
}

/// Read of the one-register presence status
#[inline]
pub fn read_presence(address: DeviceAddress) -> Command {
    read_holding_registers(address, REG_STATUS, 1)
}
