//! Modbus RTU frames and stream reassembly
//!
//! RTU framing carries no delimiter on a TCP stream. The [`FrameAssembler`]
//! sizes each candidate frame from its function code (and byte count for
//! register reads), verifies the CRC, and resynchronizes one byte at a time
//! when the leading bytes do not look like a response. Any other function
//! code, write echoes included, is resynchronized as noise.
//!
//! ## Accepted layouts
//!
//! | Function | Layout | Length |
//! |----------|--------|--------|
//! | 0x03 | addr, fc, n, data[n], crc | 5 + n |
//! | fc \| 0x80 | addr, fc, code, crc | 5 |

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::checksum;
use crate::config::DeviceAddress;
use crate::constants::{
    CRC_LEN, DEFAULT_MAX_BUFFERED_BYTES, EXCEPTION_FLAG, EXCEPTION_FRAME_LEN,
    FC_READ_HOLDING_REGISTERS, MIN_FRAME_LEN, MIN_RESPONSE_LEN, READ_RESPONSE_HEADER_LEN,
};
use crate::error::{GatewayError, GatewayResult};
use crate::logging::format_hex_packet;

/// A CRC-valid Modbus RTU frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Validate length and CRC of a complete frame
    pub fn new(bytes: impl Into<Bytes>) -> GatewayResult<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_FRAME_LEN {
            return Err(GatewayError::frame(format!(
                "Frame too short: {} bytes (min {})",
                bytes.len(),
                MIN_FRAME_LEN
            )));
        }
        if !checksum::verify(&bytes) {
            return Err(GatewayError::frame(format!(
                "CRC mismatch: {}",
                format_hex_packet(&bytes)
            )));
        }
        Ok(Self { bytes })
    }

    /// Slave address (byte 0)
    #[inline]
    pub fn address(&self) -> DeviceAddress {
        self.bytes[0]
    }

    /// Function code (byte 1)
    #[inline]
    pub fn function_code(&self) -> u8 {
        self.bytes[1]
    }

    /// Check if exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code() & EXCEPTION_FLAG != 0
    }

    /// Bytes between the function code and the CRC
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..self.bytes.len() - CRC_LEN]
    }

    /// Complete frame including the CRC
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Frame length
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a validated frame
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Counters kept by a [`FrameAssembler`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Frames that passed the CRC check and were emitted
    pub frames: u64,
    /// Sized frames dropped for a CRC mismatch
    pub crc_errors: u64,
    /// Exception responses consumed
    pub exception_frames: u64,
    /// Single bytes dropped while resynchronizing
    pub noise_bytes: u64,
    /// Times the buffer exceeded its cap and was discarded
    pub overflow_resets: u64,
}

/// Incremental extractor of RTU frames from a byte stream
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    max_buffered: usize,
    stats: AssemblerStats,
}

/// Outcome of one extraction step
enum Step {
    /// More bytes are needed before the next frame can be sized
    NeedMore,
    /// Bytes were consumed; maybe with a frame to emit
    Consumed(Option<Frame>),
}

impl FrameAssembler {
    /// Create an assembler with the default buffer cap
    pub fn new() -> Self {
        Self::with_max_buffered(DEFAULT_MAX_BUFFERED_BYTES)
    }

    /// Create an assembler that discards its buffer beyond `max_buffered` bytes
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_buffered.max(MIN_RESPONSE_LEN)),
            max_buffered,
            stats: AssemblerStats::default(),
        }
    }

    /// Append `chunk` and return every complete, CRC-valid frame now available
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while self.buf.len() >= MIN_RESPONSE_LEN {
            match self.step() {
                Step::NeedMore => break,
                Step::Consumed(Some(frame)) => frames.push(frame),
                Step::Consumed(None) => {}
            }
        }

        if self.buf.len() > self.max_buffered {
            warn!(
                "Receive buffer exceeded {} bytes without a frame, discarding {} bytes",
                self.max_buffered,
                self.buf.len()
            );
            self.buf.clear();
            self.stats.overflow_resets += 1;
        }

        frames
    }

    fn step(&mut self) -> Step {
        let fc = self.buf.get(1).copied().unwrap_or(0);

        if fc == FC_READ_HOLDING_REGISTERS {
            if self.buf.len() < READ_RESPONSE_HEADER_LEN {
                return Step::NeedMore;
            }
            let byte_count = self.buf[2] as usize;
            self.take_sized(READ_RESPONSE_HEADER_LEN + byte_count + CRC_LEN)
        } else if fc & EXCEPTION_FLAG != 0 {
            let frame = self.buf.split_to(EXCEPTION_FRAME_LEN);
            warn!(
                "Modbus exception response from slave {}: FC={:02X} code={:02X} [{}]",
                frame[0],
                frame[1] & !EXCEPTION_FLAG,
                frame[2],
                format_hex_packet(&frame)
            );
            self.stats.exception_frames += 1;
            Step::Consumed(None)
        } else {
            debug!("Skipping unknown byte: {:02X}", self.buf[0]);
            self.buf.advance(1);
            self.stats.noise_bytes += 1;
            Step::Consumed(None)
        }
    }

    /// Split off a frame of known length once it is fully buffered
    fn take_sized(&mut self, expected: usize) -> Step {
        if self.buf.len() < expected {
            return Step::NeedMore;
        }
        let candidate = self.buf.split_to(expected).freeze();
        match Frame::new(candidate) {
            Ok(frame) => {
                self.stats.frames += 1;
                Step::Consumed(Some(frame))
            }
            Err(e) => {
                warn!("{}", e);
                self.stats.crc_errors += 1;
                Step::Consumed(None)
            }
        }
    }

    /// Unconsumed bytes currently buffered
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Counters since creation
    #[inline]
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
