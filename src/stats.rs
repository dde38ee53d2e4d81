//! Gateway statistics
//!
//! Counters are updated lock-free from the background tasks and read as a
//! consistent-enough [`GatewayStats`] snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::AssemblerStats;

/// Snapshot of gateway counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// CRC-valid frames received
    pub frames_received: u64,
    /// Frames dropped for a CRC mismatch
    pub crc_errors: u64,
    /// Exception responses received
    pub exception_frames: u64,
    /// Bytes skipped while resynchronizing
    pub noise_bytes: u64,
    /// Receive buffer discards
    pub buffer_overflows: u64,
    /// Commands accepted by the transmit queue
    pub commands_queued: u64,
    /// Commands handed to the connection
    pub commands_sent: u64,
    /// Commands dropped (queue full, or not connected when dequeued)
    pub commands_dropped: u64,
    /// Connect attempts
    pub connect_attempts: u64,
    /// Successful connects
    pub connections: u64,
    /// Sessions lost to EOF or I/O errors
    pub disconnects: u64,
    /// Bytes written to the transport
    pub bytes_sent: u64,
    /// Bytes read from the transport
    pub bytes_received: u64,
}

impl GatewayStats {
    /// Share of dequeued-or-dropped commands that reached the wire
    pub fn delivery_rate(&self) -> f64 {
        let total = self.commands_sent + self.commands_dropped;
        if total == 0 {
            return 1.0;
        }
        self.commands_sent as f64 / total as f64
    }
}

/// Live counters shared by the gateway tasks
#[derive(Debug, Default)]
pub struct StatsCounters {
    frames_received: AtomicU64,
    crc_errors: AtomicU64,
    exception_frames: AtomicU64,
    noise_bytes: AtomicU64,
    buffer_overflows: AtomicU64,
    commands_queued: AtomicU64,
    commands_sent: AtomicU64,
    commands_dropped: AtomicU64,
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    disconnects: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl StatsCounters {
    /// Add the assembler counter growth between two readings
    pub fn record_assembler(&self, before: AssemblerStats, after: AssemblerStats) {
        add(&self.frames_received, after.frames - before.frames);
        add(&self.crc_errors, after.crc_errors - before.crc_errors);
        add(&self.exception_frames, after.exception_frames - before.exception_frames);
        add(&self.noise_bytes, after.noise_bytes - before.noise_bytes);
        add(&self.buffer_overflows, after.overflow_resets - before.overflow_resets);
    }

    pub fn record_queued(&self) {
        add(&self.commands_queued, 1);
    }

    pub fn record_sent(&self) {
        add(&self.commands_sent, 1);
    }

    pub fn record_dropped(&self) {
        add(&self.commands_dropped, 1);
    }

    pub fn record_connect_attempt(&self) {
        add(&self.connect_attempts, 1);
    }

    pub fn record_connected(&self) {
        add(&self.connections, 1);
    }

    pub fn record_disconnect(&self) {
        add(&self.disconnects, 1);
    }

    pub fn record_bytes_sent(&self, n: usize) {
        add(&self.bytes_sent, n as u64);
    }

    pub fn record_bytes_received(&self, n: usize) {
        add(&self.bytes_received, n as u64);
    }

    /// Read all counters
    pub fn snapshot(&self) -> GatewayStats {
        GatewayStats {
            frames_received: load(&self.frames_received),
            crc_errors: load(&self.crc_errors),
            exception_frames: load(&self.exception_frames),
            noise_bytes: load(&self.noise_bytes),
            buffer_overflows: load(&self.buffer_overflows),
            commands_queued: load(&self.commands_queued),
            commands_sent: load(&self.commands_sent),
            commands_dropped: load(&self.commands_dropped),
            connect_attempts: load(&self.connect_attempts),
            connections: load(&self.connections),
            disconnects: load(&self.disconnects),
            bytes_sent: load(&self.bytes_sent),
            bytes_received: load(&self.bytes_received),
        }
    }
}

#[inline]
fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

#[inline]
fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_assembler_delta() {
        let counters = StatsCounters::default();
        let before = AssemblerStats {
            frames: 2,
            noise_bytes: 5,
            ..Default::default()
        };
        let after = AssemblerStats {
            frames: 5,
            crc_errors: 1,
            noise_bytes: 5,
            ..Default::default()
        };
        counters.record_assembler(before, after);

        let snap = counters.snapshot();
        assert_eq!(snap.frames_received, 3);
        assert_eq!(snap.crc_errors, 1);
        assert_eq!(snap.noise_bytes, 0);
    }

    #[test]
    fn test_delivery_rate() {
        let counters = StatsCounters::default();
        assert_eq!(counters.snapshot().delivery_rate(), 1.0);

        counters.record_sent();
        counters.record_sent();
        counters.record_sent();
        counters.record_dropped();
        assert!((counters.snapshot().delivery_rate() - 0.75).abs() < f64::EPSILON);
    }
}
