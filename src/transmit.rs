//! Transmit scheduling
//!
//! Every command, polled or ad-hoc, goes through one bounded FIFO. A single
//! loop drains it and hands each command to the current connection with a
//! minimum spacing between commands, so the converter never sees a burst.
//! Producers never block: a full queue drops the new command.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::Command;
use crate::connection::LinkState;
use crate::logging::format_hex_packet;
use crate::stats::StatsCounters;

/// Bounded command queue shared by all producers
#[derive(Debug)]
pub struct TransmitQueue {
    tx: mpsc::Sender<Command>,
    rx: Mutex<Option<mpsc::Receiver<Command>>>,
    stats: Arc<StatsCounters>,
}

impl TransmitQueue {
    pub fn new(capacity: usize, stats: Arc<StatsCounters>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            stats,
        }
    }

    /// Queue a command without waiting
    ///
    /// Returns `false` when the queue is full; the command is dropped.
    pub fn enqueue(&self, command: Command) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => {
                self.stats.record_queued();
                true
            }
            Err(TrySendError::Full(command)) => {
                warn!(
                    "Transmit queue full, dropping command for slave {}",
                    command.address()
                );
                self.stats.record_dropped();
                false
            }
            Err(TrySendError::Closed(command)) => {
                warn!(
                    "Transmit queue closed, dropping command for slave {}",
                    command.address()
                );
                self.stats.record_dropped();
                false
            }
        }
    }

    /// Take the consumer side for a transmit loop
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Command>> {
        self.lock_rx().take()
    }

    /// Give the consumer side back after the loop ended
    pub fn restore_receiver(&self, rx: mpsc::Receiver<Command>) {
        *self.lock_rx() = Some(rx);
    }

    /// Whether the consumer side is parked in the queue
    pub fn has_receiver(&self) -> bool {
        self.lock_rx().is_some()
    }

    /// Commands waiting to be sent
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn lock_rx(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Receiver<Command>>> {
        self.rx.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Pacing of the transmit loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitTiming {
    /// Bounded wait for the next command
    pub dequeue_timeout: Duration,
    /// Minimum gap after each dequeued command
    pub command_spacing: Duration,
}

/// Drain `rx` until `cancel` fires, forwarding to `wire` while connected
///
/// The receiver is returned so the queue outlives the run.
pub async fn run_transmit_loop(
    mut rx: mpsc::Receiver<Command>,
    wire: mpsc::Sender<Command>,
    link: Arc<LinkState>,
    stats: Arc<StatsCounters>,
    timing: TransmitTiming,
    cancel: CancellationToken,
) -> mpsc::Receiver<Command> {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = timeout(timing.dequeue_timeout, rx.recv()) => next,
        };

        let command = match next {
            Ok(Some(command)) => command,
            // All senders gone: nothing can arrive any more
            Ok(None) => break,
            Err(_) => continue,
        };

        if link.is_connected() {
            match wire.try_send(command) {
                Ok(()) => stats.record_sent(),
                Err(e) => {
                    let command = match e {
                        TrySendError::Full(c) | TrySendError::Closed(c) => c,
                    };
                    warn!(
                        "Connection not accepting writes, dropping [{}]",
                        format_hex_packet(command.as_bytes())
                    );
                    stats.record_dropped();
                }
            }
        } else {
            debug!(
                "Not connected, discarding [{}]",
                format_hex_packet(command.as_bytes())
            );
            stats.record_dropped();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(timing.command_spacing) => {}
        }
    }

    debug!("Transmit loop stopped");
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::read_presence;
    use crate::connection::ConnectionState;

    fn timing() -> TransmitTiming {
        TransmitTiming {
            dequeue_timeout: Duration::from_secs(1),
            command_spacing: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_enqueue_drops_when_full() {
        let stats = Arc::new(StatsCounters::default());
        let queue = TransmitQueue::new(2, Arc::clone(&stats));

        assert!(queue.enqueue(read_presence(1)));
        assert!(queue.enqueue(read_presence(2)));
        assert!(!queue.enqueue(read_presence(3)));
        assert_eq!(queue.pending(), 2);

        let snap = stats.snapshot();
        assert_eq!(snap.commands_queued, 2);
        assert_eq!(snap.commands_dropped, 1);
    }

    #[test]
    fn test_take_and_restore_receiver() {
        let queue = TransmitQueue::new(4, Arc::new(StatsCounters::default()));
        let rx = queue.take_receiver().unwrap();
        assert!(queue.take_receiver().is_none());
        queue.restore_receiver(rx);
        assert!(queue.take_receiver().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_in_order_with_spacing() {
        let stats = Arc::new(StatsCounters::default());
        let queue = TransmitQueue::new(8, Arc::clone(&stats));
        let link = Arc::new(LinkState::new());
        link.set(ConnectionState::Connected);
        let (wire_tx, mut wire_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        for addr in [1, 2, 3] {
            queue.enqueue(read_presence(addr));
        }
        let rx = queue.take_receiver().unwrap();
        let task = tokio::spawn(run_transmit_loop(
            rx,
            wire_tx,
            Arc::clone(&link),
            Arc::clone(&stats),
            timing(),
            cancel.clone(),
        ));

        let start = tokio::time::Instant::now();
        let mut sent = Vec::new();
        let mut stamps = Vec::new();
        for _ in 0..3 {
            let command = wire_rx.recv().await.unwrap();
            stamps.push(start.elapsed());
            sent.push(command.address());
        }
        assert_eq!(sent, vec![1, 2, 3]);
        assert!(stamps[1] - stamps[0] >= Duration::from_millis(50));
        assert!(stamps[2] - stamps[1] >= Duration::from_millis(50));

        cancel.cancel();
        let rx = task.await.unwrap();
        queue.restore_receiver(rx);
        assert_eq!(stats.snapshot().commands_sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discards_while_disconnected() {
        let stats = Arc::new(StatsCounters::default());
        let queue = TransmitQueue::new(8, Arc::clone(&stats));
        let link = Arc::new(LinkState::new());
        let (wire_tx, mut wire_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        queue.enqueue(read_presence(1));
        queue.enqueue(read_presence(2));
        let task = tokio::spawn(run_transmit_loop(
            queue.take_receiver().unwrap(),
            wire_tx,
            link,
            Arc::clone(&stats),
            timing(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(wire_rx.try_recv().is_err());
        assert_eq!(stats.snapshot().commands_dropped, 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_loop_stops_on_cancel() {
        let stats = Arc::new(StatsCounters::default());
        let queue = TransmitQueue::new(8, Arc::clone(&stats));
        let (wire_tx, _wire_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_transmit_loop(
            queue.take_receiver().unwrap(),
            wire_tx,
            Arc::new(LinkState::new()),
            stats,
            timing(),
            cancel.clone(),
        ));

        // Several dequeue timeouts pass without work
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        let rx = task.await.unwrap();
        queue.restore_receiver(rx);
        assert!(queue.enqueue(read_presence(9)));
    }
}
