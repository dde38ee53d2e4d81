//! Round-robin presence polling
//!
//! One full rotation over all configured devices takes one poll interval,
//! so each device is read once per interval regardless of how many are
//! configured (down to a per-device floor).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::read_presence;
use crate::config::DeviceAddress;
use crate::connection::LinkState;
use crate::transmit::TransmitQueue;

/// Rotation over the configured addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollScheduler {
    addresses: Vec<DeviceAddress>,
    index: usize,
    poll_interval: Duration,
    min_delay: Duration,
}

impl PollScheduler {
    pub fn new(addresses: Vec<DeviceAddress>, poll_interval: Duration, min_delay: Duration) -> Self {
        Self {
            addresses,
            index: 0,
            poll_interval,
            min_delay,
        }
    }

    /// Current address, moving the rotation forward
    pub fn advance(&mut self) -> Option<DeviceAddress> {
        let address = *self.addresses.get(self.index)?;
        self.index = (self.index + 1) % self.addresses.len();
        Some(address)
    }

    /// Delay between two consecutive polls
    pub fn tick_delay(&self) -> Duration {
        let count = self.addresses.len().max(1) as u32;
        (self.poll_interval / count).max(self.min_delay)
    }

    /// Full rotation time
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[inline]
    pub fn addresses(&self) -> &[DeviceAddress] {
        &self.addresses
    }
}

/// Issue presence reads until `cancel` fires
///
/// Nothing is issued while disconnected; the loop then rechecks once per
/// poll interval. The scheduler is returned so the rotation resumes where it
/// left off.
pub async fn run_poll_loop(
    mut scheduler: PollScheduler,
    queue: Arc<TransmitQueue>,
    link: Arc<LinkState>,
    cancel: CancellationToken,
) -> PollScheduler {
    loop {
        let delay = if link.is_connected() {
            match scheduler.advance() {
                Some(address) => {
                    queue.enqueue(read_presence(address));
                    scheduler.tick_delay()
                }
                None => scheduler.poll_interval(),
            }
        } else {
            scheduler.poll_interval()
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    debug!("Poll loop stopped");
    scheduler
}
