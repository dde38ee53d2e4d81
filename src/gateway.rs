//! # Presence Gateway
//!
//! Facade tying the supervisor, the transmit loop and the poll loop together.
//! It keeps one presence record per configured address and publishes
//! presence and connectivity changes to registered callbacks.
//!
//! ## Example
//!
//! ```rust,no_run
//! use presence_gateway::{GatewayConfig, PresenceGateway};
//!
//! #[tokio::main]
//! async fn main() -> presence_gateway::GatewayResult<()> {
//!     let config = GatewayConfig::new("192.168.1.100", 8899, [1, 2, 3]);
//!     let gateway = PresenceGateway::new(config)?;
//!
//!     gateway.register_online_callback(|online| println!("online: {}", online));
//!     gateway.register_presence_callback(2, |present| println!("room 2: {}", present))?;
//!
//!     gateway.start()?;
//!     tokio::signal::ctrl_c().await.ok();
//!     gateway.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Threading
//!
//! Callbacks run on the supervisor task, one frame at a time, in the order
//! the frames arrived. They must not block.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{self, Command};
use crate::config::{DeviceAddress, GatewayConfig};
use crate::connection::{
    ConnectionState, ConnectionSupervisor, Connector, LinkEvents, LinkSettings, LinkState,
    TcpConnector,
};
use crate::constants::{FC_READ_HOLDING_REGISTERS, MIN_RESPONSE_LEN};
use crate::error::{GatewayError, GatewayResult};
use crate::frame::Frame;
use crate::logging::format_hex_packet;
use crate::observer::Observers;
use crate::poll::{run_poll_loop, PollScheduler};
use crate::stats::{GatewayStats, StatsCounters};
use crate::transmit::{run_transmit_loop, TransmitQueue, TransmitTiming};

/// State and subscribers of one device
#[derive(Debug, Default)]
struct DeviceRecord {
    present: Mutex<bool>,
    observers: Observers<bool>,
}

impl DeviceRecord {
    fn present(&self) -> bool {
        *lock(&self.present)
    }

    /// Store `present`, returning whether it changed
    fn update(&self, present: bool) -> bool {
        let mut state = lock(&self.present);
        let changed = *state != present;
        *state = present;
        changed
    }
}

/// State reachable from the background tasks
#[derive(Debug)]
struct Shared {
    devices: BTreeMap<DeviceAddress, DeviceRecord>,
    online_observers: Observers<bool>,
    link: Arc<LinkState>,
}

impl Shared {
    fn handle_frame(&self, frame: &Frame) {
        if frame.len() < MIN_RESPONSE_LEN {
            return;
        }

        let address = frame.address();
        let Some(device) = self.devices.get(&address) else {
            debug!(
                "Ignoring frame from unconfigured slave {}: [{}]",
                address,
                format_hex_packet(frame.as_bytes())
            );
            return;
        };

        match frame.function_code() {
            FC_READ_HOLDING_REGISTERS => {
                // payload: byte count, then register data
                let payload = frame.payload();
                let byte_count = payload[0] as usize;
                if byte_count < 2 || payload.len() < 3 {
                    debug!("Short register read from slave {}", address);
                    return;
                }
                let value = u16::from_be_bytes([payload[1], payload[2]]);
                let present = value != 0;

                if device.update(present) {
                    info!(
                        "Slave {} presence: {}",
                        address,
                        if present { "occupied" } else { "vacant" }
                    );
                    device.observers.notify(present);
                }
            }
            fc => {
                debug!("Ignoring FC={:02X} from slave {}", fc, address);
            }
        }
    }
}

impl LinkEvents for Shared {
    fn on_connectivity(&self, connected: bool) {
        info!(
            "Gateway {}",
            if connected { "online" } else { "offline" }
        );
        self.online_observers.notify(connected);
    }

    fn on_frame(&self, frame: Frame) {
        self.handle_frame(&frame);
    }
}

/// Handles of one run
struct RunningTasks {
    cancel: CancellationToken,
    transmit: JoinHandle<mpsc::Receiver<Command>>,
    poll: JoinHandle<PollScheduler>,
    supervisor: JoinHandle<()>,
}

/// Presence sensor gateway over Modbus RTU/TCP
pub struct PresenceGateway<C: Connector = TcpConnector> {
    config: GatewayConfig,
    connector: Arc<C>,
    shared: Arc<Shared>,
    queue: Arc<TransmitQueue>,
    stats: Arc<StatsCounters>,
    scheduler: Mutex<Option<PollScheduler>>,
    running: Mutex<Option<RunningTasks>>,
}

impl PresenceGateway<TcpConnector> {
    /// Create a gateway that connects over TCP
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> PresenceGateway<C> {
    /// Create a gateway with a custom transport
    pub fn with_connector(config: GatewayConfig, connector: C) -> GatewayResult<Self> {
        config.validate()?;

        let stats = Arc::new(StatsCounters::default());
        let devices = config
            .device_addresses
            .iter()
            .map(|&address| (address, DeviceRecord::default()))
            .collect();
        let shared = Arc::new(Shared {
            devices,
            online_observers: Observers::new(),
            link: Arc::new(LinkState::new()),
        });
        let queue = Arc::new(TransmitQueue::new(config.queue_capacity, Arc::clone(&stats)));
        let scheduler = PollScheduler::new(
            config.device_addresses.clone(),
            config.poll_interval,
            config.min_poll_delay,
        );

        info!(
            "Gateway for {} created: {} devices {:?}, {} sensors, poll interval {:?}",
            config.endpoint(),
            config.device_addresses.len(),
            config.device_addresses,
            config.sensor_type,
            config.poll_interval
        );

        Ok(Self {
            config,
            connector: Arc::new(connector),
            shared,
            queue,
            stats,
            scheduler: Mutex::new(Some(scheduler)),
            running: Mutex::new(None),
        })
    }

    /// Spawn the background tasks on the current tokio runtime
    ///
    /// Calling `start` on a running gateway does nothing.
    pub fn start(&self) -> GatewayResult<()> {
        let mut running = lock(&self.running);
        if running.is_some() {
            debug!("Gateway already running");
            return Ok(());
        }

        let handle = Handle::try_current()
            .map_err(|e| GatewayError::runtime(format!("No tokio runtime: {}", e)))?;

        let rx = self
            .queue
            .take_receiver()
            .ok_or_else(|| GatewayError::runtime("Transmit queue receiver unavailable"))?;
        let scheduler = match lock(&self.scheduler).take() {
            Some(scheduler) => scheduler,
            None => {
                self.queue.restore_receiver(rx);
                return Err(GatewayError::runtime("Poll scheduler unavailable"));
            }
        };

        let cancel = CancellationToken::new();
        let link = Arc::clone(&self.shared.link);
        let (wire_tx, wire_rx) = mpsc::channel(self.config.queue_capacity);

        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&self.connector),
            LinkSettings::from(&self.config),
            Arc::clone(&link),
            Arc::clone(&self.stats),
        );
        let timing = TransmitTiming {
            dequeue_timeout: self.config.dequeue_timeout,
            command_spacing: self.config.command_spacing,
        };

        let supervisor = handle.spawn(supervisor.run(
            Arc::clone(&self.shared),
            wire_rx,
            cancel.clone(),
        ));
        let transmit = handle.spawn(run_transmit_loop(
            rx,
            wire_tx,
            Arc::clone(&link),
            Arc::clone(&self.stats),
            timing,
            cancel.clone(),
        ));
        let poll = handle.spawn(run_poll_loop(
            scheduler,
            Arc::clone(&self.queue),
            link,
            cancel.clone(),
        ));

        *running = Some(RunningTasks {
            cancel,
            transmit,
            poll,
            supervisor,
        });
        info!("Gateway started for {}", self.config.endpoint());
        Ok(())
    }

    /// Stop the background tasks and close the transport
    ///
    /// Returns once all tasks have ended. Presence state and the poll
    /// rotation are kept for a later [`start`](Self::start).
    pub async fn stop(&self) {
        let tasks = lock(&self.running).take();
        let Some(tasks) = tasks else {
            return;
        };
        tasks.cancel.cancel();

        match tasks.transmit.await {
            Ok(rx) => self.queue.restore_receiver(rx),
            Err(e) => error!("Transmit task failed: {}", e),
        }
        match tasks.poll.await {
            Ok(scheduler) => *lock(&self.scheduler) = Some(scheduler),
            Err(e) => error!("Poll task failed: {}", e),
        }
        if let Err(e) = tasks.supervisor.await {
            error!("Connection task failed: {}", e);
        }

        self.recover_after_task_failure();
        info!("Gateway stopped for {}", self.config.endpoint());
    }

    /// Rebuild queue or scheduler if a task panicked and took it down
    fn recover_after_task_failure(&self) {
        let mut scheduler = lock(&self.scheduler);
        if scheduler.is_none() {
            warn!("Poll rotation lost, restarting from the first device");
            *scheduler = Some(PollScheduler::new(
                self.config.device_addresses.clone(),
                self.config.poll_interval,
                self.config.min_poll_delay,
            ));
        }
        if !self.queue.has_receiver() {
            warn!("Transmit queue lost; commands can no longer be sent");
        }
    }

    /// Whether background tasks are running
    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Last known presence of `address`; false for unconfigured addresses
    pub fn presence(&self, address: DeviceAddress) -> bool {
        self.shared
            .devices
            .get(&address)
            .map(|d| d.present())
            .unwrap_or(false)
    }

    /// Whether the transport is connected
    pub fn is_online(&self) -> bool {
        self.shared.link.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.link.get()
    }

    /// Configured addresses, sorted
    pub fn device_addresses(&self) -> &[DeviceAddress] {
        &self.config.device_addresses
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats.snapshot()
    }

    /// Call `callback` whenever presence of `address` changes
    pub fn register_presence_callback<F>(
        &self,
        address: DeviceAddress,
        callback: F,
    ) -> GatewayResult<()>
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let device = self
            .shared
            .devices
            .get(&address)
            .ok_or_else(|| GatewayError::unknown_device(address))?;
        device.observers.subscribe(callback);
        Ok(())
    }

    /// Call `callback` whenever connectivity changes
    pub fn register_online_callback<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.shared.online_observers.subscribe(callback);
    }

    /// Queue an immediate presence read of `address`
    ///
    /// Returns whether the command was queued. The result arrives through
    /// the presence callbacks.
    pub fn read_presence_status(&self, address: DeviceAddress) -> bool {
        self.queue.enqueue(command::read_presence(address))
    }

    /// Queue a write of one sensor setting register
    ///
    /// See the `REG_*` constants for the register map.
    pub fn write_register(
        &self,
        address: DeviceAddress,
        register: u16,
        value: u16,
    ) -> GatewayResult<bool> {
        if !self.config.has_device(address) {
            return Err(GatewayError::unknown_device(address));
        }
        Ok(self
            .queue
            .enqueue(command::write_single_register(address, register, value)))
    }
}

impl<C: Connector> Drop for PresenceGateway<C> {
    fn drop(&mut self) {
        if let Some(tasks) = lock(&self.running).take() {
            debug!("Gateway dropped while running, cancelling tasks");
            tasks.cancel.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shared(addresses: &[DeviceAddress]) -> Shared {
        Shared {
            devices: addresses
                .iter()
                .map(|&a| (a, DeviceRecord::default()))
                .collect(),
            online_observers: Observers::new(),
            link: Arc::new(LinkState::new()),
        }
    }

    fn frame(bytes: &[u8]) -> Frame {
        Frame::new(bytes.to_vec()).unwrap()
    }

    const PRESENT_3: [u8; 7] = [0x03, 0x03, 0x02, 0x00, 0x01, 0x00, 0x44];
    const ABSENT_3: [u8; 7] = [0x03, 0x03, 0x02, 0x00, 0x00, 0xC1, 0x84];
    const PRESENT_9: [u8; 7] = [0x09, 0x03, 0x02, 0x00, 0x01, 0x98, 0x45];

    #[test]
    fn test_presence_change_detection() {
        let shared = shared(&[3]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        shared.devices[&3]
            .observers
            .subscribe(move |p| sink.lock().unwrap().push(p));

        for bytes in [PRESENT_3, PRESENT_3, ABSENT_3, ABSENT_3, PRESENT_3] {
            shared.on_frame(frame(&bytes));
        }

        assert_eq!(*log.lock().unwrap(), vec![true, false, true]);
        assert!(shared.devices[&3].present());
    }

    #[test]
    fn test_initial_absent_does_not_notify() {
        let shared = shared(&[3]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        shared.devices[&3].observers.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        shared.on_frame(frame(&ABSENT_3));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unconfigured_address_ignored() {
        let shared = shared(&[3]);
        shared.on_frame(frame(&PRESENT_9));
        assert!(!shared.devices[&3].present());
        assert!(!shared.devices.contains_key(&9));
    }

    #[test]
    fn test_other_function_code_leaves_presence() {
        let shared = shared(&[1]);
        shared.on_frame(frame(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0B]));
        assert!(!shared.devices[&1].present());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GatewayConfig::new("10.0.0.1", 8899, []);
        assert!(matches!(
            PresenceGateway::new(config),
            Err(GatewayError::Configuration { .. })
        ));
    }

    #[test]
    fn test_queries_before_start() {
        let gateway = PresenceGateway::new(GatewayConfig::new("10.0.0.1", 8899, [5, 3])).unwrap();
        assert_eq!(gateway.device_addresses(), &[3, 5]);
        assert!(!gateway.presence(3));
        assert!(!gateway.presence(200));
        assert!(!gateway.is_online());
        assert!(!gateway.is_running());
        assert_eq!(gateway.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_register_unknown_device() {
        let gateway = PresenceGateway::new(GatewayConfig::new("10.0.0.1", 8899, [3])).unwrap();
        assert!(gateway.register_presence_callback(3, |_| {}).is_ok());
        assert_eq!(
            gateway.register_presence_callback(4, |_| {}),
            Err(GatewayError::unknown_device(4))
        );
        assert_eq!(
            gateway.write_register(4, crate::constants::REG_DELAY, 30),
            Err(GatewayError::unknown_device(4))
        );
    }

    #[test]
    fn test_start_outside_runtime() {
        let gateway = PresenceGateway::new(GatewayConfig::new("10.0.0.1", 8899, [3])).unwrap();
        assert!(matches!(
            gateway.start(),
            Err(GatewayError::Runtime { .. })
        ));
        assert!(!gateway.is_running());
    }

    #[test]
    fn test_stop_when_not_running() {
        let gateway = PresenceGateway::new(GatewayConfig::new("10.0.0.1", 8899, [3])).unwrap();
        tokio_test::block_on(gateway.stop());
        assert!(!gateway.is_running());
        assert!(gateway.read_presence_status(3));
    }

    #[test]
    fn test_ad_hoc_commands_are_queued() {
        let gateway = PresenceGateway::new(GatewayConfig::new("10.0.0.1", 8899, [3])).unwrap();
        assert!(gateway.read_presence_status(3));
        assert_eq!(
            gateway.write_register(3, crate::constants::REG_SENSITIVITY, 5),
            Ok(true)
        );
        assert_eq!(gateway.stats().commands_queued, 2);
    }
}
