//! Link management
//!
//! Owns the one transport to the oven. The link is opened lazily on first use
//! and dropped on any transport fault, so the next exchange re-discovers the
//! device from scratch. Nothing here retries on its own.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{self, Instant};

use super::stream::{DynSerial, OpenedPort, PortProvider};
use super::{
    OvenError, DEFAULT_BAUD_RATE, DEFAULT_RESPONSE_GAP_MS, DEFAULT_TIMEOUT_MS, MAX_RESPONSE_LEN, VENDOR_HINT,
};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link open
    Disconnected,
    /// Link open and last exchange succeeded
    Connected,
    /// Last attempt failed; the link was dropped
    Errored,
}

/// Link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Substring identifying the oven among serial devices
    pub vendor_hint: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read and write timeout in milliseconds
    pub timeout_ms: u64,
    /// Idle time after which a reply is considered complete
    pub response_gap_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            vendor_hint: VENDOR_HINT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            response_gap_ms: DEFAULT_RESPONSE_GAP_MS,
        }
    }
}

impl LinkConfig {
    /// Load from a JSON settings blob; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize for the settings store
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Bound on one whole write/read cycle
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Idle time that ends a reply
    pub fn response_gap(&self) -> Duration {
        Duration::from_millis(self.response_gap_ms)
    }
}

/// Connectivity as seen by callers, readable without waiting on the link
#[derive(Debug)]
pub struct LinkHealth {
    inner: Mutex<HealthInner>,
}

#[derive(Debug)]
struct HealthInner {
    state: ConnectionState,
    last_error: Option<String>,
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HealthInner {
                state: ConnectionState::Disconnected,
                last_error: None,
            }),
        }
    }
}

impl LinkHealth {
    fn lock(&self) -> MutexGuard<'_, HealthInner> {
        // The guarded data stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// True while the link is open and the last exchange succeeded
    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Remember `error` as the most recent failure
    pub fn record_error(&self, error: &OvenError) {
        self.lock().last_error = Some(error.to_string());
    }

    /// Forget the most recent failure
    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }
}

/// The open transport
struct ActiveLink {
    name: String,
    io: DynSerial,
}

/// Owns discovery and lifecycle of the physical link
pub struct LinkManager {
    provider: Box<dyn PortProvider>,
    config: LinkConfig,
    link: Option<ActiveLink>,
    health: Arc<LinkHealth>,
    /// Cumulative bytes sent & received
    tx_bytes: u64,
    rx_bytes: u64,
}

impl LinkManager {
    /// A manager with no link open yet
    pub fn new(config: LinkConfig, provider: Box<dyn PortProvider>, health: Arc<LinkHealth>) -> Self {
        Self {
            provider,
            config,
            link: None,
            health,
            tx_bytes: 0,
            rx_bytes: 0,
        }
    }

    /// Link configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Name of the open device, if any
    pub fn port_name(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.name.as_str())
    }

    /// True while a transport is cached
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Cumulative (tx, rx) byte counters
    pub fn get_counters(&self) -> (u64, u64) {
        (self.tx_bytes, self.rx_bytes)
    }

    /// Get the open transport, discovering and opening the device if needed
    pub async fn acquire(&mut self) -> Result<&mut DynSerial, OvenError> {
        if self.link.is_none() {
            let opened = self.provider.open(&self.config).await;
            match opened {
                Ok(OpenedPort { name, io }) => {
                    tracing::info!(port = %name, baud = self.config.baud_rate, "oven link opened");
                    self.link = Some(ActiveLink { name, io });
                }
                Err(e) => {
                    let state = if matches!(e, OvenError::NoDevice(_)) {
                        ConnectionState::Disconnected
                    } else {
                        ConnectionState::Errored
                    };
                    tracing::warn!("oven discovery failed: {}", e);
                    self.health.set_state(state);
                    return Err(e);
                }
            }
        }

        self.health.set_state(ConnectionState::Connected);
        match self.link.as_mut() {
            Some(link) => Ok(&mut link.io),
            None => Err(OvenError::NoDevice(self.config.vendor_hint.clone())),
        }
    }

    /// Write a request and, if asked, read the reply until the line goes idle.
    ///
    /// The write and the read share one deadline of `timeout_ms`. Any failure
    /// drops the link before the error is returned.
    pub async fn exchange(&mut self, request: &[u8], expect_response: bool) -> Result<Vec<u8>, OvenError> {
        let timeout = self.config.timeout();
        let gap = self.config.response_gap();
        let io = self.acquire().await?;
        let deadline = Instant::now() + timeout;

        tracing::debug!("oven tx {} bytes: {:02x?}", request.len(), request);
        let result = match write_request(io, request, deadline).await {
            Ok(()) if expect_response => read_response(io, deadline, gap).await,
            Ok(()) => Ok(Vec::new()),
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                self.tx_bytes = self.tx_bytes.saturating_add(request.len() as u64);
                self.rx_bytes = self.rx_bytes.saturating_add(response.len() as u64);
                if expect_response {
                    tracing::debug!("oven rx {} bytes: {:02x?}", response.len(), response);
                }
                Ok(response)
            }
            Err(e) => {
                self.drop_link(&e);
                Err(e)
            }
        }
    }

    /// Close the link; the next exchange re-discovers the device
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            tracing::info!(port = %link.name, "oven link closed");
        }
        self.health.set_state(ConnectionState::Disconnected);
    }

    fn drop_link(&mut self, error: &OvenError) {
        let name = self.link.take().map(|l| l.name).unwrap_or_default();
        tracing::warn!(port = %name, "dropping oven link: {}", error);
        self.health.set_state(ConnectionState::Errored);
    }
}

async fn write_request(io: &mut DynSerial, request: &[u8], deadline: Instant) -> Result<(), OvenError> {
    time::timeout_at(deadline, async {
        io.write_all(request).await?;
        io.flush().await
    })
    .await
    .map_err(|_| OvenError::TransportTimeout)?
    .map_err(OvenError::from)
}

/// Read one reply, ending at the first idle gap of `gap`.
///
/// A reply still arriving at `deadline` is a timeout, and one longer than the
/// firmware can send is malformed.
async fn read_response(io: &mut DynSerial, deadline: Instant, gap: Duration) -> Result<Vec<u8>, OvenError> {
    let mut response = Vec::new();
    let mut buffer = [0u8; MAX_RESPONSE_LEN];

    let n = time::timeout_at(deadline, io.read(&mut buffer))
        .await
        .map_err(|_| OvenError::TransportTimeout)??;
    if n == 0 {
        return Err(OvenError::TransportIo("device closed the link".to_string()));
    }
    response.extend_from_slice(&buffer[..n]);

    loop {
        let idle_at = Instant::now() + gap;
        match time::timeout_at(idle_at.min(deadline), io.read(&mut buffer)).await {
            Err(_) if idle_at <= deadline => break,
            Err(_) => return Err(OvenError::TransportTimeout),
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => response.extend_from_slice(&buffer[..n]),
            Ok(Err(e)) => return Err(e.into()),
        }

        if response.len() > MAX_RESPONSE_LEN {
            return Err(OvenError::MalformedResponse {
                expected: format!("at most {} bytes", MAX_RESPONSE_LEN),
                actual: response.len(),
            });
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::stream::OpenFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{duplex, DuplexStream};

    /// Hands out the client end of a pipe and keeps the device end alive
    #[derive(Default)]
    struct PipeProvider {
        device: std::sync::Mutex<Option<DuplexStream>>,
        opens: Arc<AtomicUsize>,
    }

    impl PortProvider for PipeProvider {
        fn open<'a>(&'a self, _config: &'a LinkConfig) -> OpenFuture<'a> {
            Box::pin(async move {
                self.opens.fetch_add(1, Ordering::SeqCst);
                let (client, device) = duplex(256);
                *self.device.lock().unwrap() = Some(device);
                Ok(OpenedPort {
                    name: "pipe".to_string(),
                    io: Box::new(client) as DynSerial,
                })
            })
        }
    }

    struct NoDevice;

    impl PortProvider for NoDevice {
        fn open<'a>(&'a self, config: &'a LinkConfig) -> OpenFuture<'a> {
            Box::pin(async move { Err(OvenError::NoDevice(config.vendor_hint.clone())) })
        }
    }

    fn manager(provider: impl PortProvider + 'static) -> (LinkManager, Arc<LinkHealth>) {
        let health = Arc::new(LinkHealth::default());
        let mgr = LinkManager::new(LinkConfig::default(), Box::new(provider), health.clone());
        (mgr, health)
    }

    #[test]
    fn test_link_config_default() {
        let config = LinkConfig::default();
        assert_eq!(config.vendor_hint, "USB");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout_ms, 1000);
    }

    #[test]
    fn test_link_config_json_defaults() {
        let config = LinkConfig::from_json(r#"{ "timeout_ms": 250 }"#).unwrap();
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);

        let text = config.to_json().unwrap();
        assert_eq!(LinkConfig::from_json(&text).unwrap(), config);
    }

    #[tokio::test]
    async fn test_acquire_without_device() {
        let (mut mgr, health) = manager(NoDevice);
        let err = mgr.acquire().await.err().expect("no device");
        assert!(matches!(err, OvenError::NoDevice(_)));
        assert_eq!(health.state(), ConnectionState::Disconnected);
        assert!(!mgr.is_open());
    }

    #[tokio::test]
    async fn test_acquire_reuses_open_link() {
        let provider = PipeProvider::default();
        let opens = provider.opens.clone();
        let (mut mgr, health) = manager(provider);
        mgr.acquire().await.unwrap();
        mgr.acquire().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.port_name(), Some("pipe"));
        assert!(health.connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_drops_link() {
        let provider = PipeProvider::default();
        let (mut mgr, health) = manager(provider);

        // Nobody answers on the device end
        let err = mgr.exchange(&[0x05], true).await.unwrap_err();
        assert!(matches!(err, OvenError::TransportTimeout));
        assert!(!mgr.is_open());
        assert_eq!(health.state(), ConnectionState::Errored);
    }

    #[tokio::test]
    async fn test_send_without_response() {
        let provider = PipeProvider::default();
        let (mut mgr, _) = manager(provider);
        let reply = mgr.exchange(&[0x06, 0x00, 0x64], false).await.unwrap();
        assert!(reply.is_empty());
        assert_eq!(mgr.get_counters(), (3, 0));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let provider = PipeProvider::default();
        let (mut mgr, health) = manager(provider);
        mgr.acquire().await.unwrap();
        mgr.disconnect();
        assert!(!mgr.is_open());
        assert_eq!(health.state(), ConnectionState::Disconnected);
    }

    /// Device end that writes `byte` every `interval` until the link closes
    fn chatter(mut device: DuplexStream, byte: u8, interval: Duration) {
        tokio::spawn(async move {
            while device.write_all(&[byte]).await.is_ok() {
                time::sleep(interval).await;
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_response_ends_on_idle_gap() {
        let (client, mut device) = duplex(64);
        let mut io: DynSerial = Box::new(client);
        device.write_all(&[0x01, 0x02]).await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(1000);
        let reply = read_response(&mut io, deadline, Duration::from_millis(50)).await.unwrap();
        assert_eq!(reply, vec![0x01, 0x02]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_response_stops_at_deadline() {
        let (client, device) = duplex(256);
        let mut io: DynSerial = Box::new(client);
        // 20 ms apart: never idle, but too slow to overflow within a second
        chatter(device, 0x01, Duration::from_millis(20));

        let started = Instant::now();
        let err = read_response(&mut io, started + Duration::from_millis(1000), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, OvenError::TransportTimeout));
        assert!(started.elapsed() <= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_response_caps_length() {
        let (client, device) = duplex(256);
        let mut io: DynSerial = Box::new(client);
        chatter(device, 0x01, Duration::from_millis(5));

        let deadline = Instant::now() + Duration::from_millis(1000);
        let err = read_response(&mut io, deadline, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(
            err,
            OvenError::MalformedResponse { actual, .. } if actual > MAX_RESPONSE_LEN
        ));
    }
}
