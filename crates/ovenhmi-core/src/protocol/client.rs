//! Oven protocol client
//!
//! Typed operations over the link. One request/response exchange is in flight
//! at a time: every operation takes the link gate (a fair `tokio` mutex, so
//! callers are served in arrival order) for its whole write/read cycle. The
//! cycle itself runs on a spawned task that owns the guard, so a caller that
//! stops waiting never cuts an exchange short or leaves its reply on the line.
//!
//! Operations never return transport errors to the caller. Failures are
//! recorded in [`OvenClient::last_error`] and reduced to the operation's
//! failure value: `Status::NotConnected`, `false`, `None` or a zeroed [`Pid`].

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::codec;
use super::link::{ConnectionState, LinkConfig, LinkHealth, LinkManager};
use super::stream::{PortProvider, SerialPortProvider};
use super::{Command, OvenError};
use crate::model::{Pid, Recipe, Sample, Status};

/// Client for the oven controller
pub struct OvenClient {
    link: Arc<Mutex<LinkManager>>,
    health: Arc<LinkHealth>,
}

impl OvenClient {
    /// Client talking to real hardware, found by the config's vendor hint
    pub fn new(config: LinkConfig) -> Self {
        Self::with_provider(config, SerialPortProvider)
    }

    /// Client using a custom device provider (simulator, test transport)
    pub fn with_provider<P>(config: LinkConfig, provider: P) -> Self
    where
        P: PortProvider + 'static,
    {
        let health = Arc::new(LinkHealth::default());
        let link = LinkManager::new(config, Box::new(provider), health.clone());
        Self {
            link: Arc::new(Mutex::new(link)),
            health,
        }
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        self.health.state()
    }

    /// True while the link is open and the last exchange did not fail
    pub fn connected(&self) -> bool {
        self.health.connected()
    }

    /// Message of the most recent failure, if any
    pub fn last_error(&self) -> Option<String> {
        self.health.last_error()
    }

    /// Forget the last recorded failure
    pub fn clear_error(&self) {
        self.health.clear_error();
    }

    /// Close the link once any in-flight exchange finishes
    pub async fn disconnect(&self) {
        self.link.lock().await.disconnect();
    }

    /// Tell the controller to start the loaded recipe
    pub async fn start(&self) -> Status {
        self.status_command(Command::Start).await
    }

    /// Tell the controller to stop and turn the heater off
    pub async fn stop(&self) -> Status {
        self.status_command(Command::Stop).await
    }

    /// Read the controller status, waiting for the link if it is busy
    pub async fn get_status(&self) -> Status {
        self.status_command(Command::GetStatus).await
    }

    /// Read the status without queueing behind another caller.
    ///
    /// Returns [`Status::Busy`] if an exchange is already in flight.
    pub async fn poll_status(&self) -> Status {
        let Ok(link) = self.link.clone().try_lock_owned() else {
            return Status::Busy;
        };
        let request = codec::encode_command(Command::GetStatus, &[]);
        let result = run_exchange(link, request, true).await;

        match result.and_then(|reply| codec::decode_status(&reply)) {
            Ok(status) => status,
            Err(e) => self.fail("poll_status", e, Status::NotConnected),
        }
    }

    /// Upload a recipe. Succeeds only if the controller echoes it back byte for byte.
    pub async fn set_recipe(&self, recipe: &Recipe) -> bool {
        match self.try_set_recipe(recipe).await {
            Ok(()) => true,
            Err(e) => self.fail("set_recipe", e, false),
        }
    }

    async fn try_set_recipe(&self, recipe: &Recipe) -> Result<(), OvenError> {
        recipe.validate()?;
        let message = codec::encode_recipe(recipe.steps());
        let echo = self.transact(&message, true).await?;
        codec::verify_echo(&message, &echo)
    }

    /// Send the ambient temperature. Succeeds once the bytes are written; no reply is read.
    pub async fn set_ambient(&self, celsius: f32) -> bool {
        let message = codec::encode_ambient(celsius);
        match self.transact(&message, false).await {
            Ok(_) => true,
            Err(e) => self.fail("set_ambient", e, false),
        }
    }

    /// Send PID coefficients and return what the controller echoed.
    ///
    /// Compare the result with `pid` to learn whether the values were adopted.
    pub async fn set_pid(&self, pid: Pid) -> Pid {
        let message = codec::encode_pid(&pid);
        self.pid_command("set_pid", &message).await
    }

    /// Read the PID coefficients the controller is using
    pub async fn get_pid(&self) -> Pid {
        let message = codec::encode_command(Command::GetPID, &[]);
        self.pid_command("get_pid", &message).await
    }

    /// Read the controller's current measurements
    pub async fn get_current_sample(&self) -> Option<Sample> {
        let request = codec::encode_command(Command::GetCurrentSample, &[]);
        let result = self
            .transact(&request, true)
            .await
            .and_then(|reply| codec::decode_sample(&reply));

        match result {
            Ok(sample) => Some(sample),
            Err(e) => self.fail("get_current_sample", e, None),
        }
    }

    async fn status_command(&self, command: Command) -> Status {
        let request = codec::encode_command(command, &[]);
        let result = self
            .transact(&request, true)
            .await
            .and_then(|reply| codec::decode_status(&reply));

        match result {
            Ok(status) => status,
            Err(e) => self.fail(&format!("{:?}", command), e, Status::NotConnected),
        }
    }

    async fn pid_command(&self, op: &str, message: &[u8]) -> Pid {
        match self.transact(message, true).await {
            // Wrong-length replies decode as zero, like an absent reply
            Ok(reply) => {
                if reply.len() != codec::PID_RESPONSE_LEN {
                    tracing::warn!("{}: PID reply was {} bytes", op, reply.len());
                }
                codec::decode_pid(&reply)
            }
            Err(e) => self.fail(op, e, Pid::ZERO),
        }
    }

    /// One gated write/read cycle
    async fn transact(&self, request: &[u8], expect_response: bool) -> Result<Vec<u8>, OvenError> {
        let link = self.link.clone().lock_owned().await;
        run_exchange(link, request.to_vec(), expect_response).await
    }

    fn fail<T>(&self, op: &str, error: OvenError, value: T) -> T {
        tracing::warn!("{} failed: {}", op, error);
        self.health.record_error(&error);
        value
    }
}

/// Run an exchange to completion on its own task, releasing the gate when it ends
async fn run_exchange(
    mut link: OwnedMutexGuard<LinkManager>,
    request: Vec<u8>,
    expect_response: bool,
) -> Result<Vec<u8>, OvenError> {
    tokio::spawn(async move { link.exchange(&request, expect_response).await })
        .await
        .map_err(|e| OvenError::TransportIo(format!("exchange task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_client_is_disconnected() {
        let client = OvenClient::new(LinkConfig::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.connected());
        assert_eq!(client.last_error(), None);
    }

    #[tokio::test]
    async fn test_invalid_recipe_never_reaches_link() {
        let client = OvenClient::new(LinkConfig {
            vendor_hint: "no-such-device".to_string(),
            ..LinkConfig::default()
        });

        assert!(!client.set_recipe(&Recipe::new()).await);
        let err = client.last_error().expect("validation error recorded");
        assert!(err.contains("at least 2 steps"), "{err}");
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
