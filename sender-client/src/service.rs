//! SessionService - the main interface for the SenderSDK link.
//!
//! This module provides [`SessionService`], the object applications hold on
//! to. It combines the device registry, the connection manager and radio
//! events into one observable [`SessionState`].
//!
//! # Architecture
//!
//! ```text
//! Application → SessionService → ConnectionManager → Radio
//!                    ↑ watch<SessionState>    │
//!                    └──── ConnectionResult ──┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sendersdk_client::{LinkConfig, MockRadio, SessionService};
//!
//! let service = SessionService::new(MockRadio::new(), LinkConfig::default());
//! service.start();
//! service.start_discovery().await?;
//!
//! let mut state = service.state();
//! service.connect(peer).await?;
//! state.changed().await?;
//! ```

use crate::config::LinkConfig;
use crate::manager::{ConnectionManager, ManagerError, ResultReceiver};
use crate::radio::{Radio, RadioError, RadioEvent};
use sender_core::{ConnectionState, DeviceRegistry, SessionState};
use sender_types::{ConnectionResult, Message, Peer};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const ERROR_CAPACITY: usize = 16;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection manager error.
    #[error("connection error: {0}")]
    Connection(#[from] ManagerError),

    /// Radio stack error.
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),

    /// No connection to send on.
    #[error("not connected")]
    NotConnected,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared<R: Radio> {
    radio: Arc<R>,
    manager: ConnectionManager<R>,
    registry: tokio::sync::Mutex<DeviceRegistry>,
    state: watch::Sender<SessionState>,
    errors: broadcast::Sender<String>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    config: LinkConfig,
}

impl<R: Radio> Shared<R> {
    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(f);
    }

    fn notify_error(&self, reason: &str) {
        self.update(|s| s.error(reason));
        let _ = self.errors.send(reason.to_string());
    }

    fn publish_peers(&self, registry: &DeviceRegistry) {
        self.update(|s| s.set_peers(registry.scanned(), registry.bonded()));
    }

    async fn listen(self: Arc<Self>, mut events: broadcast::Receiver<RadioEvent>) {
        loop {
            match events.recv().await {
                Ok(RadioEvent::DeviceFound(peer)) => {
                    let mut registry = self.registry.lock().await;
                    if registry.on_device_found(peer.clone()) {
                        debug!(peer = %peer, "device found");
                        self.publish_peers(&registry);
                    }
                }
                Ok(RadioEvent::LinkStateChanged { connected, peer }) => {
                    match self.manager.on_link_state(connected, &peer).await {
                        Ok(flag) => self.update(|s| s.link_state(flag)),
                        Err(e) => self.notify_error(e.user_message()),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "radio events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("radio event listener stopped");
    }

    async fn consume(self: Arc<Self>, mut results: ResultReceiver) {
        while let Some(result) = results.recv().await {
            self.update(|s| s.apply_result(&result));
            if let ConnectionResult::Error(reason) = &result {
                let _ = self.errors.send(reason.clone());
            }
        }
        self.update(|s| s.attempt_ended());
    }
}

/// Discovery and connection front end.
///
/// Publishes a [`SessionState`] on every change and one-off error
/// notifications on a separate stream. Dropping the service stops the event
/// listener and closes any live connection in the background; call
/// [`release`](Self::release) to wait for the teardown.
pub struct SessionService<R: Radio> {
    shared: Arc<Shared<R>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Radio> SessionService<R> {
    /// Create a new service. Radio events are not observed until
    /// [`start`](Self::start) is called.
    pub fn new(radio: R, config: LinkConfig) -> Self {
        let radio = Arc::new(radio);
        let (state, _) = watch::channel(SessionState::new());
        let (errors, _) = broadcast::channel(ERROR_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                manager: ConnectionManager::new(Arc::clone(&radio), config.clone()),
                radio,
                registry: tokio::sync::Mutex::new(DeviceRegistry::new()),
                state,
                errors,
                consumer: Mutex::new(None),
                config,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Register for radio events.
    pub fn start(&self) {
        let mut listener = lock(&self.listener);
        if listener.is_some() {
            debug!("session service already started");
            return;
        }
        let events = self.shared.radio.subscribe();
        *listener = Some(tokio::spawn(Arc::clone(&self.shared).listen(events)));
        info!("session service started");
    }

    /// Unregister from radio events and tear everything down.
    ///
    /// Closes the connection, stops discovery and forgets scanned peers.
    pub async fn release(&self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }

        self.disconnect().await;

        {
            let mut registry = self.shared.registry.lock().await;
            registry.stop_discovery();
            registry.clear_scanned();
            self.shared.publish_peers(&registry);
        }
        if let Err(e) = self.shared.radio.stop_scan().await {
            debug!(error = %e, "stop scan on release failed");
        }
        info!("session service released");
    }

    /// Start discovery and refresh the bonded list.
    ///
    /// Without scan authorization this is a silent no-op.
    pub async fn start_discovery(&self) -> Result<(), ClientError> {
        let bonded = match self.shared.radio.bonded_devices().await {
            Ok(bonded) => bonded,
            Err(RadioError::PermissionDenied) => {
                debug!("discovery unavailable: permission denied");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        {
            let mut registry = self.shared.registry.lock().await;
            registry.start_discovery(bonded);
            self.shared.publish_peers(&registry);
        }

        match self.shared.radio.start_scan().await {
            Ok(()) => {
                info!("discovery started");
                Ok(())
            }
            Err(RadioError::PermissionDenied) => {
                debug!("scan unavailable: permission denied");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop discovery. Scanned peers are kept.
    ///
    /// Without scan authorization this is a silent no-op.
    pub async fn stop_discovery(&self) -> Result<(), ClientError> {
        self.shared.registry.lock().await.stop_discovery();

        match self.shared.radio.stop_scan().await {
            Ok(()) => {
                info!("discovery stopped");
                Ok(())
            }
            Err(RadioError::PermissionDenied) => {
                debug!("stop scan unavailable: permission denied");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Connect to `peer`.
    ///
    /// Rejected while another connection is in progress or established.
    /// Without radio authorization the attempt ends silently: no error is
    /// recorded and `is_connecting` is cleared.
    pub async fn connect(&self, peer: Peer) -> Result<(), ClientError> {
        let results = self.shared.manager.connect(peer).await?;

        // The previous attempt's result channel is closed by now. Drain it
        // first so its results land before this attempt's.
        let previous = lock(&self.shared.consumer).take();
        if let Some(previous) = previous {
            let _ = previous.await;
        }
        self.shared.update(|s| s.connect_requested());

        let consumer = tokio::spawn(Arc::clone(&self.shared).consume(results));
        *lock(&self.shared.consumer) = Some(consumer);
        Ok(())
    }

    /// Close the connection, whatever state it is in.
    pub async fn disconnect(&self) {
        self.shared.manager.close().await;

        // Let the consumer drain what the session emitted before closing.
        let consumer = lock(&self.shared.consumer).take();
        if let Some(consumer) = consumer {
            let _ = consumer.await;
        }

        self.shared.update(|s| s.disconnected());
        info!("disconnected");
    }

    /// Send a record with `id` and `text` as its action.
    ///
    /// Returns the record that was written.
    pub async fn send(&self, text: &str, id: &str) -> Result<Message, ClientError> {
        let message = Message::outgoing(id, text);
        match self.shared.manager.send(message).await? {
            Some(sent) => {
                self.shared.update(|s| s.message_sent(sent.clone()));
                Ok(sent)
            }
            None => {
                warn!(id, "send rejected: not connected");
                Err(ClientError::NotConnected)
            }
        }
    }

    /// This device's identity, with a fallback name when the radio has none.
    pub async fn local_device(&self) -> Result<Peer, ClientError> {
        let mut peer = self.shared.radio.local_device().await?;
        if peer.name.as_deref().map_or(true, str::is_empty) {
            peer.name = Some(self.shared.config.local_name_fallback.clone());
        }
        Ok(peer)
    }

    /// Whether discovery is running.
    pub async fn is_discovering(&self) -> bool {
        self.shared.registry.lock().await.is_discovering()
    }

    /// Whether `address` was in the bonded list at the last discovery start.
    pub async fn is_bonded(&self, address: &str) -> bool {
        self.shared.registry.lock().await.is_bonded(address)
    }

    /// Watch the session state. The current value is available immediately.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Current session state.
    pub fn snapshot(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Subscribe to one-off error notifications.
    pub fn errors(&self) -> broadcast::Receiver<String> {
        self.shared.errors.subscribe()
    }

    /// Current connection state machine value.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.manager.state()
    }
}

impl<R: Radio> Drop for SessionService<R> {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }

        // Close any live connection. Outside a runtime there is nothing left
        // to run the session task anyway.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let manager = self.shared.manager.clone();
            runtime.spawn(async move { manager.close().await });
        }
    }
}
