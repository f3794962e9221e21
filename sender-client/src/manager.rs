//! Connection manager: drives the pure state machine with real I/O.
//!
//! # Architecture
//!
//! ```text
//! connect() ──► session task ──► Radio::open_socket ──► TransferChannel
//!                   │                                        │
//!                   └──── sender-core::ConnectionState ◄─────┘
//!                                  │
//!                        ConnectionResult (mpsc)
//! ```
//!
//! Every transition goes through [`ConnectionState::on_event`]; this module
//! only executes the returned [`Action`]s. One spawned task per attempt runs
//! the connect call and then the receive loop. Closing sends a stop signal
//! that the task checks at every blocking point.

use crate::channel::{ChannelError, TransferChannel};
use crate::config::LinkConfig;
use crate::radio::Radio;
use sender_core::{Action, ConnectionState, Event, SessionId};
use sender_types::{ConnectionResult, LinkError, Message, Peer};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Connection manager errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A connection attempt is already in progress or established.
    #[error("a connection is already active")]
    AlreadyActive,

    /// Writing a frame failed; the session has been torn down.
    #[error("send failed: {0}")]
    Send(#[from] ChannelError),
}

/// Receiver of one session's lifecycle results.
pub type ResultReceiver = mpsc::UnboundedReceiver<ConnectionResult>;

struct ActiveSession {
    id: SessionId,
    stop: watch::Sender<bool>,
    results: mpsc::UnboundedSender<ConnectionResult>,
    channel: Option<Arc<TransferChannel>>,
}

struct Inner {
    state: ConnectionState,
    next_session: SessionId,
    active: Option<ActiveSession>,
}

/// What the caller must release after a transition.
#[derive(Default)]
struct Release {
    channel: Option<Arc<TransferChannel>>,
    closing: Option<SessionId>,
}

/// Owns the single connection, its socket and its transfer channel.
pub struct ConnectionManager<R: Radio> {
    radio: Arc<R>,
    config: LinkConfig,
    inner: Arc<Mutex<Inner>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl<R: Radio> Clone for ConnectionManager<R> {
    fn clone(&self) -> Self {
        Self {
            radio: Arc::clone(&self.radio),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            state_tx: Arc::clone(&self.state_tx),
        }
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    // A dropped sender also means the session is over.
    let _ = stop.wait_for(|stop| *stop).await;
}

impl<R: Radio> ConnectionManager<R> {
    /// Create a manager in the Idle state.
    pub fn new(radio: Arc<R>, config: LinkConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            radio,
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Idle,
                next_session: 1,
                active: None,
            })),
            state_tx: Arc::new(state_tx),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Start connecting to `peer`.
    ///
    /// Only valid from Idle; otherwise the current session is left alone and
    /// [`ManagerError::AlreadyActive`] is returned. The returned receiver
    /// yields `Established` before any `TransferSucceeded`, and at most one
    /// of `Error`/`Finished`. It closes when the session is over.
    pub async fn connect(&self, peer: Peer) -> Result<ResultReceiver, ManagerError> {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let session = {
            let mut inner = self.inner.lock().await;
            let session = inner.next_session;
            let (state, actions) = inner.state.clone().on_event(Event::ConnectRequested {
                session,
                peer: peer.clone(),
            });
            if !actions
                .iter()
                .any(|a| matches!(a, Action::OpenSocket { .. }))
            {
                warn!(peer = %peer, "connect rejected: a connection is already active");
                return Err(ManagerError::AlreadyActive);
            }

            inner.next_session += 1;
            inner.state = state;
            inner.active = Some(ActiveSession {
                id: session,
                stop: stop_tx,
                results: results_tx,
                channel: None,
            });
            self.state_tx.send_replace(inner.state.clone());
            session
        };

        info!(session, peer = %peer, "connecting");
        let manager = self.clone();
        tokio::spawn(async move { manager.run_session(session, peer, stop_rx).await });

        Ok(results_rx)
    }

    /// Write `message` on the active channel.
    ///
    /// Returns the sent message, or `None` when no channel is active. A write
    /// failure emits `Error` on the session and tears it down.
    pub async fn send(&self, message: Message) -> Result<Option<Message>, ManagerError> {
        let (session, channel) = {
            let inner = self.inner.lock().await;
            let channel = inner.active.as_ref().and_then(|a| a.channel.clone());
            match (&inner.state, channel) {
                (ConnectionState::Connected { session, .. }, Some(channel)) => {
                    (*session, channel)
                }
                _ => {
                    debug!(id = %message.id, "send ignored: not connected");
                    return Ok(None);
                }
            }
        };

        match channel.send(&message).await {
            Ok(()) => Ok(Some(message)),
            Err(e) => {
                warn!(session, error = %e, "send failed");
                let release = self
                    .apply(
                        Event::TransferFailed {
                            session,
                            error: e.classify(),
                        },
                        None,
                    )
                    .await;
                self.release(release).await;
                Err(ManagerError::Send(e))
            }
        }
    }

    /// Close the current session, whatever state it is in.
    ///
    /// Interrupts a blocked connect or read, closes the socket if one is held
    /// and returns once the manager is Idle again. Closing an Idle manager is
    /// a no-op.
    pub async fn close(&self) {
        let release = self.apply(Event::CloseRequested, None).await;
        if let Some(session) = release.closing {
            info!(session, "closing connection");
        }
        self.release(release).await;

        // A teardown started by the session task may still be releasing its
        // socket.
        let mut state = self.state_tx.subscribe();
        let _ = state
            .wait_for(|s| !matches!(s, ConnectionState::Closing { .. }))
            .await;
    }

    /// Check an advisory link-state event against the radio's bonded set.
    ///
    /// Returns the flag to publish, or [`LinkError::UntrustedLinkEvent`] when
    /// the peer is not bonded or the bonded set cannot be read.
    pub async fn on_link_state(&self, connected: bool, peer: &Peer) -> Result<bool, LinkError> {
        let untrusted = || LinkError::UntrustedLinkEvent {
            address: peer.address.clone(),
        };

        let bonded = self.radio.bonded_devices().await.map_err(|e| {
            debug!(error = %e, "bonded devices unavailable");
            untrusted()
        })?;

        if bonded.contains(peer) {
            debug!(peer = %peer, connected, "link state changed");
            Ok(connected)
        } else {
            warn!(peer = %peer, connected, "ignoring link event from unbonded device");
            Err(untrusted())
        }
    }

    async fn run_session(self, session: SessionId, peer: Peer, mut stop: watch::Receiver<bool>) {
        let opened = tokio::select! {
            biased;
            _ = stopped(&mut stop) => {
                debug!(session, "connect cancelled");
                return;
            }
            opened = tokio::time::timeout(
                self.config.connect_timeout,
                self.radio.open_socket(&peer, self.config.service_id),
            ) => opened,
        };

        let socket = match opened {
            Ok(Ok(Some(socket))) => socket,
            Ok(Ok(None)) => {
                warn!(session, peer = %peer, "radio returned no socket");
                return self.connect_failed(session, LinkError::SocketUnavailable).await;
            }
            Ok(Err(e)) => {
                warn!(session, peer = %peer, error = %e, "connect failed");
                return self.connect_failed(session, e.classify()).await;
            }
            Err(_) => {
                warn!(session, peer = %peer, "connect timed out");
                return self.connect_failed(session, LinkError::SocketUnavailable).await;
            }
        };

        let channel = Arc::new(TransferChannel::new(socket, &self.config));
        let release = self
            .apply(Event::SocketOpened { session }, Some(Arc::clone(&channel)))
            .await;
        if release.channel.is_some() {
            debug!(session, "discarding socket of a closed attempt");
            self.release(release).await;
            return;
        }

        info!(session, peer = %peer, "connected");
        self.receive_loop(session, channel, stop).await;
    }

    async fn connect_failed(&self, session: SessionId, error: LinkError) {
        let release = self.apply(Event::ConnectFailed { session, error }, None).await;
        self.release(release).await;
    }

    async fn receive_loop(
        &self,
        session: SessionId,
        channel: Arc<TransferChannel>,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut incoming = match channel.receive() {
            Ok(incoming) => incoming,
            Err(e) => {
                let error = e.classify();
                let release = self.apply(Event::TransferFailed { session, error }, None).await;
                self.release(release).await;
                return;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = stopped(&mut stop) => {
                    debug!(session, "receive loop stopped");
                    return;
                }
                next = incoming.next_message() => next,
            };

            let event = match next {
                Ok(Some(message)) => {
                    self.apply(Event::MessageReceived { session, message }, None)
                        .await;
                    continue;
                }
                Ok(None) => {
                    info!(session, "peer closed the stream");
                    Event::StreamEnded { session }
                }
                Err(e) => {
                    warn!(session, error = %e, "receive failed");
                    Event::TransferFailed {
                        session,
                        error: e.classify(),
                    }
                }
            };

            let release = self.apply(event, None).await;
            self.release(release).await;
            return;
        }
    }

    /// Feed one event to the state machine and execute its actions.
    ///
    /// `opened` is the channel built for a `SocketOpened` event. Channels
    /// that must be closed are handed back instead of being closed under the
    /// lock.
    async fn apply(&self, event: Event, mut opened: Option<Arc<TransferChannel>>) -> Release {
        let mut inner = self.inner.lock().await;
        let (state, actions) = inner.state.clone().on_event(event);
        let mut release = Release::default();

        for action in actions {
            match action {
                Action::Emit(result) => {
                    if let Some(active) = inner.active.as_ref() {
                        let _ = active.results.send(result);
                    }
                }
                Action::StartTransfer { .. } => {
                    if let Some(active) = inner.active.as_mut() {
                        active.channel = opened.take();
                    }
                }
                Action::CloseSocket { session } => {
                    if let Some(active) = inner.active.as_mut() {
                        let _ = active.stop.send(true);
                        release.channel = active.channel.take();
                    }
                    release.closing = Some(session);
                }
                Action::DiscardSocket { .. } => {
                    release.channel = opened.take();
                }
                // Only produced by ConnectRequested, which `connect` handles.
                Action::OpenSocket { .. } => {}
            }
        }

        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "connection state changed");
        }
        inner.state = state;
        if inner.state.is_idle() {
            if let Some(active) = inner.active.take() {
                debug!(session = active.id, "session released");
            }
        }
        self.state_tx.send_replace(inner.state.clone());

        release
    }

    async fn release(&self, release: Release) {
        if let Some(channel) = release.channel {
            channel.close().await;
        }
        if let Some(session) = release.closing {
            self.apply(Event::CloseCompleted { session }, None).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::MockRadio;
    use sender_types::CONNECTION_INTERRUPTED;
    use std::time::Duration;

    fn peer() -> Peer {
        Peer::new("Tablet", "00:11:22:33:44:55")
    }

    fn manager(radio: &MockRadio) -> ConnectionManager<MockRadio> {
        ConnectionManager::new(Arc::new(radio.clone()), LinkConfig::default())
    }

    async fn wait_idle(manager: &ConnectionManager<MockRadio>) {
        let mut state = manager.subscribe_state();
        state.wait_for(|s| s.is_idle()).await.unwrap();
    }

    #[tokio::test]
    async fn connect_established_and_receives() {
        let radio = MockRadio::new();
        let socket = radio.queue_socket();
        socket.push_frame(&Message::outgoing("1", "SYNC"));
        let manager = manager(&radio);

        let mut results = manager.connect(peer()).await.unwrap();

        assert_eq!(results.recv().await, Some(ConnectionResult::Established));
        assert_eq!(
            results.recv().await,
            Some(ConnectionResult::TransferSucceeded(Message::outgoing(
                "1", "SYNC"
            )))
        );
        assert!(manager.state().is_connected());
        assert_eq!(radio.open_requests()[0].1, sender_types::SERVICE_UUID);
    }

    #[tokio::test]
    async fn no_socket_fails_to_idle() {
        let radio = MockRadio::new();
        radio.queue_no_socket();
        let manager = manager(&radio);

        let mut results = manager.connect(peer()).await.unwrap();

        assert_eq!(
            results.recv().await,
            Some(ConnectionResult::Error(CONNECTION_INTERRUPTED.into()))
        );
        assert_eq!(results.recv().await, None);
        assert!(manager.state().is_idle());
    }

    #[tokio::test]
    async fn connect_timeout_fails() {
        let radio = MockRadio::new();
        radio.hang_next_open();
        let manager = ConnectionManager::new(
            Arc::new(radio.clone()),
            LinkConfig::default().with_connect_timeout(Duration::from_millis(20)),
        );

        let mut results = manager.connect(peer()).await.unwrap();

        assert_eq!(
            results.recv().await,
            Some(ConnectionResult::Error(CONNECTION_INTERRUPTED.into()))
        );
        assert!(manager.state().is_idle());
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let radio = MockRadio::new();
        radio.hang_next_open();
        let manager = manager(&radio);

        let _results = manager.connect(peer()).await.unwrap();
        let state = manager.state();

        let err = manager.connect(Peer::unnamed("AA")).await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyActive));
        assert_eq!(manager.state(), state);

        manager.close().await;
    }

    #[tokio::test]
    async fn close_cancels_pending_connect() {
        let radio = MockRadio::new();
        radio.hang_next_open();
        let manager = manager(&radio);

        let mut results = manager.connect(peer()).await.unwrap();
        manager.close().await;

        assert!(manager.state().is_idle());
        // Nothing is emitted for a cancelled attempt.
        assert_eq!(results.recv().await, None);
    }

    #[tokio::test]
    async fn close_idle_is_noop() {
        let radio = MockRadio::new();
        let manager = manager(&radio);
        manager.close().await;
        manager.close().await;
        assert!(manager.state().is_idle());
    }

    #[tokio::test]
    async fn send_without_channel_is_none() {
        let radio = MockRadio::new();
        let manager = manager(&radio);

        let sent = manager.send(Message::outgoing("1", "PING")).await.unwrap();
        assert!(sent.is_none());
    }

    #[tokio::test]
    async fn send_echoes_message() {
        let radio = MockRadio::new();
        let socket = radio.queue_socket();
        let manager = manager(&radio);

        let mut results = manager.connect(peer()).await.unwrap();
        assert_eq!(results.recv().await, Some(ConnectionResult::Established));

        let sent = manager.send(Message::outgoing("9", "PING")).await.unwrap();
        assert_eq!(sent, Some(Message::outgoing("9", "PING")));
        assert_eq!(socket.written_messages(), vec![Message::outgoing("9", "PING")]);

        manager.close().await;
        assert_eq!(socket.close_count(), 1);
    }

    #[tokio::test]
    async fn send_failure_tears_down() {
        let radio = MockRadio::new();
        let socket = radio.queue_socket();
        let manager = manager(&radio);

        let mut results = manager.connect(peer()).await.unwrap();
        assert_eq!(results.recv().await, Some(ConnectionResult::Established));

        socket.fail_next_write("broken pipe");
        let err = manager.send(Message::outgoing("1", "PING")).await;
        assert!(matches!(err, Err(ManagerError::Send(_))));

        assert_eq!(
            results.recv().await,
            Some(ConnectionResult::Error(CONNECTION_INTERRUPTED.into()))
        );
        assert_eq!(results.recv().await, None);
        wait_idle(&manager).await;
        assert_eq!(socket.close_count(), 1);
    }

    #[tokio::test]
    async fn link_state_requires_bonded_peer() {
        let radio = MockRadio::new();
        radio.set_bonded(vec![peer()]);
        let manager = manager(&radio);

        assert_eq!(manager.on_link_state(true, &peer()).await, Ok(true));
        assert_eq!(
            manager.on_link_state(true, &Peer::unnamed("FF")).await,
            Err(LinkError::UntrustedLinkEvent {
                address: "FF".into()
            })
        );
    }
}
