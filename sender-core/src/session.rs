//! Session snapshot for observers.
//!
//! [`SessionState`] is the one value the application watches. Every change
//! goes through a method here and the snapshot is normalized afterwards:
//! whenever the link is not connected, `last_message` is the empty record.
//! Nothing carries over from one connection to the next.

use sender_types::{ConnectionResult, Message, Peer};
use serde::Serialize;

/// Aggregated discovery and connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Peers found during discovery, first-seen order.
    pub scanned_peers: Vec<Peer>,
    /// Bonded peers as of the last discovery start.
    pub bonded_peers: Vec<Peer>,
    /// A connection is established.
    pub is_connected: bool,
    /// A connection attempt is in progress.
    pub is_connecting: bool,
    /// Last user-facing error, cleared when a connection is established.
    pub last_error: Option<String>,
    /// Last message received or successfully sent on this connection.
    pub last_message: Message,
}

impl SessionState {
    /// Create the initial snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both peer lists.
    pub fn set_peers(&mut self, scanned: &[Peer], bonded: &[Peer]) {
        self.scanned_peers = scanned.to_vec();
        self.bonded_peers = bonded.to_vec();
    }

    /// A connect request was accepted.
    pub fn connect_requested(&mut self) {
        self.is_connecting = true;
    }

    /// Fold one lifecycle result into the snapshot.
    ///
    /// `Finished` is handled like a local disconnect.
    pub fn apply_result(&mut self, result: &ConnectionResult) {
        match result {
            ConnectionResult::Established => {
                self.is_connected = true;
                self.is_connecting = false;
                self.last_error = None;
            }
            ConnectionResult::TransferSucceeded(message) => {
                self.last_message = message.clone();
            }
            ConnectionResult::Error(reason) => {
                self.is_connected = false;
                self.is_connecting = false;
                self.last_error = Some(reason.clone());
            }
            ConnectionResult::Finished => self.disconnected(),
        }
        self.normalize();
    }

    /// An attempt's result stream closed.
    ///
    /// Covers attempts that end without any result, such as a connect
    /// refused for lack of radio authorization.
    pub fn attempt_ended(&mut self) {
        self.is_connecting = false;
    }

    /// The link was closed locally or by the peer.
    pub fn disconnected(&mut self) {
        self.is_connected = false;
        self.is_connecting = false;
        self.normalize();
    }

    /// A trusted link-state event reported the connection flag.
    pub fn link_state(&mut self, connected: bool) {
        self.is_connected = connected;
        self.normalize();
    }

    /// Record a user-facing error notification.
    pub fn error(&mut self, reason: impl Into<String>) {
        self.last_error = Some(reason.into());
    }

    /// A message was written to the peer.
    pub fn message_sent(&mut self, message: Message) {
        self.last_message = message;
        self.normalize();
    }

    fn normalize(&mut self) {
        if !self.is_connected {
            self.last_message = Message::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_message() -> Message {
        Message {
            id: "1".into(),
            action: "SYNC".into(),
            battery_percentage: "80".into(),
            ..Message::default()
        }
    }

    fn connected() -> SessionState {
        let mut state = SessionState::new();
        state.connect_requested();
        state.apply_result(&ConnectionResult::Established);
        state
    }

    #[test]
    fn initial_state_is_empty() {
        let state = SessionState::new();
        assert!(!state.is_connected);
        assert!(!state.is_connecting);
        assert!(state.last_error.is_none());
        assert!(state.last_message.is_empty());
    }

    #[test]
    fn established_clears_connecting_and_error() {
        let mut state = SessionState::new();
        state.error("old failure");
        state.connect_requested();
        assert!(state.is_connecting);

        state.apply_result(&ConnectionResult::Established);

        assert!(state.is_connected);
        assert!(!state.is_connecting);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn transfer_updates_last_message() {
        let mut state = connected();
        state.apply_result(&ConnectionResult::TransferSucceeded(sync_message()));
        assert_eq!(state.last_message, sync_message());
    }

    #[test]
    fn error_resets_flags_and_message() {
        let mut state = connected();
        state.apply_result(&ConnectionResult::TransferSucceeded(sync_message()));

        state.apply_result(&ConnectionResult::Error("connection interrupted".into()));

        assert!(!state.is_connected);
        assert!(!state.is_connecting);
        assert_eq!(state.last_error.as_deref(), Some("connection interrupted"));
        assert!(state.last_message.is_empty());
    }

    #[test]
    fn finished_acts_like_disconnect() {
        let mut state = connected();
        state.apply_result(&ConnectionResult::TransferSucceeded(sync_message()));

        state.apply_result(&ConnectionResult::Finished);

        assert!(!state.is_connected);
        assert!(state.last_message.is_empty());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn silent_attempt_end_clears_connecting() {
        let mut state = SessionState::new();
        state.connect_requested();

        state.attempt_ended();

        assert!(!state.is_connecting);
        assert!(!state.is_connected);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn attempt_end_keeps_established_link() {
        let mut state = connected();
        state.attempt_ended();
        assert!(state.is_connected);
    }

    #[test]
    fn message_dropped_when_not_connected() {
        let mut state = SessionState::new();
        state.apply_result(&ConnectionResult::TransferSucceeded(sync_message()));
        assert!(state.last_message.is_empty());

        state.message_sent(sync_message());
        assert!(state.last_message.is_empty());
    }

    #[test]
    fn sent_message_is_recorded_while_connected() {
        let mut state = connected();
        state.message_sent(Message::outgoing("9", "PING"));
        assert_eq!(state.last_message.action, "PING");
    }

    #[test]
    fn link_down_resets_message() {
        let mut state = connected();
        state.message_sent(sync_message());
        state.link_state(false);
        assert!(!state.is_connected);
        assert!(state.last_message.is_empty());
    }

    #[test]
    fn peers_are_replaced() {
        let mut state = SessionState::new();
        state.set_peers(&[Peer::unnamed("AA")], &[Peer::unnamed("BB")]);
        state.set_peers(&[Peer::unnamed("CC")], &[]);
        assert_eq!(state.scanned_peers, vec![Peer::unnamed("CC")]);
        assert!(state.bonded_peers.is_empty());
    }

    #[test]
    fn snapshot_serializes() {
        let state = connected();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["is_connected"], true);
        assert_eq!(json["last_message"]["id"], "");
    }
}
