//! Mock radio for testing.
//!
//! Allows scripting socket outcomes and inbound bytes, injecting radio
//! events, and capturing written frames for verification.

use super::{Radio, RadioError, RadioEvent, RadioSocket};
use async_trait::async_trait;
use sender_types::{decode, encode, Message, Peer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

enum ReadStep {
    Data(Vec<u8>),
    Fail(String),
}

struct Reader {
    rx: mpsc::UnboundedReceiver<ReadStep>,
    pending: Vec<u8>,
}

struct MockSocketInner {
    feed: Mutex<Option<mpsc::UnboundedSender<ReadStep>>>,
    reader: tokio::sync::Mutex<Reader>,
    written: Mutex<Vec<Vec<u8>>>,
    fail_next_write: Mutex<Option<String>>,
    close_count: AtomicUsize,
}

/// Mock connected socket.
///
/// Clones share state: the copy handed to the code under test and the copy
/// kept by the test observe the same stream.
#[derive(Clone)]
pub struct MockSocket {
    inner: Arc<MockSocketInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockSocket {
    /// Create an open socket with nothing to read yet.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockSocketInner {
                feed: Mutex::new(Some(tx)),
                reader: tokio::sync::Mutex::new(Reader {
                    rx,
                    pending: Vec::new(),
                }),
                written: Mutex::new(Vec::new()),
                fail_next_write: Mutex::new(None),
                close_count: AtomicUsize::new(0),
            }),
        }
    }

    fn feed(&self, step: ReadStep) {
        if let Some(tx) = lock(&self.inner.feed).as_ref() {
            let _ = tx.send(step);
        }
    }

    /// Make `bytes` available to the next reads.
    pub fn push(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.feed(ReadStep::Data(bytes.to_vec()));
        }
    }

    /// Make one encoded frame available to the next reads.
    pub fn push_frame(&self, msg: &Message) {
        self.push(&encode(msg));
    }

    /// Cause the read after all queued bytes to fail.
    pub fn fail_read(&self, error: &str) {
        self.feed(ReadStep::Fail(error.to_string()));
    }

    /// Close the stream from the peer side; reads return 0 once drained.
    pub fn finish(&self) {
        lock(&self.inner.feed).take();
    }

    /// Cause the next write to fail with the given error.
    pub fn fail_next_write(&self, error: &str) {
        *lock(&self.inner.fail_next_write) = Some(error.to_string());
    }

    /// Every buffer passed to a successful `write`.
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.inner.written).clone()
    }

    /// Successful writes decoded as frames.
    pub fn written_messages(&self) -> Vec<Message> {
        self.written()
            .iter()
            .filter_map(|frame| decode(frame).ok())
            .collect()
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.inner.close_count.load(Ordering::SeqCst)
    }

    /// Whether `close` was called at least once.
    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

impl Default for MockSocket {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadioSocket for MockSocket {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, RadioError> {
        if self.is_closed() {
            return Err(RadioError::Closed);
        }

        let mut reader = self.inner.reader.lock().await;
        if reader.pending.is_empty() {
            match reader.rx.recv().await {
                Some(ReadStep::Data(data)) => reader.pending = data,
                Some(ReadStep::Fail(error)) => return Err(RadioError::ReadFailed(error)),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(reader.pending.len());
        buf[..n].copy_from_slice(&reader.pending[..n]);
        reader.pending.drain(..n);
        Ok(n)
    }

    async fn write(&self, data: &[u8]) -> Result<(), RadioError> {
        if self.is_closed() {
            return Err(RadioError::Closed);
        }

        // Check for forced failure
        if let Some(error) = lock(&self.inner.fail_next_write).take() {
            return Err(RadioError::WriteFailed(error));
        }

        lock(&self.inner.written).push(data.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), RadioError> {
        self.inner.close_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.feed).take();
        Ok(())
    }
}

enum OpenPlan {
    Socket(MockSocket),
    NoSocket,
    Fail(String),
    Hang,
}

struct MockRadioInner {
    permission_denied: bool,
    scanning: bool,
    bonded: Vec<Peer>,
    local: Option<Peer>,
    plans: VecDeque<OpenPlan>,
    open_requests: Vec<(Peer, Uuid)>,
}

/// Mock radio stack for testing.
///
/// `open_socket` consumes scripted outcomes in order; with nothing scripted
/// it returns no socket.
#[derive(Clone)]
pub struct MockRadio {
    inner: Arc<Mutex<MockRadioInner>>,
    events: broadcast::Sender<RadioEvent>,
}

impl MockRadio {
    /// Create a mock radio with permissions granted and no devices.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(MockRadioInner {
                permission_denied: false,
                scanning: false,
                bonded: Vec::new(),
                local: None,
                plans: VecDeque::new(),
                open_requests: Vec::new(),
            })),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockRadioInner> {
        lock(&self.inner)
    }

    /// Script the next `open_socket` to succeed; returns the socket handle.
    pub fn queue_socket(&self) -> MockSocket {
        let socket = MockSocket::new();
        self.lock()
            .plans
            .push_back(OpenPlan::Socket(socket.clone()));
        socket
    }

    /// Script the next `open_socket` to return no socket.
    pub fn queue_no_socket(&self) {
        self.lock().plans.push_back(OpenPlan::NoSocket);
    }

    /// Script the next `open_socket` to fail with the given error.
    pub fn fail_next_open(&self, error: &str) {
        self.lock()
            .plans
            .push_back(OpenPlan::Fail(error.to_string()));
    }

    /// Script the next `open_socket` to never complete.
    pub fn hang_next_open(&self) {
        self.lock().plans.push_back(OpenPlan::Hang);
    }

    /// Set the bonded device list.
    pub fn set_bonded(&self, peers: Vec<Peer>) {
        self.lock().bonded = peers;
    }

    /// Set this device's identity.
    pub fn set_local_device(&self, peer: Peer) {
        self.lock().local = Some(peer);
    }

    /// Revoke or restore scan/connect authorization.
    pub fn set_permission_denied(&self, denied: bool) {
        self.lock().permission_denied = denied;
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.lock().scanning
    }

    /// Every `(peer, service_id)` passed to `open_socket`.
    pub fn open_requests(&self) -> Vec<(Peer, Uuid)> {
        self.lock().open_requests.clone()
    }

    /// Deliver a "device found" event to subscribers.
    pub fn emit_found(&self, peer: Peer) {
        let _ = self.events.send(RadioEvent::DeviceFound(peer));
    }

    /// Deliver a "link state changed" event to subscribers.
    pub fn emit_link_state(&self, connected: bool, peer: Peer) {
        let _ = self
            .events
            .send(RadioEvent::LinkStateChanged { connected, peer });
    }

    /// Number of registered event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn check_permission(&self) -> Result<(), RadioError> {
        if self.lock().permission_denied {
            Err(RadioError::PermissionDenied)
        } else {
            Ok(())
        }
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn start_scan(&self) -> Result<(), RadioError> {
        self.check_permission()?;
        self.lock().scanning = true;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.check_permission()?;
        self.lock().scanning = false;
        Ok(())
    }

    async fn bonded_devices(&self) -> Result<Vec<Peer>, RadioError> {
        self.check_permission()?;
        Ok(self.lock().bonded.clone())
    }

    async fn local_device(&self) -> Result<Peer, RadioError> {
        self.check_permission()?;
        self.lock().local.clone().ok_or(RadioError::Unavailable)
    }

    async fn open_socket(
        &self,
        peer: &Peer,
        service_id: Uuid,
    ) -> Result<Option<Box<dyn RadioSocket>>, RadioError> {
        self.check_permission()?;
        let plan = {
            let mut inner = self.lock();
            inner.open_requests.push((peer.clone(), service_id));
            inner.plans.pop_front()
        };

        match plan {
            Some(OpenPlan::Socket(socket)) => Ok(Some(Box::new(socket))),
            Some(OpenPlan::NoSocket) | None => Ok(None),
            Some(OpenPlan::Fail(error)) => Err(RadioError::ConnectFailed(error)),
            Some(OpenPlan::Hang) => std::future::pending().await,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sender_types::SERVICE_UUID;

    // ===========================================
    // MockSocket Tests
    // ===========================================

    #[tokio::test]
    async fn socket_reads_pushed_bytes_in_order() {
        let socket = MockSocket::new();
        socket.push(b"abc");
        socket.push(b"de");

        let mut buf = [0u8; 2];
        assert_eq!(socket.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(socket.read(&mut buf).await.unwrap(), 1);
        assert_eq!(&buf[..1], b"c");
        assert_eq!(socket.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf, b"de");
    }

    #[tokio::test]
    async fn finish_reads_as_end_of_stream() {
        let socket = MockSocket::new();
        socket.push(b"x");
        socket.finish();

        let mut buf = [0u8; 8];
        assert_eq!(socket.read(&mut buf).await.unwrap(), 1);
        assert_eq!(socket.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn forced_read_failure() {
        let socket = MockSocket::new();
        socket.fail_read("connection reset");

        let mut buf = [0u8; 8];
        let result = socket.read(&mut buf).await;
        assert!(matches!(result, Err(RadioError::ReadFailed(_))));
    }

    #[tokio::test]
    async fn writes_are_captured() {
        let socket = MockSocket::new();
        socket.write(b"one").await.unwrap();
        socket.write(&encode(&Message::outgoing("1", "PING"))).await.unwrap();

        assert_eq!(socket.written().len(), 2);
        assert_eq!(socket.written_messages(), vec![Message::outgoing("1", "PING")]);
    }

    #[tokio::test]
    async fn forced_write_failure_is_one_shot() {
        let socket = MockSocket::new();
        socket.fail_next_write("buffer full");

        assert!(matches!(
            socket.write(b"data").await,
            Err(RadioError::WriteFailed(_))
        ));
        socket.write(b"data").await.unwrap();
        assert_eq!(socket.written().len(), 1);
    }

    #[tokio::test]
    async fn closed_socket_rejects_io_and_counts_closes() {
        let socket = MockSocket::new();
        socket.close().await.unwrap();
        socket.close().await.unwrap();

        assert_eq!(socket.close_count(), 2);
        let mut buf = [0u8; 1];
        assert!(matches!(socket.read(&mut buf).await, Err(RadioError::Closed)));
        assert!(matches!(socket.write(b"x").await, Err(RadioError::Closed)));
    }

    // ===========================================
    // MockRadio Tests
    // ===========================================

    #[tokio::test]
    async fn open_socket_follows_script() {
        let radio = MockRadio::new();
        let peer = Peer::unnamed("AA");
        let _socket = radio.queue_socket();
        radio.queue_no_socket();
        radio.fail_next_open("refused");

        assert!(radio.open_socket(&peer, SERVICE_UUID).await.unwrap().is_some());
        assert!(radio.open_socket(&peer, SERVICE_UUID).await.unwrap().is_none());
        assert!(matches!(
            radio.open_socket(&peer, SERVICE_UUID).await,
            Err(RadioError::ConnectFailed(_))
        ));
        // Nothing scripted: no socket.
        assert!(radio.open_socket(&peer, SERVICE_UUID).await.unwrap().is_none());

        let requests = radio.open_requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0], (peer, SERVICE_UUID));
    }

    #[tokio::test]
    async fn permission_denied_blocks_everything() {
        let radio = MockRadio::new();
        radio.set_permission_denied(true);

        assert_eq!(radio.start_scan().await, Err(RadioError::PermissionDenied));
        assert_eq!(
            radio.bonded_devices().await,
            Err(RadioError::PermissionDenied)
        );
        assert!(!radio.is_scanning());
    }

    #[tokio::test]
    async fn scan_toggles() {
        let radio = MockRadio::new();
        radio.start_scan().await.unwrap();
        assert!(radio.is_scanning());
        radio.stop_scan().await.unwrap();
        assert!(!radio.is_scanning());
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let radio = MockRadio::new();
        let mut events = radio.subscribe();
        assert_eq!(radio.subscriber_count(), 1);

        radio.emit_found(Peer::unnamed("AA"));
        radio.emit_link_state(true, Peer::unnamed("AA"));

        assert_eq!(
            events.recv().await.unwrap(),
            RadioEvent::DeviceFound(Peer::unnamed("AA"))
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            RadioEvent::LinkStateChanged { connected: true, .. }
        ));

        drop(events);
        assert_eq!(radio.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn local_device_requires_identity() {
        let radio = MockRadio::new();
        assert_eq!(radio.local_device().await, Err(RadioError::Unavailable));

        radio.set_local_device(Peer::new("Phone", "11"));
        assert_eq!(radio.local_device().await.unwrap().address, "11");
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let radio1 = MockRadio::new();
        let radio2 = radio1.clone();

        radio1.set_bonded(vec![Peer::unnamed("B1")]);
        assert_eq!(radio2.bonded_devices().await.unwrap().len(), 1);
    }
}
