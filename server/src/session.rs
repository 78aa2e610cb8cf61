//! Player sessions and their connections
//!
//! This module holds everything the server knows about one connected player:
//! - The wire-visible record (id, name, alive flag, score)
//! - Readiness, which never travels inside the record
//! - Liveness tracking used to evict silent clients
//! - The connection itself, with timeout-bounded send/receive primitives
//!
//! Sessions report readiness changes and eliminations to the room that owns
//! them through a per-room event channel rather than touching the room
//! directly.

use crate::error::SessionError;
use log::debug;
use serde::Serialize;
use shared::PlayerRecord;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedSemaphorePermit};
use tokio::time::timeout;

pub const DEFAULT_NAME_PREFIX: &str = "Player_";

/// Any byte stream a player can be reached through
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// A player's byte stream plus the framing rules applied to it
///
/// Reads are fixed-size: whatever a single read returns, up to
/// `buffer_size` bytes, is one client message. Longer payloads are cut off
/// and the overflow already waiting on the stream is discarded.
pub struct Connection {
    stream: Box<dyn Transport>,
    peer: Option<SocketAddr>,
    buffer_size: usize,
}

impl Connection {
    pub fn new<T: Transport + 'static>(
        stream: T,
        peer: Option<SocketAddr>,
        buffer_size: usize,
    ) -> Self {
        Self {
            stream: Box::new(stream),
            peer,
            buffer_size,
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Performs one fixed-size read, giving up after `wait`
    ///
    /// A zero-length read means the peer hung up and is reported as
    /// [`SessionError::Closed`].
    pub async fn receive(&mut self, wait: Duration) -> Result<Vec<u8>, SessionError> {
        let mut buffer = vec![0u8; self.buffer_size];
        let read = timeout(wait, self.stream.read(&mut buffer)).await;
        match read {
            Err(_) => Err(SessionError::Timeout),
            Ok(Err(e)) => Err(SessionError::Io(e)),
            Ok(Ok(0)) => Err(SessionError::Closed),
            Ok(Ok(len)) => {
                if len == self.buffer_size {
                    self.discard_pending().await;
                }
                buffer.truncate(len);
                Ok(buffer)
            }
        }
    }

    /// Throws away whatever is readable without waiting
    ///
    /// A zero timeout still polls the read once, so only bytes that have
    /// already arrived are consumed. End of stream and errors are left for
    /// the next `receive` to report.
    async fn discard_pending(&mut self) {
        let mut scratch = vec![0u8; self.buffer_size];
        let mut discarded = 0;
        while let Ok(Ok(len)) = timeout(Duration::ZERO, self.stream.read(&mut scratch)).await {
            if len == 0 {
                break;
            }
            discarded += len;
        }
        if discarded > 0 {
            debug!(
                "Discarded {} bytes past the {}-byte read limit from {:?}",
                discarded, self.buffer_size, self.peer
            );
        }
    }

    /// Writes the whole frame and flushes it, giving up after `wait`
    pub async fn send(&mut self, data: &[u8], wait: Duration) -> Result<(), SessionError> {
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(data).await?;
            stream.flush().await?;
            Ok::<(), std::io::Error>(())
        };

        match timeout(wait, write).await {
            Err(_) => Err(SessionError::Timeout),
            Ok(result) => Ok(result?),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

/// Shared handle to a connection, locked only for the duration of one I/O call
pub type Link = Arc<AsyncMutex<Connection>>;

/// Notifications a session raises towards its owning room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    ReadyToggled { player_id: u64, ready: bool },
    Lost { player_id: u64 },
}

/// Hands out process-wide unique, monotonically increasing player ids
#[derive(Debug, Default)]
pub struct IdIssuer {
    next: AtomicU64,
}

impl IdIssuer {
    /// Creates an issuer whose first id is 0
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Read-only view of a player, used by room listings and the console
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: u64,
    pub name: String,
    pub alive: bool,
    pub score: i64,
    pub ready: bool,
}

/// A connected player occupying (or about to occupy) a room slot
#[derive(Debug)]
pub struct PlayerSession {
    record: PlayerRecord,
    ready: bool,
    /// Last time anything arrived from this player
    pub(crate) last_seen: Instant,
    link: Link,
    observer: Option<mpsc::UnboundedSender<PlayerEvent>>,
    /// Held for as long as the session lives; dropping it frees a server slot
    admission: Option<OwnedSemaphorePermit>,
}

impl PlayerSession {
    /// Creates a session with the default `Player_<id>` name
    pub fn new(id: u64, connection: Connection) -> Self {
        Self::with_name(id, format!("{DEFAULT_NAME_PREFIX}{id}"), connection)
    }

    pub fn with_name(id: u64, name: impl Into<String>, connection: Connection) -> Self {
        Self {
            record: PlayerRecord::new(id, name),
            ready: false,
            last_seen: Instant::now(),
            link: Arc::new(AsyncMutex::new(connection)),
            observer: None,
            admission: None,
        }
    }

    /// Ties the session to an admission permit released when it is dropped
    pub fn with_admission(mut self, permit: OwnedSemaphorePermit) -> Self {
        self.admission = Some(permit);
        self
    }

    pub fn id(&self) -> u64 {
        self.record.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn is_alive(&self) -> bool {
        self.record.alive
    }

    pub fn score(&self) -> i64 {
        self.record.score
    }

    pub fn set_score(&mut self, score: i64) {
        self.record.score = score;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn record(&self) -> &PlayerRecord {
        &self.record
    }

    pub fn holds_admission(&self) -> bool {
        self.admission.is_some()
    }

    pub fn link(&self) -> Link {
        Arc::clone(&self.link)
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.record.id,
            name: self.record.name.clone(),
            alive: self.record.alive,
            score: self.record.score,
            ready: self.ready,
        }
    }

    /// Routes this session's notifications to a room's event channel
    pub fn attach(&mut self, observer: mpsc::UnboundedSender<PlayerEvent>) {
        self.observer = Some(observer);
    }

    /// Flips readiness and notifies the owning room
    pub fn toggle_ready(&mut self) -> bool {
        self.ready = !self.ready;
        self.notify(PlayerEvent::ReadyToggled {
            player_id: self.record.id,
            ready: self.ready,
        });
        self.ready
    }

    /// Marks the player as eliminated and notifies the owning room
    pub fn kill(&mut self) {
        self.record.alive = false;
        self.notify(PlayerEvent::Lost {
            player_id: self.record.id,
        });
    }

    /// Adopts a record received from the client
    ///
    /// The server-issued id is kept whatever the client sent. A record can
    /// eliminate its player but never brings one back.
    pub fn apply_record(&mut self, incoming: PlayerRecord) {
        let eliminated = self.record.alive && !incoming.alive;
        self.apply_profile(incoming);
        if eliminated {
            self.kill();
        }
    }

    /// Adopts only the name and score of a received record
    ///
    /// Used before a match, when nobody can be eliminated yet.
    pub fn apply_profile(&mut self, incoming: PlayerRecord) {
        self.record.name = incoming.name;
        self.record.score = incoming.score;
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    fn notify(&self, event: PlayerEvent) {
        if let Some(observer) = &self.observer {
            if observer.send(event).is_err() {
                debug!("Room for player {} no longer listening", self.record.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn test_session(id: u64) -> PlayerSession {
        let (server_end, _client_end) = duplex(64);
        PlayerSession::new(id, Connection::new(server_end, None, 256))
    }

    #[test]
    fn test_session_creation() {
        let session = test_session(4);
        assert_eq!(session.id(), 4);
        assert_eq!(session.name(), "Player_4");
        assert!(session.is_alive());
        assert_eq!(session.score(), 0);
        assert!(!session.is_ready());
        assert!(!session.holds_admission());
    }

    #[test]
    fn test_id_issuer_is_monotonic() {
        let issuer = IdIssuer::new();
        assert_eq!(issuer.issue(), 0);
        assert_eq!(issuer.issue(), 1);
        assert_eq!(issuer.issue(), 2);
    }

    #[test]
    fn test_toggle_ready_notifies_observer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = test_session(1);
        session.attach(tx);

        assert!(session.toggle_ready());
        assert!(!session.toggle_ready());

        assert_eq!(
            rx.try_recv().unwrap(),
            PlayerEvent::ReadyToggled {
                player_id: 1,
                ready: true
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            PlayerEvent::ReadyToggled {
                player_id: 1,
                ready: false
            }
        );
    }

    #[test]
    fn test_toggle_ready_without_observer() {
        let mut session = test_session(1);
        assert!(session.toggle_ready());
        assert!(session.is_ready());
    }

    #[test]
    fn test_kill_notifies_observer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = test_session(9);
        session.attach(tx);

        session.kill();

        assert!(!session.is_alive());
        assert_eq!(rx.try_recv().unwrap(), PlayerEvent::Lost { player_id: 9 });
    }

    #[test]
    fn test_apply_record_keeps_server_id() {
        let mut session = test_session(2);
        session.apply_record(PlayerRecord {
            id: 77,
            name: "Alice".to_string(),
            alive: true,
            score: 150,
        });

        assert_eq!(session.id(), 2);
        assert_eq!(session.name(), "Alice");
        assert_eq!(session.score(), 150);
        assert!(session.is_alive());
    }

    #[test]
    fn test_apply_record_cannot_revive() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = test_session(3);
        session.attach(tx);

        let mut record = session.record().clone();
        record.alive = false;
        session.apply_record(record.clone());
        assert!(!session.is_alive());
        assert_eq!(rx.try_recv().unwrap(), PlayerEvent::Lost { player_id: 3 });

        record.alive = true;
        session.apply_record(record);
        assert!(!session.is_alive());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_apply_profile_ignores_alive_flag() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = test_session(6);
        session.attach(tx);

        session.apply_profile(PlayerRecord {
            id: 6,
            name: "Dora".to_string(),
            alive: false,
            score: 12,
        });

        assert!(session.is_alive());
        assert_eq!(session.name(), "Dora");
        assert_eq!(session.score(), 12);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_session_timeout() {
        let mut session = test_session(1);
        assert!(!session.is_timed_out(Duration::from_secs(1)));

        session.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(session.is_timed_out(Duration::from_secs(1)));

        session.touch();
        assert!(!session.is_timed_out(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_receive_fixed_size_read() {
        let mock = tokio_test::io::Builder::new()
            .read(b"7|Alice|1|150")
            .build();
        let mut connection = Connection::new(mock, None, 256);

        let data = connection.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(data, b"7|Alice|1|150");
    }

    #[tokio::test]
    async fn test_receive_truncates_to_buffer_size() {
        let (server_end, mut client_end) = duplex(64);
        let mut connection = Connection::new(server_end, None, 4);

        client_end.write_all(b"abcdefgh").await.unwrap();

        let data = connection.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(data, b"abcd");
    }

    #[tokio::test]
    async fn test_receive_discards_overflow() {
        let (server_end, mut client_end) = duplex(1024);
        let mut connection = Connection::new(server_end, None, 4);

        client_end.write_all(b"abcd5|Mallory|1|999").await.unwrap();

        let data = connection.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(data, b"abcd");

        let leftover = connection.receive(Duration::from_millis(20)).await;
        assert!(matches!(leftover, Err(SessionError::Timeout)));

        client_end.write_all(b"ok").await.unwrap();
        let data = connection.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(data, b"ok");
    }

    #[tokio::test]
    async fn test_overflow_then_hangup_reports_closed() {
        let (server_end, mut client_end) = duplex(1024);
        let mut connection = Connection::new(server_end, None, 4);

        client_end.write_all(b"abcdefgh").await.unwrap();
        drop(client_end);

        assert_eq!(
            connection.receive(Duration::from_secs(1)).await.unwrap(),
            b"abcd"
        );
        let result = connection.receive(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let (server_end, _client_end) = duplex(64);
        let mut connection = Connection::new(server_end, None, 256);

        let result = connection.receive(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(SessionError::Timeout)));
    }

    #[tokio::test]
    async fn test_receive_closed() {
        let (server_end, client_end) = duplex(64);
        let mut connection = Connection::new(server_end, None, 256);
        drop(client_end);

        let result = connection.receive(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_send_frame() {
        let mock = tokio_test::io::Builder::new().write(b"waiting\n").build();
        let mut connection = Connection::new(mock, None, 256);

        connection
            .send(b"waiting\n", Duration::from_secs(1))
            .await
            .unwrap();
    }
}
