//! Server network layer: the listener, admission control and accept loop

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hook::{GameplayHook, NoRules};
use crate::matchmaker::Matchmaker;
use crate::room::RoomSummary;
use crate::session::{Connection, IdIssuer, PlayerSession};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Accepts connections and hands the resulting players to the matchmaker
///
/// Admission is a counting semaphore sized to `max_players`. The accept loop
/// takes a permit before every `accept`, so while the server is full new
/// connections wait in the transport backlog. Each permit travels with its
/// player session and is returned when that player leaves.
pub struct Server {
    config: Arc<ServerConfig>,
    matchmaker: Arc<Matchmaker>,
    ids: Arc<IdIssuer>,
    admission: Arc<Semaphore>,
    listener: Mutex<Option<Listening>>,
}

struct Listening {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Server {
    /// Creates a server running the no-op rule set
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        Self::with_hook(config, Arc::new(NoRules))
    }

    pub fn with_hook(
        config: ServerConfig,
        hook: Arc<dyn GameplayHook>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Server {
            matchmaker: Arc::new(Matchmaker::new(Arc::clone(&config), hook)),
            ids: Arc::new(IdIssuer::new()),
            admission: Arc::new(Semaphore::new(config.max_players)),
            listener: Mutex::new(None),
            config,
        })
    }

    fn listener(&self) -> MutexGuard<'_, Option<Listening>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds the configured address and starts accepting players
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested.
    pub async fn begin_listening(&self) -> Result<SocketAddr, ServerError> {
        if self.is_listening() {
            return Err(ServerError::AlreadyListening);
        }

        let socket = TcpListener::bind(self.config.bind_address()).await?;
        let addr = socket.local_addr()?;
        info!("Server listening on {}", addr);

        let task = tokio::spawn(accept_loop(
            socket,
            Arc::clone(&self.config),
            Arc::clone(&self.matchmaker),
            Arc::clone(&self.ids),
            Arc::clone(&self.admission),
        ));

        let mut listener = self.listener();
        if listener.is_some() {
            task.abort();
            return Err(ServerError::AlreadyListening);
        }
        *listener = Some(Listening { addr, task });
        Ok(addr)
    }

    /// Stops accepting new players; rooms already running carry on
    pub fn stop(&self) -> Result<(), ServerError> {
        let listening = self.listener().take().ok_or(ServerError::NotListening)?;
        listening.task.abort();
        info!("Stopped listening on {}", listening.addr);
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listener()
            .as_ref()
            .is_some_and(|listening| !listening.task.is_finished())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener().as_ref().map(|listening| listening.addr)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn connected_players(&self) -> usize {
        self.matchmaker.connected_players()
    }

    pub fn is_full(&self) -> bool {
        self.connected_players() >= self.config.max_players
    }

    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.matchmaker.summaries()
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(listening) = self.listener().take() {
            listening.task.abort();
        }
    }
}

/// Waits for a free player slot, logging each interval spent full
///
/// Returns `None` only if the semaphore has been closed.
async fn admit(admission: &Arc<Semaphore>, poll: Duration) -> Option<OwnedSemaphorePermit> {
    loop {
        match timeout(poll, Arc::clone(admission).acquire_owned()).await {
            Ok(Ok(permit)) => return Some(permit),
            Ok(Err(_)) => return None,
            Err(_) => debug!("Server full, deferring new connections"),
        }
    }
}

async fn accept_loop(
    socket: TcpListener,
    config: Arc<ServerConfig>,
    matchmaker: Arc<Matchmaker>,
    ids: Arc<IdIssuer>,
    admission: Arc<Semaphore>,
) {
    loop {
        let Some(permit) = admit(&admission, config.admission_poll).await else {
            warn!("Admission closed, accept loop exiting");
            break;
        };

        match socket.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not disable Nagle for {}: {}", addr, e);
                }

                let id = ids.issue();
                let connection = Connection::new(stream, Some(addr), config.buffer_size);
                let session = PlayerSession::new(id, connection).with_admission(permit);

                match matchmaker.place(session) {
                    Ok(room) => info!(
                        "Client {} connected from {} into room {} ({} players connected)",
                        id,
                        addr,
                        room.id(),
                        matchmaker.connected_players()
                    ),
                    Err(e) => error!("Failed to place client {} from {}: {}", id, addr, e),
                }
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}
