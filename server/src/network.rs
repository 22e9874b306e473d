//! Session server: owns the UDP socket, runs the receive loop, dispatches
//! decoded messages and reports how it stopped

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::logger::Logger;
use crate::registry::PlayerRegistry;
use protocol::{Message, MessageType, PlayerState};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::UdpSocket;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why the receive loop exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token was triggered
    NormalShutdown,
    /// The loop faulted; carries a description of the fault
    Error(String),
}

impl StopReason {
    pub fn is_error(&self) -> bool {
        matches!(self, StopReason::Error(_))
    }
}

/// Lifecycle position of a [`Server`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Socket bound, loop not started
    Created,
    /// Receive loop active
    Running,
    /// Cancellation or disposal observed, loop draining
    Stopping,
    /// Loop exited and the stopped event fired
    Stopped,
    /// Terminal; supersedes every other state
    Disposed,
}

/// A UDP endpoint hosting one multiplayer session
///
/// Only one receive loop ever runs per instance. The player registry is
/// written by that loop alone; collaborators may take read locks on it.
pub struct Server {
    local_addr: SocketAddr,
    recv_buffer_size: usize,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    running: AtomicBool,
    disposed: AtomicBool,
    // Fired by `dispose` to wake a receive that is still pending.
    released: CancellationToken,
    token: CancellationToken,
    logger: Arc<dyn Logger>,
    registry: RwLock<PlayerRegistry>,
    stopped_tx: watch::Sender<Option<StopReason>>,
}

impl Server {
    /// Binds the socket. Port 0 binds an ephemeral port, see [`Server::port`].
    pub async fn bind(
        config: &ServerConfig,
        token: CancellationToken,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        let addr = config.bind_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;
        logger.info(&format!("Server listening on {}", local_addr));

        let (stopped_tx, _) = watch::channel(None);

        Ok(Server {
            local_addr,
            recv_buffer_size: config.recv_buffer_len(),
            socket: Mutex::new(Some(Arc::new(socket))),
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            released: CancellationToken::new(),
            registry: RwLock::new(PlayerRegistry::new(token.clone())),
            token,
            logger,
            stopped_tx,
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &RwLock<PlayerRegistry> {
        &self.registry
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ServerState {
        if self.is_disposed() {
            ServerState::Disposed
        } else if self.stopped_tx.borrow().is_some() {
            ServerState::Stopped
        } else if !self.running.load(Ordering::Acquire) {
            ServerState::Created
        } else if self.token.is_cancelled() || self.released.is_cancelled() {
            ServerState::Stopping
        } else {
            ServerState::Running
        }
    }

    /// Receiver holding `None` until the loop exits, then the stop reason
    pub fn subscribe_stopped(&self) -> watch::Receiver<Option<StopReason>> {
        self.stopped_tx.subscribe()
    }

    /// Waits for the receive loop to exit
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.subscribe_stopped();
        wait_for_stop(&mut rx)
            .await
            .unwrap_or_else(|| StopReason::Error("server dropped before stopping".to_string()))
    }

    /// Runs `callback` on a spawned task once the loop exits
    pub fn on_stopped<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(StopReason) + Send + 'static,
    {
        let mut rx = self.subscribe_stopped();
        tokio::spawn(async move {
            if let Some(reason) = wait_for_stop(&mut rx).await {
                callback(reason);
            }
        })
    }

    fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn release_socket(&self) {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Main receive loop
    ///
    /// Only the first call runs the loop; later or concurrent calls return
    /// `Ok(())` straight away. Fails with `AlreadyDisposed` after
    /// [`Server::dispose`]. Whatever ends the loop, the socket is released,
    /// every player is removed and the stopped event fires exactly once.
    pub async fn run(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ServerError::AlreadyDisposed);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        self.logger.info("Started server!");
        let reason = self.receive_loop().await;

        self.release_socket();
        self.registry.write().await.clear();
        self.stopped_tx.send_replace(Some(reason));
        Ok(())
    }

    async fn receive_loop(&self) -> StopReason {
        let Some(socket) = self.socket() else {
            return self.on_released();
        };
        let mut buffer = vec![0u8; self.recv_buffer_size];

        loop {
            if self.token.is_cancelled() {
                return self.on_cancelled();
            }

            let received = tokio::select! {
                biased;
                _ = self.token.cancelled() => return self.on_cancelled(),
                _ = self.released.cancelled() => return self.on_released(),
                received = socket.recv_from(&mut buffer) => received,
            };

            match received {
                Ok((len, addr)) => self.handle_datagram(&socket, &buffer[..len], addr).await,
                Err(e) => {
                    if let Some(reason) = self.on_receive_error(&e) {
                        return reason;
                    }
                }
            }
        }
    }

    /// Logs a failed receive. Returns the stop reason when the loop cannot go on.
    fn on_receive_error(&self, e: &io::Error) -> Option<StopReason> {
        if is_peer_fault(e) {
            self.logger
                .warning(&format!("Dropping unreadable datagram: {}", e));
            return None;
        }
        let what = format!("receive failed: {}", e);
        self.logger.fatal(&what);
        Some(StopReason::Error(what))
    }

    fn on_cancelled(&self) -> StopReason {
        self.logger.info("Stopping server...");
        StopReason::NormalShutdown
    }

    fn on_released(&self) -> StopReason {
        if self.token.is_cancelled() {
            return self.on_cancelled();
        }
        let what = "socket released without cancellation".to_string();
        self.logger.fatal(&what);
        StopReason::Error(what)
    }

    async fn handle_datagram(&self, socket: &UdpSocket, datagram: &[u8], addr: SocketAddr) {
        let message = match Message::decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                self.logger
                    .warning(&format!("Dropping malformed datagram from {}: {}", addr, e));
                return;
            }
        };

        if let Some(sender) = self.dispatch(&message, addr).await {
            self.relay(socket, &message, sender).await;
        }
    }

    /// Applies a message to the session. Returns the sending player's id when
    /// the message should be relayed to everyone else.
    async fn dispatch(&self, message: &Message, addr: SocketAddr) -> Option<u32> {
        match message.kind {
            MessageType::PlayerJoin => self.player_join(message, addr).await,
            MessageType::PlayerLeft => self.player_left(addr).await,
            MessageType::TeleportDungeon | MessageType::RitualPerform | MessageType::ChatNotify => {
                let sender = self.registry.read().await.find_by_peer(addr);
                match sender {
                    Some(id) => self
                        .logger
                        .info(&format!("{:?} from player {}", message.kind, id)),
                    None => self.logger.info(&format!(
                        "Ignoring {:?} from {}, not in the session",
                        message.kind, addr
                    )),
                }
                sender
            }
        }
    }

    async fn player_join(&self, message: &Message, addr: SocketAddr) -> Option<u32> {
        let state = match PlayerState::decode(message.payload()) {
            Ok(state) => state,
            Err(e) => {
                self.logger
                    .warning(&format!("Bad join payload from {}: {}", addr, e));
                return None;
            }
        };

        let mut registry = self.registry.write().await;
        let Some(id) = registry
            .find_by_peer(addr)
            .or_else(|| registry.first_free())
        else {
            self.logger
                .warning(&format!("Session full, refusing join from {}", addr));
            return None;
        };

        let skin = registry.get(id).map_or(0, |player| player.skin);
        registry.create(id, state.position, skin);
        registry.set_state(id, state);
        registry.attach_peer(id, addr);
        self.logger
            .info(&format!("Player {} joined from {}", id, addr));
        Some(id)
    }

    async fn player_left(&self, addr: SocketAddr) -> Option<u32> {
        let mut registry = self.registry.write().await;
        let id = registry.find_by_peer(addr)?;
        registry.delete(id);
        self.logger.info(&format!("Player {} left", id));
        Some(id)
    }

    async fn relay(&self, socket: &UdpSocket, message: &Message, sender: u32) {
        let datagram = match message.encode() {
            Ok(datagram) => datagram,
            Err(e) => {
                self.logger
                    .error(&format!("Failed to encode relayed {:?}: {}", message.kind, e));
                return;
            }
        };

        let peers = self.registry.read().await.peers();
        for (id, peer) in peers {
            if id == sender {
                continue;
            }
            if let Err(e) = socket.send_to(&datagram, peer).await {
                self.logger
                    .error(&format!("Failed to relay to player {} at {}: {}", id, peer, e));
            }
        }
    }

    /// Sends one message to `peer` from the session socket
    pub async fn send(&self, message: &Message, peer: SocketAddr) -> Result<()> {
        let socket = self.live_socket()?;
        socket.send_to(&message.encode()?, peer).await?;
        Ok(())
    }

    /// Sends one message to every joined player and returns how many were
    /// reached. Individual send failures are logged, not returned.
    pub async fn broadcast(&self, message: &Message) -> Result<usize> {
        let socket = self.live_socket()?;
        let datagram = message.encode()?;
        let peers = self.registry.read().await.peers();

        let mut reached = 0;
        for (id, peer) in peers {
            match socket.send_to(&datagram, peer).await {
                Ok(_) => reached += 1,
                Err(e) => self
                    .logger
                    .error(&format!("Failed to send to player {} at {}: {}", id, peer, e)),
            }
        }
        Ok(reached)
    }

    fn live_socket(&self) -> Result<Arc<UdpSocket>> {
        if self.is_disposed() {
            return Err(ServerError::AlreadyDisposed);
        }
        self.socket().ok_or_else(|| {
            ServerError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "session socket already released",
            ))
        })
    }

    /// Releases the socket and marks the server disposed. Idempotent.
    ///
    /// A loop that is still running wakes up and exits; without a prior
    /// cancellation that exit is reported as a fault.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.release_socket();
        self.released.cancel();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Windows `WSAEMSGSIZE`: the datagram was larger than the receive buffer
const WSAEMSGSIZE: i32 = 10040;

/// Receive errors caused by a single peer rather than the socket itself
fn is_peer_fault(e: &io::Error) -> bool {
    // ICMP port unreachable left behind by a relay to a departed peer
    if e.kind() == io::ErrorKind::ConnectionReset {
        return true;
    }
    cfg!(windows) && e.raw_os_error() == Some(WSAEMSGSIZE)
}

async fn wait_for_stop(rx: &mut watch::Receiver<Option<StopReason>>) -> Option<StopReason> {
    loop {
        let current = rx.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        rx.changed().await.ok()?;
    }
}

/// A running server as seen by the embedding game or binary
///
/// Dropping the handle stops the session.
pub struct ServerHandle {
    server: Arc<Server>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Binds a server and spawns its receive loop
///
/// The server watches a child of `token`: cancelling `token` or calling
/// [`ServerHandle::stop`] both end the session normally. The server is
/// disposed as soon as its loop exits.
pub async fn start(
    config: &ServerConfig,
    token: &CancellationToken,
    logger: Arc<dyn Logger>,
) -> Result<ServerHandle> {
    let token = token.child_token();
    let server = Arc::new(Server::bind(config, token.clone(), logger).await?);

    let task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                server.logger.error(&format!("Server did not run: {}", e));
            }
            server.dispose();
        })
    };

    Ok(ServerHandle {
        server,
        token,
        task,
    })
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub async fn stopped(&self) -> StopReason {
        self.server.stopped().await
    }

    pub fn subscribe_stopped(&self) -> watch::Receiver<Option<StopReason>> {
        self.server.subscribe_stopped()
    }

    pub async fn send(&self, message: &Message, peer: SocketAddr) -> Result<()> {
        self.server.send(message, peer).await
    }

    pub async fn broadcast(&self, message: &Message) -> Result<usize> {
        self.server.broadcast(message).await
    }

    /// Requests a normal shutdown. Idempotent.
    ///
    /// Disposal follows once the loop has exited, so the stop is always
    /// reported as `NormalShutdown`.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Waits for the loop task to finish and returns the stop reason
    pub async fn join(mut self) -> StopReason {
        if let Err(e) = (&mut self.task).await {
            return StopReason::Error(format!("server task failed: {}", e));
        }
        self.server.stopped().await
    }
}

impl Drop for ServerHandle {
    /// Dropping the handle ends the session like [`ServerHandle::stop`]
    fn drop(&mut self) {
        self.token.cancel();
    }
}
