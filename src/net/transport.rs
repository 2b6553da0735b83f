//! WebTransport endpoint and per-connection loop
//!
//! The first bidirectional stream a client opens is its control stream:
//! length-prefixed reliable messages in both directions. Datagrams carry
//! the loss-tolerant traffic. Outbound bytes go through a per-connection
//! writer task so the session never awaits network I/O while locked.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use wtransport::{Connection, RecvStream, SendStream};

use crate::config::ServerConfig;
use crate::net::dos_protection::{ConnectionId, FloodError, FloodGuard};
use crate::net::framing::{datagram_limit, read_message, validate_datagram_size, write_message, FramingError};
use crate::net::game_session::{start_game_loop, Control, GameSession};
use crate::net::gateway::{Channel, Outbound};
use crate::net::tls::TlsConfig;
use crate::util::clock::now_ms;

pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    flood_guard: Arc<RwLock<FloodGuard>>,
    game_session: Arc<RwLock<GameSession>>,
}

impl WebTransportServer {
    pub async fn new(config: ServerConfig, game_session: Arc<RwLock<GameSession>>) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;
        Ok(Self {
            config,
            tls_config,
            flood_guard: Arc::new(RwLock::new(FloodGuard::default())),
            game_session,
        })
    }

    /// Base64 SHA-256 of the served certificate
    pub fn cert_hash(&self) -> &str {
        &self.tls_config.cert_hash
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Accept connections forever; also drives the tick task
    pub async fn run(self) -> anyhow::Result<()> {
        let bind = self.bind_addr();
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_address(bind)
            .with_identity(self.tls_config.identity)
            .build();
        let server = wtransport::Endpoint::server(server_config)?;

        info!("WebTransport server listening on {}", bind);
        let _ticker = start_game_loop(self.game_session.clone());

        loop {
            let incoming = server.accept().await;
            let flood = self.flood_guard.clone();
            let session = self.game_session.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, flood, session).await {
                    debug!("Connection ended with error: {}", e);
                }
            });
        }
    }
}

async fn handle_connection(
    incoming: wtransport::endpoint::IncomingSession,
    flood: Arc<RwLock<FloodGuard>>,
    session: Arc<RwLock<GameSession>>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    debug!(
        "Session request from {:?}, path {}",
        session_request.authority(),
        session_request.path()
    );
    let connection = Arc::new(session_request.accept().await?);
    let peer = connection.remote_address();

    let conn_id = {
        let mut guard = flood.write().await;
        let now = now_ms();
        guard.prune_bans(now);
        match guard.register(peer.ip(), now) {
            Ok(id) => id,
            Err(e) => {
                warn!("Connection from {} refused: {}", peer, e);
                return Err(e.into());
            }
        }
    };

    let result = serve_connection(conn_id, connection, &flood, &session).await;

    if let Some(player) = session.write().await.disconnect(conn_id) {
        debug!("Conn {} closed, player {} removed", conn_id, player);
    }
    flood.write().await.unregister(conn_id);
    debug!("Connection closed (conn_id: {}, peer: {})", conn_id, peer);
    result
}

async fn serve_connection(
    conn_id: ConnectionId,
    connection: Arc<Connection>,
    flood: &RwLock<FloodGuard>,
    session: &RwLock<GameSession>,
) -> anyhow::Result<()> {
    let (send, mut recv) = connection.accept_bi().await?;
    debug!("Control stream open for conn {}", conn_id);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_writer(conn_id, connection.clone(), send, rx));
    session.write().await.connect(
        conn_id,
        tx,
        datagram_limit(connection.max_datagram_size()),
        now_ms(),
    );

    tokio::select! {
        r = read_stream(conn_id, &mut recv, flood, session) => r,
        r = read_datagrams(conn_id, &connection, flood, session) => r,
    }
}

async fn read_stream(
    conn_id: ConnectionId,
    recv: &mut RecvStream,
    flood: &RwLock<FloodGuard>,
    session: &RwLock<GameSession>,
) -> anyhow::Result<()> {
    loop {
        let payload = match read_message(recv).await {
            Ok(payload) => payload,
            Err(FramingError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !admit(flood, conn_id, payload.len()).await? {
            continue;
        }
        let control = session
            .write()
            .await
            .receive(conn_id, &payload, Channel::Stream, now_ms());
        if control == Control::Close {
            return Ok(());
        }
    }
}

async fn read_datagrams(
    conn_id: ConnectionId,
    connection: &Connection,
    flood: &RwLock<FloodGuard>,
    session: &RwLock<GameSession>,
) -> anyhow::Result<()> {
    loop {
        let datagram = connection.receive_datagram().await?;
        let payload = datagram.payload();
        if let Err(e) = validate_datagram_size(&payload) {
            debug!("Dropping datagram from conn {}: {}", conn_id, e);
            continue;
        }
        if !admit(flood, conn_id, payload.len()).await? {
            continue;
        }
        session
            .write()
            .await
            .receive(conn_id, &payload, Channel::Datagram, now_ms());
    }
}

/// Ok(false) drops the message; Err closes the connection
async fn admit(flood: &RwLock<FloodGuard>, conn_id: ConnectionId, len: usize) -> Result<bool, FloodError> {
    match flood.write().await.check_message(conn_id, len, now_ms()) {
        Ok(()) => Ok(true),
        Err(e) if e.is_fatal() => {
            warn!("Disconnecting conn {}: {}", conn_id, e);
            Err(e)
        }
        Err(e) => {
            debug!("Dropping message from conn {}: {}", conn_id, e);
            Ok(false)
        }
    }
}

/// Drains one client's queue onto the control stream and datagrams
async fn run_writer(
    conn_id: ConnectionId,
    connection: Arc<Connection>,
    mut send: SendStream,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Reliable(bytes) => {
                if let Err(e) = write_message(&mut send, &bytes).await {
                    debug!("Control stream write to conn {} failed: {}", conn_id, e);
                    break;
                }
            }
            Outbound::Datagram(bytes) => {
                // Loss is acceptable here; the next tick supersedes it
                if let Err(e) = connection.send_datagram(bytes.as_slice()) {
                    debug!("Datagram to conn {} dropped: {}", conn_id, e);
                }
            }
        }
    }
    let _ = send.finish().await;
}
