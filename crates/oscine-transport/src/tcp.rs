//! TCP transports
//!
//! Both ends share the same IO shape: each connection gets one spawned task
//! that serializes writes through an outgoing channel and deframes the read
//! side incrementally. Frames that fail to decode are dropped where they
//! land; a bad frame never tears the connection down.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use oscine_core::{decode, encode, Packet};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::events::{ConnectionEvent, ConnectionId, ConnectionState, EventStream};
use crate::framing::{frame, Deframer, Framing};

/// Default channel buffer size for per-connection queues
const CHANNEL_CAPACITY: usize = 1000;

/// State event buffer; lifecycle transitions are rare
const STATE_CHANNEL_CAPACITY: usize = 32;

const READ_BUFFER_SIZE: usize = 8192;

// ============================================================================
// Client
// ============================================================================

struct ClientShared {
    state: Mutex<ConnectionState>,
    state_tx: Mutex<Option<mpsc::Sender<ConnectionState>>>,
    packet_tx: Mutex<Option<mpsc::Sender<Packet>>>,
    outgoing: Mutex<Option<mpsc::Sender<Bytes>>>,
    shutdown: Mutex<Arc<Notify>>,
}

impl ClientShared {
    async fn transition(&self, next: ConnectionState) {
        *self.state.lock() = next.clone();
        let tx = self.state_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(next).await;
        }
    }

    /// Drop the producer ends so both event streams terminate.
    /// Already-queued events are still delivered to the consumer.
    fn finish_streams(&self) {
        self.packet_tx.lock().take();
        self.state_tx.lock().take();
        self.outgoing.lock().take();
    }
}

/// A single-connection OSC-over-TCP client
///
/// The client drives one connection: `connect` is fire-and-forget and the
/// outcome arrives on the state stream. Once the connection has ended (the
/// `Disconnected` transition after a connect, or terminal `Failed`) the
/// streams are finished; create a new client to connect again.
pub struct TcpClient {
    host: String,
    port: u16,
    framing: Framing,
    shared: Arc<ClientShared>,
    started: AtomicBool,
}

impl TcpClient {
    /// Create a client together with its packet and state streams
    pub fn new(
        host: impl Into<String>,
        port: u16,
        framing: Framing,
    ) -> (Self, EventStream<Packet>, EventStream<ConnectionState>) {
        let (packet_tx, packet_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (state_tx, state_rx) = mpsc::channel(STATE_CHANNEL_CAPACITY);

        let client = Self {
            host: host.into(),
            port,
            framing,
            shared: Arc::new(ClientShared {
                state: Mutex::new(ConnectionState::Disconnected),
                state_tx: Mutex::new(Some(state_tx)),
                packet_tx: Mutex::new(Some(packet_tx)),
                outgoing: Mutex::new(None),
                shutdown: Mutex::new(Arc::new(Notify::new())),
            }),
            started: AtomicBool::new(false),
        };

        (client, EventStream::new(packet_rx), EventStream::new(state_rx))
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().clone()
    }

    /// Start connecting. Fire-and-forget: observers await the state stream.
    pub fn connect(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.shared.state.lock();
            if *state != ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Connecting;
        }

        let shutdown = Arc::new(Notify::new());
        *self.shared.shutdown.lock() = shutdown.clone();

        let shared = self.shared.clone();
        let host = self.host.clone();
        let port = self.port;
        let framing = self.framing;

        tokio::spawn(async move {
            let tx = shared.state_tx.lock().clone();
            if let Some(tx) = tx {
                let _ = tx.send(ConnectionState::Connecting).await;
            }

            let connected = tokio::select! {
                result = TcpStream::connect((host.as_str(), port)) => result,
                _ = shutdown.notified() => {
                    shared
                        .transition(ConnectionState::Failed("connect cancelled".into()))
                        .await;
                    shared.finish_streams();
                    return;
                }
            };

            let stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(%host, port, "tcp connect failed: {e}");
                    shared
                        .transition(ConnectionState::Failed(e.to_string()))
                        .await;
                    shared.finish_streams();
                    return;
                }
            };

            info!(%host, port, "tcp client connected");

            let (out_tx, out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
            *shared.outgoing.lock() = Some(out_tx);
            shared.transition(ConnectionState::Connected).await;

            run_client_io(stream, framing, out_rx, &shutdown, &shared).await;

            shared.outgoing.lock().take();
            shared.transition(ConnectionState::Disconnected).await;
            shared.finish_streams();
        });
    }

    /// Encode, frame, and queue a packet for writing.
    ///
    /// Fails with `NotConnected` unless the state is `Connected`. A write
    /// error on the wire is logged but does not disconnect the client.
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        if *self.shared.state.lock() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let tx = self
            .shared
            .outgoing
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let payload = encode(packet)?;
        tx.send(frame(self.framing, &payload))
            .await
            .map_err(|_| TransportError::NotConnected)
    }

    /// Tear the connection down. Idempotent.
    ///
    /// During `Connecting` this cancels the attempt and yields `Failed`;
    /// during `Connected` it yields `Disconnected`.
    pub fn disconnect(&self) {
        let active = matches!(
            *self.shared.state.lock(),
            ConnectionState::Connecting | ConnectionState::Connected
        );
        if active {
            self.shared.shutdown.lock().notify_one();
        }
    }
}

async fn run_client_io(
    stream: TcpStream,
    framing: Framing,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    shutdown: &Notify,
    shared: &ClientShared,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut deframer = Deframer::new(framing);
    let mut read_buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    'io: loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("tcp client disconnect requested");
                break 'io;
            }

            maybe = outgoing_rx.recv() => {
                match maybe {
                    Some(framed) => {
                        if let Err(e) = writer.write_all(&framed).await {
                            warn!("tcp client write error: {e}");
                        }
                    }
                    None => break 'io,
                }
            }

            result = reader.read_buf(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        debug!("tcp connection closed by peer");
                        break 'io;
                    }
                    Ok(_) => {
                        deframer.feed(&read_buf);
                        read_buf.clear();

                        let tx = shared.packet_tx.lock().clone();
                        let Some(tx) = tx else { break 'io };
                        while let Some(frame_bytes) = deframer.next_packet() {
                            match decode(&frame_bytes) {
                                Ok(packet) => {
                                    if tx.send(packet).await.is_err() {
                                        break 'io;
                                    }
                                }
                                Err(e) => debug!("dropping malformed tcp frame: {e}"),
                            }
                        }
                    }
                    Err(e) => {
                        warn!("tcp client read error: {e}");
                        break 'io;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Server
// ============================================================================

struct Connection {
    outgoing: mpsc::Sender<Bytes>,
    shutdown: Arc<Notify>,
    peer: SocketAddr,
}

struct ServerShared {
    connections: DashMap<u64, Connection>,
    packet_tx: Mutex<Option<mpsc::Sender<(ConnectionId, Packet)>>>,
    event_tx: Mutex<Option<mpsc::Sender<ConnectionEvent>>>,
    next_id: AtomicU64,
}

impl ServerShared {
    /// Remove a connection and emit its disconnected event.
    ///
    /// Removal from the table is what makes the event fire exactly once, no
    /// matter whether the close came from us, the client, or the network.
    async fn remove_connection(&self, id: ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(&id.0) {
            conn.shutdown.notify_one();
            debug!(%id, peer = %conn.peer, "tcp connection closed");
            let tx = self.event_tx.lock().clone();
            if let Some(tx) = tx {
                let _ = tx.send(ConnectionEvent::Disconnected(id)).await;
            }
        }
    }
}

/// A multi-connection OSC-over-TCP server
pub struct TcpServer {
    shared: Arc<ServerShared>,
    framing: Framing,
    local_addr: SocketAddr,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpServer {
    /// Bind a listener (port 0 for an ephemeral assignment) and start
    /// accepting.
    ///
    /// Returns the server handle, the stream of decoded packets tagged
    /// with their connection id, and the stream of connect/disconnect
    /// events.
    pub async fn bind(
        port: u16,
        framing: Framing,
    ) -> Result<(
        Self,
        EventStream<(ConnectionId, Packet)>,
        EventStream<ConnectionEvent>,
    )> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;

        info!(%local_addr, "tcp server listening");

        let (packet_tx, packet_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let shared = Arc::new(ServerShared {
            connections: DashMap::new(),
            packet_tx: Mutex::new(Some(packet_tx)),
            event_tx: Mutex::new(Some(event_tx)),
            next_id: AtomicU64::new(1),
        });

        let accept_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        accept_connection(&accept_shared, framing, stream, peer).await;
                    }
                    Err(e) => {
                        warn!("tcp accept error: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok((
            Self {
                shared,
                framing,
                local_addr,
                accept_task: Mutex::new(Some(accept_task)),
            },
            EventStream::new(packet_rx),
            EventStream::new(event_rx),
        ))
    }

    /// The bound address, with the ephemeral port resolved
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.shared.connections.len()
    }

    /// Send a packet to one connection
    pub async fn send(&self, packet: &Packet, to: ConnectionId) -> Result<()> {
        let outgoing = self
            .shared
            .connections
            .get(&to.0)
            .map(|conn| conn.outgoing.clone())
            .ok_or(TransportError::NotConnected)?;

        let payload = encode(packet)?;
        outgoing
            .send(frame(self.framing, &payload))
            .await
            .map_err(|_| TransportError::NotConnected)
    }

    /// Send a packet to every current connection.
    ///
    /// Per-connection failures are tolerated; returns how many connections
    /// accepted the frame.
    pub async fn broadcast(&self, packet: &Packet) -> Result<usize> {
        let payload = encode(packet)?;
        let framed = frame(self.framing, &payload);

        let targets: Vec<(ConnectionId, mpsc::Sender<Bytes>)> = self
            .shared
            .connections
            .iter()
            .map(|entry| (ConnectionId(*entry.key()), entry.outgoing.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.send(framed.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => debug!(%id, "broadcast skipped a closing connection"),
            }
        }
        Ok(delivered)
    }

    /// Disconnect one client. The disconnected event fires exactly once;
    /// disconnecting an unknown id is a no-op.
    pub async fn disconnect(&self, id: ConnectionId) {
        self.shared.remove_connection(id).await;
    }

    /// Disconnect everyone and close the listener. Idempotent; both event
    /// streams finish.
    pub async fn stop(&self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }

        let ids: Vec<u64> = self
            .shared
            .connections
            .iter()
            .map(|entry| *entry.key())
            .collect();
        for id in ids {
            self.shared.remove_connection(ConnectionId(id)).await;
        }

        self.shared.packet_tx.lock().take();
        self.shared.event_tx.lock().take();
    }
}

async fn accept_connection(
    shared: &Arc<ServerShared>,
    framing: Framing,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let id = ConnectionId(shared.next_id.fetch_add(1, Ordering::Relaxed));
    let (out_tx, out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    let shutdown = Arc::new(Notify::new());

    shared.connections.insert(
        id.0,
        Connection {
            outgoing: out_tx,
            shutdown: shutdown.clone(),
            peer,
        },
    );
    info!(%id, %peer, "tcp connection accepted");

    let tx = shared.event_tx.lock().clone();
    if let Some(tx) = tx {
        let _ = tx.send(ConnectionEvent::Connected(id)).await;
    }

    let conn_shared = shared.clone();
    tokio::spawn(async move {
        run_server_io(stream, framing, out_rx, &shutdown, &conn_shared, id).await;
        conn_shared.remove_connection(id).await;
    });
}

async fn run_server_io(
    stream: TcpStream,
    framing: Framing,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    shutdown: &Notify,
    shared: &ServerShared,
    id: ConnectionId,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut deframer = Deframer::new(framing);
    let mut read_buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    'io: loop {
        tokio::select! {
            _ = shutdown.notified() => break 'io,

            maybe = outgoing_rx.recv() => {
                match maybe {
                    Some(framed) => {
                        if let Err(e) = writer.write_all(&framed).await {
                            warn!(%id, "tcp write error: {e}");
                        }
                    }
                    None => break 'io,
                }
            }

            result = reader.read_buf(&mut read_buf) => {
                match result {
                    Ok(0) => break 'io,
                    Ok(_) => {
                        deframer.feed(&read_buf);
                        read_buf.clear();

                        let tx = shared.packet_tx.lock().clone();
                        let Some(tx) = tx else { break 'io };
                        while let Some(frame_bytes) = deframer.next_packet() {
                            match decode(&frame_bytes) {
                                Ok(packet) => {
                                    if tx.send((id, packet)).await.is_err() {
                                        break 'io;
                                    }
                                }
                                Err(e) => debug!(%id, "dropping malformed tcp frame: {e}"),
                            }
                        }
                    }
                    Err(e) => {
                        debug!(%id, "tcp read error: {e}");
                        break 'io;
                    }
                }
            }
        }
    }
}
