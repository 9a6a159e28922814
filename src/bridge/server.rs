use crate::bridge::{BridgeError, Result};
use crate::data::{BridgeCommand, BridgeEvent};
use crate::players::command_sink::CommandSink;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use log::{debug, error, info, trace, warn};

/// Close reason sent to a client that connects while another one is active
pub const CLOSE_REASON_BUSY: &str = "Only one client allowed at a time";

/// Close reason sent to the active client when the server stops
pub const CLOSE_REASON_SHUTDOWN: &str = "Server shutting down";

/// How long a rejected client gets to acknowledge the close frame
const REJECT_LINGER: Duration = Duration::from_secs(1);

struct ActiveClient {
    id: u64,
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<Message>,
}

/// Single-client WebSocket server for the remote player
///
/// At most one client is active. A second client is closed right after the
/// handshake without disturbing the first. Commands sent while no client is
/// connected are dropped.
pub struct BridgeServer {
    local_addr: SocketAddr,
    active: Mutex<Option<ActiveClient>>,
    next_id: AtomicU64,
    connected: watch::Sender<Option<u64>>,
    shutdown: watch::Sender<bool>,
    events: mpsc::Sender<BridgeEvent>,
}

fn close_frame(reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    }))
}

impl BridgeServer {
    /// Bind the listener and start accepting clients
    ///
    /// Decoded progress and player state events are forwarded to `events`.
    /// `ping` is answered here and never forwarded.
    pub async fn bind(addr: SocketAddr, events: mpsc::Sender<BridgeEvent>) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr).await.map_err(BridgeError::Bind)?;
        let local_addr = listener.local_addr().map_err(BridgeError::Bind)?;
        info!("Bridge server listening on {}", local_addr);

        let (connected, _) = watch::channel(None);
        let (shutdown, _) = watch::channel(false);
        let server = Arc::new(Self {
            local_addr,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            connected,
            shutdown,
            events,
        });

        tokio::spawn(Arc::clone(&server).accept_loop(listener));
        Ok(server)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Id of the active connection, if any
    pub fn connection_id(&self) -> Option<u64> {
        *self.connected.borrow()
    }

    /// Watch the active connection id
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.connected.subscribe()
    }

    /// Wait until a client is connected
    ///
    /// Returns immediately if one already is. Expiry of `timeout` is a
    /// `HandshakeTimeout` error.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<u64> {
        let mut receiver = self.connected.subscribe();
        let connected = async {
            receiver.wait_for(|id| id.is_some()).await.map(|id| *id)
        };
        match tokio::time::timeout(timeout, connected).await {
            Ok(Ok(Some(id))) => Ok(id),
            Ok(_) | Err(_) => {
                error!("No remote client connected within {} s", timeout.as_secs());
                Err(BridgeError::HandshakeTimeout(timeout))
            }
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                debug!("Bridge accept loop stopping");
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => continue,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(Arc::clone(&self).handle_connection(stream, peer));
                    }
                    Err(e) => warn!("Failed to accept bridge connection: {}", e),
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let mut ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        // The normalization commands go out before anything sent afterwards
        for command in BridgeCommand::normalization() {
            let _ = outbound.send(Message::Text(command.encode()));
        }

        let claimed = match self.active.lock() {
            Ok(mut active) if active.is_none() && !*self.shutdown.borrow() => {
                *active = Some(ActiveClient { id, peer, outbound: outbound.clone() });
                true
            }
            _ => false,
        };

        if !claimed {
            warn!("A client is already connected, rejecting connection from {}", peer);
            reject(&mut ws).await;
            return;
        }

        info!("Remote client connected from {} (connection {})", peer, id);
        self.connected.send_replace(Some(id));

        let (sink, mut incoming) = ws.split();
        let writer = tokio::spawn(write_outbound(sink, outbound_rx, peer));

        while let Some(message) = incoming.next().await {
            match message {
                Ok(Message::Text(frame)) => self.handle_frame(&frame, &outbound).await,
                Ok(Message::Close(frame)) => {
                    debug!("Client {} closed the connection: {:?}", peer, frame);
                    break;
                }
                Ok(other) => trace!("Ignoring non-text message from {}: {:?}", peer, other),
                Err(e) => {
                    warn!("Error reading from {}: {}", peer, e);
                    break;
                }
            }
        }

        self.release(id);
        drop(outbound);
        if let Err(e) = writer.await {
            debug!("Writer for {} ended abnormally: {}", peer, e);
        }
        info!("Connection {} from {} closed", id, peer);
    }

    async fn handle_frame(&self, frame: &str, outbound: &mpsc::UnboundedSender<Message>) {
        trace!("Received frame: {}", frame);
        match frame.parse::<BridgeEvent>() {
            Ok(BridgeEvent::Ping) => {
                let _ = outbound.send(Message::Text(BridgeCommand::Pong.encode()));
            }
            Ok(BridgeEvent::Pong) => trace!("Received pong"),
            Ok(event) => {
                if self.events.send(event).await.is_err() {
                    debug!("No session listening, dropping event");
                }
            }
            Err(e) => warn!("Dropping frame {:?}: {}", frame, e),
        }
    }

    /// Free the client slot if it still belongs to connection `id`
    fn release(&self, id: u64) {
        if let Ok(mut active) = self.active.lock() {
            if active.as_ref().is_some_and(|client| client.id == id) {
                *active = None;
            }
        }
        self.connected.send_if_modified(|current| {
            if *current == Some(id) {
                *current = None;
                true
            } else {
                false
            }
        });
    }

    /// Close the active client and stop accepting new ones
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let client = self.active.lock().ok().and_then(|mut active| active.take());
        if let Some(client) = client {
            info!("Closing connection to {}", client.peer);
            let _ = client.outbound.send(close_frame(CLOSE_REASON_SHUTDOWN));
        }
        self.connected.send_replace(None);
    }
}

async fn reject(ws: &mut WebSocketStream<TcpStream>) {
    if let Err(e) = ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: CLOSE_REASON_BUSY.into(),
    })).await {
        debug!("Failed to close rejected connection: {}", e);
        return;
    }
    // Wait briefly for the client's close acknowledgement
    let _ = tokio::time::timeout(REJECT_LINGER, async {
        while let Some(Ok(_)) = ws.next().await {}
    }).await;
}

async fn write_outbound<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<Message>, peer: SocketAddr)
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!("Failed to send to {}: {}", peer, e);
            break;
        }
        if closing {
            break;
        }
    }
}

impl CommandSink for BridgeServer {
    fn send_command(&self, command: BridgeCommand) -> bool {
        let frame = command.encode();
        let Ok(active) = self.active.lock() else {
            return false;
        };
        match active.as_ref() {
            Some(client) => {
                debug!("Sending {} to connection {}", frame, client.id);
                client.outbound.send(Message::Text(frame)).is_ok()
            }
            None => {
                debug!("No client connected, dropping {}", frame);
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connection_id().is_some()
    }

    fn close(&self) {
        self.shutdown();
    }
}
