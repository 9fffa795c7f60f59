use crate::channel::{ChannelRole, ConnectionId, TabId};
use crate::protocol::{ContextMenuSelection, Envelope, InboundMsg, OutboundMsg};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message;
use tungstenite::WebSocket;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);
const DISCONNECT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);
const IDLE_SLEEP: Duration = Duration::from_millis(10);
const TAB_QUERY_KEY: &str = "tab";

#[derive(Error, Debug)]
pub enum NetError {
    #[error("ws bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("listener setup failed: {0}")]
    Io(#[from] io::Error),
}

struct Client {
    ws: WebSocket<TcpStream>,
    role: ChannelRole,
    socket_addr: SocketAddr,
}

/// Owns the websocket listener and every page connection.
///
/// Pages connect to `/frontend`, `/backend` or `/contextMenu`, optionally
/// passing their tab id as `?tab=<id>`. Socket events are forwarded to the main loop; the
/// thread itself never interprets envelopes beyond decoding them.
pub struct NetworkThread {
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    listen_addr: SocketAddr,
}

impl NetworkThread {
    pub fn spawn_with_addr(
        addr: &str,
        in_tx: Sender<InboundMsg>,
        out_rx: Receiver<OutboundMsg>,
    ) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).map_err(|source| NetError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let listen_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join_handle =
            thread::spawn(move || run_server(listener, in_tx, out_rx, shutdown_for_thread));

        Ok(Self {
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
            listen_addr,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    in_tx: Sender<InboundMsg>,
    out_rx: Receiver<OutboundMsg>,
    shutdown: Arc<AtomicBool>,
) {
    let mut clients: HashMap<ConnectionId, Client> = HashMap::new();
    let mut next_conn: u64 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        let mut busy = false;

        // Accept every pending connection.
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => {
                    busy = true;
                    let (ws, role, tab) = match accept_channel(stream) {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            debug!(peer = %socket_addr, error = %e, "ws handshake refused");
                            continue;
                        }
                    };

                    next_conn += 1;
                    let conn = ConnectionId(next_conn);
                    if in_tx
                        .try_send(InboundMsg::Connected {
                            conn,
                            role,
                            tab,
                            socket_addr,
                        })
                        .is_err()
                    {
                        warn!(peer = %socket_addr, "router busy, dropping new channel");
                        let mut ws = ws;
                        let _ = ws.close(None);
                        let _ = ws.flush();
                        continue;
                    }
                    clients.insert(
                        conn,
                        Client {
                            ws,
                            role,
                            socket_addr,
                        },
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "ws accept failed");
                    break;
                }
            }
        }

        // Outbound: drain queued sends and closes.
        loop {
            match out_rx.try_recv() {
                Ok(OutboundMsg::Send { conn, payload }) => {
                    busy = true;
                    let Some(client) = clients.get_mut(&conn) else {
                        debug!(conn = %conn, "send to gone channel, dropping");
                        continue;
                    };
                    if send_text(&mut client.ws, payload).is_err() {
                        drop_client(&mut clients, conn, &in_tx);
                    }
                }
                Ok(OutboundMsg::Close { conn }) => {
                    busy = true;
                    drop_client(&mut clients, conn, &in_tx);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    close_all(clients);
                    return;
                }
            }
        }

        // Inbound: at most one frame per connection per pass.
        let mut gone = Vec::new();
        for (conn, client) in clients.iter_mut() {
            // Push out frames a previous pass could not fully write.
            let _ = client.ws.flush();
            match client.ws.read() {
                Ok(msg) => {
                    busy = true;
                    if handle_inbound(&in_tx, *conn, client.role, msg).is_err() {
                        gone.push(*conn);
                    }
                }
                Err(tungstenite::Error::Io(e))
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => {
                    debug!(conn = %conn, peer = %client.socket_addr, error = %e, "ws read ended");
                    gone.push(*conn);
                }
            }
        }
        for conn in gone {
            drop_client(&mut clients, conn, &in_tx);
        }

        if !busy {
            thread::sleep(IDLE_SLEEP);
        }
    }

    close_all(clients);
}

fn accept_channel(
    stream: TcpStream,
) -> Result<(WebSocket<TcpStream>, ChannelRole, Option<TabId>), String> {
    // Blocking handshake with a deadline, then non-blocking for the poll loop.
    stream.set_nonblocking(false).map_err(|e| e.to_string())?;
    let _ = stream.set_nodelay(true);
    let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));
    let _ = stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT));

    let mut target = None;
    let ws = tungstenite::accept_hdr(stream, |req: &Request, resp: Response| {
        match channel_target(req.uri().path(), req.uri().query()) {
            Some(t) => {
                target = Some(t);
                Ok(resp)
            }
            None => {
                let mut err = ErrorResponse::new(Some("unknown channel".to_string()));
                *err.status_mut() = StatusCode::NOT_FOUND;
                Err(err)
            }
        }
    })
    .map_err(|e| e.to_string())?;

    let (role, tab) = target.ok_or_else(|| "channel target missing".to_string())?;
    ws.get_ref()
        .set_nonblocking(true)
        .map_err(|e| e.to_string())?;
    Ok((ws, role, tab))
}

/// Maps a request path and query to the channel role and the page's tab id.
pub fn channel_target(path: &str, query: Option<&str>) -> Option<(ChannelRole, Option<TabId>)> {
    let role = ChannelRole::from_channel_name(path.trim_matches('/'))?;
    let tab = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == TAB_QUERY_KEY)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
            .map(TabId)
    });
    Some((role, tab))
}

/// `Err` means the channel must be dropped.
fn handle_inbound(
    in_tx: &Sender<InboundMsg>,
    conn: ConnectionId,
    role: ChannelRole,
    msg: Message,
) -> Result<(), ()> {
    let text = match msg {
        Message::Text(s) => s,
        Message::Binary(_) => return Ok(()),
        // tungstenite queues the pong itself.
        Message::Ping(_) | Message::Pong(_) => return Ok(()),
        Message::Close(_) => return Err(()),
        Message::Frame(_) => return Ok(()),
    };

    let inbound = match role {
        ChannelRole::ContextMenu => match serde_json::from_str::<ContextMenuSelection>(&text) {
            Ok(selection) => InboundMsg::ContextMenuSelection { conn, selection },
            Err(e) => {
                debug!(conn = %conn, error = %e, "undecodable selection, ignoring");
                return Ok(());
            }
        },
        ChannelRole::Frontend | ChannelRole::Backend => match serde_json::from_str::<Envelope>(&text) {
            Ok(msg) => InboundMsg::Envelope { conn, msg },
            Err(e) => {
                debug!(conn = %conn, error = %e, "undecodable message, ignoring");
                return Ok(());
            }
        },
    };

    // A lost handshake would leave the page connected but unregistered;
    // closing makes it reconnect and announce itself again.
    if in_tx.try_send(inbound).is_err() {
        warn!(conn = %conn, "router busy, dropping channel");
        return Err(());
    }
    Ok(())
}

fn send_text(ws: &mut WebSocket<TcpStream>, payload: String) -> Result<(), ()> {
    match ws.send(Message::Text(payload.into())) {
        Ok(()) => Ok(()),
        // Frame stays buffered; the next pass flushes it.
        Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
        Err(_) => Err(()),
    }
}

fn drop_client(
    clients: &mut HashMap<ConnectionId, Client>,
    conn: ConnectionId,
    in_tx: &Sender<InboundMsg>,
) {
    let Some(mut client) = clients.remove(&conn) else {
        return;
    };
    let _ = client.ws.close(None);
    let _ = client.ws.flush();
    info!(conn = %conn, peer = %client.socket_addr, "channel disconnected");

    // Losing this would leave a dead backend registered.
    if in_tx
        .send_timeout(InboundMsg::Disconnected { conn }, DISCONNECT_NOTIFY_TIMEOUT)
        .is_err()
    {
        warn!(conn = %conn, "could not report disconnect to router");
    }
}

fn close_all(clients: HashMap<ConnectionId, Client>) {
    for (_, mut client) in clients {
        let _ = client.ws.close(None);
        let _ = client.ws.flush();
    }
}
