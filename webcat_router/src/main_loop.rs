use crate::channel::{ChannelError, ConnectionId, Port};
use crate::policy::SearchOptions;
use crate::protocol::{Envelope, InboundMsg, OutboundMsg};
use crate::router::Router;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::rc::Rc;
use tracing::debug;

/// Drives the router from the network thread's queues on the calling thread.
pub struct MainLoop {
    inbound_rx: Receiver<InboundMsg>,
    outbound_tx: Sender<OutboundMsg>,
    router: Router,
}

impl MainLoop {
    pub fn new(
        inbound_rx: Receiver<InboundMsg>,
        outbound_tx: Sender<OutboundMsg>,
        options: SearchOptions,
    ) -> Self {
        Self {
            inbound_rx,
            outbound_tx,
            router: Router::new(options),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Handles everything queued so far; returns how many messages that was.
    pub fn tick(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.inbound_rx.try_recv() {
                Ok(msg) => {
                    handled += 1;
                    self.handle(msg);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    fn handle(&mut self, msg: InboundMsg) {
        match msg {
            InboundMsg::Connected {
                conn,
                role,
                tab,
                socket_addr,
            } => {
                debug!(conn = %conn, peer = %socket_addr, "accepted socket");
                let port = NetPort {
                    conn,
                    outbound_tx: self.outbound_tx.clone(),
                };
                self.router.accept(conn, role, tab, Rc::new(port));
            }
            InboundMsg::Envelope { conn, msg } => self.router.dispatch(conn, msg),
            InboundMsg::ContextMenuSelection { conn, selection } => {
                debug!(conn = %conn, "context menu selection");
                self.router
                    .route_context_menu_selection(&selection.selection_text);
            }
            InboundMsg::Disconnected { conn } => self.router.disconnect(conn),
        }
    }
}

/// A socket connection seen through the outbound queue.
struct NetPort {
    conn: ConnectionId,
    outbound_tx: Sender<OutboundMsg>,
}

impl NetPort {
    fn push(&self, msg: OutboundMsg) -> Result<(), ChannelError> {
        self.outbound_tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Disconnected(_) => ChannelError::Closed,
        })
    }
}

impl Port for NetPort {
    fn post(&self, msg: &Envelope) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(msg).map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.push(OutboundMsg::Send {
            conn: self.conn,
            payload,
        })
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.push(OutboundMsg::Close { conn: self.conn })
    }
}
