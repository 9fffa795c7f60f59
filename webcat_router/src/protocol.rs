use crate::channel::{ChannelRole, ConnectionId, TabId};
use std::net::SocketAddr;

pub const INBOUND_CAP: usize = 256;
pub const OUTBOUND_CAP: usize = 256;

/// Network thread -> main loop.
#[derive(Debug)]
pub enum InboundMsg {
    Connected {
        conn: ConnectionId,
        role: ChannelRole,
        tab: Option<TabId>,
        socket_addr: SocketAddr,
    },
    Envelope {
        conn: ConnectionId,
        msg: Envelope,
    },
    ContextMenuSelection {
        conn: ConnectionId,
        selection: ContextMenuSelection,
    },
    Disconnected {
        conn: ConnectionId,
    },
}

/// Main loop -> network thread.
#[derive(Debug)]
pub enum OutboundMsg {
    Send { conn: ConnectionId, payload: String },
    Close { conn: ConnectionId },
}

pub use webcat_protocol::{
    BackendInit, ContextMenuSelection, Envelope, FrontendEvent, FrontendInfo, FrontendInit,
    SegmentInfo, SegmentLocation, SegmentPair,
};
