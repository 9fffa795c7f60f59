use crate::protocol::Envelope;
use std::fmt;
use thiserror::Error;

pub const FRONTEND_CHANNEL: &str = "frontend";
pub const BACKEND_CHANNEL: &str = "backend";
pub const CONTEXT_MENU_CHANNEL: &str = "contextMenu";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    Frontend,
    Backend,
    /// Browser context-menu selections; carries no envelopes.
    ContextMenu,
}

impl ChannelRole {
    pub fn from_channel_name(name: &str) -> Option<Self> {
        match name {
            FRONTEND_CHANNEL => Some(ChannelRole::Frontend),
            BACKEND_CHANNEL => Some(ChannelRole::Backend),
            CONTEXT_MENU_CHANNEL => Some(ChannelRole::ContextMenu),
            _ => None,
        }
    }

    pub fn channel_name(self) -> &'static str {
        match self {
            ChannelRole::Frontend => FRONTEND_CHANNEL,
            ChannelRole::Backend => BACKEND_CHANNEL,
            ChannelRole::ContextMenu => CONTEXT_MENU_CHANNEL,
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_name())
    }
}

/// Host-assigned identity of one accepted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque tab identifier reported by the host. Channels may arrive without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabId(pub String);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("channel queue full")]
    Full,
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Sending half of a connection channel as the router sees it.
///
/// Both operations are fire-and-forget. `close` must be safe to call on a
/// channel whose page is already gone.
pub trait Port {
    fn post(&self, msg: &Envelope) -> Result<(), ChannelError>;
    fn close(&self) -> Result<(), ChannelError>;
}
