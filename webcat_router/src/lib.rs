pub mod channel;
pub mod config;
mod main_loop;
mod net;
pub mod policy;
mod protocol;
pub mod registry;
pub mod router;

pub use crate::channel::{ChannelError, ChannelRole, ConnectionId, Port, TabId};
pub use crate::config::{ConfigError, RelayConfig};
pub use crate::main_loop::MainLoop;
pub use crate::net::{channel_target, NetError, NetworkThread};
pub use crate::policy::{DropReason, SearchOptions, TargetClickSearchMode};
pub use crate::protocol::{
    BackendInit, ContextMenuSelection, Envelope, FrontendEvent, FrontendInfo, FrontendInit,
    InboundMsg, OutboundMsg, SegmentInfo, SegmentLocation, SegmentPair, INBOUND_CAP, OUTBOUND_CAP,
};
pub use crate::registry::{BackendRegistry, Registration};
pub use crate::router::{RouteOutcome, Router, CONTEXT_MENU_FRONTEND, UNKNOWN_FRONTEND};
