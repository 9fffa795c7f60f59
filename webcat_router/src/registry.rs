use crate::channel::{ConnectionId, Port, TabId};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// The single active channel of one backend service.
pub struct BackendRegistration {
    pub conn: ConnectionId,
    pub tab: Option<TabId>,
    channel: Rc<dyn Port>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No entry existed; the channel is now active.
    Installed,
    /// Same tab announced again (page reload); the previous channel was closed.
    Replaced { previous: ConnectionId },
    /// Another tab owns the backend; the new channel was closed.
    Rejected { active: ConnectionId },
    /// The channel re-announced a name it already holds.
    AlreadyActive,
}

enum Decision {
    Install,
    Keep,
    Replace(ConnectionId),
    Reject(ConnectionId),
}

/// Backend name -> active channel. At most one entry per name.
///
/// Pages do not keep a fallback list of inactive channels: once the active
/// page goes away, the next page to announce itself becomes active.
#[derive(Default)]
pub struct BackendRegistry {
    entries: HashMap<String, BackendRegistration>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        backend: &str,
        conn: ConnectionId,
        tab: Option<TabId>,
        channel: Rc<dyn Port>,
    ) -> Registration {
        let decision = match self.entries.get(backend) {
            None => Decision::Install,
            Some(existing) if existing.conn == conn => Decision::Keep,
            // The disconnect of a reloaded page is not guaranteed to arrive
            // before its new handshake.
            Some(existing) if existing.tab == tab => Decision::Replace(existing.conn),
            Some(existing) => Decision::Reject(existing.conn),
        };

        match decision {
            Decision::Install => {
                info!(backend, conn = %conn, tab = ?tab, "registering backend");
                self.install(backend, conn, tab, channel);
                Registration::Installed
            }
            Decision::Keep => {
                debug!(backend, conn = %conn, "backend re-announced on its active channel");
                Registration::AlreadyActive
            }
            Decision::Replace(previous) => {
                info!(
                    backend,
                    previous = %previous,
                    conn = %conn,
                    tab = ?tab,
                    "backend tab reloaded, replacing stale channel"
                );
                if let Some(stale) = self.install(backend, conn, tab, channel) {
                    if let Err(e) = stale.channel.close() {
                        debug!(backend, conn = %previous, error = %e, "closing stale backend channel failed, ignoring");
                    }
                }
                Registration::Replaced { previous }
            }
            Decision::Reject(active) => {
                warn!(
                    backend,
                    active = %active,
                    conn = %conn,
                    tab = ?tab,
                    "backend already active in another tab, closing new channel"
                );
                if let Err(e) = channel.close() {
                    debug!(backend, conn = %conn, error = %e, "closing rejected backend channel failed, ignoring");
                }
                Registration::Rejected { active }
            }
        }
    }

    fn install(
        &mut self,
        backend: &str,
        conn: ConnectionId,
        tab: Option<TabId>,
        channel: Rc<dyn Port>,
    ) -> Option<BackendRegistration> {
        self.entries
            .insert(backend.to_string(), BackendRegistration { conn, tab, channel })
    }

    /// Removes the entry for `backend`, if any.
    pub fn unregister(&mut self, backend: &str) -> bool {
        self.entries.remove(backend).is_some()
    }

    /// Disconnect handling: drops only the entries held by `conn`.
    pub fn unregister_channel(&mut self, conn: ConnectionId) -> Vec<String> {
        let names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, reg)| reg.conn == conn)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.entries.remove(name);
            info!(backend = %name, conn = %conn, "backend disconnected");
        }
        names
    }

    pub fn get(&self, backend: &str) -> Option<&BackendRegistration> {
        self.entries.get(backend)
    }

    /// Registered backends in unspecified order.
    pub fn all(&self) -> impl Iterator<Item = (&str, &dyn Port)> + '_ {
        self.entries
            .iter()
            .map(|(name, reg)| (name.as_str(), reg.channel.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
