use crate::channel::{ChannelRole, ConnectionId, Port, TabId};
use crate::policy::{self, DropReason, SearchOptions};
use crate::protocol::{BackendInit, Envelope, FrontendEvent, FrontendInfo, FrontendInit};
use crate::registry::{BackendRegistry, Registration};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Frontend name used until a channel declares one.
pub const UNKNOWN_FRONTEND: &str = "<unknown>";
/// Frontend name attached to selections coming from the context menu.
pub const CONTEXT_MENU_FRONTEND: &str = "contextMenu";

struct Connection {
    role: ChannelRole,
    tab: Option<TabId>,
    port: Rc<dyn Port>,
    frontend_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Dropped(DropReason),
    Delivered { attempted: usize, failed: usize },
}

/// Routing core: owns the backend registry and the per-channel state.
///
/// Everything here runs on one thread; the host feeds it channel events in
/// arrival order and it never blocks.
pub struct Router {
    options: SearchOptions,
    registry: BackendRegistry,
    connections: HashMap<ConnectionId, Connection>,
}

impl Router {
    pub fn new(options: SearchOptions) -> Self {
        Self {
            options,
            registry: BackendRegistry::new(),
            connections: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn frontend_name(&self, conn: ConnectionId) -> Option<&str> {
        self.connections
            .get(&conn)
            .filter(|c| c.role == ChannelRole::Frontend)
            .map(|c| c.frontend_name.as_str())
    }

    pub fn accept(
        &mut self,
        conn: ConnectionId,
        role: ChannelRole,
        tab: Option<TabId>,
        port: Rc<dyn Port>,
    ) {
        info!(conn = %conn, role = %role, tab = ?tab, "channel opened");
        self.connections.insert(
            conn,
            Connection {
                role,
                tab,
                port,
                frontend_name: UNKNOWN_FRONTEND.to_string(),
            },
        );
    }

    /// Handles one inbound message from `conn`.
    pub fn dispatch(&mut self, conn: ConnectionId, msg: Envelope) {
        let Some(role) = self.connections.get(&conn).map(|c| c.role) else {
            debug!(conn = %conn, kind = msg.kind(), "message on unknown channel, ignoring");
            return;
        };

        match (role, msg) {
            (ChannelRole::Frontend, Envelope::FrontendInit(init)) => {
                self.frontend_init(conn, init);
            }
            (ChannelRole::Frontend, Envelope::FrontendEvent { event, .. }) => {
                let name = self
                    .frontend_name(conn)
                    .unwrap_or(UNKNOWN_FRONTEND)
                    .to_string();
                self.route(&name, &event);
            }
            (ChannelRole::Backend, Envelope::BackendInit(init)) => {
                self.backend_init(conn, init);
            }
            (role, msg) => {
                debug!(conn = %conn, role = %role, kind = msg.kind(), "unexpected message for channel role, ignoring");
            }
        }
    }

    /// Handles the disconnect signal of `conn`.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        let Some(c) = self.connections.remove(&conn) else {
            return;
        };
        debug!(conn = %conn, role = %c.role, "channel closed");
        if c.role == ChannelRole::Backend {
            self.registry.unregister_channel(conn);
        }
    }

    fn frontend_init(&mut self, conn: ConnectionId, init: FrontendInit) {
        let Some(name) = init.frontend_name.filter(|n| !n.is_empty()) else {
            debug!(conn = %conn, "frontend handshake without name, ignoring");
            return;
        };
        if let Some(c) = self.connections.get_mut(&conn) {
            info!(conn = %conn, frontend = %name, "frontend initialized");
            c.frontend_name = name;
        }
    }

    fn backend_init(&mut self, conn: ConnectionId, init: BackendInit) -> Option<Registration> {
        let Some(name) = init.backend_name.filter(|n| !n.is_empty()) else {
            debug!(conn = %conn, "backend handshake without name, ignoring");
            return None;
        };
        let c = self.connections.get(&conn)?;
        let (tab, port) = (c.tab.clone(), Rc::clone(&c.port));
        Some(self.registry.register(&name, conn, tab, port))
    }

    /// Applies policy to `event`, tags it with `frontend_name` and sends it
    /// to every registered backend. `event` itself is left untouched.
    pub fn route(&self, frontend_name: &str, event: &FrontendEvent) -> RouteOutcome {
        let event = match policy::apply(&self.options, event) {
            Ok(ev) => ev,
            Err(reason @ DropReason::MalformedSegmentPair) => {
                warn!(frontend = frontend_name, kind = event.kind(), %reason, "frontend event dropped");
                return RouteOutcome::Dropped(reason);
            }
            Err(reason) => {
                debug!(frontend = frontend_name, kind = event.kind(), %reason, "frontend event dropped");
                return RouteOutcome::Dropped(reason);
            }
        };

        let msg = Envelope::FrontendEvent {
            event: event.into_owned(),
            frontend: Some(FrontendInfo {
                name: frontend_name.to_string(),
            }),
        };

        debug!(frontend = frontend_name, kind = msg.kind(), backends = self.registry.len(), "routing frontend event");
        let mut attempted = 0;
        let mut failed = 0;
        for (backend, port) in self.registry.all() {
            attempted += 1;
            if let Err(e) = port.post(&msg) {
                failed += 1;
                warn!(backend, error = %e, "delivery to backend failed");
            }
        }
        RouteOutcome::Delivered { attempted, failed }
    }

    /// Routes a browser context-menu selection as a monolingual selection.
    pub fn route_context_menu_selection(&self, selection_text: &str) -> RouteOutcome {
        let event = FrontendEvent::SelectMonolingualText {
            selected_text: selection_text.to_string(),
        };
        self.route(CONTEXT_MENU_FRONTEND, &event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::MockPort;
    use crate::policy::TargetClickSearchMode;
    use crate::protocol::{SegmentInfo, SegmentLocation, SegmentPair};

    fn tab(s: &str) -> Option<TabId> {
        Some(TabId(s.to_string()))
    }

    fn frontend_name_of(msg: &Envelope) -> Option<&str> {
        match msg {
            Envelope::FrontendEvent { frontend, .. } => frontend.as_ref().map(|f| f.name.as_str()),
            _ => None,
        }
    }

    fn event_of(msg: &Envelope) -> &FrontendEvent {
        match msg {
            Envelope::FrontendEvent { event, .. } => event,
            other => panic!("expected frontend event, got {other:?}"),
        }
    }

    fn target_click(target_text: &str) -> FrontendEvent {
        FrontendEvent::ClickSegment {
            segment_pair: SegmentPair {
                active: SegmentInfo {
                    text: target_text.to_string(),
                    lang_code: "fr-FR".to_string(),
                    location: SegmentLocation::Target,
                },
                other: SegmentInfo {
                    text: "Member States".to_string(),
                    lang_code: "en-GB".to_string(),
                    location: SegmentLocation::Source,
                },
            },
        }
    }

    fn bonjour() -> FrontendEvent {
        FrontendEvent::SelectMonolingualText {
            selected_text: "bonjour".to_string(),
        }
    }

    struct Fixture {
        router: Router,
        next: u64,
    }

    impl Fixture {
        fn new(options: SearchOptions) -> Self {
            Self {
                router: Router::new(options),
                next: 0,
            }
        }

        fn open(&mut self, role: ChannelRole, tab: Option<TabId>) -> (ConnectionId, MockPort) {
            self.next += 1;
            let conn = ConnectionId(self.next);
            let port = MockPort::new();
            self.router.accept(conn, role, tab, port.shared());
            (conn, port)
        }

        fn backend(&mut self, name: &str, tab: Option<TabId>) -> (ConnectionId, MockPort) {
            let (conn, port) = self.open(ChannelRole::Backend, tab);
            self.router.dispatch(conn, Envelope::backend_init(name));
            (conn, port)
        }
    }

    #[test]
    fn fan_out_reaches_all_backends() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (_, iate) = fx.backend("IATE", tab("1"));
        let (_, eurlex) = fx.backend("EURLex", tab("2"));
        let (fe, fe_port) = fx.open(ChannelRole::Frontend, tab("3"));
        fx.router.dispatch(fe, Envelope::frontend_init("memoQweb"));

        fx.router.dispatch(fe, Envelope::event(bonjour()));

        for port in [&iate, &eurlex] {
            let posted = port.posted();
            assert_eq!(posted.len(), 1);
            assert_eq!(frontend_name_of(&posted[0]), Some("memoQweb"));
            assert_eq!(event_of(&posted[0]), &bonjour());
        }
        assert!(fe_port.posted().is_empty());
    }

    #[test]
    fn undeclared_frontend_is_unknown() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (_, iate) = fx.backend("IATE", tab("1"));
        let (fe, _) = fx.open(ChannelRole::Frontend, tab("3"));

        fx.router.dispatch(fe, Envelope::event(bonjour()));
        // A nameless handshake does not change the default.
        fx.router.dispatch(fe, Envelope::FrontendInit(FrontendInit::default()));
        fx.router.dispatch(fe, Envelope::event(bonjour()));

        let posted = iate.posted();
        assert_eq!(posted.len(), 2);
        assert!(posted.iter().all(|m| frontend_name_of(m) == Some(UNKNOWN_FRONTEND)));
    }

    #[test]
    fn frontend_names_are_per_channel() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (_, iate) = fx.backend("IATE", tab("1"));
        let (memoq, _) = fx.open(ChannelRole::Frontend, tab("2"));
        let (matecat, _) = fx.open(ChannelRole::Frontend, tab("3"));
        fx.router.dispatch(memoq, Envelope::frontend_init("memoQweb"));
        fx.router.dispatch(matecat, Envelope::frontend_init("matecat"));

        fx.router.dispatch(matecat, Envelope::event(bonjour()));
        fx.router.dispatch(memoq, Envelope::event(bonjour()));

        let names: Vec<_> = iate
            .posted()
            .iter()
            .map(|m| frontend_name_of(m).unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["matecat", "memoQweb"]);
    }

    #[test]
    fn incoming_frontend_tag_is_overwritten() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (_, iate) = fx.backend("IATE", tab("1"));
        let (fe, _) = fx.open(ChannelRole::Frontend, tab("2"));
        fx.router.dispatch(fe, Envelope::frontend_init("matecat"));

        fx.router.dispatch(
            fe,
            Envelope::FrontendEvent {
                event: bonjour(),
                frontend: Some(FrontendInfo {
                    name: "spoofed".to_string(),
                }),
            },
        );
        assert_eq!(frontend_name_of(&iate.posted()[0]), Some("matecat"));
    }

    #[test]
    fn target_click_off_delivers_nothing() {
        let mut fx = Fixture::new(SearchOptions {
            target_click_search_mode: TargetClickSearchMode::Off,
            ..SearchOptions::default()
        });
        let (_, iate) = fx.backend("IATE", tab("1"));

        let out = fx.router.route("memoQweb", &target_click(""));
        assert_eq!(out, RouteOutcome::Dropped(DropReason::TargetClickDisabled));
        assert!(iate.posted().is_empty());
    }

    #[test]
    fn source_if_empty_rewrites_blank_target_click() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (_, iate) = fx.backend("IATE", tab("1"));

        let input = target_click("");
        let snapshot = input.clone();
        fx.router.route("memoQweb", &input);
        fx.router.route("memoQweb", &target_click("hello"));

        assert_eq!(input, snapshot);
        let posted = iate.posted();
        assert_eq!(posted.len(), 2);
        let FrontendEvent::ClickSegment { segment_pair } = event_of(&posted[0]) else {
            panic!("expected click");
        };
        assert_eq!(segment_pair.active.location, SegmentLocation::Source);
        assert_eq!(segment_pair.active.text, "Member States");
        assert_eq!(event_of(&posted[1]), &target_click("hello"));
    }

    #[test]
    fn routing_never_mutates_input() {
        let mut fx = Fixture::new(SearchOptions {
            target_click_search_mode: TargetClickSearchMode::Source,
            ..SearchOptions::default()
        });
        fx.backend("IATE", tab("1"));

        for input in [target_click("déjà"), target_click(""), bonjour()] {
            let snapshot = input.clone();
            fx.router.route("memoQweb", &input);
            assert_eq!(input, snapshot);
        }
    }

    #[test]
    fn delivery_failure_does_not_stop_fan_out() {
        let mut fx = Fixture::new(SearchOptions::default());
        let dead = MockPort::failing();
        let dead_conn = ConnectionId(100);
        fx.router.accept(dead_conn, ChannelRole::Backend, tab("9"), dead.shared());
        fx.router.dispatch(dead_conn, Envelope::backend_init("Juremy"));
        let (_, iate) = fx.backend("IATE", tab("1"));

        let out = fx.router.route("matecat", &bonjour());
        assert_eq!(
            out,
            RouteOutcome::Delivered {
                attempted: 2,
                failed: 1
            }
        );
        assert_eq!(iate.posted().len(), 1);
        assert_eq!(fx.router.registry().len(), 2);
    }

    #[test]
    fn no_backends_is_not_an_error() {
        let fx = Fixture::new(SearchOptions::default());
        assert_eq!(
            fx.router.route("matecat", &bonjour()),
            RouteOutcome::Delivered {
                attempted: 0,
                failed: 0
            }
        );
    }

    #[test]
    fn reload_then_late_disconnect_keeps_new_backend() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (old_conn, old_port) = fx.backend("EURLex", tab("5"));
        let (new_conn, new_port) = fx.backend("EURLex", tab("5"));
        assert_eq!(old_port.closed(), 1);

        fx.router.disconnect(old_conn);
        assert_eq!(fx.router.registry().get("EURLex").map(|r| r.conn), Some(new_conn));

        fx.router.route_context_menu_selection("acquis");
        assert!(old_port.posted().is_empty());
        assert_eq!(new_port.posted().len(), 1);
    }

    #[test]
    fn second_tab_is_rejected_and_its_disconnect_is_harmless() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (first, _) = fx.backend("IATE", tab("1"));
        let (second, second_port) = fx.backend("IATE", tab("2"));
        assert_eq!(second_port.closed(), 1);

        fx.router.disconnect(second);
        assert_eq!(fx.router.registry().get("IATE").map(|r| r.conn), Some(first));

        fx.router.disconnect(first);
        assert!(fx.router.registry().is_empty());
        assert_eq!(fx.router.connection_count(), 0);
    }

    #[test]
    fn backend_can_reannounce_after_active_one_leaves() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (first, _) = fx.backend("IATE", tab("1"));
        fx.router.disconnect(first);

        let (third, _) = fx.backend("IATE", tab("3"));
        assert_eq!(fx.router.registry().get("IATE").map(|r| r.conn), Some(third));
    }

    #[test]
    fn malformed_backend_handshake_is_ignored() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (conn, port) = fx.open(ChannelRole::Backend, tab("1"));
        fx.router.dispatch(conn, Envelope::BackendInit(BackendInit::default()));
        fx.router.dispatch(
            conn,
            Envelope::BackendInit(BackendInit {
                backend_name: Some(String::new()),
            }),
        );
        assert!(fx.router.registry().is_empty());
        assert_eq!(port.closed(), 0);
    }

    #[test]
    fn messages_are_gated_by_role() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (be, be_port) = fx.backend("IATE", tab("1"));
        let (fe, _) = fx.open(ChannelRole::Frontend, tab("2"));

        // Frontends cannot register as backends, backends cannot emit events.
        fx.router.dispatch(fe, Envelope::backend_init("Rogue"));
        fx.router.dispatch(be, Envelope::event(bonjour()));
        fx.router.dispatch(be, Envelope::frontend_init("memoQweb"));

        assert!(fx.router.registry().get("Rogue").is_none());
        assert!(be_port.posted().is_empty());
        assert_eq!(fx.router.frontend_name(be), None);
    }

    #[test]
    fn messages_from_unknown_channels_are_ignored() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (_, iate) = fx.backend("IATE", tab("1"));
        fx.router.dispatch(ConnectionId(999), Envelope::event(bonjour()));
        fx.router.disconnect(ConnectionId(999));
        assert!(iate.posted().is_empty());
        assert_eq!(fx.router.registry().len(), 1);
    }

    #[test]
    fn context_menu_selection_is_tagged() {
        let mut fx = Fixture::new(SearchOptions::default());
        let (_, juremy) = fx.backend("Juremy", tab("1"));

        fx.router.route_context_menu_selection("state aid");

        let posted = juremy.posted();
        assert_eq!(frontend_name_of(&posted[0]), Some(CONTEXT_MENU_FRONTEND));
        assert_eq!(
            event_of(&posted[0]),
            &FrontendEvent::SelectMonolingualText {
                selected_text: "state aid".to_string()
            }
        );
    }
}
