//! Session state machine for one world connection.
//!
//! `Game` owns the online/dead/server-beat flags, the local player, and the
//! protocol link of the current connection attempt. Transport callbacks come
//! in through the `process_*` methods; player actions go out through the
//! gateway methods in [`actions`]. Every call runs on the caller's event
//! loop; nothing here blocks or locks.

pub mod actions;
pub mod events;
pub mod map;
pub mod player;
pub mod protection;
pub mod scripting;
pub mod stackpos;
pub mod types;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, TimerHandle};
use crate::network::{ClientRequest, LinkError, LinkFactory, LoginRequest, ProtocolLink};

use events::{EventBus, GameEvent, GameObserver};
use map::WorldMap;
use player::LocalPlayer;
use protection::{BotProtection, CallContext};
use types::{Direction, Item, Location};

/// Coarse lifecycle view derived from the session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No protocol link.
    Idle,
    /// Link created, login requested, no answer yet.
    Connecting,
    Online,
    /// Online with the dead flag set.
    Dead,
}

/// Copy of the session flags, readable while `Game` itself is borrowed
/// (for example by a script handler running inside an event emit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub online: bool,
    pub dead: bool,
    pub server_beat: u32,
}

/// Callbacks the session posts on its own dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredEvent {
    ForceLogout,
}

pub struct Game {
    online: bool,
    dead: bool,
    server_beat: u32,
    status: Rc<Cell<SessionStatus>>,
    local_player: Option<LocalPlayer>,
    link: Option<Box<dyn ProtocolLink>>,
    link_factory: Box<dyn LinkFactory>,
    map: Rc<RefCell<dyn WorldMap>>,
    events: EventBus,
    dispatcher: Dispatcher<DeferredEvent>,
    forced_logout: Option<TimerHandle>,
    forced_logout_delay_ms: u64,
    protection: BotProtection,
}

impl Game {
    /// Build an idle session. Bot protection mode is fixed from `config` here.
    pub fn new(
        config: &ClientConfig,
        link_factory: impl LinkFactory + 'static,
        map: Rc<RefCell<dyn WorldMap>>,
    ) -> Self {
        Self::with_call_context(config, link_factory, map, CallContext::new())
    }

    /// Like [`Game::new`], sharing an existing call context with the UI layer.
    pub fn with_call_context(
        config: &ClientConfig,
        link_factory: impl LinkFactory + 'static,
        map: Rc<RefCell<dyn WorldMap>>,
        context: CallContext,
    ) -> Self {
        Self {
            online: false,
            dead: false,
            server_beat: 0,
            status: Rc::new(Cell::new(SessionStatus::default())),
            local_player: None,
            link: None,
            link_factory: Box::new(link_factory),
            map,
            events: EventBus::new(),
            dispatcher: Dispatcher::new(),
            forced_logout: None,
            forced_logout_delay_ms: config.forced_logout_delay_ms,
            protection: BotProtection::new(config.bot_protection, context),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn GameObserver>) {
        self.events.subscribe(observer);
    }

    pub fn call_context(&self) -> CallContext {
        self.protection.context().clone()
    }

    pub fn bot_protection(&self) -> &BotProtection {
        &self.protection
    }

    /// Shared view of the session flags, kept current on every transition.
    pub fn status_handle(&self) -> Rc<Cell<SessionStatus>> {
        Rc::clone(&self.status)
    }

    fn publish_status(&self) {
        self.status.set(SessionStatus {
            online: self.online,
            dead: self.dead,
            server_beat: self.server_beat,
        });
    }

    // ============================================
    // Lifecycle
    // ============================================

    /// Start a new connection attempt.
    ///
    /// The caller must not call this while a previous attempt is still
    /// pending; the old link is dropped without being disconnected.
    pub fn login_world(
        &mut self,
        account: &str,
        password: &str,
        host: &str,
        port: u16,
        character: &str,
    ) {
        if self.link.is_some() {
            tracing::warn!("[session] login requested while a link is still pending");
        }
        self.cancel_forced_logout();

        self.online = false;
        self.dead = false;
        self.publish_status();

        let request = LoginRequest {
            account: account.to_owned(),
            password: password.to_owned(),
            host: host.to_owned(),
            port,
            character: character.to_owned(),
        };
        tracing::info!("[session] login {}@{}:{}", character, host, port);

        let mut link = self.link_factory.create();
        link.login(&request);
        self.link = Some(link);
    }

    pub fn cancel_login(&mut self) {
        self.process_logout();
    }

    /// Ask the server to log out. With `force`, tear down locally right away
    /// instead of waiting for the server to close the connection.
    pub fn logout(&mut self, force: bool) {
        if !self.online {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        link.send(ClientRequest::Logout);

        if force {
            self.process_logout();
        }
    }

    pub fn force_logout(&mut self) {
        self.logout(true);
    }

    pub fn clean_logout(&mut self) {
        self.logout(false);
    }

    // ============================================
    // Transport callbacks
    // ============================================

    pub fn process_login_error(&mut self, message: &str) {
        tracing::info!("[session] login error: {}", message);
        self.events.emit(GameEvent::LoginError { message });
    }

    pub fn process_connection_error(&mut self, error: &LinkError) {
        // only meaningful while we still own a link
        if self.link.is_none() {
            tracing::debug!("[session] stale connection error ignored: {}", error);
            return;
        }

        if !error.is_eof() {
            let message = error.to_string();
            tracing::info!("[session] connection error: {}", message);
            self.events.emit(GameEvent::ConnectionError { message: &message });
        }

        self.process_logout();
    }

    pub fn process_login(&mut self, player: LocalPlayer) {
        if self.link.is_none() || self.online {
            tracing::warn!(
                "[session] unexpected login for {} (link={}, online={})",
                player.name,
                self.link.is_some(),
                self.online
            );
            return;
        }

        tracing::info!("[session] online as {} (id={})", player.name, player.id);
        self.online = true;
        self.publish_status();
        let player = self.local_player.insert(player);
        self.events.emit(GameEvent::Login { player });
    }

    /// Tear the session down. Safe to call any number of times.
    pub fn process_logout(&mut self) {
        self.cancel_forced_logout();

        if self.online {
            if let Some(player) = self.local_player.as_ref() {
                tracing::info!("[session] logout {}", player.name);
                self.events.emit(GameEvent::Logout { player });
            }
            self.local_player = None;
            self.online = false;
        }
        self.dead = false;
        self.publish_status();

        if let Some(mut link) = self.link.take() {
            link.disconnect();
        }
    }

    /// Mark the player dead and arm the forced-logout timer.
    pub fn process_death(&mut self) {
        tracing::info!("[session] player died, forced logout in {}ms", self.forced_logout_delay_ms);
        self.dead = true;
        self.publish_status();
        self.events.emit(GameEvent::Death);

        self.cancel_forced_logout();
        let handle = self
            .dispatcher
            .schedule(self.forced_logout_delay_ms, DeferredEvent::ForceLogout);
        self.forced_logout = Some(handle);
    }

    pub fn process_text_message(&mut self, kind: u8, text: &str) {
        self.events.emit(GameEvent::TextMessage { kind, text });
    }

    pub fn process_inventory_change(&mut self, slot: u8, mut item: Option<Item>) {
        if let Some(item) = item.as_mut() {
            item.location = Location::inventory(slot);
        }
        self.events.emit(GameEvent::InventoryChange {
            slot,
            item: item.as_ref(),
        });
    }

    /// The server dropped our attack target; it already knows, so nothing is sent.
    pub fn process_attack_cancel(&mut self) {
        if let Some(player) = self.local_player.as_mut() {
            if player.is_attacking() {
                player.set_attacking_creature(None);
            }
        }
    }

    pub fn process_walk_confirmed(&mut self) {
        if let Some(player) = self.local_player.as_mut() {
            player.confirm_walk();
        }
    }

    /// The server refused our predicted step. `direction` is what the server
    /// reports; the rollback always undoes the step we actually predicted.
    pub fn process_walk_cancel(&mut self, direction: Direction) {
        let Some(player) = self.local_player.as_mut() else {
            return;
        };
        if let Some(predicted) = player.cancel_walk() {
            if predicted != direction {
                tracing::debug!(
                    "[session] walk cancel for {:?} while {:?} was pending",
                    direction,
                    predicted
                );
            }
        }
    }

    // ============================================
    // Event loop
    // ============================================

    /// Advance the session clock and run every deferred callback that is due.
    pub fn advance(&mut self, elapsed_ms: u64) {
        for (handle, event) in self.dispatcher.advance(elapsed_ms) {
            if self.forced_logout == Some(handle) {
                self.forced_logout = None;
            }
            match event {
                DeferredEvent::ForceLogout => {
                    tracing::info!("[session] forced logout timer fired");
                    self.force_logout();
                }
            }
        }
    }

    /// Milliseconds until the next deferred callback, `None` when nothing is armed.
    pub fn next_deadline(&self) -> Option<u64> {
        self.dispatcher.next_due_in()
    }

    pub fn forced_logout_pending(&self) -> bool {
        self.forced_logout.is_some()
    }

    fn cancel_forced_logout(&mut self) {
        if let Some(handle) = self.forced_logout.take() {
            if self.dispatcher.cancel(handle).is_some() {
                tracing::debug!("[session] forced logout timer canceled");
            }
        }
    }

    // ============================================
    // Accessors
    // ============================================

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_connecting(&self) -> bool {
        self.link.is_some() && !self.online
    }

    pub fn state(&self) -> SessionState {
        match (self.link.is_some(), self.online, self.dead) {
            (_, true, true) => SessionState::Dead,
            (_, true, false) => SessionState::Online,
            (true, false, _) => SessionState::Connecting,
            (false, false, _) => SessionState::Idle,
        }
    }

    pub fn server_beat(&self) -> u32 {
        self.server_beat
    }

    pub fn set_server_beat(&mut self, server_beat: u32) {
        self.server_beat = server_beat;
        self.publish_status();
    }

    pub fn local_player(&self) -> Option<&LocalPlayer> {
        self.local_player.as_ref()
    }

    pub fn local_player_mut(&mut self) -> Option<&mut LocalPlayer> {
        self.local_player.as_mut()
    }

    pub fn protocol_link(&self) -> Option<&dyn ProtocolLink> {
        self.link.as_deref()
    }

    pub fn has_protocol_link(&self) -> bool {
        self.link.is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::events::{EventRecorder, RecordedEvent};
    use crate::game::map::TileMap;
    use crate::game::types::{Position, Item};
    use crate::network::loopback::{Journal, LinkCall, LoopbackFactory};

    pub(crate) struct Harness {
        pub game: Game,
        pub journal: Journal,
        pub events: EventRecorder,
        pub map: Rc<RefCell<TileMap>>,
    }

    pub(crate) fn harness_with(config: ClientConfig) -> Harness {
        let journal = Journal::new();
        let events = EventRecorder::new();
        let map = Rc::new(RefCell::new(TileMap::new()));
        let mut game = Game::new(&config, LoopbackFactory::new(journal.clone()), map.clone());
        game.subscribe(Box::new(events.clone()));
        Harness {
            game,
            journal,
            events,
            map,
        }
    }

    pub(crate) fn harness() -> Harness {
        harness_with(ClientConfig::default())
    }

    pub(crate) fn knight() -> LocalPlayer {
        LocalPlayer::new(0x1000_0001, "Knight", Position::new(100, 100, 7))
    }

    /// Harness already logged in as [`knight`], with traffic cleared.
    pub(crate) fn online() -> Harness {
        let mut h = harness();
        h.game.login_world("acc", "pw", "host", 7172, "Knight");
        h.game.process_login(knight());
        h.journal.clear();
        h.events.clear();
        h
    }

    #[test]
    fn test_login_scenario() {
        let mut h = harness();
        assert_eq!(h.game.state(), SessionState::Idle);

        h.game.login_world("acc", "pw", "host", 7172, "Char");
        assert_eq!(h.game.state(), SessionState::Connecting);
        assert!(h.game.is_connecting());
        assert_eq!(
            h.journal.entries()[0].call,
            LinkCall::Login(LoginRequest {
                account: "acc".into(),
                password: "pw".into(),
                host: "host".into(),
                port: 7172,
                character: "Char".into(),
            })
        );

        let player = LocalPlayer::new(5, "Char", Position::new(100, 100, 7));
        h.game.process_login(player.clone());

        assert!(h.game.is_online());
        assert_eq!(h.game.local_player(), Some(&player));
        assert_eq!(
            h.events.events(),
            vec![RecordedEvent::Login {
                player_id: 5,
                name: "Char".into()
            }]
        );
    }

    #[test]
    fn test_login_without_link_is_ignored() {
        let mut h = harness();
        h.game.process_login(knight());
        assert!(!h.game.is_online());
        assert!(h.game.local_player().is_none());
        assert!(h.events.events().is_empty());
    }

    #[test]
    fn test_logout_after_login_clears_everything() {
        let mut h = online();
        h.game.process_death();
        h.game.process_death();
        h.game.process_logout();

        assert!(!h.game.is_online());
        assert!(!h.game.is_dead());
        assert!(h.game.local_player().is_none());
        assert!(!h.game.has_protocol_link());
        assert_eq!(h.game.state(), SessionState::Idle);
        assert_eq!(h.journal.disconnects(), 1);
        assert_eq!(
            h.events.events().last(),
            Some(&RecordedEvent::Logout {
                player_id: 0x1000_0001,
                name: "Knight".into()
            })
        );
    }

    #[test]
    fn test_process_logout_is_idempotent() {
        let mut h = online();
        h.game.process_logout();
        h.game.process_logout();
        h.game.cancel_login();

        assert_eq!(h.journal.disconnects(), 1);
        let logouts = h
            .events
            .events()
            .into_iter()
            .filter(|e| matches!(e, RecordedEvent::Logout { .. }))
            .count();
        assert_eq!(logouts, 1);
    }

    #[test]
    fn test_cancel_login_while_connecting() {
        let mut h = harness();
        h.game.login_world("acc", "pw", "host", 7172, "Char");
        h.game.cancel_login();

        assert_eq!(h.game.state(), SessionState::Idle);
        assert_eq!(h.journal.disconnects(), 1);
        // never online, so no logout notification
        assert!(h.events.events().is_empty());
    }

    #[test]
    fn test_clean_logout_waits_for_server() {
        let mut h = online();
        h.game.clean_logout();

        assert_eq!(h.journal.requests(), vec![ClientRequest::Logout]);
        assert!(h.game.is_online());
        assert!(h.game.has_protocol_link());

        h.game.process_connection_error(&LinkError::Eof);
        assert!(!h.game.is_online());
        assert!(!h.game.has_protocol_link());
    }

    #[test]
    fn test_force_logout_tears_down_immediately() {
        let mut h = online();
        h.game.force_logout();

        assert_eq!(h.journal.requests(), vec![ClientRequest::Logout]);
        assert_eq!(h.game.state(), SessionState::Idle);
    }

    #[test]
    fn test_logout_while_connecting_is_noop() {
        let mut h = harness();
        h.game.login_world("acc", "pw", "host", 7172, "Char");
        h.journal.clear();

        h.game.logout(true);
        assert!(h.journal.is_empty());
        assert!(h.game.is_connecting());
    }

    #[test]
    fn test_connection_error_reports_and_tears_down() {
        let mut h = online();
        h.game.process_connection_error(&LinkError::TimedOut);

        assert_eq!(
            h.events.events(),
            vec![
                RecordedEvent::ConnectionError("connection timed out".into()),
                RecordedEvent::Logout {
                    player_id: 0x1000_0001,
                    name: "Knight".into()
                },
            ]
        );
        assert_eq!(h.game.state(), SessionState::Idle);
    }

    #[test]
    fn test_eof_tears_down_silently() {
        let mut h = online();
        h.game.process_connection_error(&LinkError::Eof);

        assert!(!h
            .events
            .events()
            .iter()
            .any(|e| matches!(e, RecordedEvent::ConnectionError(_))));
        assert_eq!(h.game.state(), SessionState::Idle);
    }

    #[test]
    fn test_stale_connection_error_is_ignored() {
        let mut h = harness();
        for error in [
            LinkError::Eof,
            LinkError::TimedOut,
            LinkError::Protocol("garbage".into()),
        ] {
            h.game.process_connection_error(&error);
        }
        assert!(h.events.events().is_empty());
        assert!(h.journal.is_empty());

        let mut h = online();
        h.game.force_logout();
        h.events.clear();
        h.game.process_connection_error(&LinkError::TimedOut);
        assert!(h.events.events().is_empty());
    }

    #[test]
    fn test_login_error_only_notifies() {
        let mut h = harness();
        h.game.login_world("acc", "pw", "host", 7172, "Char");
        h.game.process_login_error("Account name or password is not correct.");

        assert_eq!(
            h.events.events(),
            vec![RecordedEvent::LoginError(
                "Account name or password is not correct.".into()
            )]
        );
        assert!(h.game.has_protocol_link());
    }

    #[test]
    fn test_death_forces_logout_after_delay() {
        let mut h = online();
        h.game.process_death();

        assert!(h.game.is_dead());
        assert_eq!(h.game.state(), SessionState::Dead);
        assert_eq!(h.events.events(), vec![RecordedEvent::Death]);
        assert_eq!(h.game.next_deadline(), Some(5000));

        h.game.advance(4999);
        assert!(h.game.is_online());

        h.game.advance(1);
        assert!(!h.game.is_online());
        assert!(!h.game.forced_logout_pending());
        assert_eq!(h.journal.requests(), vec![ClientRequest::Logout]);
    }

    #[test]
    fn test_manual_logout_before_timer() {
        let mut h = online();
        h.game.process_death();
        h.game.advance(1000);
        h.game.logout(true);
        assert!(!h.game.forced_logout_pending());

        let before = h.journal.len();
        let events_before = h.events.events().len();
        h.game.advance(10_000);

        assert_eq!(h.journal.len(), before);
        assert_eq!(h.events.events().len(), events_before);
        assert_eq!(h.game.next_deadline(), None);
    }

    #[test]
    fn test_timer_does_not_leak_into_next_session() {
        let mut h = online();
        h.game.process_death();
        h.game.process_logout();

        h.game.login_world("acc", "pw", "host", 7172, "Knight");
        h.game.process_login(knight());
        h.game.advance(5000);
        assert!(h.game.is_online());
    }

    #[test]
    fn test_relogin_resets_dead() {
        let mut h = online();
        h.game.process_death();
        h.game.login_world("acc", "pw", "host", 7172, "Knight");
        assert!(!h.game.is_dead());
        assert!(!h.game.is_online());
    }

    #[test]
    fn test_configured_delay() {
        let config = ClientConfig {
            forced_logout_delay_ms: 250,
            ..ClientConfig::default()
        };
        let mut h = harness_with(config);
        h.game.login_world("acc", "pw", "host", 7172, "Knight");
        h.game.process_login(knight());
        h.game.process_death();
        h.game.advance(250);
        assert!(!h.game.is_online());
    }

    #[test]
    fn test_inventory_change_stamps_location() {
        let mut h = online();
        let item = Item::new(2160, 100, Location::Map(Position::new(1, 2, 7)));
        h.game.process_inventory_change(5, Some(item));
        h.game.process_inventory_change(6, None);

        assert_eq!(
            h.events.events(),
            vec![
                RecordedEvent::InventoryChange {
                    slot: 5,
                    item: Some(Item::new(2160, 100, Location::inventory(5))),
                },
                RecordedEvent::InventoryChange { slot: 6, item: None },
            ]
        );
    }

    #[test]
    fn test_text_message_relay() {
        let mut h = harness();
        h.game.process_text_message(19, "Welcome to the world.");
        assert_eq!(
            h.events.events(),
            vec![RecordedEvent::TextMessage {
                kind: 19,
                text: "Welcome to the world.".into()
            }]
        );
    }

    #[test]
    fn test_attack_cancel_is_local_only() {
        let mut h = online();
        let rat = crate::game::types::Creature::new(77, "Rat", Position::new(101, 100, 7));
        h.game.local_player_mut().unwrap().set_attacking_creature(Some(&rat));

        h.game.process_attack_cancel();
        assert!(!h.game.local_player().unwrap().is_attacking());
        assert!(h.journal.is_empty());
    }

    #[test]
    fn test_server_beat() {
        let mut h = harness();
        assert_eq!(h.game.server_beat(), 0);
        h.game.set_server_beat(50);
        assert_eq!(h.game.server_beat(), 50);
        assert_eq!(h.game.status_handle().get().server_beat, 50);
    }

    #[test]
    fn test_status_tracks_transitions() {
        let mut h = harness();
        let status = h.game.status_handle();

        h.game.login_world("acc", "pw", "host", 7172, "Knight");
        h.game.process_login(knight());
        assert!(status.get().online);

        h.game.process_death();
        assert!(status.get().dead);

        h.game.process_logout();
        assert_eq!(status.get(), SessionStatus::default());
    }

    #[test]
    fn test_walk_cancel_undoes_predicted_step() {
        let mut h = online();
        assert!(h.game.walk(Direction::North));
        assert_eq!(h.game.local_player().unwrap().position, Position::new(100, 99, 7));

        // server names a different direction than the one we predicted
        h.game.process_walk_cancel(Direction::South);
        let player = h.game.local_player().unwrap();
        assert_eq!(player.position, Position::new(100, 100, 7));
        assert!(!player.is_walking());
    }
}
