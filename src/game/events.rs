//! Lifecycle notifications delivered to the scripting/UI layer.

use super::player::LocalPlayer;
use super::types::Item;

/// One notification. Payloads borrow session state for the duration of the
/// call; observers that need to keep data must clone it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameEvent<'a> {
    LoginError { message: &'a str },
    ConnectionError { message: &'a str },
    Login { player: &'a LocalPlayer },
    Logout { player: &'a LocalPlayer },
    Death,
    TextMessage { kind: u8, text: &'a str },
    InventoryChange { slot: u8, item: Option<&'a Item> },
}

impl GameEvent<'_> {
    /// Handler name the scripting layer registers for this event.
    pub fn handler_name(&self) -> &'static str {
        match self {
            GameEvent::LoginError { .. } => "onLoginError",
            GameEvent::ConnectionError { .. } => "onConnectionError",
            GameEvent::Login { .. } => "onLogin",
            GameEvent::Logout { .. } => "onLogout",
            GameEvent::Death => "onDeath",
            GameEvent::TextMessage { .. } => "onTextMessage",
            GameEvent::InventoryChange { .. } => "onInventoryChange",
        }
    }
}

pub trait GameObserver {
    fn on_event(&mut self, event: &GameEvent<'_>);
}

/// Fan-out to every subscribed observer, in subscription order.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn GameObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn GameObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn emit(&mut self, event: GameEvent<'_>) {
        tracing::trace!("[session] notify {}", event.handler_name());
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }
}

/// Owned copy of a [`GameEvent`], for observers that record what they saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    LoginError(String),
    ConnectionError(String),
    Login { player_id: u32, name: String },
    Logout { player_id: u32, name: String },
    Death,
    TextMessage { kind: u8, text: String },
    InventoryChange { slot: u8, item: Option<Item> },
}

impl From<&GameEvent<'_>> for RecordedEvent {
    fn from(event: &GameEvent<'_>) -> Self {
        match *event {
            GameEvent::LoginError { message } => RecordedEvent::LoginError(message.to_owned()),
            GameEvent::ConnectionError { message } => {
                RecordedEvent::ConnectionError(message.to_owned())
            }
            GameEvent::Login { player } => RecordedEvent::Login {
                player_id: player.id,
                name: player.name.clone(),
            },
            GameEvent::Logout { player } => RecordedEvent::Logout {
                player_id: player.id,
                name: player.name.clone(),
            },
            GameEvent::Death => RecordedEvent::Death,
            GameEvent::TextMessage { kind, text } => RecordedEvent::TextMessage {
                kind,
                text: text.to_owned(),
            },
            GameEvent::InventoryChange { slot, item } => RecordedEvent::InventoryChange {
                slot,
                item: item.cloned(),
            },
        }
    }
}

/// Observer that appends every event to a shared log.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    log: std::rc::Rc<std::cell::RefCell<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.log.borrow().clone()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

impl GameObserver for EventRecorder {
    fn on_event(&mut self, event: &GameEvent<'_>) {
        self.log.borrow_mut().push(RecordedEvent::from(event));
    }
}
