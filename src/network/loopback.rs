//! In-process link that journals every call instead of touching a socket.
//!
//! Used by the replay CLI and by tests. All links created from one
//! [`LoopbackFactory`] append to the same [`Journal`], tagged with the
//! connection number they belong to.

use std::cell::RefCell;
use std::rc::Rc;

use super::{ClientRequest, LinkFactory, LoginRequest, ProtocolLink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    Login(LoginRequest),
    Send(ClientRequest),
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub connection: u32,
    pub call: LinkCall,
}

/// Shared, single-threaded record of link traffic.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<JournalEntry>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, connection: u32, call: LinkCall) {
        self.0.borrow_mut().push(JournalEntry { connection, call });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.0.borrow().clone()
    }

    /// Only the forwarded requests, in order.
    pub fn requests(&self) -> Vec<ClientRequest> {
        self.0
            .borrow()
            .iter()
            .filter_map(|e| match &e.call {
                LinkCall::Send(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.call == LinkCall::Disconnect)
            .count()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

pub struct LoopbackLink {
    connection: u32,
    journal: Journal,
    connected: bool,
}

impl LoopbackLink {
    pub fn new(connection: u32, journal: Journal) -> Self {
        Self {
            connection,
            journal,
            connected: false,
        }
    }
}

impl ProtocolLink for LoopbackLink {
    fn login(&mut self, request: &LoginRequest) {
        self.connected = true;
        tracing::debug!(
            "[loopback] conn={} login {}@{}:{}",
            self.connection,
            request.character,
            request.host,
            request.port
        );
        self.journal.push(self.connection, LinkCall::Login(request.clone()));
    }

    fn send(&mut self, request: ClientRequest) {
        if !self.connected {
            tracing::warn!("[loopback] conn={} send before login: {:?}", self.connection, request);
        }
        tracing::trace!("[loopback] conn={} send {:?}", self.connection, request);
        self.journal.push(self.connection, LinkCall::Send(request));
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.journal.push(self.connection, LinkCall::Disconnect);
    }
}

/// Hands out numbered [`LoopbackLink`]s sharing one journal.
#[derive(Debug, Clone, Default)]
pub struct LoopbackFactory {
    journal: Journal,
    created: u32,
}

impl LoopbackFactory {
    pub fn new(journal: Journal) -> Self {
        Self { journal, created: 0 }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn created(&self) -> u32 {
        self.created
    }
}

impl LinkFactory for LoopbackFactory {
    fn create(&mut self) -> Box<dyn ProtocolLink> {
        self.created += 1;
        Box::new(LoopbackLink::new(self.created, self.journal.clone()))
    }
}
