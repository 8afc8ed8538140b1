//! Protocol link seam between the session core and the transport.
//!
//! A link is bound to exactly one connection attempt. Requests are
//! fire-and-forget; results come back later through the `Game::process_*`
//! entry points on the same event loop.

pub mod loopback;

use crate::game::types::{Direction, Outfit, Position};

/// Credentials and endpoint for one world login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub account: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub character: String,
}

/// Every request the session core can forward to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Logout,
    Walk(Direction),
    /// Cardinal directions only.
    Turn(Direction),
    LookAt {
        position: Position,
        thing_id: u32,
        stackpos: u8,
    },
    UseItem {
        position: Position,
        thing_id: u32,
        stackpos: u8,
        index: u8,
    },
    RotateItem {
        position: Position,
        thing_id: u32,
        stackpos: u8,
    },
    /// `creature_id == 0` cancels the current attack.
    Attack { creature_id: u32 },
    /// `creature_id == 0` cancels the current follow.
    Follow { creature_id: u32 },
    Talk {
        channel_type: u8,
        channel_id: u16,
        receiver: String,
        message: String,
    },
    InviteToParty { creature_id: u32 },
    GetOutfit,
    SetOutfit(Outfit),
    AddVip { name: String },
    RemoveVip { player_id: u32 },
}

/// Errors a transport reports through `Game::process_connection_error`.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("end of stream")]
    Eof,

    #[error("connection refused by {host}:{port}")]
    Refused { host: String, port: u16 },

    #[error("connection timed out")]
    TimedOut,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Ordinary stream termination, which is not worth reporting to the UI.
    pub fn is_eof(&self) -> bool {
        match self {
            LinkError::Eof => true,
            LinkError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Transport collaborator owned by the session for one connection attempt.
pub trait ProtocolLink {
    fn login(&mut self, request: &LoginRequest);

    fn send(&mut self, request: ClientRequest);

    fn disconnect(&mut self);
}

/// Creates a fresh link for every login attempt.
pub trait LinkFactory {
    fn create(&mut self) -> Box<dyn ProtocolLink>;
}

impl<F> LinkFactory for F
where
    F: FnMut() -> Box<dyn ProtocolLink>,
{
    fn create(&mut self) -> Box<dyn ProtocolLink> {
        self()
    }
}
