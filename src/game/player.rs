//! The local player entity owned by an online session.

use serde::{Deserialize, Serialize};

use super::types::{Creature, Direction, Position};

/// What the local player is currently locked onto.
///
/// Following and attacking share one field so both can never be set at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionMode {
    #[default]
    None,
    Following(u32),
    Attacking(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPlayer {
    pub id: u32,
    pub name: String,
    pub position: Position,
    #[serde(skip)]
    interaction: InteractionMode,
    /// Direction of a client-predicted step the server has not confirmed yet.
    #[serde(skip)]
    pending_walk: Option<Direction>,
}

impl LocalPlayer {
    pub fn new(id: u32, name: impl Into<String>, position: Position) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            interaction: InteractionMode::None,
            pending_walk: None,
        }
    }

    pub fn interaction(&self) -> InteractionMode {
        self.interaction
    }

    pub fn is_following(&self) -> bool {
        matches!(self.interaction, InteractionMode::Following(_))
    }

    pub fn is_attacking(&self) -> bool {
        matches!(self.interaction, InteractionMode::Attacking(_))
    }

    pub fn attacking_creature(&self) -> Option<u32> {
        match self.interaction {
            InteractionMode::Attacking(id) => Some(id),
            _ => None,
        }
    }

    pub fn following_creature(&self) -> Option<u32> {
        match self.interaction {
            InteractionMode::Following(id) => Some(id),
            _ => None,
        }
    }

    /// `None` clears the attack target; clearing never touches an active follow.
    pub fn set_attacking_creature(&mut self, creature: Option<&Creature>) {
        match creature {
            Some(c) => self.interaction = InteractionMode::Attacking(c.id),
            None if self.is_attacking() => self.interaction = InteractionMode::None,
            None => {}
        }
    }

    /// `None` clears the follow target; clearing never touches an active attack.
    pub fn set_following_creature(&mut self, creature: Option<&Creature>) {
        match creature {
            Some(c) => self.interaction = InteractionMode::Following(c.id),
            None if self.is_following() => self.interaction = InteractionMode::None,
            None => {}
        }
    }

    pub fn is_walking(&self) -> bool {
        self.pending_walk.is_some()
    }

    /// Local movement pre-check: one predicted step at a time, inside the map.
    pub fn can_walk(&self, direction: Direction) -> bool {
        self.pending_walk.is_none() && self.position.translated(direction).is_some()
    }

    /// Optimistically apply a step before the server confirms it.
    pub fn client_walk(&mut self, direction: Direction) {
        if let Some(next) = self.position.translated(direction) {
            self.position = next;
            self.pending_walk = Some(direction);
        }
    }

    pub fn confirm_walk(&mut self) {
        self.pending_walk = None;
    }

    /// Undo a predicted step the server rejected. Returns the direction of
    /// the step that was rolled back.
    pub fn cancel_walk(&mut self) -> Option<Direction> {
        let direction = self.pending_walk.take()?;
        if let Some(previous) = self.position.translated(direction.opposite()) {
            self.position = previous;
        }
        Some(direction)
    }
}
