//! Shared game types read by the session core.
//!
//! `Position`  → a real map coordinate
//! `Location`  → where a thing lives: on the map or inside a container/inventory
//! `Thing`     → anything a targeted action can point at (item or creature)

use serde::{Deserialize, Serialize};

/// First-axis value the wire protocol uses for "not on the map".
pub const CONTAINER_SENTINEL_X: u16 = 65535;

/// Creature identifier the server uses to mean "no target".
pub const NO_TARGET: u32 = 0;

/// A point on the map (x, y, floor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

impl Position {
    pub fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Neighbouring position one step towards `direction`, or `None` at the map edge.
    pub fn translated(&self, direction: Direction) -> Option<Self> {
        let (dx, dy) = direction.offset();
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        if x == CONTAINER_SENTINEL_X {
            return None;
        }
        Some(Self { x, y, z: self.z })
    }
}

/// Addressing space of a thing.
///
/// Things on the map are addressed by their stack position inside a tile.
/// Things inside a container or the inventory are addressed by the receiving
/// side, so their interaction address is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Map(Position),
    /// `container` is the inventory slot for equipped items, or the
    /// container flag/id for items inside an open container.
    Contained { container: u16, index: u8 },
}

impl Location {
    /// Location of an equipped item.
    pub fn inventory(slot: u8) -> Self {
        Location::Contained {
            container: slot as u16,
            index: 0,
        }
    }

    /// Decode a raw wire position, honouring the container sentinel.
    pub fn from_wire(pos: Position) -> Self {
        if pos.x == CONTAINER_SENTINEL_X {
            Location::Contained {
                container: pos.y,
                index: pos.z,
            }
        } else {
            Location::Map(pos)
        }
    }

    /// Raw position as the wire protocol expects it.
    pub fn wire_position(&self) -> Position {
        match *self {
            Location::Map(pos) => pos,
            Location::Contained { container, index } => {
                Position::new(CONTAINER_SENTINEL_X, container, index)
            }
        }
    }

    /// Fold a `Map` location that carries the container sentinel into
    /// `Contained`, so hand-built locations resolve like decoded ones.
    pub fn normalized(self) -> Self {
        Location::from_wire(self.wire_position())
    }

    pub fn map_position(&self) -> Option<Position> {
        match self.normalized() {
            Location::Map(pos) => Some(pos),
            Location::Contained { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
    NorthEast,
    SouthEast,
    SouthWest,
    NorthWest,
}

impl Direction {
    /// (dx, dy) of one step; y grows southwards.
    pub fn offset(self) -> (i16, i16) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, -1),
            Direction::SouthEast => (1, 1),
            Direction::SouthWest => (-1, 1),
            Direction::NorthWest => (-1, -1),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::NorthEast => Direction::SouthWest,
            Direction::SouthEast => Direction::NorthWest,
            Direction::SouthWest => Direction::NorthEast,
            Direction::NorthWest => Direction::SouthEast,
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::NorthEast | Direction::SouthEast | Direction::SouthWest | Direction::NorthWest
        )
    }
}

/// An item instance as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u16,
    #[serde(default = "default_count")]
    pub count: u8,
    pub location: Location,
    /// Instance id assigned by whoever owns the item. Items left at 0 are
    /// told apart by value only, so two identical ones share an address.
    #[serde(default)]
    pub serial: u32,
}

fn default_count() -> u8 {
    1
}

impl Item {
    pub fn new(id: u16, count: u8, location: Location) -> Self {
        Self {
            id,
            count,
            location,
            serial: 0,
        }
    }

    pub fn with_serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }
}

/// A creature known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creature {
    pub id: u32,
    pub name: String,
    pub position: Position,
}

impl Creature {
    pub fn new(id: u32, name: impl Into<String>, position: Position) -> Self {
        Self {
            id,
            name: name.into(),
            position,
        }
    }
}

/// Anything a look/use/rotate action can target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Thing {
    Item(Item),
    Creature(Creature),
}

impl Thing {
    /// Identifier sent alongside the position in look/use/rotate requests.
    pub fn thing_id(&self) -> u32 {
        match self {
            Thing::Item(item) => item.id as u32,
            Thing::Creature(creature) => creature.id,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Thing::Item(item) => item.location,
            Thing::Creature(creature) => Location::from_wire(creature.position),
        }
    }

    /// Identity match: creatures by id, items by value including their serial.
    pub fn is_same(&self, other: &Thing) -> bool {
        match (self, other) {
            (Thing::Creature(a), Thing::Creature(b)) => a.id == b.id,
            (Thing::Item(a), Thing::Item(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Item> for Thing {
    fn from(item: Item) -> Self {
        Thing::Item(item)
    }
}

impl From<Creature> for Thing {
    fn from(creature: Creature) -> Self {
        Thing::Creature(creature)
    }
}

/// Look type plus the four colour layers and addon bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outfit {
    pub look_type: u16,
    #[serde(default)]
    pub head: u8,
    #[serde(default)]
    pub body: u8,
    #[serde(default)]
    pub legs: u8,
    #[serde(default)]
    pub feet: u8,
    #[serde(default)]
    pub addons: u8,
}

/// Talk channel type used by plain `talk`.
pub const SPEAK_SAY: u8 = 1;

/// Channel id used by plain `talk`.
pub const DEFAULT_CHANNEL: u16 = 0;
