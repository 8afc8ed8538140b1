//! Map collaborator seam.
//!
//! The session core only needs two questions answered: "is there a tile at
//! this position" and "where in that tile's stack is this thing".

use std::collections::HashMap;

use super::types::{Position, Thing};

pub trait Tile {
    /// Index of `thing` within this tile's stack, `None` when absent.
    fn stack_index(&self, thing: &Thing) -> Option<u8>;
}

pub trait WorldMap {
    fn tile(&self, pos: &Position) -> Option<&dyn Tile>;
}

/// Ordered contents of one tile, ground first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileStack {
    things: Vec<Thing>,
}

impl TileStack {
    pub fn push(&mut self, thing: Thing) {
        self.things.push(thing);
    }

    pub fn remove(&mut self, thing: &Thing) -> bool {
        match self.things.iter().position(|t| t.is_same(thing)) {
            Some(i) => {
                self.things.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.things.len()
    }

    pub fn is_empty(&self) -> bool {
        self.things.is_empty()
    }
}

impl Tile for TileStack {
    fn stack_index(&self, thing: &Thing) -> Option<u8> {
        self.things
            .iter()
            .position(|t| t.is_same(thing))
            .and_then(|i| u8::try_from(i).ok())
    }
}

/// Sparse map keyed by position.
#[derive(Debug, Clone, Default)]
pub struct TileMap {
    tiles: HashMap<Position, TileStack>,
}

impl TileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `thing` to the stack at `pos`, creating the tile if needed.
    pub fn add_thing(&mut self, pos: Position, thing: Thing) {
        self.tiles.entry(pos).or_default().push(thing);
    }

    pub fn remove_thing(&mut self, pos: &Position, thing: &Thing) -> bool {
        self.tiles
            .get_mut(pos)
            .map(|tile| tile.remove(thing))
            .unwrap_or(false)
    }

    pub fn clean_tile(&mut self, pos: &Position) {
        self.tiles.remove(pos);
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

impl WorldMap for TileMap {
    fn tile(&self, pos: &Position) -> Option<&dyn Tile> {
        self.tiles.get(pos).map(|t| t as &dyn Tile)
    }
}
