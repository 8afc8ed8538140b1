//! Interaction address ("stack position") resolution.

use super::map::WorldMap;
use super::types::{Location, Thing};

/// Wire value for "thing not found".
pub const STACKPOS_NOT_FOUND: i32 = -1;

/// Resolve the interaction address of `thing`.
///
/// Map things are looked up in their tile; contained things always resolve
/// to 0 without touching the map. A `Map` location carrying the container
/// sentinel counts as contained.
pub fn resolve(map: &dyn WorldMap, thing: &Thing) -> Option<u8> {
    match thing.location().normalized() {
        Location::Map(pos) => map.tile(&pos)?.stack_index(thing),
        Location::Contained { .. } => Some(0),
    }
}

/// Same as [`resolve`] but with the wire protocol's `-1` convention.
pub fn thing_stackpos(map: &dyn WorldMap, thing: &Thing) -> i32 {
    resolve(map, thing).map_or(STACKPOS_NOT_FOUND, i32::from)
}
