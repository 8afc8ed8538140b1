//! Lua bridge for the session.
//!
//! Two directions:
//! - [`LuaObserver`] forwards lifecycle events to `Game.<handler>` functions
//!   defined by scripts (`Game.onLogin`, `Game.onDeath`, ...).
//! - [`register_game_api`] exposes gated session actions to scripts as the
//!   global `g_game` table. Every call made through it runs inside a script
//!   scope, so bot protection applies.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::{FromLua, IntoLuaMulti, Lua, MultiValue, Table, Value};

use super::events::{GameEvent, GameObserver};
use super::player::LocalPlayer;
use super::protection::CallContext;
use super::types::{Creature, Direction, Item, Location, Outfit, Position, Thing};
use super::Game;

/// Global table scripts define their handlers on.
pub const HANDLER_ROOT: &str = "Game";

/// Global table the session API is registered under.
pub const API_ROOT: &str = "g_game";

fn player_table(lua: &Lua, player: &LocalPlayer) -> mlua::Result<Table> {
    let t = lua.create_table()?;
    t.set("id", player.id)?;
    t.set("name", player.name.as_str())?;
    t.set("x", player.position.x)?;
    t.set("y", player.position.y)?;
    t.set("z", player.position.z)?;
    Ok(t)
}

fn item_value(lua: &Lua, item: Option<&Item>) -> mlua::Result<Value> {
    let Some(item) = item else {
        return Ok(Value::Nil);
    };
    let t = lua.create_table()?;
    t.set("id", item.id)?;
    t.set("count", item.count)?;
    let pos = item.location.wire_position();
    t.set("x", pos.x)?;
    t.set("y", pos.y)?;
    t.set("z", pos.z)?;
    if item.serial != 0 {
        t.set("serial", item.serial)?;
    }
    if let Location::Contained { container, .. } = item.location {
        t.set("slot", container)?;
    }
    Ok(Value::Table(t))
}

fn event_args(lua: &Lua, event: &GameEvent<'_>) -> mlua::Result<MultiValue> {
    match *event {
        GameEvent::LoginError { message } | GameEvent::ConnectionError { message } => {
            message.into_lua_multi(lua)
        }
        GameEvent::Login { player } | GameEvent::Logout { player } => {
            player_table(lua, player)?.into_lua_multi(lua)
        }
        GameEvent::Death => Ok(MultiValue::new()),
        GameEvent::TextMessage { kind, text } => (kind, text).into_lua_multi(lua),
        GameEvent::InventoryChange { slot, item } => (slot, item_value(lua, item)?).into_lua_multi(lua),
    }
}

/// Calls `Game.<handler>(...)` for every event. Missing handlers are skipped;
/// handler errors are logged and swallowed.
pub struct LuaObserver {
    lua: Rc<Lua>,
}

impl LuaObserver {
    pub fn new(lua: Rc<Lua>) -> Self {
        Self { lua }
    }

    fn call_handler(&self, event: &GameEvent<'_>) -> mlua::Result<bool> {
        let Some(root) = self.lua.globals().get::<Option<Table>>(HANDLER_ROOT)? else {
            return Ok(false);
        };
        let Some(func) = root.get::<Option<mlua::Function>>(event.handler_name())? else {
            return Ok(false);
        };
        func.call::<()>(event_args(&self.lua, event)?)?;
        Ok(true)
    }
}

impl GameObserver for LuaObserver {
    fn on_event(&mut self, event: &GameEvent<'_>) {
        if let Err(e) = self.call_handler(event) {
            tracing::warn!("[scripting] {}.{}: {e}", HANDLER_ROOT, event.handler_name());
        }
    }
}

/// Parse a direction name as scripts spell it ("north", "southwest", ...).
pub fn parse_direction(name: &str) -> Option<Direction> {
    let dir = match name.to_ascii_lowercase().as_str() {
        "north" | "n" => Direction::North,
        "east" | "e" => Direction::East,
        "south" | "s" => Direction::South,
        "west" | "w" => Direction::West,
        "northeast" | "ne" => Direction::NorthEast,
        "southeast" | "se" => Direction::SouthEast,
        "southwest" | "sw" => Direction::SouthWest,
        "northwest" | "nw" => Direction::NorthWest,
        _ => return None,
    };
    Some(dir)
}

/// Run `f` against the session from script code.
///
/// Reentrant calls (a script handler calling back while the session is busy
/// notifying it) are dropped like any other failed precondition.
fn with_game<R: Default>(
    game: &Rc<RefCell<Game>>,
    context: &CallContext,
    name: &str,
    f: impl FnOnce(&mut Game) -> R,
) -> R {
    let _scope = context.enter_script();
    match game.try_borrow_mut() {
        Ok(mut game) => f(&mut *game),
        Err(_) => {
            tracing::warn!("[scripting] {API_ROOT}.{name}: reentrant call dropped");
            R::default()
        }
    }
}

macro_rules! api {
    ($lua:expr, $tbl:expr, $game:expr, $ctx:expr, $name:literal, |$g:ident, $args:tt : $ty:ty| $body:expr) => {{
        let game = Rc::clone(&$game);
        let ctx = $ctx.clone();
        $tbl.set(
            $name,
            $lua.create_function(move |_, $args: $ty| {
                Ok(with_game(&game, &ctx, $name, |$g| $body))
            })?,
        )?;
    }};
}

/// Read-only queries go through the shared status, so they answer correctly
/// even from a handler running inside an emit.
macro_rules! query {
    ($lua:expr, $tbl:expr, $status:expr, $name:literal, |$s:ident| $body:expr) => {{
        let status = Rc::clone(&$status);
        $tbl.set(
            $name,
            $lua.create_function(move |_, ()| {
                let $s = status.get();
                Ok($body)
            })?,
        )?;
    }};
}

fn table_arg(value: Value, to: &str) -> mlua::Result<Table> {
    match value {
        Value::Table(t) => Ok(t),
        other => Err(mlua::Error::FromLuaConversionError {
            from: other.type_name(),
            to: to.to_string(),
            message: Some("expected a table".to_string()),
        }),
    }
}

fn field_or_default<V: FromLua + Default>(t: &Table, key: &str) -> mlua::Result<V> {
    Ok(t.get::<Option<V>>(key)?.unwrap_or_default())
}

fn position_arg(t: &Table) -> mlua::Result<Position> {
    Ok(Position::new(t.get("x")?, t.get("y")?, t.get("z")?))
}

/// `{ id = 0x40000001, name = "Rat", x = .., y = .., z = .. }`; only `id` is
/// required.
struct LuaCreature(Creature);

impl FromLua for LuaCreature {
    fn from_lua(value: Value, _: &Lua) -> mlua::Result<Self> {
        let t = table_arg(value, "Creature")?;
        let position = Position::new(
            field_or_default(&t, "x")?,
            field_or_default(&t, "y")?,
            field_or_default(&t, "z")?,
        );
        let name: String = field_or_default(&t, "name")?;
        Ok(LuaCreature(Creature::new(t.get("id")?, name, position)))
    }
}

/// An item addressed the way the wire does it (`x = 65535` for containers),
/// or a creature when `kind = "creature"`.
struct LuaThing(Thing);

impl FromLua for LuaThing {
    fn from_lua(value: Value, lua: &Lua) -> mlua::Result<Self> {
        let t = table_arg(value, "Thing")?;
        if t.get::<Option<String>>("kind")?.as_deref() == Some("creature") {
            let LuaCreature(creature) = LuaCreature::from_lua(Value::Table(t), lua)?;
            return Ok(LuaThing(Thing::from(creature)));
        }
        let location = Location::from_wire(position_arg(&t)?);
        let count = t.get::<Option<u8>>("count")?.unwrap_or(1);
        let serial = field_or_default(&t, "serial")?;
        let item = Item::new(t.get("id")?, count, location).with_serial(serial);
        Ok(LuaThing(Thing::from(item)))
    }
}

struct LuaOutfit(Outfit);

impl FromLua for LuaOutfit {
    fn from_lua(value: Value, _: &Lua) -> mlua::Result<Self> {
        let t = table_arg(value, "Outfit")?;
        Ok(LuaOutfit(Outfit {
            look_type: t.get("lookType")?,
            head: field_or_default(&t, "head")?,
            body: field_or_default(&t, "body")?,
            legs: field_or_default(&t, "legs")?,
            feet: field_or_default(&t, "feet")?,
            addons: field_or_default(&t, "addons")?,
        }))
    }
}

/// Register the `g_game` table on `lua`.
pub fn register_game_api(lua: &Lua, game: Rc<RefCell<Game>>) -> mlua::Result<()> {
    let (ctx, status) = {
        let g = game.borrow();
        (g.call_context(), g.status_handle())
    };
    let t = lua.create_table()?;

    query!(lua, t, status, "isOnline", |s| s.online);
    query!(lua, t, status, "isDead", |s| s.dead);
    query!(lua, t, status, "getServerBeat", |s| s.server_beat);

    // lifecycle
    api!(lua, t, game, ctx, "loginWorld", |g, (account, password, host, port, character): (String, String, String, u16, String)| {
        g.login_world(&account, &password, &host, port, &character)
    });
    api!(lua, t, game, ctx, "cancelLogin", |g, _: ()| g.cancel_login());
    api!(lua, t, game, ctx, "forceLogout", |g, _: ()| g.force_logout());
    api!(lua, t, game, ctx, "logout", |g, force: Option<bool>| {
        g.logout(force.unwrap_or(false))
    });

    // movement
    api!(lua, t, game, ctx, "walk", |g, dir: String| {
        parse_direction(&dir).is_some_and(|d| g.walk(d))
    });
    api!(lua, t, game, ctx, "turn", |g, dir: String| {
        parse_direction(&dir).is_some_and(|d| g.turn(d))
    });

    // targeted actions
    api!(lua, t, game, ctx, "look", |g, thing: Option<LuaThing>| {
        g.look(thing.map(|t| t.0).as_ref())
    });
    api!(lua, t, game, ctx, "use", |g, thing: Option<LuaThing>| {
        g.use_thing(thing.map(|t| t.0).as_ref())
    });
    api!(lua, t, game, ctx, "rotate", |g, thing: Option<LuaThing>| {
        g.rotate(thing.map(|t| t.0).as_ref())
    });
    api!(lua, t, game, ctx, "attack", |g, creature: Option<LuaCreature>| {
        g.attack(creature.map(|c| c.0).as_ref())
    });
    api!(lua, t, game, ctx, "follow", |g, creature: Option<LuaCreature>| {
        g.follow(creature.map(|c| c.0).as_ref())
    });
    api!(lua, t, game, ctx, "cancelAttack", |g, _: ()| g.cancel_attack());
    api!(lua, t, game, ctx, "cancelFollow", |g, _: ()| g.cancel_follow());

    // chat and social
    api!(lua, t, game, ctx, "talk", |g, msg: String| g.talk(&msg));
    api!(lua, t, game, ctx, "talkChannel", |g, (kind, channel, msg): (u8, u16, String)| {
        g.talk_channel(kind, channel, &msg)
    });
    api!(lua, t, game, ctx, "talkPrivate", |g, (kind, receiver, msg): (u8, String, String)| {
        g.talk_private(kind, &receiver, &msg)
    });
    api!(lua, t, game, ctx, "inviteToParty", |g, id: u32| g.invite_to_party(id));
    api!(lua, t, game, ctx, "openOutfitWindow", |g, _: ()| g.open_outfit_window());
    api!(lua, t, game, ctx, "setOutfit", |g, outfit: LuaOutfit| g.set_outfit(&outfit.0));
    api!(lua, t, game, ctx, "addVip", |g, name: String| g.add_vip(&name));
    api!(lua, t, game, ctx, "removeVip", |g, id: u32| g.remove_vip(id));

    lua.globals().set(API_ROOT, t)?;
    Ok(())
}

/// Execute a chunk of script code, logging failures.
pub fn exec(lua: &Lua, code: &str) -> bool {
    match lua.load(code).exec() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("[scripting] exec error: {e}");
            false
        }
    }
}

fn load_lua_file(lua: &Lua, path: &Path) -> mlua::Result<()> {
    let src = std::fs::read(path).map_err(mlua::Error::external)?;
    let name = path.to_string_lossy();
    lua.load(src.as_slice()).set_name(name.as_ref()).exec()
}

/// Load every `.lua` file under `dir`, `init.lua` first.
///
/// A missing directory is not an error; a broken file is logged and skipped.
pub fn load_scripts(lua: &Lua, dir: &Path) -> mlua::Result<usize> {
    let mut loaded = 0;
    let init = dir.join("init.lua");
    if init.exists() {
        load_lua_file(lua, &init)?;
        loaded += 1;
    }
    load_dir_recursive(lua, dir, &mut loaded)?;
    Ok(loaded)
}

fn load_dir_recursive(lua: &Lua, dir: &Path, loaded: &mut usize) -> mlua::Result<()> {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    let mut paths: Vec<_> = rd.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with('.') || name == "init.lua" {
            continue;
        }
        if path.is_dir() {
            load_dir_recursive(lua, &path, loaded)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("lua") {
            match load_lua_file(lua, &path) {
                Ok(()) => *loaded += 1,
                Err(e) => tracing::warn!("[scripting] error loading {}: {e}", path.display()),
            }
        }
    }
    Ok(())
}
