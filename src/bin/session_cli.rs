use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use mlua::Lua;
use serde::Deserialize;

use worldlink::config::ClientConfig;
use worldlink::dispatcher::LOOP_TICK_RATE;
use worldlink::game::events::{GameEvent, GameObserver};
use worldlink::game::map::TileMap;
use worldlink::game::player::LocalPlayer;
use worldlink::game::scripting::{self, LuaObserver};
use worldlink::game::types::{Creature, Direction, Item, Location, Outfit, Position, Thing};
use worldlink::network::loopback::{Journal, LinkCall, LoopbackFactory};
use worldlink::network::LinkError;
use worldlink::Game;

/// A thing addressed the way the wire does it (x = 65535 for containers).
#[derive(Debug, Deserialize)]
struct ThingSpec {
    id: u16,
    #[serde(default = "one")]
    count: u8,
    x: u16,
    y: u16,
    z: u8,
    #[serde(default)]
    serial: u32,
}

fn one() -> u8 {
    1
}

impl ThingSpec {
    fn item(&self) -> Item {
        let location = Location::from_wire(Position::new(self.x, self.y, self.z));
        Item::new(self.id, self.count, location).with_serial(self.serial)
    }
}

#[derive(Debug, Deserialize)]
struct CreatureSpec {
    id: u32,
    name: String,
    x: u16,
    y: u16,
    z: u8,
}

impl CreatureSpec {
    fn creature(&self) -> Creature {
        Creature::new(self.id, self.name.clone(), Position::new(self.x, self.y, self.z))
    }
}

/// One line of a replay script.
///
/// Server-side steps feed the `process_*` callbacks; player steps run inside
/// an input scope; `lua` steps run as plain script code.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Login,
    CancelLogin,
    LoginOk { player: LocalPlayer },
    LoginError { message: String },
    ConnectionError { message: String },
    Death,
    TextMessage { kind: u8, text: String },
    Inventory { slot: u8, item: Option<ThingSpec> },
    Place { thing: ThingSpec },
    ServerBeat { beat: u32 },
    Wait { ms: u64 },
    Walk { direction: Direction },
    WalkConfirmed,
    WalkCancel { direction: Direction },
    Turn { direction: Direction },
    Look { thing: ThingSpec },
    Use { thing: ThingSpec },
    Rotate { thing: ThingSpec },
    Attack { creature: CreatureSpec },
    CancelAttack,
    Follow { creature: CreatureSpec },
    CancelFollow,
    Talk { message: String },
    TalkPrivate { receiver: String, message: String },
    InviteToParty { creature_id: u32 },
    OpenOutfitWindow,
    SetOutfit { outfit: Outfit },
    AddVip { name: String },
    RemoveVip { player_id: u32 },
    Logout { #[serde(default)] force: bool },
    Lua { code: String },
}

#[derive(Debug, Deserialize)]
struct Script {
    steps: Vec<Step>,
}

/// Echoes every notification to the log.
struct LogObserver;

impl GameObserver for LogObserver {
    fn on_event(&mut self, event: &GameEvent<'_>) {
        match event {
            GameEvent::Login { player } | GameEvent::Logout { player } => {
                tracing::info!("[event] {} {}", event.handler_name(), player.name)
            }
            GameEvent::LoginError { message } | GameEvent::ConnectionError { message } => {
                tracing::info!("[event] {} {}", event.handler_name(), message)
            }
            GameEvent::TextMessage { kind, text } => {
                tracing::info!("[event] onTextMessage {} {}", kind, text)
            }
            _ => tracing::info!("[event] {}", event.handler_name()),
        }
    }
}

fn connection_error(message: &str) -> LinkError {
    match message {
        "eof" => LinkError::Eof,
        "timeout" => LinkError::TimedOut,
        other => LinkError::Protocol(other.to_string()),
    }
}

struct Replay {
    config: ClientConfig,
    game: Rc<RefCell<Game>>,
    map: Rc<RefCell<TileMap>>,
    lua: Rc<Lua>,
    fast: bool,
}

impl Replay {
    async fn wait(&self, ms: u64) {
        let step = LOOP_TICK_RATE.as_millis() as u64;
        let mut interval = tokio::time::interval(LOOP_TICK_RATE);
        let mut elapsed = 0;
        while elapsed < ms {
            if !self.fast {
                interval.tick().await;
            }
            let delta = step.min(ms - elapsed);
            self.game.borrow_mut().advance(delta);
            elapsed += delta;
        }
    }

    fn login(&self) -> Result<()> {
        let c = &self.config;
        let account = c.account.as_deref().context("config has no account")?;
        let password = c.password.as_deref().unwrap_or_default();
        let character = c.character.as_deref().context("config has no character")?;
        self.game
            .borrow_mut()
            .login_world(account, password, &c.world_host, c.world_port, character);
        Ok(())
    }

    /// Player steps run as if a real key press or click triggered them.
    fn input(&self, f: impl FnOnce(&mut Game)) {
        let ctx = self.game.borrow().call_context();
        let _input = ctx.enter_input();
        f(&mut *self.game.borrow_mut());
    }

    async fn run(&self, step: Step) -> Result<()> {
        tracing::debug!("[replay] {:?}", step);
        match step {
            Step::Login => self.login()?,
            Step::CancelLogin => self.game.borrow_mut().cancel_login(),
            Step::LoginOk { player } => self.game.borrow_mut().process_login(player),
            Step::LoginError { message } => self.game.borrow_mut().process_login_error(&message),
            Step::ConnectionError { message } => self
                .game
                .borrow_mut()
                .process_connection_error(&connection_error(&message)),
            Step::Death => self.game.borrow_mut().process_death(),
            Step::TextMessage { kind, text } => {
                self.game.borrow_mut().process_text_message(kind, &text)
            }
            Step::Inventory { slot, item } => self
                .game
                .borrow_mut()
                .process_inventory_change(slot, item.map(|t| t.item())),
            Step::Place { thing } => {
                let item = thing.item();
                match item.location.map_position() {
                    Some(pos) => self.map.borrow_mut().add_thing(pos, Thing::from(item)),
                    None => tracing::warn!("[replay] cannot place a contained thing on the map"),
                }
            }
            Step::ServerBeat { beat } => self.game.borrow_mut().set_server_beat(beat),
            Step::Wait { ms } => self.wait(ms).await,
            Step::Walk { direction } => self.input(|g| {
                g.walk(direction);
            }),
            Step::WalkConfirmed => self.game.borrow_mut().process_walk_confirmed(),
            Step::WalkCancel { direction } => {
                self.game.borrow_mut().process_walk_cancel(direction)
            }
            Step::Turn { direction } => self.input(|g| {
                g.turn(direction);
            }),
            Step::Look { thing } => self.input(|g| {
                g.look(Some(&Thing::from(thing.item())));
            }),
            Step::Use { thing } => self.input(|g| {
                g.use_thing(Some(&Thing::from(thing.item())));
            }),
            Step::Rotate { thing } => self.input(|g| {
                g.rotate(Some(&Thing::from(thing.item())));
            }),
            Step::Attack { creature } => self.input(|g| {
                g.attack(Some(&creature.creature()));
            }),
            Step::CancelAttack => self.input(|g| {
                g.cancel_attack();
            }),
            Step::Follow { creature } => self.input(|g| {
                g.follow(Some(&creature.creature()));
            }),
            Step::CancelFollow => self.input(|g| {
                g.cancel_follow();
            }),
            Step::Talk { message } => self.input(|g| {
                g.talk(&message);
            }),
            Step::TalkPrivate { receiver, message } => self.input(|g| {
                g.talk_private(worldlink::game::types::SPEAK_SAY, &receiver, &message);
            }),
            Step::InviteToParty { creature_id } => self.input(|g| {
                g.invite_to_party(creature_id);
            }),
            Step::OpenOutfitWindow => self.input(|g| {
                g.open_outfit_window();
            }),
            Step::SetOutfit { outfit } => self.input(|g| {
                g.set_outfit(&outfit);
            }),
            Step::AddVip { name } => self.input(|g| {
                g.add_vip(&name);
            }),
            Step::RemoveVip { player_id } => self.input(|g| {
                g.remove_vip(player_id);
            }),
            Step::Logout { force } => self.input(|g| g.logout(force)),
            Step::Lua { code } => {
                scripting::exec(&self.lua, &code);
            }
        }
        Ok(())
    }
}

fn print_journal(journal: &Journal) {
    for entry in journal.entries() {
        match entry.call {
            LinkCall::Login(req) => println!(
                "#{} login {}@{}:{}",
                entry.connection, req.character, req.host, req.port
            ),
            LinkCall::Send(req) => println!("#{} {:?}", entry.connection, req),
            LinkCall::Disconnect => println!("#{} disconnect", entry.connection),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file: Option<String> = None;
    let mut script_file: Option<String> = None;
    let mut fast = false;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: session_cli [--conf FILE] [--fast] --script FILE");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = Some(args[i].clone());
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            "--script" => {
                if i + 1 < args.len() {
                    i += 1;
                    script_file = Some(args[i].clone());
                } else {
                    eprintln!("Error: --script requires a FILE argument");
                    return Ok(());
                }
            }
            "--fast" => fast = true,
            _ => {}
        }
        i += 1;
    }

    let config = match &conf_file {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Cannot load config: {}", path))?,
        None => ClientConfig::default(),
    };

    let script_file = script_file.context("--script FILE is required")?;
    let script: Script = {
        let content = std::fs::read_to_string(&script_file)
            .with_context(|| format!("Cannot read script: {}", script_file))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Cannot parse script: {}", script_file))?
    };

    let journal = Journal::new();
    let map = Rc::new(RefCell::new(TileMap::new()));
    let mut game = Game::new(&config, LoopbackFactory::new(journal.clone()), map.clone());

    let lua = Rc::new(Lua::new());
    // mlua::Error is not Send + Sync here; convert before adding context.
    let loaded = scripting::load_scripts(&lua, Path::new(&config.lua_dir))
        .map_err(|e| anyhow::anyhow!("Cannot load scripts from {}: {e}", config.lua_dir))?;
    tracing::info!("[replay] loaded {} script(s) from {}", loaded, config.lua_dir);

    game.subscribe(Box::new(LogObserver));
    game.subscribe(Box::new(LuaObserver::new(Rc::clone(&lua))));

    let game = Rc::new(RefCell::new(game));
    scripting::register_game_api(&lua, Rc::clone(&game))
        .map_err(|e| anyhow::anyhow!("Cannot register scripting API: {e}"))?;

    let replay = Replay {
        config,
        game,
        map,
        lua,
        fast,
    };

    tracing::info!("[replay] [started] {} step(s)", script.steps.len());
    for step in script.steps {
        replay.run(step).await?;
    }

    print_journal(&journal);
    Ok(())
}
