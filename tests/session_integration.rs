use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mlua::Lua;
use worldlink::config::ClientConfig;
use worldlink::dispatcher::LOOP_TICK_RATE;
use worldlink::game::events::{EventRecorder, RecordedEvent};
use worldlink::game::map::TileMap;
use worldlink::game::player::LocalPlayer;
use worldlink::game::protection::BotProtectionMode;
use worldlink::game::scripting::{self, LuaObserver};
use worldlink::game::types::{Item, Location, Position, Thing};
use worldlink::network::loopback::{Journal, LinkCall, LoopbackFactory};
use worldlink::network::{ClientRequest, LinkError};
use worldlink::{Game, SessionState};

struct Session {
    game: Game,
    journal: Journal,
    events: EventRecorder,
    map: Rc<RefCell<TileMap>>,
}

fn start_session(config: &ClientConfig) -> Session {
    let journal = Journal::new();
    let events = EventRecorder::new();
    let map = Rc::new(RefCell::new(TileMap::new()));
    let mut game = Game::new(config, LoopbackFactory::new(journal.clone()), map.clone());
    game.subscribe(Box::new(events.clone()));
    Session {
        game,
        journal,
        events,
        map,
    }
}

fn paladin() -> LocalPlayer {
    LocalPlayer::new(0x1000_0042, "Paladin", Position::new(200, 300, 7))
}

fn log_in(game: &mut Game) {
    game.login_world("acc", "secret", "127.0.0.1", 7172, "Paladin");
    game.process_login(paladin());
}

#[test]
fn test_full_session_lifecycle() {
    let mut s = start_session(&ClientConfig::default());

    log_in(&mut s.game);
    assert_eq!(s.game.state(), SessionState::Online);

    assert!(s.game.talk("hi"));
    s.game.process_death();
    assert_eq!(s.game.state(), SessionState::Dead);

    s.game.advance(5000);
    assert_eq!(s.game.state(), SessionState::Idle);
    assert!(!s.game.has_protocol_link());

    let calls: Vec<LinkCall> = s.journal.entries().into_iter().map(|e| e.call).collect();
    assert!(matches!(calls[0], LinkCall::Login(_)));
    assert!(matches!(calls[1], LinkCall::Send(ClientRequest::Talk { .. })));
    assert_eq!(calls[2], LinkCall::Send(ClientRequest::Logout));
    assert_eq!(calls[3], LinkCall::Disconnect);
    assert_eq!(calls.len(), 4);

    assert_eq!(
        s.events.events(),
        vec![
            RecordedEvent::Login {
                player_id: 0x1000_0042,
                name: "Paladin".into()
            },
            RecordedEvent::Death,
            RecordedEvent::Logout {
                player_id: 0x1000_0042,
                name: "Paladin".into()
            },
        ]
    );
}

#[test]
fn test_reconnect_after_connection_error() {
    let mut s = start_session(&ClientConfig::default());
    log_in(&mut s.game);

    s.game
        .process_connection_error(&LinkError::Protocol("bad opcode".into()));
    assert_eq!(s.game.state(), SessionState::Idle);

    log_in(&mut s.game);
    assert_eq!(s.game.state(), SessionState::Online);

    let connections: Vec<u32> = s
        .journal
        .entries()
        .iter()
        .filter(|e| matches!(e.call, LinkCall::Login(_)))
        .map(|e| e.connection)
        .collect();
    assert_eq!(connections.len(), 2);
    assert_ne!(connections[0], connections[1]);
    assert_eq!(s.journal.disconnects(), 1);
}

#[test]
fn test_map_and_container_targets() {
    let mut s = start_session(&ClientConfig::default());
    log_in(&mut s.game);

    let ground = Thing::from(Item::new(100, 1, Location::Map(Position::new(201, 300, 7))));
    let torch = Thing::from(Item::new(2050, 1, Location::Map(Position::new(201, 300, 7))));
    {
        let mut map = s.map.borrow_mut();
        map.add_thing(Position::new(201, 300, 7), ground);
        map.add_thing(Position::new(201, 300, 7), torch.clone());
    }
    let backpack = Thing::from(Item::new(
        2160,
        50,
        Location::from_wire(Position::new(65535, 64, 3)),
    ));
    let lost = Thing::from(Item::new(3031, 1, Location::Map(Position::new(1, 1, 7))));

    assert_eq!(s.game.thing_stackpos(&torch), 1);
    assert_eq!(s.game.thing_stackpos(&backpack), 0);
    assert_eq!(s.game.thing_stackpos(&lost), -1);

    assert!(s.game.look(Some(&torch)));
    assert!(s.game.use_thing(Some(&backpack)));
    assert!(!s.game.rotate(Some(&lost)));

    assert_eq!(
        s.journal.requests(),
        vec![
            ClientRequest::LookAt {
                position: Position::new(201, 300, 7),
                thing_id: 2050,
                stackpos: 1,
            },
            ClientRequest::UseItem {
                position: Position::new(65535, 64, 3),
                thing_id: 2160,
                stackpos: 0,
                index: 0,
            },
        ]
    );
}

#[test]
fn test_scripts_are_bot_protected() {
    let s = start_session(&ClientConfig::default());
    let journal = s.journal.clone();
    let game = Rc::new(RefCell::new(s.game));
    log_in(&mut game.borrow_mut());

    let lua = Lua::new();
    scripting::register_game_api(&lua, Rc::clone(&game)).unwrap();

    assert!(scripting::exec(&lua, "walked = g_game.walk('north')"));
    assert!(!lua.globals().get::<bool>("walked").unwrap());
    assert_eq!(game.borrow().bot_protection().violations(), 1);

    // A script running under a key press may act.
    let ctx = game.borrow().call_context();
    {
        let _input = ctx.enter_input();
        assert!(scripting::exec(&lua, "walked = g_game.walk('north')"));
    }
    assert!(lua.globals().get::<bool>("walked").unwrap());
    assert_eq!(
        journal.requests(),
        vec![ClientRequest::Walk(worldlink::game::types::Direction::North)]
    );
}

#[test]
fn test_scripts_unrestricted_when_protection_disabled() {
    let config = ClientConfig {
        bot_protection: BotProtectionMode::Disabled,
        ..ClientConfig::default()
    };
    let s = start_session(&config);
    let game = Rc::new(RefCell::new(s.game));
    log_in(&mut game.borrow_mut());

    let lua = Lua::new();
    scripting::register_game_api(&lua, Rc::clone(&game)).unwrap();

    assert!(scripting::exec(&lua, "said = g_game.talk('hello')"));
    assert!(lua.globals().get::<bool>("said").unwrap());
    assert_eq!(game.borrow().bot_protection().violations(), 0);
}

#[test]
fn test_lua_handlers_see_lifecycle() {
    let lua = Rc::new(Lua::new());
    scripting::exec(
        &lua,
        r#"
        Game = {}
        seen = {}
        function Game.onLogin(player) table.insert(seen, "login:" .. player.name) end
        function Game.onDeath() table.insert(seen, "death") end
        function Game.onLogout(player) table.insert(seen, "logout:" .. player.id) end
        "#,
    );

    let mut s = start_session(&ClientConfig::default());
    s.game.subscribe(Box::new(LuaObserver::new(Rc::clone(&lua))));
    log_in(&mut s.game);
    s.game.process_death();
    s.game.advance(5000);

    let seen: Vec<String> = lua
        .globals()
        .get::<mlua::Table>("seen")
        .unwrap()
        .sequence_values::<String>()
        .collect::<mlua::Result<_>>()
        .unwrap();
    assert_eq!(
        seen,
        vec![
            "login:Paladin".to_string(),
            "death".to_string(),
            format!("logout:{}", 0x1000_0042u32),
        ]
    );
}

#[tokio::test]
async fn test_forced_logout_on_event_loop() {
    let config = ClientConfig {
        forced_logout_delay_ms: 50,
        ..ClientConfig::default()
    };
    let mut s = start_session(&config);
    log_in(&mut s.game);
    s.game.process_death();

    let step = LOOP_TICK_RATE.as_millis() as u64;
    let mut interval = tokio::time::interval(LOOP_TICK_RATE);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while s.game.forced_logout_pending() && tokio::time::Instant::now() < deadline {
        interval.tick().await;
        s.game.advance(step);
    }

    assert_eq!(s.game.state(), SessionState::Idle);
    assert_eq!(s.journal.disconnects(), 1);
}
