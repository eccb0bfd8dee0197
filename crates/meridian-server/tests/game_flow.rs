//! End-to-end scenarios driven through `Game`: sessions, chunk loading,
//! commands, activities, combat, visibility and persistence.

use glam::DVec2;
use meridian_server::boundary::persistence::{AccountRecord, CharacterRecord, ItemRecord, Record};
use meridian_server::inventory;
use meridian_server::prelude::*;
use meridian_server::spatial::grid_at;

const HERO_PEER: u64 = 1;

struct Harness {
    game: Game,
    store: MemoryStore,
    net: RecordingNetwork,
}

fn config() -> ServerConfig {
    ServerConfig {
        tick_rate: 10,
        ..ServerConfig::default()
    }
}

fn harness_with(config: ServerConfig) -> Harness {
    let store = MemoryStore::new();
    let net = RecordingNetwork::new();
    let game = Game::new(config, Box::new(store.clone()), Box::new(net.clone())).unwrap();
    Harness { game, store, net }
}

fn harness() -> Harness {
    harness_with(config())
}

fn spawn_point(game: &Game) -> DVec2 {
    let [lat, lon] = game.state().config.spawn_point;
    DVec2::new(lat, lon)
}

fn place(game: &mut Game, kind: &str, pos: DVec2) -> EntityId {
    let state = game.state_mut();
    state
        .prototypes
        .instantiate_at(&mut state.world, kind, pos)
        .unwrap()
}

fn held(game: &Game, owner: EntityId, kind: &str) -> u32 {
    inventory::count(&game.state().world, owner, kind).unwrap()
}

fn give(game: &mut Game, owner: EntityId, kind: &str, amount: u32) {
    let link = game.state().link(owner);
    game.state_mut().queues.inventory.enqueue(InventoryCommand {
        owner: link,
        op: InventoryOp::Add {
            kind: kind.into(),
            amount,
        },
    });
}

// -- sessions and chunks ----------------------------------------------------

#[test]
fn login_loads_the_surrounding_chunks() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();

    h.game.tick().unwrap();
    assert_eq!(h.game.state().queues.chunk.len(), 9);
    assert_eq!(h.game.state().chunks.len(), 0);

    h.game.tick().unwrap();
    let state = h.game.state();
    assert_eq!(state.chunks.len(), 9);
    for grid in state.chunks.grids().collect::<Vec<_>>() {
        let chunk = state.chunks.live(&state.world, grid).unwrap();
        assert!(state.world.get::<Chunk>(chunk).unwrap().loaded_by.contains(&hero));
    }

    let zoom = state.config.chunk_zoom;
    let home = grid_at(spawn_point(&h.game), zoom);
    assert_eq!(state.world.get::<Transform>(hero).unwrap().chunk, Some(home));
    let home_chunk = state.chunks.live(&state.world, home).unwrap();
    assert!(state
        .world
        .get::<Chunk>(home_chunk)
        .unwrap()
        .contains
        .contains(&hero));
}

#[test]
fn failed_chunk_lookups_are_retried() {
    let mut h = harness();
    h.store.fail_lookups(true);
    h.game.login("ada", HERO_PEER).unwrap();
    h.game.run_ticks(3).unwrap();
    assert_eq!(h.game.state().chunks.len(), 0);

    h.store.fail_lookups(false);
    h.game.run_ticks(2).unwrap();
    assert_eq!(h.game.state().chunks.len(), 9);
}

#[test]
fn logout_parks_the_character_and_login_reactivates_it() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    h.game.run_ticks(12).unwrap();
    assert!(h.game.state().tree.contains(hero));

    assert_eq!(h.game.logout(HERO_PEER).unwrap(), Some(hero));
    h.game.run_ticks(1).unwrap();
    let state = h.game.state();
    assert!(state.world.has::<Inactive>(hero));
    assert!(!state.world.has::<LoggedIn>(hero));
    assert!(!state.tree.contains(hero));

    let again = h.game.login("ada", 9).unwrap();
    assert_eq!(again, hero);
    let state = h.game.state();
    assert!(!state.world.has::<Inactive>(hero));
    assert_eq!(state.world.get::<Character>(hero).unwrap().peer, 9);
}

fn decaying() -> Harness {
    harness_with(ServerConfig {
        tick_rate: 10,
        chunk_decay_seconds: 1.0,
        ..ServerConfig::default()
    })
}

fn chunks_of(game: &Game) -> Vec<(EntityId, Chunk)> {
    let state = game.state();
    state
        .chunks
        .grids()
        .filter_map(|grid| state.chunks.live(&state.world, grid))
        .map(|e| (e, state.world.get::<Chunk>(e).unwrap().clone()))
        .collect()
}

#[test]
fn unloaded_chunks_count_down_and_decay() {
    let mut h = decaying();
    h.game.login("ada", HERO_PEER).unwrap();
    h.game.run_ticks(5).unwrap();
    assert_eq!(h.game.state().chunks.len(), 9);

    h.game.logout(HERO_PEER).unwrap();
    h.game.run_ticks(3).unwrap();
    let chunks = chunks_of(&h.game);
    assert_eq!(chunks.len(), 9);
    for (_, chunk) in &chunks {
        assert!(chunk.loaded_by.is_empty());
        let left = chunk.decay.unwrap();
        assert!(left > 0.0 && left < 1.0, "decay {left}");
    }

    h.game.run_ticks(20).unwrap();
    assert_eq!(h.game.state().chunks.len(), 0);
}

#[test]
fn returning_loader_cancels_decay() {
    let mut h = decaying();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    h.game.run_ticks(5).unwrap();
    let before: Vec<EntityId> = chunks_of(&h.game).into_iter().map(|(e, _)| e).collect();

    h.game.logout(HERO_PEER).unwrap();
    h.game.run_ticks(3).unwrap();
    h.game.login("ada", 9).unwrap();
    h.game.run_ticks(20).unwrap();

    let after = chunks_of(&h.game);
    assert_eq!(after.iter().map(|(e, _)| *e).collect::<Vec<_>>(), before);
    for (_, chunk) in &after {
        assert_eq!(chunk.decay, None);
        assert!(chunk.loaded_by.contains(&hero));
    }
}

#[test]
fn recreated_chunk_contains_the_returning_character() {
    let mut h = decaying();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    h.game.run_ticks(5).unwrap();
    h.game.logout(HERO_PEER).unwrap();
    h.game.run_ticks(40).unwrap();
    assert_eq!(h.game.state().chunks.len(), 0);
    assert!(h.game.state().world.is_alive(hero));
    assert_eq!(h.game.state().world.get::<Transform>(hero).unwrap().chunk, None);

    h.game.login("ada", HERO_PEER).unwrap();
    h.game.run_ticks(10).unwrap();

    let state = h.game.state();
    let home = grid_at(spawn_point(&h.game), state.config.chunk_zoom);
    assert_eq!(state.world.get::<Transform>(hero).unwrap().chunk, Some(home));
    let home_chunk = state.chunks.live(&state.world, home).unwrap();
    let holders: Vec<EntityId> = chunks_of(&h.game)
        .into_iter()
        .filter(|(_, c)| c.contains.contains(&hero))
        .map(|(e, _)| e)
        .collect();
    assert_eq!(holders, vec![home_chunk]);
}

#[test]
fn saved_character_is_restored_with_its_items() {
    let mut h = harness();
    h.store.insert(Record::Account(AccountRecord {
        name: "ada".into(),
        character: 4242,
    }));
    h.store.insert(Record::Character(CharacterRecord {
        id: 4242,
        name: "ada".into(),
        kind: "character:player".into(),
        position: [47.0, 8.0],
        health: 40.0,
        admin: false,
    }));
    h.store.insert(Record::Item(ItemRecord {
        id: 77,
        kind: "item:wood".into(),
        amount: 6,
        owner: 4242,
    }));

    let hero = h.game.login("ada", HERO_PEER).unwrap();
    let state = h.game.state();
    assert_eq!(state.world.get::<Identity>(hero).unwrap().id, 4242);
    assert_eq!(state.world.get::<Transform>(hero).unwrap().pos, DVec2::new(47.0, 8.0));
    assert_eq!(state.world.get::<Health>(hero).unwrap().current, 40.0);
    assert_eq!(held(&h.game, hero, "item:wood"), 6);
    assert!(h.net.sent_to(HERO_PEER).iter().any(|m| matches!(
        m,
        OutboundMessage::InventoryAdd { item: 77, amount: 6, .. }
    )));
}

#[test]
fn persistence_failure_stops_the_server() {
    let mut h = harness_with(ServerConfig {
        save_interval_seconds: 0.5,
        ..config()
    });
    h.store.fail_saves(true);
    h.game.login("ada", HERO_PEER).unwrap();

    let err = h.game.run_ticks(20).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, ServerError::PersistenceFailure { .. }));
}

#[test]
fn saves_flush_characters_and_accounts() {
    let mut h = harness_with(ServerConfig {
        save_interval_seconds: 0.5,
        ..config()
    });
    h.game.login("ada", HERO_PEER).unwrap();
    h.game.run_ticks(10).unwrap();
    assert!(h.store.save_count() >= 1);
    assert!(h
        .store
        .get(&meridian_server::boundary::RecordKey::Account("ada".into()))
        .is_some());
}

// -- commands ---------------------------------------------------------------

#[test]
fn commands_enqueued_during_a_tick_run_on_the_next_one() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    let sp = spawn_point(&h.game);
    let tree = place(&mut h.game, "resource:tree", sp);
    let (clicker, target) = (h.game.state().link(hero), h.game.state().link(tree));
    h.game
        .state_mut()
        .queues
        .click
        .enqueue(ClickCommand::Entity { clicker, target });

    h.game.tick().unwrap();
    assert_eq!(h.game.state().queues.popup.len(), 1);
    assert!(h
        .game
        .state()
        .world
        .query::<(&Popup,)>()
        .next()
        .is_none());

    h.game.tick().unwrap();
    let state = h.game.state();
    let (popup, (info,)) = state.world.query::<(&Popup,)>().next().unwrap();
    assert_eq!(info.owner.entity, hero);
    assert_eq!(info.target.entity, tree);
    assert_eq!(state.world.get::<Parent>(popup).unwrap().children.len(), 2);
}

#[test]
fn inventory_subtract_is_all_or_nothing() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    give(&mut h.game, hero, "item:wood", 5);
    h.game.tick().unwrap();
    assert_eq!(held(&h.game, hero, "item:wood"), 5);

    let owner = h.game.state().link(hero);
    let take = |amount| InventoryCommand {
        owner,
        op: InventoryOp::Subtract {
            kind: "item:wood".into(),
            amount,
        },
    };
    h.game.state_mut().queues.inventory.enqueue(take(7));
    h.game.tick().unwrap();
    assert_eq!(held(&h.game, hero, "item:wood"), 5);

    h.game.state_mut().queues.inventory.enqueue(take(5));
    h.game.tick().unwrap();
    assert_eq!(held(&h.game, hero, "item:wood"), 0);
    assert!(h.game.state().world.get::<Inventory>(hero).unwrap().items.is_empty());

    let sent = h.net.sent_to(HERO_PEER);
    assert!(sent.iter().any(|m| matches!(m, OutboundMessage::InventoryAdd { amount: 5, .. })));
    assert!(sent.iter().any(|m| matches!(m, OutboundMessage::InventoryRemove { .. })));
}

#[test]
fn build_consumes_ingredients_and_raises_the_structure() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    give(&mut h.game, hero, "item:wood", 1);
    h.game.tick().unwrap();

    let builder = h.game.state().link(hero);
    let position = spawn_point(&h.game);
    h.game.state_mut().queues.build.enqueue(BuildCommand {
        builder,
        recipe: "recipe:flag".into(),
        position,
    });
    h.game.tick().unwrap();
    assert_eq!(held(&h.game, hero, "item:wood"), 0);
    let link = h.game.state().world.get::<Build>(hero).unwrap().entity;
    let flag = h.game.state().resolve(&link).unwrap();
    assert!(h.game.state().world.get::<Health>(flag).unwrap().current < 100.0);

    // Two seconds of building at ten ticks per second.
    h.game.run_ticks(21).unwrap();
    let state = h.game.state();
    assert!(!state.world.has::<Build>(hero));
    let health = state.world.get::<Health>(flag).unwrap();
    assert_eq!(health.current, health.max);
    assert_eq!(state.world.get::<Identity>(flag).unwrap().kind, "structure:flag");
}

#[test]
fn build_without_ingredients_does_nothing() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    let builder = h.game.state().link(hero);
    let position = spawn_point(&h.game);
    h.game.state_mut().queues.build.enqueue(BuildCommand {
        builder,
        recipe: "recipe:flag".into(),
        position,
    });
    h.game.tick().unwrap();
    assert!(!h.game.state().world.has::<Build>(hero));
}

#[test]
fn pickup_moves_a_ground_item_into_the_inventory() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    let sp = spawn_point(&h.game);
    let wood = place(&mut h.game, "item:wood", sp);
    h.game.state_mut().world.get_mut::<Item>(wood).unwrap().amount = 2;
    let (actor, target) = (h.game.state().link(hero), h.game.state().link(wood));
    h.game
        .state_mut()
        .queues
        .pickup
        .enqueue(PickupCommand { actor, target });

    h.game.run_ticks(2).unwrap();
    assert_eq!(held(&h.game, hero, "item:wood"), 2);
    assert!(!h.game.state().world.is_alive(wood));
    assert!(!h.game.state().world.has::<Pickup>(hero));
}

#[test]
fn commands_against_dead_targets_do_not_block_the_batch() {
    let mut h = harness();
    let ghost = h.game.login("ghost", 2).unwrap();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    let (gone, alive) = (h.game.state().link(ghost), h.game.state().link(hero));
    h.game.state_mut().world.despawn(ghost).unwrap();

    let to = DVec2::new(47.5, 8.5);
    let queue = &mut h.game.state_mut().queues.teleport;
    queue.enqueue(TeleportCommand {
        target: gone,
        position: to,
    });
    queue.enqueue(TeleportCommand {
        target: alive,
        position: to,
    });
    h.game.tick().unwrap();

    assert!(h.game.state().queues.teleport.is_empty());
    assert_eq!(h.game.state().world.get::<Transform>(hero).unwrap().pos, to);
}

// -- activities and combat --------------------------------------------------

#[test]
fn chopping_a_tree_to_death_grants_its_loot() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    let sp = spawn_point(&h.game);
    let tree = place(&mut h.game, "resource:tree", sp);
    let target = h.game.state().link(tree);
    h.game.state_mut().world.add(hero, Chop { target }).unwrap();

    // 30 health, 10 per chop, one chop per second.
    h.game.run_ticks(50).unwrap();
    let state = h.game.state();
    assert!(!state.world.is_alive(tree));
    assert!(!state.world.has::<Chop>(hero));
    assert_eq!(held(&h.game, hero, "item:wood"), 3);
}

#[test]
fn a_broken_chop_target_does_not_stall_other_choppers() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    let at = spawn_point(&h.game);
    let tree = place(&mut h.game, "resource:tree", at);
    let target = h.game.state().link(tree);
    h.game.state_mut().world.add(hero, Chop { target }).unwrap();

    // Resolvable but has no position, so every chop at it errors.
    let state = h.game.state_mut();
    let ghost = state
        .world
        .spawn_one(Identity::new("resource", "resource:ghost"));
    state.assign_id(ghost).unwrap();
    let target = state.link(ghost);
    let stuck = state.world.spawn(
        ComponentBundle::new()
            .with(Transform::at(at))
            .with(Chop { target }),
    );

    h.game.run_ticks(50).unwrap();
    let state = h.game.state();
    assert!(state.world.has::<Chop>(stuck));
    assert!(!state.world.is_alive(tree));
    assert_eq!(held(&h.game, hero, "item:wood"), 3);
}

#[test]
fn mobs_die_and_respawn() {
    let mut h = harness();
    let hero = h.game.login("ada", HERO_PEER).unwrap();
    let sp = spawn_point(&h.game);
    let wolf = place(&mut h.game, "mob:wolf", sp);
    let defender = h.game.state().link(wolf);
    let mut combat = InCombat::default();
    combat.defenders.insert(defender);
    h.game.state_mut().world.add(hero, combat).unwrap();

    // 50 health at 10 * 100 / 120 per second.
    h.game.run_ticks(80).unwrap();
    {
        let state = h.game.state();
        assert!(state.world.is_alive(wolf));
        assert!(state.world.has::<Dead>(wolf));
        assert_eq!(state.world.get::<Health>(wolf).unwrap().current, 0.0);
        assert!(!state.world.has::<InCombat>(hero));
        assert!(state.world.get::<Health>(hero).unwrap().current > 0.0);
        assert_eq!(held(&h.game, hero, "item:wood"), 0);
    }

    h.game.run_ticks(600).unwrap();
    let state = h.game.state();
    assert!(!state.world.has::<Dead>(wolf));
    let health = state.world.get::<Health>(wolf).unwrap();
    assert!(health.current > 0.0);
}

// -- visibility and chat ----------------------------------------------------

#[test]
fn observers_see_each_other_enter_and_leave() {
    let mut h = harness();
    let _ada = h.game.login("ada", 1).unwrap();
    let bob = h.game.login("bob", 2).unwrap();
    let bob_id = h.game.state().world.get::<Identity>(bob).unwrap().id;

    h.game.run_ticks(12).unwrap();
    assert!(h.net.sent_to(1).iter().any(|m| matches!(
        m,
        OutboundMessage::Spawn { id, kind, .. } if *id == bob_id && kind == "character:player"
    )));

    let target = h.game.state().link(bob);
    let far = spawn_point(&h.game) + DVec2::new(1.0, 1.0);
    h.game
        .state_mut()
        .queues
        .teleport
        .enqueue(TeleportCommand { target, position: far });
    h.game.run_ticks(12).unwrap();
    assert!(h
        .net
        .sent_to(1)
        .iter()
        .any(|m| matches!(m, OutboundMessage::Despawn { id } if *id == bob_id)));
}

#[test]
fn chat_is_broadcast_and_replayed_on_login() {
    let mut h = harness();
    let ada = h.game.login("ada", 1).unwrap();
    let sender = h.game.state().link(ada);
    h.game.state_mut().queues.chat.enqueue(ChatCommand {
        sender,
        message: "hello".into(),
    });
    h.game.tick().unwrap();
    assert_eq!(h.game.state().chat.len(), 1);

    h.game.login("bob", 2).unwrap();
    assert!(h.net.sent_to(2).iter().any(|m| matches!(
        m,
        OutboundMessage::Chat { from, message } if from == "ada" && message == "hello"
    )));
}

#[test]
fn admins_run_console_commands_from_chat() {
    let mut h = harness_with(ServerConfig {
        admins: vec!["root".into()],
        ..config()
    });
    let root = h.game.login("root", 1).unwrap();
    let sender = h.game.state().link(root);
    h.game.state_mut().queues.chat.enqueue(ChatCommand {
        sender,
        message: "/help".into(),
    });
    h.game.tick().unwrap();
    assert!(h.game.state().chat.is_empty());
    assert!(h
        .net
        .sent_to(1)
        .iter()
        .any(|m| matches!(m, OutboundMessage::Chat { from, .. } if from == "server")));
}

// -- determinism ------------------------------------------------------------

#[test]
fn same_seed_same_world() {
    let run = || {
        let mut h = harness();
        h.game.login("ada", 1).unwrap();
        h.game.run_ticks(30).unwrap();
        h.game.state().world.state_hash()
    };
    assert_eq!(run(), run());
}
