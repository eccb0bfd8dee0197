//! Built-in prototype table.
//!
//! The server core never names a concrete entity type. Everything it
//! instantiates comes from the registry, and this module fills the registry
//! with a small default world: one player type, two resources, a mob, a
//! buildable flag and the popups that tie them together.

use meridian_ecs::prelude::*;

use crate::components::{
    Animation, AttackDamage, AttackSpeed, BiomeRule, ChunkLoader, Collider, Collisions, DestroyAfter, Health,
    Ingredient, Inventory, Item, Loot, MobBrain, Movement, NoiseCondition, OnClickSpawnPopup,
    OnDeathRespawn, OptionAction, PhysicalResistance, Placement, PopupOption, PopupTemplate, Range,
    Recipe, SpawnEntry, SpawnTable, Transform,
};
use crate::link::EntityLink;
use crate::spatial::aoi::Aoi;
use crate::state::GameState;

/// Degrees per second.
const PLAYER_SPEED: f64 = 0.00005;
const WOLF_SPEED: f64 = 0.00004;
const POPUP_SECONDS: f32 = 30.0;

pub const PLAYER: &str = "character:player";

fn option(action: OptionAction) -> ComponentBundle {
    ComponentBundle::new()
        .with(PopupOption {
            action,
            popup: EntityLink::NONE,
        })
        .with(Transform::default())
}

fn popup(options: &[&str]) -> ComponentBundle {
    ComponentBundle::new()
        .with(PopupTemplate {
            options: options.iter().map(|o| o.to_string()).collect(),
        })
        .with(DestroyAfter {
            seconds: POPUP_SECONDS,
        })
        .with(Transform::default())
}

fn resource(health: f32, loot: &str, collider: f64) -> ComponentBundle {
    ComponentBundle::new()
        .with(Transform::default())
        .with(Health::full(health))
        .with(Loot {
            items: vec![Ingredient::new(loot, 3)],
        })
        .with(OnClickSpawnPopup {
            kind: "popup:resource".into(),
        })
        .with(Collider { size: collider })
}

fn item() -> ComponentBundle {
    ComponentBundle::new()
        .with(Item {
            amount: 1,
            stackable: true,
        })
        .with(OnClickSpawnPopup {
            kind: "popup:item".into(),
        })
}

/// Register the default prototypes.
pub fn register_defaults(state: &mut GameState) {
    let collider = state.config.collider_size;
    let world = &mut state.world;
    let registry = &mut state.prototypes;

    registry.register(
        world,
        PLAYER,
        ComponentBundle::new()
            .with(Transform::default())
            .with(Movement::new(PLAYER_SPEED))
            .with(Health::full(100.0))
            .with(Inventory::default())
            .with(ChunkLoader::default())
            .with(Aoi::default())
            .with(Collider { size: collider })
            .with(Collisions::default())
            .with(Range {
                distance: collider * 2.0,
            })
            .with(AttackDamage { value: 10.0 })
            .with(AttackSpeed { seconds: 1.0 })
            .with(PhysicalResistance { value: 0.0 })
            .with(Animation::default()),
    );

    registry.register(world, "resource:tree", resource(30.0, "item:wood", collider));
    registry.register(world, "resource:rock", resource(60.0, "item:stone", collider));
    registry.register(world, "item:wood", item());
    registry.register(world, "item:stone", item());

    registry.register(
        world,
        "structure:flag",
        ComponentBundle::new()
            .with(Transform::default())
            .with(Health::full(100.0))
            .with(Collider { size: collider }),
    );
    registry.register(
        world,
        "recipe:flag",
        ComponentBundle::new().with(Recipe {
            ingredients: vec![Ingredient::new("item:wood", 1)],
            produces: "structure:flag".into(),
            duration: 2.0,
            distance: 0.0005,
            requires_free_space: true,
            placement: Placement::Target,
        }),
    );

    registry.register(
        world,
        "mob:wolf",
        ComponentBundle::new()
            .with(Transform::default())
            .with(Movement::new(WOLF_SPEED))
            .with(Health::full(50.0))
            .with(MobBrain::new(0.002))
            .with(Range {
                distance: collider * 2.0,
            })
            .with(AttackDamage { value: 5.0 })
            .with(AttackSpeed { seconds: 1.5 })
            .with(PhysicalResistance { value: 20.0 })
            .with(OnDeathRespawn::after(60.0))
            .with(Collider { size: collider })
            .with(Animation::default())
            .with(OnClickSpawnPopup {
                kind: "popup:mob".into(),
            }),
    );

    registry.register(world, "popup:resource", popup(&["option:chop", "option:close"]));
    registry.register(world, "popup:item", popup(&["option:pickup", "option:close"]));
    registry.register(
        world,
        "popup:mob",
        popup(&["option:attack", "option:visit", "option:close"]),
    );
    registry.register(world, "option:chop", option(OptionAction::Chop));
    registry.register(world, "option:visit", option(OptionAction::Visit));
    registry.register(world, "option:attack", option(OptionAction::Attack));
    registry.register(world, "option:pickup", option(OptionAction::Pickup));
    registry.register(world, "option:close", option(OptionAction::Close));

    registry.register(
        world,
        "biome:forest",
        ComponentBundle::new()
            .with(BiomeRule {
                codes: vec![22],
                weight: 1.0,
            })
            .with(SpawnTable {
                resolution: 8,
                entries: vec![
                    SpawnEntry {
                        prototype: "resource:tree".into(),
                        weight: 3.0,
                        condition: NoiseCondition::Greater(0.6),
                        mob: false,
                    },
                    SpawnEntry {
                        prototype: "resource:rock".into(),
                        weight: 1.0,
                        condition: NoiseCondition::Less(0.15),
                        mob: false,
                    },
                    SpawnEntry {
                        prototype: "mob:wolf".into(),
                        weight: 1.0,
                        condition: NoiseCondition::Always,
                        mob: true,
                    },
                ],
            }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{MemoryStore, RecordingNetwork};
    use crate::config::ServerConfig;

    #[test]
    fn every_referenced_prototype_is_registered() {
        let mut state = GameState::new(
            ServerConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(RecordingNetwork::new()),
        )
        .unwrap();
        register_defaults(&mut state);

        let world = &state.world;
        let mut referenced = Vec::new();
        for kind in state.prototypes.kinds() {
            let t = state.prototypes.template(kind).unwrap();
            if let Ok(p) = world.get::<OnClickSpawnPopup>(t) {
                referenced.push(p.kind.clone());
            }
            if let Ok(p) = world.get::<PopupTemplate>(t) {
                referenced.extend(p.options.iter().cloned());
            }
            if let Ok(l) = world.get::<Loot>(t) {
                referenced.extend(l.items.iter().map(|i| i.kind.clone()));
            }
            if let Ok(r) = world.get::<Recipe>(t) {
                referenced.push(r.produces.clone());
            }
            if let Ok(s) = world.get::<SpawnTable>(t) {
                referenced.extend(s.entries.iter().map(|e| e.prototype.clone()));
            }
        }
        assert!(!referenced.is_empty());
        for kind in referenced {
            assert!(state.prototypes.contains(&kind), "{kind} is not registered");
        }
    }
}
