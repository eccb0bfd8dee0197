//! Melee combat: engagement, swings, damage resolution, death and respawn.
//!
//! Attacks never touch health directly. A swing records a short-lived entity
//! carrying [`Damage`] plus one or more damage kinds into the start buffer.
//! It is created when the buffer plays back at the start of the next tick,
//! [`DamageSystem`] resolves it and flags it `applied`, and the reactive
//! cleanup of the tick after removes it.

use glam::DVec2;
use meridian_ecs::prelude::*;
use tracing::{debug, info};

use crate::commands::{InventoryCommand, InventoryOp};
use crate::components::{
    active, Animation, AttackDamage, AttackSpeed, Attacks, Character, ChopDamage, Damage, Dead, Destroy,
    DirtyAnimation, DirtyHealth, Health, InCombat, Loot, OnDeathRespawn, PhysicalDamage,
    PhysicalResistance, Range, Transform,
};
use crate::error::{contain, ServerError};
use crate::schedule::{Context, System};
use crate::state::GameState;

/// Characters are never taken below this by damage.
pub const CHARACTER_MIN_HEALTH: f32 = 1.0;

fn reach(state: &GameState, attacker: EntityId) -> f64 {
    state
        .world
        .get::<Range>(attacker)
        .map_or(state.config.collider_size * 2.0, |r| r.distance)
}

fn position(world: &World, entity: EntityId) -> Option<DVec2> {
    world.get::<Transform>(entity).ok().map(|t| t.pos)
}

/// Drops defenders that died, vanished or moved out of reach.
pub struct CancelAttackSystem;

impl System for CancelAttackSystem {
    fn name(&self) -> &str {
        "cancel_attack"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let fighters = state
            .world
            .matching::<(&InCombat, &Transform)>(&active());

        for attacker in fighters {
            contain("cancel_attack", Self::prune(state, attacker))?;
        }
        Ok(())
    }
}

impl CancelAttackSystem {
    fn prune(state: &mut GameState, attacker: EntityId) -> Result<(), ServerError> {
        let origin = state.world.get::<Transform>(attacker)?.pos;
        let range = reach(state, attacker);
        let defenders = state.world.get::<InCombat>(attacker)?.defenders.clone();
        let keep: Vec<_> = defenders
            .into_iter()
            .filter(|link| {
                state.resolve(link).is_some_and(|d| {
                    !state.world.has::<Dead>(d)
                        && position(&state.world, d).is_some_and(|p| p.distance(origin) <= range)
                })
            })
            .collect();

        if keep.is_empty() {
            state.world.remove::<InCombat>(attacker)?;
            debug!(%attacker, "left combat");
        } else {
            state.world.get_mut::<InCombat>(attacker)?.defenders = keep.into_iter().collect();
        }
        Ok(())
    }
}

/// Swings at every defender once the attack timer runs out.
pub struct AttackSystem;

impl System for AttackSystem {
    fn name(&self) -> &str {
        "attack"
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let fighters = state
            .world
            .matching::<(&InCombat,)>(&active().without::<Dead>());

        for attacker in fighters {
            contain("attack", Self::swing(state, attacker, dt))?;
        }
        Ok(())
    }
}

impl AttackSystem {
    fn swing(state: &mut GameState, attacker: EntityId, dt: f64) -> Result<(), ServerError> {
        let cooldown = state
            .world
            .get::<AttackSpeed>(attacker)
            .map_or(1.0, |s| s.seconds);
        let combat = state.world.get_mut::<InCombat>(attacker)?;
        combat.timer -= dt as f32;
        if combat.timer > 0.0 {
            return Ok(());
        }
        combat.timer = cooldown;
        let defenders: Vec<_> = combat.defenders.iter().copied().collect();

        let amount = state
            .world
            .get::<AttackDamage>(attacker)
            .map_or(0.0, |d| d.value);
        let sender = state.link(attacker);
        for receiver in defenders {
            state.start_buffer.create(
                ComponentBundle::new()
                    .with(Damage::new(sender, receiver))
                    .with(PhysicalDamage(amount)),
            );
        }

        state.world.add(attacker, Attacks)?;
        if let Ok(animation) = state.world.get_mut::<Animation>(attacker) {
            animation.trigger("attack");
            state.world.add(attacker, DirtyAnimation)?;
        }
        Ok(())
    }
}

/// Physical damage after resistance: `v * 100 / (100 + resistance)`.
pub fn mitigate(value: f32, resistance: f32) -> f32 {
    value * 100.0 / (100.0 + resistance)
}

/// Resolves pending damage entities against their receivers.
pub struct DamageSystem;

impl System for DamageSystem {
    fn name(&self) -> &str {
        "damage"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let pending: Vec<(EntityId, Damage, f32)> = state
            .world
            .query::<(&Damage, &PhysicalDamage)>()
            .filter(|(_, (d, _))| !d.applied)
            .map(|(e, (d, p))| (e, *d, p.0))
            .collect();

        for (entity, damage, raw) in pending {
            contain("damage", Self::resolve(state, entity, damage, raw))?;
        }
        Ok(())
    }
}

impl DamageSystem {
    fn resolve(
        state: &mut GameState,
        entity: EntityId,
        mut damage: Damage,
        raw: f32,
    ) -> Result<(), ServerError> {
        let chopped = state.world.has::<ChopDamage>(entity);
        damage.applied = true;
        let receiver = state
            .resolve(&damage.receiver)
            .filter(|r| state.world.has::<Health>(*r) && !state.world.has::<Dead>(*r));

        if let Some(receiver) = receiver {
            let resistance = state
                .world
                .get::<PhysicalResistance>(receiver)
                .map_or(0.0, |r| r.value);
            let dealt = mitigate(raw, resistance);
            let protected = state.world.has::<Character>(receiver);
            let health = state.world.get_mut::<Health>(receiver)?;

            health.current -= dealt;
            if protected {
                let floor = CHARACTER_MIN_HEALTH.min(health.current + dealt);
                if health.current < floor {
                    debug!(%receiver, "lethal hit on a character clamped");
                    health.current = floor;
                }
            } else if health.current <= 0.0 {
                health.current = 0.0;
                damage.killed = true;
            }
            state.world.add(receiver, DirtyHealth)?;

            if damage.killed {
                state.world.add(receiver, Dead)?;
                info!(%receiver, killer = %damage.sender, "killed");
                let loot = match state.world.get::<Loot>(receiver) {
                    Ok(loot) if chopped && !damage.sender.is_none() => loot.items.clone(),
                    _ => Vec::new(),
                };
                for item in loot {
                    state.queues.inventory.enqueue(InventoryCommand {
                        owner: damage.sender,
                        op: InventoryOp::Add {
                            kind: item.kind,
                            amount: item.amount,
                        },
                    });
                }
            }
        }
        state.world.set(entity, damage)?;
        Ok(())
    }
}

/// Marks the dead for removal unless they respawn.
pub struct DestroyDeadSystem;

impl System for DestroyDeadSystem {
    fn name(&self) -> &str {
        "destroy_dead"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let world = &mut ctx.state.world;
        let doomed = world.matching::<(&Dead,)>(
            &Filter::new()
                .without::<OnDeathRespawn>()
                .without::<Destroy>()
                .without::<crate::components::Prefab>(),
        );
        for entity in doomed {
            contain("destroy_dead", world.add(entity, Destroy).map_err(Into::into))?;
        }
        Ok(())
    }
}

/// Brings dead respawners back at full health once their timer expires.
pub struct RespawnSystem;

impl System for RespawnSystem {
    fn name(&self) -> &str {
        "respawn"
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        let world = &mut ctx.state.world;
        let mut revived = Vec::new();
        for (entity, (respawn,)) in
            world.query_mut_filtered::<(&mut OnDeathRespawn,)>(&active().with::<Dead>())
        {
            respawn.remaining -= dt as f32;
            if respawn.remaining <= 0.0 {
                respawn.remaining = respawn.seconds;
                revived.push(entity);
            }
        }
        for entity in revived {
            contain("respawn", Self::revive(world, entity))?;
        }
        Ok(())
    }
}

impl RespawnSystem {
    fn revive(world: &mut World, entity: EntityId) -> Result<(), ServerError> {
        let health = world.get_mut::<Health>(entity)?;
        health.current = health.max;
        world.remove::<Dead>(entity)?;
        world.add(entity, DirtyHealth)?;
        info!(%entity, "respawned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{MemoryStore, RecordingNetwork};
    use crate::config::ServerConfig;
    use crate::link::EntityLink;

    fn state() -> GameState {
        GameState::new(
            ServerConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(RecordingNetwork::new()),
        )
        .unwrap()
    }

    fn run(system: &mut impl System, state: &mut GameState, dt: f64) {
        let mut events = EventBus::new();
        system
            .update(&mut Context::new(state, &mut events), dt)
            .unwrap();
    }

    fn victim(state: &mut GameState, health: f32, character: bool) -> EntityId {
        let mut bundle = ComponentBundle::new().with(Health {
            current: health,
            max: 100.0,
        });
        if character {
            bundle = bundle.with(Character {
                name: "ada".into(),
                peer: 1,
                admin: false,
            });
        }
        state.world.spawn(bundle)
    }

    fn hit(state: &mut GameState, receiver: EntityId, amount: f32) -> EntityId {
        let receiver = state.link(receiver);
        state.world.spawn(
            ComponentBundle::new()
                .with(Damage::new(EntityLink::NONE, receiver))
                .with(PhysicalDamage(amount)),
        )
    }

    #[test]
    fn lethal_hits_leave_characters_at_the_floor() {
        let mut state = state();
        let hero = victim(&mut state, 5.0, true);
        let damage = hit(&mut state, hero, 50.0);
        run(&mut DamageSystem, &mut state, 0.1);

        assert_eq!(state.world.get::<Health>(hero).unwrap().current, CHARACTER_MIN_HEALTH);
        assert!(!state.world.has::<Dead>(hero));
        assert!(state.world.has::<DirtyHealth>(hero));
        let applied = state.world.get::<Damage>(damage).unwrap();
        assert!(applied.applied && !applied.killed);
    }

    #[test]
    fn lethal_hits_kill_everything_else() {
        let mut state = state();
        let wolf = victim(&mut state, 5.0, false);
        let damage = hit(&mut state, wolf, 50.0);
        run(&mut DamageSystem, &mut state, 0.1);

        assert_eq!(state.world.get::<Health>(wolf).unwrap().current, 0.0);
        assert!(state.world.has::<Dead>(wolf));
        assert!(state.world.get::<Damage>(damage).unwrap().killed);
    }

    #[test]
    fn swings_are_created_at_the_next_barrier() {
        let mut state = state();
        let wolf = victim(&mut state, 50.0, false);
        let target = state.link(wolf);
        let mut combat = InCombat::default();
        combat.defenders.insert(target);
        let attacker = state.world.spawn(
            ComponentBundle::new()
                .with(combat)
                .with(AttackDamage { value: 10.0 }),
        );

        run(&mut AttackSystem, &mut state, 0.1);
        assert!(state.world.has::<Attacks>(attacker));
        assert_eq!(state.world.query::<(&Damage,)>().count(), 0);
        assert_eq!(state.start_buffer.len(), 1);

        let report = state.start_buffer.playback(&mut state.world);
        assert_eq!(report.created.len(), 1);
        run(&mut DamageSystem, &mut state, 0.1);
        assert_eq!(state.world.get::<Health>(wolf).unwrap().current, 40.0);
    }

    #[test]
    fn resistance_scales_damage_down() {
        assert_eq!(mitigate(10.0, 0.0), 10.0);
        assert_eq!(mitigate(10.0, 100.0), 5.0);
        assert!(mitigate(10.0, 300.0) < 3.0);
    }
}
