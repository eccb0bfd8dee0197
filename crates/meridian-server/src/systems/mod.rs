//! The tick pipeline.
//!
//! [`install`] adds every group to a scheduler in frame order. Groups are
//! declared here, systems live in the submodules by concern.

pub mod activity;
pub mod behaviour;
pub mod combat;
pub mod commands;
pub mod environment;
pub mod interaction;
pub mod lifecycle;
pub mod movement;
pub mod network;
pub mod persistence;
pub mod physics;
pub mod reactive;

use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::schedule::{Context, Group, Interval, Scheduler, System};

/// Periodic one-line summary of the world.
pub struct DiagnosticsSystem;

impl System for DiagnosticsSystem {
    fn name(&self) -> &str {
        "diagnostics"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &*ctx.state;
        info!(
            tick = state.tick,
            entities = state.world.entity_count(),
            archetypes = state.world.archetype_count(),
            chunks = state.chunks.len(),
            indexed = state.tree.len(),
            identities = state.identities.len(),
            models = state.models.len(),
            "world stats"
        );
        Ok(())
    }
}

/// Add the full frame pipeline to `scheduler`.
pub fn install(scheduler: &mut Scheduler, config: &ServerConfig) {
    scheduler.add(
        Group::new("reactive")
            .with(reactive::ReactiveSystem)
            .with(reactive::StartBufferSystem),
    );
    scheduler.add(Group::new("initialisation").with(lifecycle::InitialisationSystem));
    scheduler.add(
        Group::new("commands")
            .with(commands::TeleportExecutor)
            .with(commands::ClickExecutor)
            .with(commands::DoubleClickExecutor)
            .with(commands::BuildExecutor)
            .with(commands::PickupExecutor)
            .with(commands::InventoryExecutor)
            .with(commands::ChatExecutor)
            .with(commands::ChunkExecutor)
            .with(commands::EntityExecutor)
            .with(commands::PopupExecutor),
    );
    scheduler.add(Group::new("interaction").with(interaction::InteractionSystem));
    scheduler.add(
        Group::new("environment")
            .with(environment::ChunkSystem)
            .with(environment::ChunkAssignmentSystem)
            .with(environment::BiomeSystem)
            .with(environment::GeneratorSystem)
            .with(environment::SpawnerSystem),
    );
    scheduler.add(
        Group::new("behaviour")
            .with(behaviour::MobBrainSystem)
            .with(behaviour::AnimationSystem),
    );
    scheduler.add(Group::new("movement").with(movement::MovementSystem));
    scheduler.add(
        Group::new("combat")
            .with(combat::CancelAttackSystem)
            .with(combat::AttackSystem)
            .with(combat::DamageSystem)
            .with(combat::DestroyDeadSystem)
            .with(combat::RespawnSystem),
    );
    scheduler.add(
        Group::new("physics")
            .with(Interval::new(
                config.physics_interval_seconds,
                Group::new("spatial")
                    .with(physics::QuadtreeSystem)
                    .with(physics::AoiSystem)
                    .with(physics::CollisionSystem),
            ))
            .with(physics::InactiveSystem),
    );
    scheduler.add(
        Group::new("activity")
            .with(Interval::new(
                config.chop_interval_seconds,
                activity::ChopSystem,
            ))
            .with(activity::BuildSystem)
            .with(activity::PickupSystem),
    );
    scheduler.add(
        Group::new("network")
            .with(network::NetworkSystem)
            .with(network::CharacterNetworkSystem),
    );
    scheduler.add(
        Group::new("persistence")
            .with(persistence::ModelSystem)
            .with(Interval::new(
                config.save_interval_seconds,
                Group::new("save")
                    .with(persistence::ModelUpdateSystem)
                    .with(persistence::SaveSystem),
            ))
            .with(persistence::ChunkLookupPump),
    );
    scheduler.add(Interval::new(config.debug_interval_seconds, DiagnosticsSystem));
    scheduler.add(
        Group::new("end_of_frame")
            .with(lifecycle::DestroySystem)
            .with(reactive::EndBufferSystem),
    );
}
