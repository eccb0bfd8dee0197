//! Position integration toward movement targets.

use glam::DQuat;
use meridian_ecs::prelude::*;

use crate::components::{active, Dead, DirtyTransform, Movement, Moving, Transform};
use crate::error::ServerError;
use crate::schedule::{Context, System};

pub struct MovementSystem;

impl System for MovementSystem {
    fn name(&self) -> &str {
        "movement"
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        let world = &mut ctx.state.world;
        let mut moved = Vec::new();
        for (entity, (transform, movement)) in world
            .query_mut_filtered::<(&mut Transform, &mut Movement)>(&active().without::<Dead>())
        {
            if !movement.has_target() {
                continue;
            }
            let delta = movement.target - transform.pos;
            let distance = delta.length();
            let step = movement.speed * dt;
            if distance <= step || distance == 0.0 {
                transform.pos = movement.target;
                movement.target = glam::DVec2::ZERO;
            } else {
                transform.pos += delta / distance * step;
            }
            if distance > 0.0 {
                transform.rot = DQuat::from_rotation_z(delta.y.atan2(delta.x));
            }
            moved.push(entity);
        }
        for entity in moved {
            world.add(entity, Moving)?;
            world.add(entity, DirtyTransform)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{MemoryStore, RecordingNetwork};
    use crate::components::Identity;
    use crate::config::ServerConfig;
    use crate::state::GameState;
    use glam::DVec2;

    #[test]
    fn walks_toward_target_and_stops_on_arrival() {
        let mut state = GameState::new(
            ServerConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(RecordingNetwork::new()),
        )
        .unwrap();
        let mut events = EventBus::new();
        let walker = state.world.spawn(
            ComponentBundle::new()
                .with(Identity::new("mob", "mob:wolf"))
                .with(Transform::at(DVec2::new(1.0, 1.0)))
                .with(Movement {
                    target: DVec2::new(1.0, 2.0),
                    speed: 0.5,
                }),
        );

        let mut ctx = Context::new(&mut state, &mut events);
        MovementSystem.update(&mut ctx, 1.0).unwrap();
        let t = ctx.state.world.get::<Transform>(walker).unwrap();
        assert!((t.pos - DVec2::new(1.0, 1.5)).length() < 1e-12);
        assert!(ctx.state.world.has::<Moving>(walker));
        assert!(ctx.state.world.has::<DirtyTransform>(walker));

        MovementSystem.update(&mut ctx, 1.0).unwrap();
        assert_eq!(
            ctx.state.world.get::<Transform>(walker).unwrap().pos,
            DVec2::new(1.0, 2.0)
        );
        assert!(!ctx.state.world.get::<Movement>(walker).unwrap().has_target());
    }
}
