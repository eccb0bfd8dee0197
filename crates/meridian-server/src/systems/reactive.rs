//! Start-of-tick bookkeeping: one-frame markers from the previous tick are
//! cleared and the start buffer is played back.

use meridian_ecs::prelude::*;
use tracing::debug;

use crate::components::{
    Animation, Attacks, Clicked, Created, Damage, DirtyAnimation, DirtyHealth, DirtyTransform,
    Moving,
};
use crate::error::ServerError;
use crate::schedule::{Context, System};

fn clear<T: Component>(world: &mut World) -> usize {
    let marked = world.matching::<(&T,)>(&Filter::new());
    let mut cleared = 0;
    for entity in marked {
        match world.remove::<T>(entity) {
            Ok(_) => cleared += 1,
            Err(err) => debug!(%entity, error = %err, "one-frame tag already gone"),
        }
    }
    cleared
}

/// Removes one-frame tags and applied damage entities.
pub struct ReactiveSystem;

impl System for ReactiveSystem {
    fn name(&self) -> &str {
        "reactive"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let world = &mut ctx.state.world;

        for (_, (animation,)) in
            world.query_mut_filtered::<(&mut Animation,)>(&Filter::new().with::<DirtyAnimation>())
        {
            animation.triggers.clear();
        }

        let cleared = clear::<Created>(world)
            + clear::<Moving>(world)
            + clear::<DirtyTransform>(world)
            + clear::<DirtyHealth>(world)
            + clear::<DirtyAnimation>(world)
            + clear::<Clicked>(world)
            + clear::<Attacks>(world);

        let applied: Vec<EntityId> = world
            .query::<(&Damage,)>()
            .filter(|(_, (d,))| d.applied)
            .map(|(e, _)| e)
            .collect();
        for entity in &applied {
            if let Err(err) = world.despawn(*entity) {
                debug!(%entity, error = %err, "applied damage already gone");
            }
        }

        if cleared + applied.len() > 0 {
            debug!(cleared, damage = applied.len(), "reactive cleanup");
        }
        Ok(())
    }
}

/// Plays back the start-of-frame command buffer.
pub struct StartBufferSystem;

impl System for StartBufferSystem {
    fn name(&self) -> &str {
        "start_buffer"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        if !state.start_buffer.is_empty() {
            let report = state.start_buffer.playback(&mut state.world);
            debug!(applied = report.applied, stale = report.stale, "start buffer");
        }
        Ok(())
    }
}

/// Plays back the end-of-frame command buffer.
pub struct EndBufferSystem;

impl System for EndBufferSystem {
    fn name(&self) -> &str {
        "end_buffer"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        if !state.end_buffer.is_empty() {
            let report = state.end_buffer.playback(&mut state.world);
            debug!(applied = report.applied, stale = report.stale, "end buffer");
        }
        Ok(())
    }
}
