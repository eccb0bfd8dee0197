//! Spatial index maintenance, area-of-interest and collision detection.
//!
//! These run inside the physics interval, so every delta they produce
//! (AOI entered/left, collisions entered/left) is relative to the previous
//! physics step rather than the previous tick.

use std::collections::BTreeSet;

use glam::DVec2;
use meridian_ecs::prelude::*;
use tracing::trace;

use crate::components::{
    active, link_to, Character, Chunk, Collider, Collisions, Dead, Identity, Inactive, Prefab,
    Transform,
};
use crate::error::ServerError;
use crate::events::{AoiEntered, AoiLeft};
use crate::schedule::{Context, System};
use crate::spatial::aoi::Aoi;
use crate::spatial::quadtree::Rect;

/// Mirrors positions of active, identified entities into the quadtree.
pub struct QuadtreeSystem;

impl System for QuadtreeSystem {
    fn name(&self) -> &str {
        "quadtree"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let filter = active().without::<Chunk>().without::<Dead>();
        for (entity, (identity, transform)) in
            state.world.query_filtered::<(&Identity, &Transform)>(&filter)
        {
            state.tree.upsert(
                crate::link::EntityLink::new(entity, identity.id),
                transform.pos,
            );
        }
        Ok(())
    }
}

/// Recomputes every observer's visible set and announces the deltas.
pub struct AoiSystem;

impl System for AoiSystem {
    fn name(&self) -> &str {
        "aoi"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let default_range = ctx.state.config.aoi_range;
        let observers = ctx
            .state
            .world
            .matching::<(&Aoi, &Transform)>(&active().without::<Dead>());

        for observer in observers {
            let state = &mut *ctx.state;
            let pos = state.world.get::<Transform>(observer)?.pos;
            let aoi = state.world.get::<Aoi>(observer)?;
            let range = if aoi.range > 0.0 { aoi.range } else { default_range };
            let now: BTreeSet<EntityId> = state
                .tree
                .entities_in(&Rect::centered(pos, range))
                .into_iter()
                .filter(|e| *e != observer)
                .collect();

            let aoi = state.world.get_mut::<Aoi>(observer)?;
            aoi.update(now);
            let entered = aoi.entered.clone();
            let left = aoi.left.clone();
            if !entered.is_empty() || !left.is_empty() {
                trace!(%observer, entered = entered.len(), left = left.len(), "aoi changed");
            }

            for entity in entered {
                ctx.publish(&AoiEntered { observer, entity });
            }
            for entity in left {
                let link = link_to(&ctx.state.world, entity);
                ctx.publish(&AoiLeft {
                    observer,
                    entity: link,
                });
            }
        }
        Ok(())
    }
}

/// Box-vs-box overlap between collider-carrying entities.
pub struct CollisionSystem;

impl CollisionSystem {
    fn bounds(pos: DVec2, collider: &Collider) -> Rect {
        Rect::centered(pos, collider.size)
    }
}

impl System for CollisionSystem {
    fn name(&self) -> &str {
        "collision"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let widest = state
            .world
            .query_filtered::<(&Collider,)>(&active())
            .map(|(_, (c,))| c.size)
            .fold(0.0_f64, f64::max);

        let bodies: Vec<(EntityId, Rect)> = state
            .world
            .query_filtered::<(&Collider, &Transform, &Collisions)>(&active().without::<Dead>())
            .map(|(e, (c, t, _))| (e, Self::bounds(t.pos, c)))
            .collect();

        for (entity, own) in bodies {
            let centre = (own.min + own.max) / 2.0;
            let search = Rect::centered(centre, (own.max.x - own.min.x) + widest);
            let mut now = BTreeSet::new();
            state.tree.query_range(&search, |hit| {
                if hit.link.entity == entity {
                    return;
                }
                if let Ok(other) = state.world.get::<Collider>(hit.link.entity) {
                    if own.intersects(&Self::bounds(hit.pos, other)) {
                        now.insert(hit.link.entity);
                    }
                }
            });

            let collisions = state.world.get_mut::<Collisions>(entity)?;
            collisions.entered = now.difference(&collisions.current).copied().collect();
            collisions.left = collisions.current.difference(&now).copied().collect();
            collisions.current = now;
        }
        Ok(())
    }
}

/// Takes inactive and dead entities out of the spatial index and blinds
/// inactive observers.
pub struct InactiveSystem;

impl System for InactiveSystem {
    fn name(&self) -> &str {
        "inactive"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let hidden: Vec<EntityId> = state
            .world
            .matching::<(&Inactive,)>(&Filter::new().without::<Prefab>())
            .into_iter()
            .chain(state.world.matching::<(&Dead,)>(&Filter::new().without::<Prefab>()))
            .collect();
        for entity in &hidden {
            if state.tree.remove(*entity) {
                trace!(%entity, "removed from quadtree");
            }
        }

        let blind = state
            .world
            .matching::<(&Aoi, &Character)>(&Filter::new().with::<Inactive>());
        for observer in blind {
            let aoi = state.world.get_mut::<Aoi>(observer)?;
            if !aoi.visible.is_empty() {
                aoi.clear();
            }
        }
        Ok(())
    }
}
