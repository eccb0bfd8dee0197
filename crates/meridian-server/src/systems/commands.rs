//! Command-queue executors.
//!
//! Each executor takes its queue's current batch and applies it in order.
//! A command whose target is gone is dropped with an info log; any other
//! per-command failure is logged and the rest of the batch still runs.
//! Commands enqueued while a batch runs are left for the next tick.

use std::collections::BTreeSet;

use glam::DVec2;
use meridian_ecs::prelude::*;
use tracing::{debug, info, warn};

use crate::boundary::network::OutboundMessage;
use crate::boundary::persistence::{ChunkRecord, LoadedChunk, PlacedRecord};
use crate::chat::ChatLine;
use crate::commands::{
    BuildCommand, ChatCommand, ChunkCommand, ClickCommand, DoubleClickCommand, EntityCommand,
    InventoryCommand, InventoryOp, PickupCommand, PopupCommand, TeleportCommand,
};
use crate::components::{
    Biome, Build, Character, Child, Chop, Chunk, Clicked, Destroy, DirtyTransform, Generated,
    Health, Identity, InInventory, Item, Movement, Parent, Pickup, Placement, Popup, PopupOption,
    PopupTemplate, Recipe, Transform,
};
use crate::console;
use crate::error::{contain, ServerError};
use crate::events::ChunkCreated;
use crate::inventory;
use crate::link::EntityLink;
use crate::schedule::{Context, System};
use crate::spatial::grid::{grid_at, Grid};
use crate::spatial::quadtree::Rect;

fn target(ctx: &Context<'_>, command: &'static str, link: &EntityLink) -> Result<EntityId, ServerError> {
    ctx.state
        .resolve(link)
        .ok_or(ServerError::CommandTargetDead {
            command,
            target: *link,
        })
}

fn walk_to(world: &mut World, entity: EntityId, position: DVec2) -> Result<(), ServerError> {
    world.get_mut::<Movement>(entity)?.target = position;
    Ok(())
}

/// Run `execute` over the current batch of one queue.
macro_rules! executor {
    ($system:ident, $name:literal, $queue:ident, $execute:ident) => {
        pub struct $system;

        impl System for $system {
            fn name(&self) -> &str {
                $name
            }

            fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
                let batch = ctx.state.queues.$queue.take();
                for command in batch {
                    contain($name, $execute(ctx, command))?;
                }
                Ok(())
            }
        }
    };
}

// -- teleport -----------------------------------------------------------------

fn teleport(ctx: &mut Context<'_>, command: TeleportCommand) -> Result<(), ServerError> {
    let entity = target(ctx, "teleport", &command.target)?;
    let world = ctx.world();
    world.get_mut::<Transform>(entity)?.pos = command.position;
    if let Ok(movement) = world.get_mut::<Movement>(entity) {
        movement.target = DVec2::ZERO;
    }
    world.add(entity, DirtyTransform)?;
    debug!(%entity, position = ?command.position, "teleported");
    Ok(())
}

executor!(TeleportExecutor, "teleport", teleport, teleport);

// -- click / double click -------------------------------------------------------

fn click(ctx: &mut Context<'_>, command: ClickCommand) -> Result<(), ServerError> {
    match command {
        ClickCommand::Ground { clicker, position } => {
            let entity = target(ctx, "click", &clicker)?;
            walk_to(ctx.world(), entity, position)
        }
        ClickCommand::Entity { clicker, target: clicked } => {
            let who = target(ctx, "click", &clicker)?;
            let what = target(ctx, "click", &clicked)?;
            let link = ctx.state.link(who);
            let world = ctx.world();
            match world.get_mut::<Clicked>(what) {
                Ok(c) => {
                    c.clickers.insert(link);
                }
                Err(_) => world.add(
                    what,
                    Clicked {
                        clickers: BTreeSet::from([link]),
                    },
                )?,
            }
            Ok(())
        }
    }
}

executor!(ClickExecutor, "click", click, click);

fn double_click(ctx: &mut Context<'_>, command: DoubleClickCommand) -> Result<(), ServerError> {
    let entity = target(ctx, "double_click", &command.clicker)?;
    let world = ctx.world();
    if world.has::<Chop>(entity) {
        world.remove::<Chop>(entity)?;
    }
    if world.has::<Build>(entity) {
        world.remove::<Build>(entity)?;
    }
    if world.has::<Pickup>(entity) {
        world.remove::<Pickup>(entity)?;
    }
    walk_to(world, entity, command.position)
}

executor!(DoubleClickExecutor, "double_click", double_click, double_click);

// -- build ----------------------------------------------------------------------

fn build(ctx: &mut Context<'_>, command: BuildCommand) -> Result<(), ServerError> {
    let builder = target(ctx, "build", &command.builder)?;
    let state = &mut *ctx.state;
    let recipe = state
        .prototypes
        .template(&command.recipe)
        .ok_or_else(|| ServerError::UnknownPrototype {
            kind: command.recipe.clone(),
        })
        .and_then(|t| Ok(state.world.get::<Recipe>(t)?.clone()))?;

    inventory::check_ingredients(&state.world, builder, &recipe.ingredients)?;

    let position = match recipe.placement {
        Placement::Target => command.position,
        Placement::TileCenter => {
            let at = state.world.get::<Transform>(builder)?.pos;
            let zoom = state.config.tile_zoom;
            grid_at(at, zoom).tile(zoom).middle()
        }
    };

    if recipe.requires_free_space {
        let area = Rect::centered(position, state.config.collider_size * 2.0);
        let mut blocked = false;
        state.tree.query_range(&area, |hit| {
            blocked |= state
                .world
                .get::<Identity>(hit.link.entity)
                .map(|i| i.kind == recipe.produces)
                .unwrap_or(false);
        });
        if blocked {
            info!(%builder, structure = %recipe.produces, "build spot occupied");
            return Ok(());
        }
    }

    for ingredient in &recipe.ingredients {
        inventory::subtract_items(ctx, builder, &ingredient.kind, ingredient.amount)?;
    }
    let world = ctx.world();
    world.add(
        builder,
        Build {
            position,
            distance: recipe.distance,
            duration: recipe.duration,
            structure: recipe.produces.clone(),
            entity: EntityLink::NONE,
        },
    )?;
    walk_to(world, builder, position)?;
    info!(%builder, structure = %recipe.produces, "build started");
    Ok(())
}

executor!(BuildExecutor, "build", build, build);

// -- pickup ---------------------------------------------------------------------

fn pickup(ctx: &mut Context<'_>, command: PickupCommand) -> Result<(), ServerError> {
    let actor = target(ctx, "pickup", &command.actor)?;
    let item = target(ctx, "pickup", &command.target)?;
    let world = ctx.world();
    if !world.has::<Item>(item) || world.has::<InInventory>(item) {
        debug!(%actor, %item, "pickup target is not on the ground");
        return Ok(());
    }
    let at = world.get::<Transform>(item)?.pos;
    let link = crate::components::link_to(world, item);
    world.add(actor, Pickup { target: link })?;
    walk_to(world, actor, at)
}

executor!(PickupExecutor, "pickup", pickup, pickup);

// -- inventory ------------------------------------------------------------------

fn inventory_op(ctx: &mut Context<'_>, command: InventoryCommand) -> Result<(), ServerError> {
    let owner = target(ctx, "inventory", &command.owner)?;
    match command.op {
        InventoryOp::Add { kind, amount } => {
            inventory::add_items(ctx, owner, &kind, amount)?;
        }
        InventoryOp::Subtract { kind, amount } => {
            inventory::subtract_items(ctx, owner, &kind, amount)?;
        }
    }
    Ok(())
}

executor!(InventoryExecutor, "inventory", inventory, inventory_op);

// -- chat -----------------------------------------------------------------------

fn chat(ctx: &mut Context<'_>, command: ChatCommand) -> Result<(), ServerError> {
    let sender = target(ctx, "chat", &command.sender)?;
    let state = &mut *ctx.state;
    let character = state.world.get::<Character>(sender)?.clone();

    if character.admin && command.message.starts_with('/') {
        let reply = match console::execute(state, &command.message) {
            Ok(reply) => reply,
            Err(err) => err.to_string(),
        };
        state.send(
            character.peer,
            OutboundMessage::Chat {
                from: "server".into(),
                message: reply,
            },
        );
        return Ok(());
    }

    let line = ChatLine {
        from: character.name,
        message: command.message,
    };
    console::broadcast(state, &line);
    state.chat.push(line);
    Ok(())
}

executor!(ChatExecutor, "chat", chat, chat);

// -- chunk ----------------------------------------------------------------------

/// Create the chunk entity for `grid` unless one already exists, handing it
/// every loader that was waiting for it.
fn create_chunk(
    ctx: &mut Context<'_>,
    grid: Grid,
    record: Option<&ChunkRecord>,
) -> Result<Option<EntityId>, ServerError> {
    let state = &mut *ctx.state;
    let waiting: BTreeSet<EntityId> = state
        .chunks
        .take_pending(grid)
        .into_iter()
        .filter(|e| state.world.is_alive(*e))
        .collect();

    if let Some(existing) = state.chunks.live(&state.world, grid) {
        state
            .world
            .get_mut::<Chunk>(existing)?
            .loaded_by
            .extend(waiting);
        debug!(?grid, "chunk already present");
        return Ok(None);
    }

    let zoom = state.config.chunk_zoom;
    let mut chunk = Chunk::new(grid, record.map_or(state.time, |r| r.created_at));
    if waiting.is_empty() {
        chunk.decay = Some(state.config.chunk_decay_seconds);
    }
    chunk.loaded_by = waiting;

    let mut bundle = ComponentBundle::new()
        .with(Identity::new("chunk", "chunk"))
        .with(Transform::at(grid.tile(zoom).middle()))
        .with(chunk);
    if let Some(record) = record {
        if let Some(kind) = &record.biome {
            bundle.add(Biome { kind: kind.clone() });
        }
        bundle.add(Generated);
    }
    let entity = state.world.spawn(bundle);
    info!(%entity, ?grid, loaded = record.is_some(), "chunk created");
    ctx.publish(&ChunkCreated { entity, grid });
    Ok(Some(entity))
}

fn restore_placed(ctx: &mut Context<'_>, record: &PlacedRecord) -> Result<EntityId, ServerError> {
    let state = &mut *ctx.state;
    let pos = DVec2::new(record.position[0], record.position[1]);
    let entity = state
        .prototypes
        .instantiate_at(&mut state.world, &record.kind, pos)?;
    state.world.get_mut::<Identity>(entity)?.id = record.id;
    if let (Some(current), Ok(health)) = (record.health, state.world.get_mut::<Health>(entity)) {
        health.current = current;
    }
    Ok(entity)
}

fn load_chunk(ctx: &mut Context<'_>, loaded: LoadedChunk) -> Result<(), ServerError> {
    if create_chunk(ctx, loaded.chunk.grid, Some(&loaded.chunk))?.is_none() {
        return Ok(());
    }
    let contents = loaded
        .resources
        .iter()
        .chain(&loaded.structures)
        .chain(&loaded.mobs);
    for record in contents {
        if let Err(err) = restore_placed(ctx, record) {
            warn!(id = record.id, kind = %record.kind, error = %err, "saved entity not restored");
        }
    }
    Ok(())
}

fn chunk(ctx: &mut Context<'_>, command: ChunkCommand) -> Result<(), ServerError> {
    match command {
        ChunkCommand::Create { grid } => create_chunk(ctx, grid, None).map(|_| ()),
        ChunkCommand::Load(loaded) => load_chunk(ctx, *loaded),
    }
}

executor!(ChunkExecutor, "chunk", chunk, chunk);

// -- entity ---------------------------------------------------------------------

fn entity(ctx: &mut Context<'_>, command: EntityCommand) -> Result<(), ServerError> {
    match command {
        EntityCommand::Spawn { kind, position } => {
            let state = &mut *ctx.state;
            let spawned = state
                .prototypes
                .instantiate_at(&mut state.world, &kind, position)?;
            info!(entity = %spawned, %kind, "spawned");
            Ok(())
        }
        EntityCommand::Destroy { target: link } => {
            let doomed = target(ctx, "entity", &link)?;
            ctx.world().add(doomed, Destroy)?;
            Ok(())
        }
    }
}

executor!(EntityExecutor, "entity", entity, entity);

// -- popup ----------------------------------------------------------------------

fn popup(ctx: &mut Context<'_>, command: PopupCommand) -> Result<(), ServerError> {
    let owner = target(ctx, "popup", &command.owner)?;
    let clicked = target(ctx, "popup", &command.target)?;
    let state = &mut *ctx.state;
    let at = state.world.get::<Transform>(clicked)?.pos;

    let popup = state
        .prototypes
        .instantiate_at(&mut state.world, &command.kind, at)?;
    let popup_id = state.assign_id(popup)?;
    let popup_link = EntityLink::new(popup, popup_id);
    let options = state
        .world
        .get::<PopupTemplate>(popup)
        .map(|t| t.options.clone())
        .unwrap_or_default();

    let mut children = BTreeSet::new();
    for kind in options {
        let option = state.prototypes.instantiate_at(&mut state.world, &kind, at)?;
        state.world.get_mut::<PopupOption>(option)?.popup = popup_link;
        state.world.add(option, Child { parent: popup_link })?;
        let id = state.assign_id(option)?;
        children.insert(EntityLink::new(option, id));
    }

    let owner_link = state.link(owner);
    let target_link = state.link(clicked);
    state.world.add(
        popup,
        Popup {
            owner: owner_link,
            target: target_link,
        },
    )?;
    state.world.add(popup, Parent { children })?;
    debug!(%popup, %owner, target = %clicked, "popup opened");
    Ok(())
}

executor!(PopupExecutor, "popup", popup, popup);
