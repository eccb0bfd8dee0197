//! Inventory operations shared by the inventory executor, pickups, loot and
//! crafting.

use meridian_ecs::prelude::*;
use tracing::debug;

use crate::components::{Destroy, Identity, InInventory, Ingredient, Inventory, Item};
use crate::error::ServerError;
use crate::events::{ItemAdded, ItemRemoved, ItemUpdated};
use crate::schedule::Context;

/// Live stacks of `kind` in `owner`'s inventory, in inventory order.
pub fn stacks(world: &World, owner: EntityId, kind: &str) -> Result<Vec<EntityId>, ServerError> {
    let inventory = world.get::<Inventory>(owner)?;
    Ok(inventory
        .items
        .iter()
        .map(|link| link.entity)
        .filter(|item| {
            world.has::<Item>(*item)
                && world
                    .get::<Identity>(*item)
                    .map(|i| i.kind == kind)
                    .unwrap_or(false)
        })
        .collect())
}

/// Total amount of `kind` held by `owner`.
pub fn count(world: &World, owner: EntityId, kind: &str) -> Result<u32, ServerError> {
    Ok(stacks(world, owner, kind)?
        .into_iter()
        .filter_map(|item| world.get::<Item>(item).ok().map(|i| i.amount))
        .sum())
}

/// Fails with the first ingredient `owner` does not have enough of.
pub fn check_ingredients(
    world: &World,
    owner: EntityId,
    ingredients: &[Ingredient],
) -> Result<(), ServerError> {
    for ingredient in ingredients {
        let available = count(world, owner, &ingredient.kind)?;
        if available < ingredient.amount {
            return Err(ServerError::InsufficientResources {
                kind: ingredient.kind.clone(),
                needed: ingredient.amount,
                available,
            });
        }
    }
    Ok(())
}

/// Give `owner` `amount` of `kind`, merging into an existing stack when the
/// item type stacks. Returns the stack that received the items.
pub fn add_items(
    ctx: &mut Context<'_>,
    owner: EntityId,
    kind: &str,
    amount: u32,
) -> Result<EntityId, ServerError> {
    let state = &mut *ctx.state;
    let template = state
        .prototypes
        .template(kind)
        .ok_or_else(|| ServerError::UnknownPrototype {
            kind: kind.to_owned(),
        })?;
    let stackable = state.world.get::<Item>(template)?.stackable;

    if stackable {
        if let Some(stack) = stacks(&state.world, owner, kind)?.first().copied() {
            state.world.get_mut::<Item>(stack)?.amount += amount;
            debug!(%owner, kind, amount, "merged into stack");
            ctx.publish(&ItemUpdated { owner, item: stack });
            return Ok(stack);
        }
    }

    let owner_link = state.link(owner);
    let item = state.prototypes.instantiate(&mut state.world, kind)?;
    state.world.get_mut::<Item>(item)?.amount = amount;
    state.world.add(item, InInventory { owner: owner_link })?;
    let id = state.assign_id(item)?;
    let link = crate::link::EntityLink::new(item, id);
    state.world.get_mut::<Inventory>(owner)?.items.push(link);
    debug!(%owner, %item, kind, amount, "new stack");
    ctx.publish(&ItemAdded { owner, item });
    Ok(item)
}

/// Take `amount` of `kind` from `owner`. Nothing changes if there is not
/// enough. Stacks that reach zero are removed and marked for destruction.
pub fn subtract_items(
    ctx: &mut Context<'_>,
    owner: EntityId,
    kind: &str,
    amount: u32,
) -> Result<(), ServerError> {
    let world = &ctx.state.world;
    let held = stacks(world, owner, kind)?;
    let available = count(world, owner, kind)?;
    if available < amount {
        return Err(ServerError::InsufficientResources {
            kind: kind.to_owned(),
            needed: amount,
            available,
        });
    }

    let mut remaining = amount;
    for stack in held {
        if remaining == 0 {
            break;
        }
        let state = &mut *ctx.state;
        let item = state.world.get_mut::<Item>(stack)?;
        let taken = remaining.min(item.amount);
        item.amount -= taken;
        remaining -= taken;

        if item.amount > 0 {
            ctx.publish(&ItemUpdated { owner, item: stack });
            continue;
        }
        let link = state.link(stack);
        state
            .world
            .get_mut::<Inventory>(owner)?
            .items
            .retain(|l| l.entity != stack);
        ctx.publish(&ItemRemoved { owner, item: link });
        ctx.state.world.add(stack, Destroy)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{MemoryStore, RecordingNetwork};
    use crate::config::ServerConfig;
    use crate::state::GameState;
    use meridian_ecs::event::EventBus;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (GameState, EventBus<GameState>, EntityId) {
        let mut state = GameState::new(
            ServerConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(RecordingNetwork::new()),
        )
        .unwrap();
        let world = &mut state.world;
        state.prototypes.register(
            world,
            "item:wood",
            ComponentBundle::new().with(Item {
                amount: 1,
                stackable: true,
            }),
        );
        state.prototypes.register(
            world,
            "item:axe",
            ComponentBundle::new().with(Item {
                amount: 1,
                stackable: false,
            }),
        );
        let owner = world.spawn(
            ComponentBundle::new()
                .with(Identity::new("character", "character:player"))
                .with(Inventory::default()),
        );
        (state, EventBus::new(), owner)
    }

    #[test]
    fn stackable_items_merge() {
        let (mut state, mut events, owner) = setup();
        let mut ctx = Context::new(&mut state, &mut events);
        let a = add_items(&mut ctx, owner, "item:wood", 2).unwrap();
        let b = add_items(&mut ctx, owner, "item:wood", 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(count(&ctx.state.world, owner, "item:wood").unwrap(), 5);
        assert_eq!(ctx.state.world.get::<Inventory>(owner).unwrap().items.len(), 1);
    }

    #[test]
    fn non_stackable_items_get_their_own_entity() {
        let (mut state, mut events, owner) = setup();
        let mut ctx = Context::new(&mut state, &mut events);
        let a = add_items(&mut ctx, owner, "item:axe", 1).unwrap();
        let b = add_items(&mut ctx, owner, "item:axe", 1).unwrap();
        assert_ne!(a, b);
        assert_eq!(stacks(&ctx.state.world, owner, "item:axe").unwrap().len(), 2);
    }

    #[test]
    fn new_stacks_get_ids_immediately() {
        let (mut state, mut events, owner) = setup();
        let mut ctx = Context::new(&mut state, &mut events);
        let item = add_items(&mut ctx, owner, "item:wood", 1).unwrap();
        let id = ctx.state.world.get::<Identity>(item).unwrap().id;
        assert_ne!(id, 0);
        assert_eq!(ctx.state.identities.get(id), Some(item));
    }

    #[test]
    fn subtract_more_than_held_changes_nothing() {
        let (mut state, mut events, owner) = setup();
        let mut ctx = Context::new(&mut state, &mut events);
        add_items(&mut ctx, owner, "item:wood", 2).unwrap();
        let err = subtract_items(&mut ctx, owner, "item:wood", 3).unwrap_err();
        assert!(matches!(
            err,
            ServerError::InsufficientResources {
                needed: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(count(&ctx.state.world, owner, "item:wood").unwrap(), 2);
    }

    #[test]
    fn emptied_stack_is_removed_with_event() {
        let (mut state, mut events, owner) = setup();
        let removed = Rc::new(RefCell::new(Vec::new()));
        let seen = removed.clone();
        events.subscribe(move |e: &ItemRemoved, _: &mut GameState| seen.borrow_mut().push(e.item));

        let mut ctx = Context::new(&mut state, &mut events);
        let stack = add_items(&mut ctx, owner, "item:wood", 4).unwrap();
        subtract_items(&mut ctx, owner, "item:wood", 4).unwrap();

        assert!(ctx.state.world.get::<Inventory>(owner).unwrap().items.is_empty());
        assert!(ctx.state.world.has::<Destroy>(stack));
        assert_eq!(removed.borrow().len(), 1);
        assert_eq!(removed.borrow()[0].entity, stack);
    }

    #[test]
    fn missing_ingredients_are_reported() {
        let (mut state, mut events, owner) = setup();
        let mut ctx = Context::new(&mut state, &mut events);
        add_items(&mut ctx, owner, "item:wood", 1).unwrap();
        let recipe = [Ingredient::new("item:wood", 1), Ingredient::new("item:stone", 2)];
        assert!(matches!(
            check_ingredients(&ctx.state.world, owner, &recipe),
            Err(ServerError::InsufficientResources { ref kind, .. }) if kind == "item:stone"
        ));
    }
}
