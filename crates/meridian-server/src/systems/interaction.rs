//! Click handling: opening popups and acting on popup options.

use meridian_ecs::prelude::*;
use tracing::debug;

use crate::commands::{PickupCommand, PopupCommand};
use crate::components::{
    live, Chop, Clicked, Destroy, InCombat, Movement, OnClickSpawnPopup, OptionAction, Popup,
    PopupOption, Transform,
};
use crate::error::{contain, ServerError};
use crate::link::EntityLink;
use crate::schedule::{Context, System};

pub struct InteractionSystem;

impl InteractionSystem {
    fn act(
        ctx: &mut Context<'_>,
        action: OptionAction,
        actor: EntityId,
        target: EntityLink,
    ) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let Some(resolved) = state.resolve(&target) else {
            debug!(%actor, %target, "option target is gone");
            return Ok(());
        };
        let world = &mut state.world;
        match action {
            OptionAction::Chop => {
                world.add(actor, Chop { target })?;
                let at = world.get::<Transform>(resolved)?.pos;
                world.get_mut::<Movement>(actor)?.target = at;
            }
            OptionAction::Visit => {
                let at = world.get::<Transform>(resolved)?.pos;
                world.get_mut::<Movement>(actor)?.target = at;
            }
            OptionAction::Attack => match world.get_mut::<InCombat>(actor) {
                Ok(combat) => {
                    combat.defenders.insert(target);
                }
                Err(_) => {
                    let mut combat = InCombat::default();
                    combat.defenders.insert(target);
                    world.add(actor, combat)?;
                }
            },
            OptionAction::Pickup => {
                let actor = state.link(actor);
                state.queues.pickup.enqueue(PickupCommand { actor, target });
            }
            OptionAction::Close => {}
        }
        Ok(())
    }
}

impl System for InteractionSystem {
    fn name(&self) -> &str {
        "interaction"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let world = &ctx.state.world;

        let popups: Vec<(EntityLink, EntityId, String)> = world
            .query_filtered::<(&Clicked, &OnClickSpawnPopup)>(&live().without::<Destroy>())
            .flat_map(|(entity, (clicked, spawn))| {
                clicked
                    .clickers
                    .iter()
                    .map(move |c| (*c, entity, spawn.kind.clone()))
            })
            .collect();

        let options: Vec<(EntityId, PopupOption, Vec<EntityLink>)> = world
            .query_filtered::<(&Clicked, &PopupOption)>(&live().without::<Destroy>())
            .map(|(entity, (clicked, option))| {
                (entity, *option, clicked.clickers.iter().copied().collect())
            })
            .collect();

        for (owner, clicked, kind) in popups {
            let target = ctx.state.link(clicked);
            ctx.state
                .queues
                .popup
                .enqueue(PopupCommand { owner, target, kind });
        }

        for (option, choice, clickers) in options {
            let result = Self::choose(ctx, option, choice, &clickers);
            contain("interaction", result)?;
        }
        Ok(())
    }
}

impl InteractionSystem {
    fn choose(
        ctx: &mut Context<'_>,
        option: EntityId,
        choice: PopupOption,
        clickers: &[EntityLink],
    ) -> Result<(), ServerError> {
        let Some(popup) = ctx.state.resolve(&choice.popup) else {
            return Ok(());
        };
        let Ok(Popup { owner, target }) = ctx.state.world.get::<Popup>(popup).copied() else {
            return Ok(());
        };
        let Some(owner_entity) = ctx.state.resolve(&owner) else {
            return Ok(());
        };
        let chosen_by_owner = clickers
            .iter()
            .any(|c| ctx.state.resolve(c) == Some(owner_entity));
        if !chosen_by_owner {
            debug!(%option, "option clicked by someone other than the popup owner");
            return Ok(());
        }
        // Any choice closes the popup, even one whose action failed.
        let acted = Self::act(ctx, choice.action, owner_entity, target);
        if !ctx.state.world.has::<Destroy>(popup) {
            ctx.state.world.add(popup, Destroy)?;
        }
        acted
    }
}
