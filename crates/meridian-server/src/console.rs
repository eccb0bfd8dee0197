//! Administrative slash-commands.
//!
//! Lines typed on the server console and `/`-prefixed chat from admins both
//! parse into a [`ConsoleCommand`], which is turned into the same queued
//! commands the network produces.

use glam::DVec2;
use tracing::info;

use crate::boundary::network::OutboundMessage;
use crate::chat::ChatLine;
use crate::commands::{EntityCommand, InventoryCommand, InventoryOp, TeleportCommand};
use crate::components::{Character, LoggedIn};
use crate::error::ServerError;
use crate::link::EntityLink;
use crate::state::GameState;

pub const HELP: &str = "commands: /help | /sendMessage <text> | /teleport <entityId> <x> <y> | \
/item <entityId> <type> <amount> | /spawn <type> <x> <y>";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Help,
    SendMessage(String),
    Teleport { id: u64, position: DVec2 },
    Item { id: u64, kind: String, amount: u32 },
    Spawn { kind: String, position: DVec2 },
}

fn unknown(input: &str) -> ServerError {
    ServerError::UnknownConsoleCommand {
        input: input.to_owned(),
    }
}

fn number<T: std::str::FromStr>(input: &str, arg: Option<&str>) -> Result<T, ServerError> {
    arg.and_then(|a| a.parse().ok()).ok_or_else(|| unknown(input))
}

/// Parse one console line. The leading `/` is optional.
pub fn parse(input: &str) -> Result<ConsoleCommand, ServerError> {
    let line = input.trim();
    let line = line.strip_prefix('/').unwrap_or(line);
    let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
    let mut args = rest.split_whitespace();

    let command = match name {
        "help" => ConsoleCommand::Help,
        "sendMessage" => {
            let text = rest.trim();
            if text.is_empty() {
                return Err(unknown(input));
            }
            ConsoleCommand::SendMessage(text.to_owned())
        }
        "teleport" => ConsoleCommand::Teleport {
            id: number(input, args.next())?,
            position: DVec2::new(number(input, args.next())?, number(input, args.next())?),
        },
        "item" => ConsoleCommand::Item {
            id: number(input, args.next())?,
            kind: args.next().ok_or_else(|| unknown(input))?.to_owned(),
            amount: number(input, args.next())?,
        },
        "spawn" => ConsoleCommand::Spawn {
            kind: args.next().ok_or_else(|| unknown(input))?.to_owned(),
            position: DVec2::new(number(input, args.next())?, number(input, args.next())?),
        },
        _ => return Err(unknown(input)),
    };
    if !matches!(command, ConsoleCommand::SendMessage(_)) && args.next().is_some() {
        return Err(unknown(input));
    }
    Ok(command)
}

/// Apply `command`, queueing whatever it asks for. Returns the text to show
/// the operator.
pub fn dispatch(state: &mut GameState, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Help => HELP.to_owned(),
        ConsoleCommand::SendMessage(message) => {
            let line = ChatLine {
                from: "server".into(),
                message,
            };
            broadcast(state, &line);
            state.chat.push(line);
            "sent".into()
        }
        ConsoleCommand::Teleport { id, position } => match state.identities.get(id) {
            Some(entity) => {
                state.queues.teleport.enqueue(TeleportCommand {
                    target: EntityLink::new(entity, id),
                    position,
                });
                format!("teleporting #{id}")
            }
            None => format!("no entity #{id}"),
        },
        ConsoleCommand::Item { id, kind, amount } => match state.identities.get(id) {
            Some(entity) => {
                state.queues.inventory.enqueue(InventoryCommand {
                    owner: EntityLink::new(entity, id),
                    op: InventoryOp::Add { kind, amount },
                });
                format!("giving #{id} items")
            }
            None => format!("no entity #{id}"),
        },
        ConsoleCommand::Spawn { kind, position } => {
            if !state.prototypes.contains(&kind) {
                return format!("no prototype {kind}");
            }
            state
                .queues
                .entity
                .enqueue(EntityCommand::Spawn { kind, position });
            "spawning".into()
        }
    }
}

/// Parse and dispatch one operator line.
pub fn execute(state: &mut GameState, input: &str) -> Result<String, ServerError> {
    let command = parse(input)?;
    info!(?command, "console");
    Ok(dispatch(state, command))
}

/// Send a chat line to every logged-in character.
pub fn broadcast(state: &mut GameState, line: &ChatLine) {
    let peers: Vec<u64> = state
        .world
        .query_filtered::<(&Character,)>(&crate::components::live().with::<LoggedIn>())
        .map(|(_, (c,))| c.peer)
        .collect();
    for peer in peers {
        state.send(
            peer,
            OutboundMessage::Chat {
                from: line.from.clone(),
                message: line.message.clone(),
            },
        );
    }
}
