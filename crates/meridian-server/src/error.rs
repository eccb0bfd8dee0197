//! Server error taxonomy.
//!
//! Component and command failures are contained at the system that detects
//! them and only ever logged. [`ServerError::PersistenceFailure`] is the one
//! error that escapes a tick and terminates the process.

use meridian_ecs::EcsError;
use tracing::{error, info, warn};

use crate::link::EntityLink;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// A queued command's target died between enqueue and drain.
    #[error("{command} command target {target} is no longer alive")]
    CommandTargetDead {
        command: &'static str,
        target: EntityLink,
    },

    /// Not enough items or ingredients.
    #[error("insufficient {kind}: needed {needed}, have {available}")]
    InsufficientResources {
        kind: String,
        needed: u32,
        available: u32,
    },

    /// The persistence boundary failed. Fatal.
    #[error("persistence failure: {reason}")]
    PersistenceFailure { reason: String },

    #[error("no prototype registered for '{kind}'")]
    UnknownPrototype { kind: String },

    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("unknown console command: {input}")]
    UnknownConsoleCommand { input: String },

    #[error("failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl ServerError {
    /// Whether the process must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::PersistenceFailure { .. })
    }

    /// Log a contained failure at the level its kind calls for.
    pub fn report(&self, scope: &str) {
        match self {
            ServerError::CommandTargetDead { .. } => info!(scope, error = %self, "dropped"),
            ServerError::InsufficientResources { .. } => info!(scope, error = %self, "no effect"),
            ServerError::Ecs(EcsError::MissingComponent { .. }) => {
                error!(scope, error = %self, "precondition violated")
            }
            _ => warn!(scope, error = %self, "failed"),
        }
    }
}

/// Swallow a non-fatal failure after logging it; fatal ones pass through.
pub fn contain(scope: &str, result: Result<(), ServerError>) -> Result<(), ServerError> {
    match result {
        Err(err) if !err.is_fatal() => {
            err.report(scope);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_ecs::prelude::EntityId;

    #[test]
    fn only_persistence_failures_escape() {
        let missing = ServerError::Ecs(EcsError::MissingComponent {
            entity: EntityId::new(1, 0),
            component: "transform".into(),
        });
        assert!(contain("test", Err(missing)).is_ok());
        assert!(contain(
            "test",
            Err(ServerError::UnknownPrototype { kind: "x".into() })
        )
        .is_ok());
        assert!(matches!(
            contain(
                "test",
                Err(ServerError::PersistenceFailure {
                    reason: "disk".into()
                })
            ),
            Err(ServerError::PersistenceFailure { .. })
        ));
    }
}
