//! Clicks, popups and their options.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::link::EntityLink;

/// Who clicked this entity this tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clicked {
    pub clickers: BTreeSet<EntityLink>,
}

/// Clicking opens a popup built from prototype `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnClickSpawnPopup {
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Popup {
    /// The character the popup was opened for.
    pub owner: EntityLink,
    /// The entity that was clicked.
    pub target: EntityLink,
}

/// On a popup prototype: option prototypes to attach, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopupTemplate {
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionAction {
    Chop,
    Visit,
    Attack,
    Pickup,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopupOption {
    pub action: OptionAction,
    pub popup: EntityLink,
}
