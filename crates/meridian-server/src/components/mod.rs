//! Domain components.
//!
//! Every component is plain data. [`register_all`] gives each one the stable
//! name used in JSON snapshots and in the bundles sent to clients.

pub mod common;
pub mod environment;
pub mod gameplay;
pub mod interaction;

pub use common::*;
pub use environment::*;
pub use gameplay::*;
pub use interaction::*;

use meridian_ecs::prelude::*;

use crate::spatial::aoi::Aoi;

/// Register every domain component with `world` under its wire name.
pub fn register_all(world: &mut World) {
    // core
    world.register::<Identity>("identity");
    world.register::<Transform>("transform");
    world.register::<Movement>("movement");
    world.register::<Health>("health");
    world.register::<DestroyAfter>("destroy_after");
    world.register::<Parent>("parent");
    world.register::<Child>("child");
    world.register::<Character>("character");
    world.register::<Prefab>("prefab");
    world.register::<Destroy>("destroy");
    world.register::<Created>("created");
    world.register::<Initialized>("initialized");
    world.register::<Inactive>("inactive");
    world.register::<Dead>("dead");
    world.register::<LoggedIn>("logged_in");
    world.register::<Moving>("moving");
    world.register::<DirtyTransform>("dirty_transform");
    world.register::<DirtyHealth>("dirty_health");
    world.register::<DirtyAnimation>("dirty_animation");
    world.register::<Attacks>("attacks");
    world.register::<Unloaded>("unloaded");

    // environment
    world.register::<Chunk>("chunk");
    world.register::<ChunkLoader>("chunk_loader");
    world.register::<Biome>("biome");
    world.register::<BiomeRule>("biome_rule");
    world.register::<SpawnTable>("spawn_table");
    world.register::<NoiseGrid>("noise_grid");
    world.register::<Generated>("generated");

    // gameplay
    world.register::<Inventory>("inventory");
    world.register::<Item>("item");
    world.register::<InInventory>("in_inventory");
    world.register::<Loot>("loot");
    world.register::<Recipe>("recipe");
    world.register::<Build>("build");
    world.register::<Chop>("chop");
    world.register::<Pickup>("pickup");
    world.register::<Collider>("collider");
    world.register::<Collisions>("collisions");
    world.register::<InCombat>("in_combat");
    world.register::<AttackSpeed>("attack_speed");
    world.register::<Range>("range");
    world.register::<AttackDamage>("attack_damage");
    world.register::<PhysicalResistance>("physical_resistance");
    world.register::<OnDeathRespawn>("on_death_respawn");
    world.register::<Damage>("damage");
    world.register::<PhysicalDamage>("physical_damage");
    world.register::<ChopDamage>("chop_damage");
    world.register::<MobBrain>("mob_brain");
    world.register::<Animation>("animation");

    // interaction
    world.register::<Clicked>("clicked");
    world.register::<OnClickSpawnPopup>("on_click_spawn_popup");
    world.register::<Popup>("popup");
    world.register::<PopupTemplate>("popup_template");
    world.register::<PopupOption>("popup_option");

    world.register::<Aoi>("aoi");
}

/// Rows that take part in the simulation.
pub fn live() -> Filter {
    Filter::new().without::<Prefab>()
}

/// Live rows that are neither parked nor about to be removed.
pub fn active() -> Filter {
    Filter::new()
        .without::<Prefab>()
        .without::<Inactive>()
        .without::<Destroy>()
}
