//! Server configuration.
//!
//! Loaded from an optional JSON file; every field has a default so a partial
//! file (or none at all) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::schedule::TickConfig;

/// Tunables for the whole server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Ticks per second.
    pub tick_rate: u32,
    /// Slippy-map zoom of chunk tiles.
    pub chunk_zoom: u8,
    /// Slippy-map zoom used for build placement on tile centres.
    pub tile_zoom: u8,
    /// Grace period before an unloaded chunk is destroyed.
    pub chunk_decay_seconds: f32,
    pub save_interval_seconds: f64,
    pub debug_interval_seconds: f64,
    pub physics_interval_seconds: f64,
    pub chop_interval_seconds: f64,
    /// Edge length (degrees) of the square observers see around themselves.
    pub aoi_range: f64,
    /// Default edge length (degrees) of box colliders.
    pub collider_size: f64,
    pub chat_history_capacity: usize,
    /// Seed for every random decision the simulation makes.
    pub seed: u64,
    /// Where fresh characters appear, as `[lat, lon]`.
    pub spawn_point: [f64; 2],
    /// Character names allowed to run slash-commands from chat.
    pub admins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            chunk_zoom: 13,
            tile_zoom: 14,
            chunk_decay_seconds: 60.0,
            save_interval_seconds: 60.0,
            debug_interval_seconds: 10.0,
            physics_interval_seconds: 1.0,
            chop_interval_seconds: 1.0,
            aoi_range: 0.01,
            collider_size: 0.0001,
            chat_history_capacity: 50,
            seed: 0x5eed,
            spawn_point: [47.3769, 8.5417],
            admins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ServerError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ServerError::InvalidConfig {
                    field,
                    reason: format!("must be positive and finite, got {value}"),
                })
            }
        }

        positive("tick_rate", self.tick_rate as f64)?;
        positive("chunk_decay_seconds", self.chunk_decay_seconds as f64)?;
        positive("save_interval_seconds", self.save_interval_seconds)?;
        positive("debug_interval_seconds", self.debug_interval_seconds)?;
        positive("physics_interval_seconds", self.physics_interval_seconds)?;
        positive("chop_interval_seconds", self.chop_interval_seconds)?;
        positive("aoi_range", self.aoi_range)?;
        positive("collider_size", self.collider_size)?;
        if self.chat_history_capacity == 0 {
            return Err(ServerError::InvalidConfig {
                field: "chat_history_capacity",
                reason: "must hold at least one message".to_owned(),
            });
        }
        for (field, zoom) in [("chunk_zoom", self.chunk_zoom), ("tile_zoom", self.tile_zoom)] {
            if zoom == 0 || zoom > 16 {
                return Err(ServerError::InvalidConfig {
                    field,
                    reason: format!("zoom must be in 1..=16, got {zoom}"),
                });
            }
        }
        Ok(())
    }

    /// Seconds per tick.
    pub fn fixed_dt(&self) -> f64 {
        1.0 / self.tick_rate as f64
    }

    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            fixed_dt: self.fixed_dt(),
            headless: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
