//! Fixed-timestep scheduling of system groups.
//!
//! The [`Scheduler`] owns an ordered list of systems (usually [`Group`]s) and
//! runs them in declaration order once per tick. A [`Group`] runs each hook
//! across all of its members before moving to the next hook: every `before`,
//! then every `update`, then every `after`. An [`Interval`] only lets its
//! inner group run once enough simulated time has accumulated.
//!
//! Simulation time is computed as `tick * fixed_dt` rather than accumulated,
//! so it never drifts.

use std::time::{Duration, Instant};

use meridian_ecs::prelude::*;
use tracing::trace;

use crate::error::{contain, ServerError};
use crate::state::GameState;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What a system sees: the whole game state plus the event bus.
pub struct Context<'a> {
    pub state: &'a mut GameState,
    pub events: &'a mut EventBus<GameState>,
}

impl<'a> Context<'a> {
    pub fn new(state: &'a mut GameState, events: &'a mut EventBus<GameState>) -> Self {
        Self { state, events }
    }

    /// Publish `event` to every handler, synchronously.
    pub fn publish<E: 'static>(&mut self, event: &E) -> usize {
        self.events.publish(event, self.state)
    }

    pub fn world(&mut self) -> &mut World {
        &mut self.state.world
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// One step of the tick pipeline.
///
/// Systems contain their own per-entity failures. Anything else a hook
/// returns is logged at the group boundary, and only fatal errors abort the
/// tick.
pub trait System {
    fn name(&self) -> &str;

    fn before(&mut self, _ctx: &mut Context<'_>) -> Result<(), ServerError> {
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError>;

    fn after(&mut self, _ctx: &mut Context<'_>) -> Result<(), ServerError> {
        Ok(())
    }
}

/// Named sequence of systems, run phase by phase.
pub struct Group {
    name: String,
    systems: Vec<Box<dyn System>>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            systems: Vec::new(),
        }
    }

    /// Builder-style [`Group::add`].
    pub fn with(mut self, system: impl System + 'static) -> Self {
        self.add(system);
        self
    }

    pub fn add(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }
}

impl System for Group {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        for system in &mut self.systems {
            let result = system.before(ctx);
            contain(system.name(), result)?;
        }
        for system in &mut self.systems {
            let result = system.update(ctx, dt);
            contain(system.name(), result)?;
        }
        for system in &mut self.systems {
            let result = system.after(ctx);
            contain(system.name(), result)?;
        }
        Ok(())
    }
}

/// Runs `inner` every `seconds` of simulated time, passing it the elapsed
/// time since its last run.
pub struct Interval<S> {
    inner: S,
    seconds: f64,
    elapsed: f64,
}

impl<S: System> Interval<S> {
    pub fn new(seconds: f64, inner: S) -> Self {
        Self {
            inner,
            seconds,
            elapsed: 0.0,
        }
    }
}

impl<S: System> System for Interval<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        self.elapsed += dt;
        if self.elapsed + 1e-9 < self.seconds {
            return Ok(());
        }
        let elapsed = std::mem::take(&mut self.elapsed);
        trace!(group = self.inner.name(), elapsed, "interval fired");
        let result = self.inner.before(ctx);
        contain(self.inner.name(), result)?;
        let result = self.inner.update(ctx, elapsed);
        contain(self.inner.name(), result)?;
        let result = self.inner.after(ctx);
        contain(self.inner.name(), result)
    }
}

// ---------------------------------------------------------------------------
// TickConfig / TickDiagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// Tick as fast as possible instead of sleeping to the cap.
    pub headless: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            headless: false,
        }
    }
}

/// Timing of the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per top-level system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    systems: Vec<Box<dyn System>>,
    config: TickConfig,
    tick_counter: u64,
    last_diagnostics: TickDiagnostics,
}

impl Scheduler {
    pub fn new(config: TickConfig) -> Result<Self, ServerError> {
        if !(config.fixed_dt > 0.0 && config.fixed_dt.is_finite()) {
            return Err(ServerError::InvalidConfig {
                field: "fixed_dt",
                reason: format!("must be positive and finite, got {}", config.fixed_dt),
            });
        }
        Ok(Self {
            systems: Vec::new(),
            config,
            tick_counter: 0,
            last_diagnostics: TickDiagnostics::default(),
        })
    }

    /// Append `system` to the pipeline.
    pub fn add(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    /// Run every system once, in order.
    pub fn tick(&mut self, ctx: &mut Context<'_>) -> Result<(), ServerError> {
        let tick_start = Instant::now();
        let mut system_times = Vec::with_capacity(self.systems.len());
        let dt = self.config.fixed_dt;

        ctx.state.tick = self.tick_counter;
        ctx.state.time = self.sim_time();
        for system in &mut self.systems {
            let start = Instant::now();
            let result = system.before(ctx);
            contain(system.name(), result)?;
            let result = system.update(ctx, dt);
            contain(system.name(), result)?;
            let result = system.after(ctx);
            contain(system.name(), result)?;
            system_times.push((system.name().to_owned(), start.elapsed()));
        }

        self.tick_counter += 1;
        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
        };
        Ok(())
    }

    /// Time to sleep after a tick that took `spent`, to hold the tick rate.
    pub fn remaining(&self, spent: Duration) -> Option<Duration> {
        if self.config.headless {
            return None;
        }
        Duration::from_secs_f64(self.config.fixed_dt).checked_sub(spent)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.config.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.config.fixed_dt
    }

    pub fn is_headless(&self) -> bool {
        self.config.headless
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
