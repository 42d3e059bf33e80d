//! Bleed Stack Engine — stacking damage-over-time with burst detonation
//!
//! Each target accumulates time-stamped bleed stacks as hits land. Stacks
//! expire independently after [`STACK_DURATION_SECS`]; while any survive, the
//! engine emits a periodic damage application every [`TICK_INTERVAL_SECS`],
//! scaled by live stack count and the most recent triggering hit. Filling the
//! stack cap detonates everything at once as a single burst.
//!
//! ## Architecture
//! ```text
//! DamageEvent → add_stack() ──┐        (event pass)
//!                             ▼
//!                     [BleedTracker]  RwLock<HashMap<target, Mutex<StackState>>>
//!                             ▲
//! tick pass → advance(dt) ────┘ → Option<BleedEffect> (burst | periodic)
//! ```
//!
//! The tracker produces effects only; applying the damage, tagging it so it
//! cannot re-stack itself, and paying lifesteal are the caller's job
//! (see `crate::runtime`). The tracker never calls into the host.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Tuning Constants
// ============================================================================

/// Stacks a single target can carry; reaching the cap detonates a burst.
pub const MAX_STACKS: usize = 5;
/// Lifetime of one stack in seconds.
pub const STACK_DURATION_SECS: f64 = 3.0;
/// Seconds of accumulated tick time per periodic application.
pub const TICK_INTERVAL_SECS: f32 = 1.0;
/// Burst damage = last triggering hit × this.
pub const BURST_MULTIPLIER: f32 = 1.5;
/// Burst damage when no triggering hit magnitude was recorded.
pub const FALLBACK_BURST_DAMAGE: f32 = 10.0;
/// Periodic damage per stack per interval = last triggering hit × this.
pub const DAMAGE_PERCENT_PER_STACK: f32 = 0.20;
/// Periodic damage per stack per interval when no hit magnitude was recorded.
pub const FALLBACK_DAMAGE_PER_STACK: f32 = 2.0;

/// Bleed tuning knobs (defaults match the constants above).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BleedConfig {
    pub max_stacks: usize,
    pub stack_duration_secs: f64,
    pub tick_interval_secs: f32,
    pub burst_multiplier: f32,
    pub fallback_burst_damage: f32,
    pub damage_percent_per_stack: f32,
    pub fallback_damage_per_stack: f32,
}

impl Default for BleedConfig {
    fn default() -> Self {
        Self {
            max_stacks: MAX_STACKS,
            stack_duration_secs: STACK_DURATION_SECS,
            tick_interval_secs: TICK_INTERVAL_SECS,
            burst_multiplier: BURST_MULTIPLIER,
            fallback_burst_damage: FALLBACK_BURST_DAMAGE,
            damage_percent_per_stack: DAMAGE_PERCENT_PER_STACK,
            fallback_damage_per_stack: FALLBACK_DAMAGE_PER_STACK,
        }
    }
}

// ============================================================================
// Effect Results
// ============================================================================

/// One pending damage application produced by [`BleedTracker::advance`].
///
/// Damage is pre-rounded: nearest integer, never below 1, so small stacks
/// cannot underflow into zero-damage no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BleedEffect {
    /// Cap reached: all stacks consumed in one detonation.
    Burst { damage: u32, attacker: Option<u64> },
    /// Interval elapsed: recurring application scaled by live stacks.
    Periodic {
        damage: u32,
        stacks: u32,
        intervals: u32,
        attacker: Option<u64>,
    },
}

impl BleedEffect {
    pub fn damage(&self) -> u32 {
        match self {
            BleedEffect::Burst { damage, .. } => *damage,
            BleedEffect::Periodic { damage, .. } => *damage,
        }
    }

    /// Most recent contributing attacker, for reward attribution.
    pub fn attacker(&self) -> Option<u64> {
        match self {
            BleedEffect::Burst { attacker, .. } => *attacker,
            BleedEffect::Periodic { attacker, .. } => *attacker,
        }
    }

    pub fn is_burst(&self) -> bool {
        matches!(self, BleedEffect::Burst { .. })
    }
}

/// Round a raw damage magnitude to the nearest integer, floor 1.
fn round_damage(raw: f32) -> u32 {
    raw.round().max(1.0) as u32
}

// ============================================================================
// Per-Target Stack State
// ============================================================================

/// Mutable bleed record for one target. Oldest stack sits at the front.
#[derive(Debug, Default)]
struct StackState {
    /// Arrival timestamp of each live stack, insertion order.
    stamps: VecDeque<f64>,
    /// Most recent contributing attacker; cleared when all stacks expire.
    last_attacker: Option<u64>,
    /// Magnitude of the most recent triggering hit; scales future damage.
    last_hit_damage: f32,
    /// Unconsumed tick seconds toward the next periodic application.
    tick_accumulator: f32,
}

impl StackState {
    fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Drop stacks older than the configured duration. Called before every
    /// read, so expired stacks are never observable.
    fn prune(&mut self, now: f64, duration: f64) {
        while let Some(&oldest) = self.stamps.front() {
            if now - oldest > duration {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
        if self.stamps.is_empty() {
            self.last_attacker = None;
            self.last_hit_damage = 0.0;
            self.tick_accumulator = 0.0;
        }
    }

    fn push_hit(&mut self, now: f64, attacker: Option<u64>, trigger_damage: f32, cap: usize) {
        self.stamps.push_back(now);
        while self.stamps.len() > cap {
            self.stamps.pop_front();
        }
        if attacker.is_some() {
            self.last_attacker = attacker;
        }
        if trigger_damage > 0.0 {
            self.last_hit_damage = trigger_damage;
        }
    }

    /// Advance this state by `dt`. At most one effect per call; burst wins.
    fn advance(&mut self, dt: f32, now: f64, config: &BleedConfig) -> Option<BleedEffect> {
        self.prune(now, config.stack_duration_secs);
        if self.stamps.is_empty() {
            return None;
        }

        if self.stamps.len() >= config.max_stacks {
            let raw = if self.last_hit_damage > 0.0 {
                self.last_hit_damage * config.burst_multiplier
            } else {
                config.fallback_burst_damage
            };
            let attacker = self.last_attacker;
            // Burst consumes everything, including the attribution record.
            self.stamps.clear();
            self.last_attacker = None;
            self.last_hit_damage = 0.0;
            self.tick_accumulator = 0.0;
            return Some(BleedEffect::Burst {
                damage: round_damage(raw),
                attacker,
            });
        }

        self.tick_accumulator += dt;
        if self.tick_accumulator >= config.tick_interval_secs {
            let intervals = (self.tick_accumulator / config.tick_interval_secs).floor() as u32;
            self.tick_accumulator -= intervals as f32 * config.tick_interval_secs;
            let per_stack = if self.last_hit_damage > 0.0 {
                self.last_hit_damage * config.damage_percent_per_stack
            } else {
                config.fallback_damage_per_stack
            };
            let stacks = self.stamps.len() as u32;
            let raw = stacks as f32 * intervals as f32 * per_stack;
            return Some(BleedEffect::Periodic {
                damage: round_damage(raw),
                stacks,
                intervals,
                attacker: self.last_attacker,
            });
        }

        None
    }
}

// ============================================================================
// Tracker (top-level registry)
// ============================================================================

type StateSlot = Arc<Mutex<StackState>>;

/// Concurrent registry of per-target bleed state.
///
/// `add_stack` runs on the damage-event pass, `advance` on the per-target tick
/// pass; both may touch the same entry within a time-slice, so entries carry
/// their own mutex under a shared map. Lock discipline: a map lock is never
/// acquired while an entry lock is held.
///
/// Construct one per simulation instance and drop it on teardown; there is no
/// global state.
pub struct BleedTracker {
    states: RwLock<HashMap<u64, StateSlot>>,
    config: BleedConfig,
}

impl Default for BleedTracker {
    fn default() -> Self {
        Self::new(BleedConfig::default())
    }
}

impl BleedTracker {
    pub fn new(config: BleedConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &BleedConfig {
        &self.config
    }

    /// Record one bleed stack on `target` at time `now`.
    ///
    /// Appends a stack timestamp, evicting the oldest stack beyond the cap
    /// (FIFO). A present `attacker` becomes the attribution target for future
    /// effects; a positive `trigger_damage` becomes the scaling magnitude.
    /// No effect is produced synchronously; side effects only flow out of
    /// [`advance`](Self::advance).
    pub fn add_stack(&self, target: u64, attacker: Option<u64>, trigger_damage: f32, now: f64) {
        loop {
            let slot = self.states.read().get(&target).cloned();
            let slot = match slot {
                Some(slot) => slot,
                None => self.states.write().entry(target).or_default().clone(),
            };
            {
                let mut state = slot.lock();
                state.prune(now, self.config.stack_duration_secs);
                state.push_hit(now, attacker, trigger_damage, self.config.max_stacks);
            }
            // The empty-entry collector may have raced this slot out of the
            // map between lookup and mutation; if so, redo against the live
            // entry so the stack is not lost.
            let registered = self
                .states
                .read()
                .get(&target)
                .is_some_and(|current| Arc::ptr_eq(current, &slot));
            if registered {
                return;
            }
        }
    }

    /// Advance `target` by `dt` seconds of tick time.
    ///
    /// Prunes expired stacks first; a state left empty is garbage-collected
    /// and `None` is returned. Otherwise yields at most one pending effect,
    /// burst taking priority over periodic.
    pub fn advance(&self, target: u64, dt: f32, now: f64) -> Option<BleedEffect> {
        let slot = self.states.read().get(&target).cloned()?;
        let (effect, emptied) = {
            let mut state = slot.lock();
            let effect = state.advance(dt, now, &self.config);
            (effect, state.is_empty())
        };
        if emptied {
            self.collect_if_empty(target, &slot);
        }
        if let Some(effect) = effect {
            debug!(entity = target, ?effect, "bleed effect pending");
        }
        effect
    }

    /// Drop all state for `target` (death, despawn, invalid reference).
    /// Returns whether anything was tracked.
    pub fn remove(&self, target: u64) -> bool {
        self.states.write().remove(&target).is_some()
    }

    /// Live stack count for `target` after pruning at `now`. An entry left
    /// empty by the prune is collected, same as on the `advance` path.
    pub fn stack_count(&self, target: u64, now: f64) -> usize {
        let slot = match self.states.read().get(&target).cloned() {
            Some(slot) => slot,
            None => return 0,
        };
        let count = {
            let mut state = slot.lock();
            state.prune(now, self.config.stack_duration_secs);
            state.stamps.len()
        };
        if count == 0 {
            self.collect_if_empty(target, &slot);
        }
        count
    }

    /// Targets currently carrying state, for the caller's tick scan.
    pub fn tracked_targets(&self) -> Vec<u64> {
        self.states.read().keys().copied().collect()
    }

    pub fn tracked_len(&self) -> usize {
        self.states.read().len()
    }

    /// Remove an entry only if it is still the slot we mutated and still
    /// empty. Re-checks under the write lock: a concurrent `add_stack` either
    /// lands before the check (entry kept) or observes the removal and
    /// retries.
    fn collect_if_empty(&self, target: u64, slot: &StateSlot) {
        let mut map = self.states.write();
        if let Some(current) = map.get(&target) {
            if Arc::ptr_eq(current, slot) && current.lock().is_empty() {
                map.remove(&target);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
