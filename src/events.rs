//! Event payloads delivered by the host's combat/death subsystem
//!
//! Positions travel as `[f32; 3]` on the wire-adjacent types and are converted
//! to `Vec3` at the engine boundary. Timestamps are simulation-clock seconds
//! (`f64`), the same clock the tick pass uses.
//!
//! Delivery is at-least-once: the host may re-deliver an event inside the same
//! time-slice, and the engine's append-only / overwrite-latest semantics are
//! expected to tolerate that.

use crate::host::DamageSource;
use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

/// A damage packet landed on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageEvent {
    pub target: u64,
    /// Post-mitigation damage magnitude of the hit.
    pub amount: f32,
    pub source: DamageSource,
    /// Simulation time the hit landed, in seconds.
    pub timestamp: f64,
}

/// An entity died.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeathEvent {
    pub victim: u64,
    /// Killing entity, absent for environmental deaths.
    pub killer: Option<u64>,
    /// Where the victim died; absent if the host lost track of it.
    pub position: Option<[f32; 3]>,
    pub timestamp: f64,
}

impl DeathEvent {
    pub fn position(&self) -> Option<Vec3> {
        self.position.map(Vec3::from)
    }
}

/// A lootable object appeared in the world.
///
/// There is no foreign key from the object back to the kill that produced it;
/// correlation happens spatially in [`crate::loot_claims`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootSpawnEvent {
    pub object_id: u64,
    pub position: [f32; 3],
    pub timestamp: f64,
}

impl LootSpawnEvent {
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }
}
