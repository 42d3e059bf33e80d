//! Host Bridge — typed capabilities the engine consumes from the simulation
//!
//! The engine never reaches into the host's entity storage directly. Everything
//! it needs from the outside world (liveness checks, damage application, item
//! metadata, loot mutation) arrives through these traits, resolved at compile
//! time. Implementations must be callable from both the tick pass and the
//! damage/death event pass.
//!
//! Engine code never calls a host method while holding one of its own registry
//! locks; the host is free to take its own entity locks inside these calls.

use serde::{Deserialize, Serialize};

/// Origin tag carried by every damage application.
///
/// `EffectTick` marks damage generated by the effect engine itself. Hosts must
/// feed it back through [`crate::runtime::EffectsRuntime::handle_damage`]
/// unchanged so the engine can refuse to re-stack its own output (otherwise a
/// bleed tick would re-apply a bleed stack, forever).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageSource {
    /// Direct hit from another entity.
    Attack { attacker: u64 },
    /// Periodic or burst damage produced by the effect engine.
    EffectTick,
}

impl DamageSource {
    /// The attacking entity, if this damage had one.
    pub fn attacker(&self) -> Option<u64> {
        match self {
            DamageSource::Attack { attacker } => Some(*attacker),
            DamageSource::EffectTick => None,
        }
    }

    pub fn is_effect_tick(&self) -> bool {
        matches!(self, DamageSource::EffectTick)
    }
}

/// Entity identity resolution and liveness checks.
pub trait TargetDirectory {
    /// Is this entity reference still live in the simulation?
    fn is_valid(&self, entity: u64) -> bool;

    /// Is this entity a connected, living player (eligible for loot payout)?
    ///
    /// Defaults to plain validity for hosts that do not distinguish players.
    fn is_live_player(&self, entity: u64) -> bool {
        self.is_valid(entity)
    }
}

/// Damage and health mutation on the host's entity store.
pub trait CombatHost {
    /// Apply `amount` damage to `target`, tagged with its origin.
    fn apply_damage(&self, target: u64, amount: u32, source: DamageSource);

    /// Credit health to an entity (lifesteal payout path).
    fn add_health(&self, target: u64, amount: f32);
}

/// Mutation of world loot objects.
pub trait LootHost {
    /// Move the object's contents into the player's inventory.
    ///
    /// Returns `false` when the transfer cannot happen (inventory full,
    /// object already gone); the object is then left in the world for the
    /// host's default drop handling.
    fn transfer_to_player(&self, object: u64, player: u64) -> bool;

    /// Remove a fully-claimed loot object from the world.
    fn remove_object(&self, object: u64);
}

/// Item metadata for the attacker's equipped weapon.
///
/// Replaces the source material's runtime field probing of inventory items
/// with an explicit, compile-time capability.
pub trait HeldItemProvider {
    /// The item currently held by an entity, if any.
    fn held_item(&self, entity: u64) -> Option<u64>;

    /// Fraction of dealt effect damage returned to the attacker as health.
    fn lifesteal_fraction(&self, item: u64) -> f32;

    /// Does this item inflict bleed stacks on hit?
    fn applies_bleed(&self, item: u64) -> bool;
}
