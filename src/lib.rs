//! Tower Game — Status Effect & Kill Attribution Engine
//!
//! This crate provides the server-side bleed/loot-attribution logic for the
//! Tower game server:
//! - Stacking bleed tracker (per-target stacks, periodic ticks, burst at cap)
//! - Death claim correlator (kill → spawned loot matching, exactly-once)
//! - Typed host bridge (liveness, damage, item metadata, loot mutation)
//! - Runtime glue (lifesteal payout, inventory transfer, tick scan)
//!
//! Both engines are caller-owned and safe under concurrent event/tick access;
//! nothing in here is global, blocks, or persists beyond process lifetime.

pub mod bleed;
pub mod events;
pub mod host;
pub mod loot_claims;
pub mod runtime;

// Re-export commonly used types
pub use bleed::{BleedConfig, BleedEffect, BleedTracker};
pub use events::{DamageEvent, DeathEvent, LootSpawnEvent};
pub use host::{CombatHost, DamageSource, HeldItemProvider, LootHost, TargetDirectory};
pub use loot_claims::{ClaimConfig, DeathClaimCorrelator, PendingDeathClaim};
pub use runtime::{AppliedTick, EffectError, EffectsConfig, EffectsRuntime};
