//! Effects Runtime — glue between the engines and the host simulation
//!
//! Owns one [`BleedTracker`] and one [`DeathClaimCorrelator`] and wires their
//! outputs to the host: damage application tagged so it cannot re-stack
//! itself, lifesteal payout to the attributed attacker, and inventory
//! transfer + object removal for claimed loot.
//!
//! ## Architecture
//! ```text
//! damage/death pass          tick pass                 loot scan
//! handle_damage ─┐           advance_all/advance_target  handle_loot_spawn
//! handle_death ──┤               │                           │
//!                ▼               ▼                           ▼
//!        [BleedTracker]   BleedEffect → apply_damage   try_claim → transfer
//!        [Correlator]                 → add_health               → remove
//! ```
//!
//! Construct one runtime per simulation instance at plugin startup and drop it
//! on teardown. Every operation is synchronous and bounded by live
//! stacks/claims; per-target failures degrade to a skipped tick, never a
//! crashed tick loop.

use crate::bleed::{BleedConfig, BleedTracker};
use crate::events::{DamageEvent, DeathEvent, LootSpawnEvent};
use crate::host::{CombatHost, DamageSource, HeldItemProvider, LootHost, TargetDirectory};
use crate::loot_claims::{ClaimConfig, DeathClaimCorrelator};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a public operation could not do useful work this tick.
///
/// "Nothing pending" is `Ok(None)`, never an error; these variants mean
/// something actually went wrong for this target, and callers should skip it
/// and move on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EffectError {
    /// The entity reference went invalid between event and tick; any pending
    /// state for it has been dropped.
    #[error("target entity is no longer valid")]
    InvalidTarget,
    /// State or claim existed but its attributed attacker has gone invalid.
    #[error("attributed attacker is no longer valid")]
    NoAttributedAttacker,
}

/// Combined tuning for both engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectsConfig {
    pub bleed: BleedConfig,
    pub claims: ClaimConfig,
}

/// One damage application that actually went out to the host this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedTick {
    pub target: u64,
    pub damage: u32,
    pub burst: bool,
    /// Attacker the payout went to, if any survived attribution checks.
    pub attacker: Option<u64>,
    /// Health credited back to the attacker.
    pub lifesteal: f32,
}

pub struct EffectsRuntime {
    bleed: BleedTracker,
    claims: DeathClaimCorrelator,
}

impl Default for EffectsRuntime {
    fn default() -> Self {
        Self::new(EffectsConfig::default())
    }
}

impl EffectsRuntime {
    pub fn new(config: EffectsConfig) -> Self {
        info!(
            max_stacks = config.bleed.max_stacks,
            claim_ttl_secs = config.claims.claim_ttl_secs,
            match_radius = config.claims.match_radius,
            "effects runtime initialized"
        );
        Self {
            bleed: BleedTracker::new(config.bleed),
            claims: DeathClaimCorrelator::new(config.claims),
        }
    }

    pub fn bleed(&self) -> &BleedTracker {
        &self.bleed
    }

    pub fn claims(&self) -> &DeathClaimCorrelator {
        &self.claims
    }

    // ========================================================================
    // Event pass
    // ========================================================================

    /// Feed a host damage event through the bleed gate.
    ///
    /// Effect-tick damage is ignored outright (the feedback-loop guard), as is
    /// damage from attackers whose held item does not inflict bleed. Returns
    /// whether a stack was applied.
    pub fn handle_damage(&self, event: &DamageEvent, items: &impl HeldItemProvider) -> bool {
        let attacker = match event.source {
            DamageSource::Attack { attacker } => attacker,
            DamageSource::EffectTick => return false,
        };
        let inflicts_bleed = items
            .held_item(attacker)
            .is_some_and(|item| items.applies_bleed(item));
        if !inflicts_bleed {
            return false;
        }
        self.bleed
            .add_stack(event.target, Some(attacker), event.amount, event.timestamp);
        true
    }

    /// Record a kill for later loot attribution.
    ///
    /// Rejected (no-op) for environmental deaths, deaths without a recorded
    /// position, or killers the host no longer recognizes. Also drops any
    /// bleed state the victim was carrying; dead targets do not tick.
    pub fn handle_death(&self, event: &DeathEvent, directory: &impl TargetDirectory) -> bool {
        if self.bleed.remove(event.victim) {
            debug!(victim = event.victim, "cleared bleed state on death");
        }
        let (Some(killer), Some(position)) = (event.killer, event.position()) else {
            return false;
        };
        if !directory.is_valid(killer) {
            debug!(
                victim = event.victim,
                killer, "death claim rejected: killer invalid"
            );
            return false;
        }
        self.claims
            .record_death(event.victim, position, killer, event.timestamp);
        true
    }

    // ========================================================================
    // Tick pass
    // ========================================================================

    /// Advance one target's bleed state and apply whatever it produced.
    ///
    /// `Ok(None)` means nothing was pending this tick. On a pending effect the
    /// damage goes out tagged [`DamageSource::EffectTick`], then lifesteal is
    /// paid to the attributed attacker if they are still valid and their held
    /// item grants a fraction. An attacker gone invalid does not block the
    /// damage application; only the payout is skipped.
    pub fn advance_target(
        &self,
        target: u64,
        dt: f32,
        now: f64,
        directory: &impl TargetDirectory,
        host: &impl CombatHost,
        items: &impl HeldItemProvider,
    ) -> Result<Option<AppliedTick>, EffectError> {
        if !directory.is_valid(target) {
            if self.bleed.remove(target) {
                debug!(entity = target, "dropped bleed state for invalid target");
            }
            return Err(EffectError::InvalidTarget);
        }

        let Some(effect) = self.bleed.advance(target, dt, now) else {
            return Ok(None);
        };

        let damage = effect.damage();
        host.apply_damage(target, damage, DamageSource::EffectTick);

        let mut applied = AppliedTick {
            target,
            damage,
            burst: effect.is_burst(),
            attacker: None,
            lifesteal: 0.0,
        };

        if let Some(attacker) = effect.attacker() {
            if directory.is_valid(attacker) {
                applied.attacker = Some(attacker);
                let fraction = items
                    .held_item(attacker)
                    .map_or(0.0, |item| items.lifesteal_fraction(item));
                if fraction > 0.0 {
                    let heal = damage as f32 * fraction;
                    host.add_health(attacker, heal);
                    applied.lifesteal = heal;
                }
            } else {
                debug!(attacker, "lifesteal skipped: attacker no longer valid");
            }
        }

        Ok(Some(applied))
    }

    /// Tick scan over every tracked target.
    ///
    /// A single target's failure never aborts the loop; invalid targets are
    /// dropped silently (already logged at debug by [`advance_target`]).
    pub fn advance_all(
        &self,
        dt: f32,
        now: f64,
        directory: &impl TargetDirectory,
        host: &impl CombatHost,
        items: &impl HeldItemProvider,
    ) -> Vec<AppliedTick> {
        let mut applied = Vec::new();
        for target in self.bleed.tracked_targets() {
            match self.advance_target(target, dt, now, directory, host, items) {
                Ok(Some(tick)) => applied.push(tick),
                Ok(None) => {}
                Err(EffectError::InvalidTarget) => {}
                Err(err) => debug!(entity = target, %err, "skipping target this tick"),
            }
        }
        applied
    }

    // ========================================================================
    // Loot scan
    // ========================================================================

    /// Attribute a freshly spawned loot object and, on a match, move its
    /// contents to the attacker and remove it from the world.
    ///
    /// `Ok(None)`: no claim matched (or the transfer was refused); the object
    /// stays for the host's default drop handling. `Err(NoAttributedAttacker)`:
    /// a claim matched but the attacker vanished between claim and transfer;
    /// the object is likewise left alone.
    pub fn handle_loot_spawn(
        &self,
        event: &LootSpawnEvent,
        directory: &impl TargetDirectory,
        loot: &impl LootHost,
    ) -> Result<Option<u64>, EffectError> {
        let claimed = self.claims.try_claim(
            event.object_id,
            event.position(),
            event.timestamp,
            |attacker| directory.is_live_player(attacker),
        );
        let Some(attacker) = claimed else {
            return Ok(None);
        };

        if !directory.is_valid(attacker) {
            debug!(
                object_id = event.object_id,
                attacker, "claim matched but attacker vanished before transfer"
            );
            return Err(EffectError::NoAttributedAttacker);
        }

        if !loot.transfer_to_player(event.object_id, attacker) {
            warn!(
                object_id = event.object_id,
                attacker, "loot transfer refused; object left in world"
            );
            return Ok(None);
        }
        loot.remove_object(event.object_id);
        Ok(Some(attacker))
    }

    /// Periodic housekeeping: expire claims and stale ledger entries even when
    /// no loot is spawning.
    pub fn maintain(&self, now: f64) {
        self.claims.prune(now);
    }
}

// ============================================================================
// Tests
// ============================================================================
