//! Death Claim Correlator — matches spawned loot back to the kill it came from
//!
//! The host gives us no foreign key between a death event and the loot object
//! it later spawns, so correlation is heuristic: a claim is recorded at the
//! death position, and a newly spawned object within [`MATCH_RADIUS`] of a
//! live claim inside its TTL window is attributed to that claim's attacker.
//! Ties between overlapping claims break oldest-first, so attribution
//! approximates FIFO fairness deterministically.
//!
//! Known limitation: two near-simultaneous deaths at the same spot can still
//! cross-attribute loot. Fixing that properly needs the host to pass a causal
//! id through object creation, which it cannot do today.
//!
//! A short-lived processed-object ledger guards against the host re-invoking
//! matching on the same tick data: an object handled at or after a claim's
//! creation time is never re-processed for that claim.

use bevy::math::Vec3;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// Tuning Constants
// ============================================================================

/// Seconds a recorded kill waits for its loot before expiring.
pub const CLAIM_TTL_SECS: f64 = 6.0;
/// Maximum distance (world units) between a death and its spawned loot.
pub const MATCH_RADIUS: f32 = 5.0;
/// Retention of processed-object ledger entries, independent of claim TTL.
pub const LEDGER_RETENTION_SECS: f64 = 30.0;

/// Correlation tuning knobs (defaults match the constants above).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClaimConfig {
    pub claim_ttl_secs: f64,
    pub match_radius: f32,
    pub ledger_retention_secs: f64,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            claim_ttl_secs: CLAIM_TTL_SECS,
            match_radius: MATCH_RADIUS,
            ledger_retention_secs: LEDGER_RETENTION_SECS,
        }
    }
}

// ============================================================================
// Data Model
// ============================================================================

/// A recent kill awaiting its dropped loot. Keyed by victim; consumed at most
/// once; removed on expiry or consumption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingDeathClaim {
    pub victim: u64,
    pub position: Vec3,
    pub attacker: u64,
    pub created_at: f64,
}

impl PendingDeathClaim {
    fn expired(&self, now: f64, ttl: f64) -> bool {
        now - self.created_at > ttl
    }
}

// ============================================================================
// Correlator
// ============================================================================

/// Concurrent registry of pending death claims plus the dedup ledger.
///
/// `record_death` runs on the death-event pass, `try_claim` on the loot scan;
/// both may land in the same time-slice. Claims are snapshotted under a read
/// lock, the caller-supplied eligibility predicate runs with no correlator
/// lock held, and consumption re-validates under the write lock so each claim
/// is consumed exactly once even under concurrent callers.
///
/// Caller-owned: construct one per simulation instance, drop on teardown.
pub struct DeathClaimCorrelator {
    claims: RwLock<HashMap<u64, PendingDeathClaim>>,
    /// object_id → last time the object was handled.
    ledger: Mutex<HashMap<u64, f64>>,
    config: ClaimConfig,
}

impl Default for DeathClaimCorrelator {
    fn default() -> Self {
        Self::new(ClaimConfig::default())
    }
}

impl DeathClaimCorrelator {
    pub fn new(config: ClaimConfig) -> Self {
        Self {
            claims: RwLock::new(HashMap::new()),
            ledger: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ClaimConfig {
        &self.config
    }

    /// Store a claim for `victim`'s death, overwriting any prior claim for the
    /// same victim (overwrite-latest: duplicate delivery of the same death is
    /// harmless). Validity of `attacker` is the caller's responsibility; the
    /// correlator only stores what it is given.
    pub fn record_death(&self, victim: u64, position: Vec3, attacker: u64, now: f64) {
        let claim = PendingDeathClaim {
            victim,
            position,
            attacker,
            created_at: now,
        };
        let replaced = self.claims.write().insert(victim, claim);
        if replaced.is_some() {
            debug!(victim, "death claim overwritten by newer kill");
        }
    }

    /// Attribute a newly spawned object to a pending claim, if one matches.
    ///
    /// Scans live claims within `match_radius` of `position`, oldest first.
    /// A claim whose attacker fails `eligible` is silently discarded. A claim
    /// whose window the object was already handled in is skipped, but later
    /// claims are still considered. On a match the object is marked handled at
    /// `now`, the claim is consumed, and its attacker returned.
    ///
    /// `eligible` is invoked with no correlator lock held and must not call
    /// back into this correlator.
    pub fn try_claim(
        &self,
        object_id: u64,
        position: Vec3,
        now: f64,
        eligible: impl Fn(u64) -> bool,
    ) -> Option<u64> {
        self.prune(now);

        // Snapshot matching claims; claims are tiny Copy records.
        let mut candidates: Vec<PendingDeathClaim> = {
            let claims = self.claims.read();
            claims
                .values()
                .filter(|claim| claim.position.distance(position) <= self.config.match_radius)
                .copied()
                .collect()
        };
        candidates.sort_by(|a, b| a.created_at.total_cmp(&b.created_at));

        for candidate in candidates {
            let attacker_eligible = eligible(candidate.attacker);

            let mut claims = self.claims.write();
            // Re-validate: another thread may have consumed or replaced this
            // claim since the snapshot.
            let live = match claims.get(&candidate.victim) {
                Some(claim) if claim.created_at == candidate.created_at => *claim,
                _ => continue,
            };

            if !attacker_eligible {
                claims.remove(&candidate.victim);
                debug!(
                    victim = candidate.victim,
                    attacker = candidate.attacker,
                    "discarding claim: attacker no longer eligible"
                );
                continue;
            }

            let mut ledger = self.ledger.lock();
            if ledger
                .get(&object_id)
                .is_some_and(|&handled_at| handled_at >= live.created_at)
            {
                // Already handled inside this claim's window; an overlapping
                // claim may still be unclaimed, keep scanning.
                continue;
            }

            ledger.insert(object_id, now);
            claims.remove(&candidate.victim);
            debug!(
                object_id,
                victim = live.victim,
                attacker = live.attacker,
                "loot object claimed"
            );
            return Some(live.attacker);
        }

        None
    }

    /// Drop expired claims and stale ledger entries. Also safe to call from a
    /// periodic maintenance pass on hosts that spawn loot rarely.
    pub fn prune(&self, now: f64) {
        let ttl = self.config.claim_ttl_secs;
        self.claims.write().retain(|_, claim| !claim.expired(now, ttl));
        let retention = self.config.ledger_retention_secs;
        self.ledger
            .lock()
            .retain(|_, handled_at| now - *handled_at <= retention);
    }

    /// Number of live claims (after caller-driven pruning; expired claims
    /// linger until the next `prune`/`try_claim`).
    pub fn pending_claims(&self) -> usize {
        self.claims.read().len()
    }

    /// Number of objects currently remembered by the dedup ledger.
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
