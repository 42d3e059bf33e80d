//! End-to-End Effects Tests
//!
//! Drives the full pipeline against an in-memory host: weapon hit → bleed
//! stacks → periodic/burst damage → lifesteal payout, and kill → death claim
//! → loot spawn → inventory transfer + object removal. Ends with a
//! multi-thread stress pass over interleaved event/tick traffic.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tower_effects::{
    BleedConfig, ClaimConfig, CombatHost, DamageEvent, DamageSource, DeathEvent, EffectsConfig,
    EffectsRuntime, HeldItemProvider, LootHost, LootSpawnEvent, TargetDirectory,
};

const FANG_BLADE: u64 = 9_001;

// First caller wins; later tests just keep the installed subscriber.
fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tower_effects=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// In-memory stand-in for the simulation's entity store.
#[derive(Default)]
struct WorldStub {
    valid: Mutex<HashSet<u64>>,
    health: Mutex<HashMap<u64, f32>>,
    held: Mutex<HashMap<u64, u64>>,
    bleed_items: Mutex<HashSet<u64>>,
    lifesteal: Mutex<HashMap<u64, f32>>,
    damage_log: Mutex<Vec<(u64, u32, DamageSource)>>,
    transfers: Mutex<Vec<(u64, u64)>>,
    removed: Mutex<Vec<u64>>,
}

impl WorldStub {
    fn spawn(&self, entity: u64, health: f32) {
        self.valid.lock().insert(entity);
        self.health.lock().insert(entity, health);
    }

    fn equip_fang_blade(&self, entity: u64, lifesteal: f32) {
        self.held.lock().insert(entity, FANG_BLADE);
        self.bleed_items.lock().insert(FANG_BLADE);
        self.lifesteal.lock().insert(FANG_BLADE, lifesteal);
    }

    fn health_of(&self, entity: u64) -> f32 {
        self.health.lock().get(&entity).copied().unwrap_or(0.0)
    }
}

impl TargetDirectory for WorldStub {
    fn is_valid(&self, entity: u64) -> bool {
        self.valid.lock().contains(&entity)
    }
}

impl CombatHost for WorldStub {
    fn apply_damage(&self, target: u64, amount: u32, source: DamageSource) {
        self.damage_log.lock().push((target, amount, source));
        if let Some(health) = self.health.lock().get_mut(&target) {
            *health = (*health - amount as f32).max(0.0);
        }
    }

    fn add_health(&self, target: u64, amount: f32) {
        if let Some(health) = self.health.lock().get_mut(&target) {
            *health += amount;
        }
    }
}

impl LootHost for WorldStub {
    fn transfer_to_player(&self, object: u64, player: u64) -> bool {
        self.transfers.lock().push((object, player));
        true
    }

    fn remove_object(&self, object: u64) {
        self.removed.lock().push(object);
    }
}

impl HeldItemProvider for WorldStub {
    fn held_item(&self, entity: u64) -> Option<u64> {
        self.held.lock().get(&entity).copied()
    }

    fn lifesteal_fraction(&self, item: u64) -> f32 {
        self.lifesteal.lock().get(&item).copied().unwrap_or(0.0)
    }

    fn applies_bleed(&self, item: u64) -> bool {
        self.bleed_items.lock().contains(&item)
    }
}

fn hit(target: u64, attacker: u64, amount: f32, timestamp: f64) -> DamageEvent {
    DamageEvent {
        target,
        amount,
        source: DamageSource::Attack { attacker },
        timestamp,
    }
}

// ============================================================================
// Full Pipeline: Hit → Stacks → Ticks → Burst → Kill → Loot
// ============================================================================

#[test]
fn test_full_combat_to_loot_pipeline() {
    init_tracing();
    let world = WorldStub::default();
    world.spawn(1, 200.0); // attacker
    world.spawn(2, 100.0); // victim
    world.equip_fang_blade(1, 0.5);
    let rt = EffectsRuntime::default();

    // Three hits land in quick succession.
    for i in 0..3 {
        assert!(rt.handle_damage(&hit(2, 1, 10.0, i as f64 * 0.1), &world));
    }

    // One second of ticks: a periodic application of 3 × (10 × 0.20) = 6,
    // with 3 health stolen back at the 0.5 fraction.
    let mut applied = Vec::new();
    for step in 1..=10 {
        let now = 0.2 + step as f64 * 0.1;
        applied.extend(rt.advance_all(0.1, now, &world, &world, &world));
    }
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].damage, 6);
    assert_eq!(world.health_of(2), 94.0);
    assert_eq!(world.health_of(1), 203.0);

    // Two more hits fill the cap; the very next tick bursts for
    // round(10 × 1.5) = 15 and empties the stacks.
    rt.handle_damage(&hit(2, 1, 10.0, 1.3), &world);
    rt.handle_damage(&hit(2, 1, 10.0, 1.35), &world);
    let burst: Vec<_> = rt.advance_all(0.1, 1.4, &world, &world, &world);
    assert_eq!(burst.len(), 1);
    assert!(burst[0].burst);
    assert_eq!(burst[0].damage, 15);
    assert_eq!(rt.bleed().stack_count(2, 1.4), 0);

    // Every engine-applied packet carried the effect-tick marker; feeding the
    // log back through handle_damage must not re-stack anything.
    for &(target, amount, source) in world.damage_log.lock().iter() {
        assert!(source.is_effect_tick());
        let echoed = DamageEvent {
            target,
            amount: amount as f32,
            source,
            timestamp: 1.5,
        };
        assert!(!rt.handle_damage(&echoed, &world));
    }
    assert_eq!(rt.bleed().tracked_len(), 0);

    // The victim dies; its loot bag appears a beat later, two units away.
    world.valid.lock().remove(&2);
    rt.handle_death(
        &DeathEvent {
            victim: 2,
            killer: Some(1),
            position: Some([10.0, 0.0, 10.0]),
            timestamp: 1.5,
        },
        &world,
    );
    let spawn = LootSpawnEvent {
        object_id: 600,
        position: [12.0, 0.0, 10.0],
        timestamp: 2.0,
    };
    assert_eq!(rt.handle_loot_spawn(&spawn, &world, &world).unwrap(), Some(1));
    assert_eq!(world.transfers.lock().as_slice(), &[(600, 1)]);
    assert_eq!(world.removed.lock().as_slice(), &[600]);

    // Re-delivery of the same spawn event is a dedup no-op.
    assert_eq!(rt.handle_loot_spawn(&spawn, &world, &world).unwrap(), None);
    assert_eq!(world.removed.lock().len(), 1);
}

#[test]
fn test_duplicate_death_delivery_is_tolerated() {
    init_tracing();
    let world = WorldStub::default();
    world.spawn(1, 100.0);
    let rt = EffectsRuntime::default();
    let death = DeathEvent {
        victim: 2,
        killer: Some(1),
        position: Some([0.0; 3]),
        timestamp: 0.0,
    };
    assert!(rt.handle_death(&death, &world));
    assert!(rt.handle_death(&death, &world));
    assert_eq!(rt.claims().pending_claims(), 1);

    let spawn = LootSpawnEvent {
        object_id: 600,
        position: [0.0; 3],
        timestamp: 0.5,
    };
    assert_eq!(rt.handle_loot_spawn(&spawn, &world, &world).unwrap(), Some(1));
}

#[test]
fn test_two_kills_two_bags_fifo_attribution() {
    init_tracing();
    let world = WorldStub::default();
    world.spawn(1, 100.0);
    world.spawn(2, 100.0);
    let rt = EffectsRuntime::default();

    // Two players each score a kill at almost the same spot.
    for (victim, killer, t) in [(10, 1, 0.0), (11, 2, 0.3)] {
        rt.handle_death(
            &DeathEvent {
                victim,
                killer: Some(killer),
                position: Some([5.0, 0.0, 5.0]),
                timestamp: t,
            },
            &world,
        );
    }

    // Bags spawn in arbitrary order; the oldest claim resolves first.
    let bag = |object_id, t| LootSpawnEvent {
        object_id,
        position: [5.5, 0.0, 5.0],
        timestamp: t,
    };
    assert_eq!(
        rt.handle_loot_spawn(&bag(700, 1.0), &world, &world).unwrap(),
        Some(1)
    );
    assert_eq!(
        rt.handle_loot_spawn(&bag(701, 1.1), &world, &world).unwrap(),
        Some(2)
    );
}

#[test]
fn test_claim_outlives_nothing_past_ttl() {
    init_tracing();
    let world = WorldStub::default();
    world.spawn(1, 100.0);
    let rt = EffectsRuntime::new(EffectsConfig {
        bleed: BleedConfig::default(),
        claims: ClaimConfig {
            claim_ttl_secs: 5.0,
            ..ClaimConfig::default()
        },
    });
    rt.handle_death(
        &DeathEvent {
            victim: 2,
            killer: Some(1),
            position: Some([0.0; 3]),
            timestamp: 0.0,
        },
        &world,
    );

    let late = LootSpawnEvent {
        object_id: 600,
        position: [0.0; 3],
        timestamp: 6.0,
    };
    assert_eq!(rt.handle_loot_spawn(&late, &world, &world).unwrap(), None);
    assert!(world.transfers.lock().is_empty());
}

// ============================================================================
// Concurrency: no cross-talk between identities
// ============================================================================

#[test]
fn test_interleaved_stress_across_identities() {
    const WORKERS: u64 = 8;
    const IDS_PER_WORKER: u64 = 250;

    init_tracing();
    let world = Arc::new(WorldStub::default());
    let rt = Arc::new(EffectsRuntime::default());
    world.bleed_items.lock().insert(FANG_BLADE);

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let world = world.clone();
        let rt = rt.clone();
        handles.push(std::thread::spawn(move || {
            let base = 1_000 + worker * IDS_PER_WORKER;
            for i in 0..IDS_PER_WORKER {
                let attacker = base + i;
                let target = 100_000 + base + i;
                world.spawn(attacker, 100.0);
                world.spawn(target, 100.0);
                world.held.lock().insert(attacker, FANG_BLADE);

                // Event pass and tick pass interleaved on the same slice.
                for step in 0..5u32 {
                    let now = step as f64 * 0.1;
                    rt.handle_damage(&hit(target, attacker, 10.0, now), &*world);
                    let _ = rt.advance_target(target, 0.1, now, &*world, &*world, &*world);
                }

                rt.handle_death(
                    &DeathEvent {
                        victim: target,
                        killer: Some(attacker),
                        position: Some([i as f32 * 100.0, 0.0, worker as f32 * 100_000.0]),
                        timestamp: 0.5,
                    },
                    &*world,
                );
                let claimed = rt
                    .handle_loot_spawn(
                        &LootSpawnEvent {
                            object_id: 200_000 + base + i,
                            position: [i as f32 * 100.0, 0.0, worker as f32 * 100_000.0],
                            timestamp: 0.6,
                        },
                        &*world,
                        &*world,
                    )
                    .unwrap();
                // Claims are spatially isolated per identity, so attribution
                // must land on exactly this worker's attacker.
                assert_eq!(claimed, Some(attacker));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("stress worker panicked");
    }

    // Every spawned bag was claimed exactly once.
    assert_eq!(
        world.transfers.lock().len() as u64,
        WORKERS * IDS_PER_WORKER
    );
    assert_eq!(rt.claims().pending_claims(), 0);
}

#[test]
fn test_concurrent_add_and_advance_single_target() {
    // Event pass and tick pass hammer one entry; the cap invariant and the
    // empty-entry collector must hold up.
    init_tracing();
    let world = Arc::new(WorldStub::default());
    world.spawn(1, 100.0);
    world.spawn(2, 100.0);
    world.equip_fang_blade(1, 0.0);
    let rt = Arc::new(EffectsRuntime::default());

    let writer = {
        let (world, rt) = (world.clone(), rt.clone());
        std::thread::spawn(move || {
            for i in 0..2_000 {
                rt.handle_damage(&hit(2, 1, 10.0, i as f64 * 0.001), &*world);
            }
        })
    };
    let ticker = {
        let (world, rt) = (world.clone(), rt.clone());
        std::thread::spawn(move || {
            for i in 0..2_000 {
                let now = i as f64 * 0.001;
                let _ = rt.advance_target(2, 0.001, now, &*world, &*world, &*world);
                assert!(rt.bleed().stack_count(2, now) <= 5);
            }
        })
    };
    writer.join().unwrap();
    ticker.join().unwrap();

    // Drain: everything expires three seconds after the last hit.
    let _ = rt.advance_target(2, 0.1, 10.0, &*world, &*world, &*world);
    assert_eq!(rt.bleed().tracked_len(), 0);
}
