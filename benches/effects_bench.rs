//! Benchmarks for the bleed tracker and death claim correlator hot paths.
//!
//! Both run once per damage event / loot spawn on the server tick, so they
//! need to stay comfortably sub-microsecond at realistic registry sizes.

use bevy::math::Vec3;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tower_effects::{BleedTracker, ClaimConfig, DeathClaimCorrelator};

fn bench_bleed_tracker(c: &mut Criterion) {
    let mut group = c.benchmark_group("bleed_tracker");

    group.bench_function("add_stack_hot_entry", |b| {
        let tracker = BleedTracker::default();
        let mut now = 0.0f64;
        b.iter(|| {
            now += 0.01;
            tracker.add_stack(black_box(42), Some(7), 20.0, now);
        });
    });

    group.bench_function("advance_1000_targets", |b| {
        let tracker = BleedTracker::default();
        for target in 0..1_000u64 {
            tracker.add_stack(target, Some(7), 20.0, 0.0);
        }
        b.iter(|| {
            for target in 0..1_000u64 {
                black_box(tracker.advance(target, 0.05, 0.5));
            }
        });
    });

    group.finish();
}

fn bench_claim_correlator(c: &mut Criterion) {
    let mut group = c.benchmark_group("claim_correlator");

    group.bench_function("try_claim_100_pending", |b| {
        let correlator = DeathClaimCorrelator::new(ClaimConfig {
            claim_ttl_secs: 1_000_000.0, // keep claims alive for the whole run
            ..ClaimConfig::default()
        });
        for victim in 0..100u64 {
            let pos = Vec3::new(victim as f32 * 50.0, 0.0, 0.0);
            correlator.record_death(victim, pos, victim + 1_000, 0.0);
        }
        // Miss case: far from every claim, exercises the full scan.
        b.iter(|| {
            black_box(correlator.try_claim(
                black_box(9_999),
                Vec3::new(-500.0, 0.0, 0.0),
                1.0,
                |_| true,
            ))
        });
    });

    group.bench_function("record_death_overwrite", |b| {
        let correlator = DeathClaimCorrelator::default();
        let mut now = 0.0f64;
        b.iter(|| {
            now += 0.01;
            correlator.record_death(black_box(42), Vec3::ZERO, 7, now);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_bleed_tracker, bench_claim_correlator);
criterion_main!(benches);
