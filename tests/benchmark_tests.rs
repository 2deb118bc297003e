//! Performance benchmarks for the arbitration hot paths

use client::replica::ReplicaStore;
use server::arbiter::OwnershipArbiter;
use server::guard::IdempotencyGuard;
use server::persistence::MemoryStore;
use server::round::RoundController;
use server::router::RequestRouter;
use server::spawner::ItemSpawner;
use server::world::World;
use shared::{CellId, CellUpdate, CellValue, Packet, ReplicatedCell, Request};
use std::time::Instant;

/// Benchmarks idempotent commits of distinct subjects
#[test]
fn benchmark_guard_commits() {
    let mut guard = IdempotencyGuard::new();

    let iterations: u64 = 100_000;
    let start = Instant::now();

    for subject in 0..iterations {
        assert!(guard.try_commit(subject));
        assert!(!guard.try_commit(subject));
    }

    let duration = start.elapsed();
    println!(
        "Guard commits: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(guard.len(), iterations as usize);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks grab/deny/release cycles on a populated arbiter
#[test]
fn benchmark_grab_release_cycle() {
    let mut arbiter = OwnershipArbiter::new();
    for resource_id in 0..100 {
        arbiter.register(resource_id);
    }

    let iterations = 50_000;
    let start = Instant::now();

    for i in 0..iterations {
        let resource_id = (i % 100) as u64;
        let _ = arbiter.request_grab(resource_id, 1);
        let _ = arbiter.request_grab(resource_id, 2);
        let _ = arbiter.request_release(resource_id, 1);
        arbiter.drain_events();
    }

    let duration = start.elapsed();
    println!(
        "Grab/deny/release: {} cycles in {:?} ({:.2} μs/cycle)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks observer-side application of versioned updates
#[test]
fn benchmark_cell_apply() {
    let mut cell = ReplicatedCell::observer(CellId::TimeRemaining, 0.0f32);

    let iterations: u64 = 200_000;
    let start = Instant::now();

    for version in 1..=iterations {
        let update = CellUpdate {
            cell: CellId::TimeRemaining,
            version,
            value: CellValue::Float(version as f32),
        };
        let _ = cell.apply_update(&update);
        // Stale duplicate
        let _ = cell.apply_update(&update);
    }

    let duration = start.elapsed();
    println!(
        "Cell apply: {} updates in {:?} ({:.2} ns/update)",
        iterations * 2,
        duration,
        duration.as_nanos() as f64 / (iterations * 2) as f64
    );

    assert_eq!(cell.version(), iterations);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks a busy round: many clients racing to score and grab
#[test]
fn benchmark_contended_round() {
    let mut world = World::new(RoundController::new(
        120.0,
        Box::new(MemoryStore::new(0)),
    ));
    let mut router = RequestRouter::new(ItemSpawner::seeded(500, 5, 42));
    let mut replica = ReplicaStore::new();

    let start = Instant::now();
    router.start_round(&mut world);

    let objects = world.objects();
    let mut dispatched = 0;
    for info in &objects {
        for client_id in 1..=8 {
            let out = router.route(
                &mut world,
                client_id,
                Request::Grab {
                    resource_id: info.object_id,
                },
            );
            dispatched += out.len();
        }
        for client_id in 1..=8 {
            let out = router.route(
                &mut world,
                client_id,
                Request::Score {
                    item_id: info.object_id,
                    category: info.category,
                },
            );
            for dispatch in out {
                if let server::router::Dispatch::Broadcast {
                    packet: Packet::CellUpdate(update),
                    ..
                } = dispatch
                {
                    let _ = replica.apply(&update);
                }
                dispatched += 1;
            }
        }
    }

    let duration = start.elapsed();
    println!(
        "Contended round: {} objects, {} dispatches in {:?}",
        objects.len(),
        dispatched,
        duration
    );

    let expected: u32 = objects.iter().map(|info| info.value).sum();
    assert_eq!(world.round().score(), expected);
    assert_eq!(replica.session().score, expected);
    assert_eq!(router.stats().scored, objects.len() as u64);
    assert!(duration.as_millis() < 2000);
}
