//! In-process latency stress run: sequential fill, then contended storm.
//! Run with `cargo bench`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use roomcore::{
    BookingRequest, Engine, EngineConfig, EngineError, Identity, Ms, Role, Room, StaticCatalog,
    WalStore,
};

const HOUR: Ms = 3_600_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn bench_wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join("roomcore_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("stress_{}.wal", Ulid::new()));
    path
}

fn setup() -> (Arc<Engine>, Vec<Ulid>) {
    let store = Arc::new(WalStore::open(&bench_wal_path()).unwrap());
    let catalog = Arc::new(StaticCatalog::new());

    let capacities = [4u32, 4, 8, 8, 8, 10, 10, 12, 16, 20];
    let mut rooms = Vec::new();
    for (i, &cap) in capacities.iter().enumerate() {
        let id = Ulid::new();
        catalog.insert(Room {
            id,
            name: format!("room-{i}"),
            capacity: cap,
            facilities: BTreeSet::new(),
            location: None,
        });
        rooms.push(id);
    }
    println!("  created {} rooms", rooms.len());

    let engine = Arc::new(Engine::new(store, catalog, EngineConfig::default()));
    (engine, rooms)
}

fn request(room_id: Ulid, start: Ms, end: Ms) -> BookingRequest {
    BookingRequest {
        room_id,
        title: "bench".into(),
        start,
        end,
        attendees: 2,
        purpose: None,
    }
}

/// 2000 back-to-back bookings on one room, one at a time.
async fn phase1_sequential(engine: &Engine, room: Ulid) {
    let actor = Identity::new(Ulid::new(), "bench", Role::Member);
    let cancel = CancellationToken::new();
    let n = 2000i64;
    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();

    for i in 0..n {
        let s = i * HOUR;
        let t = Instant::now();
        engine
            .create_booking(request(room, s, s + HOUR), &actor, &cancel)
            .await
            .expect("sequential create failed");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    println!(
        "  phase 1: {} creates in {:.2}s ({:.0}/s)",
        n,
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("sequential create", &mut latencies);
}

/// Contended storm: many tasks fighting over a small slot grid across rooms.
async fn phase2_contended(engine: &Arc<Engine>, rooms: &[Ulid]) {
    let tasks = 256;
    let slots = 16i64;
    let start = Instant::now();

    let mut handles = Vec::with_capacity(tasks);
    for i in 0..tasks {
        let engine = engine.clone();
        let room = rooms[i % rooms.len()];
        let slot = (i as i64) % slots;
        handles.push(tokio::spawn(async move {
            let actor = Identity::new(Ulid::new(), format!("t{i}"), Role::Member);
            let cancel = CancellationToken::new();
            let s = slot * HOUR;
            let t = Instant::now();
            let result = engine
                .create_booking(request(room, s, s + HOUR), &actor, &cancel)
                .await;
            (t.elapsed(), result)
        }));
    }

    let mut latencies = Vec::with_capacity(tasks);
    let mut wins = 0usize;
    let mut conflicts = 0usize;
    for handle in handles {
        let (latency, result) = handle.await.unwrap();
        latencies.push(latency);
        match result {
            Ok(_) => wins += 1,
            Err(EngineError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error under contention: {e}"),
        }
    }

    let elapsed = start.elapsed();
    println!(
        "  phase 2: {tasks} contended creates in {:.2}s — {wins} won, {conflicts} conflicted",
        elapsed.as_secs_f64()
    );
    print_latency("contended create", &mut latencies);
}

fn main() {
    roomcore::observability::init_tracing();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        println!("setup:");
        let (engine, rooms) = setup();
        phase1_sequential(&engine, rooms[0]).await;
        phase2_contended(&engine, &rooms[1..]).await;
    });
}
