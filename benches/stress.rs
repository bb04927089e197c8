use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};

use roombook::config::EngineConfig;
use roombook::directory::{DirectoryError, RoomDirectory, UserDirectory};
use roombook::engine::{BookingError, Collaborators, Engine};
use roombook::model::*;
use roombook::notify::{DeliveryError, Notifier};

const HOUR: Minutes = 60;

struct AnyRoom;

#[async_trait]
impl RoomDirectory for AnyRoom {
    async fn room(&self, id: RoomId) -> Result<Option<Room>, DirectoryError> {
        Ok(Some(Room {
            id,
            name: format!("Room {id}"),
            status: RoomStatus::Available,
        }))
    }
}

struct SmallRoster;

#[async_trait]
impl UserDirectory for SmallRoster {
    async fn roster(&self) -> Result<Vec<Contact>, DirectoryError> {
        Ok((1..=5)
            .map(|user_id| Contact {
                user_id,
                display_name: format!("user {user_id}"),
                address: format!("sms:{user_id}"),
            })
            .collect())
    }
}

struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _address: &str, _message: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

fn member(id: UserId) -> Principal {
    Principal {
        id,
        display_name: format!("user {id}"),
        phone: format!("sms:{id}"),
        role: Role::Member,
    }
}

/// The `i`-th one-hour slot counting from tomorrow 00:00, 24 per day.
fn slot(i: usize) -> (NaiveDate, TimeWindow) {
    let date = Local::now()
        .date_naive()
        .checked_add_days(Days::new(1 + (i / 24) as u64))
        .unwrap();
    let start = (i % 24) as Minutes * HOUR;
    (date, TimeWindow::new(start, start + HOUR))
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
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
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(engine: &Engine) {
    let n = 2000;
    let who = member(1);
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let (date, window) = slot(i);
        let t = Instant::now();
        engine
            .create_reservation(&who, 1, date, window, None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency", &mut latencies);
}

async fn phase2_concurrent(engine: Arc<Engine>) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let who = member(2);
            let room_id = 100 + task as RoomId;
            for j in 0..n_per_task {
                let (date, window) = slot(j);
                engine
                    .create_reservation(&who, room_id, date, window, None)
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contended(engine: Arc<Engine>) {
    let n_tasks = 50;
    let slots = 12;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            let who = member(3 + task as UserId % 3);
            for i in 0..slots {
                let (date, window) = slot(i);
                match engine.create_reservation(&who, 500, date, window, None).await {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(BookingError::SlotConflict { .. }) => lost.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    println!(
        "  {n_tasks} tasks racing for {slots} slots: {} won, {} conflicts in {:.2}s",
        won.load(Ordering::Relaxed),
        lost.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won.load(Ordering::Relaxed), slots);
}

async fn phase4_read_under_load(engine: Arc<Engine>) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let who = member(4);
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) {
                let (date, window) = slot(i);
                let _ = engine
                    .create_reservation(&who, 900 + w as RoomId, date, window, None)
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let (date, _) = slot(i % 48);
                let t = Instant::now();
                engine.free_windows(1, date, Some(HOUR)).await;
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("free-window query", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        Engine::open(
            &EngineConfig::with_data_dir(dir.path()),
            Collaborators {
                rooms: Arc::new(AnyRoom),
                users: Arc::new(SmallRoster),
                notifier: Arc::new(NullNotifier),
            },
        )
        .unwrap(),
    );

    println!("=== roombook stress benchmark ===");
    println!("data: {}\n", dir.path().display());

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(&engine).await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent(engine.clone()).await;

    println!("\n[phase 3] contended slots");
    phase3_contended(engine.clone()).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(engine.clone()).await;

    println!("\n=== done ===");
}
