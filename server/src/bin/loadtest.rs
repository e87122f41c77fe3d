//! Load test for the 8-ball server.
//!
//! Spawns fake WebSocket clients that:
//! - Connect and join the matchmaking queue
//! - Shoot at a random angle whenever it is their turn
//! - Ping periodically to measure round-trip time
//! - Requeue after each match
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn, rounded up to even (default: 100)
//!   --duration S     Test duration in seconds (default: 30)
//!   --ping-rate R    Pings per second per client (default: 1.0)
//!   --url URL        Server URL (default: ws://127.0.0.1:3001/ws)

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::json;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Protocol types (minimal subset) ===

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ServerMsg {
    #[serde(rename = "hello")]
    Hello {},
    #[serde(rename = "queue_status")]
    QueueStatus {},
    #[serde(rename = "match_found")]
    MatchFound {
        #[serde(rename = "matchId")]
        match_id: String,
        seat: u8,
    },
    #[serde(rename = "match_ended")]
    MatchEnded {},
    #[serde(rename = "snapshot")]
    Snapshot { snapshot: Snapshot },
    #[serde(rename = "pong")]
    Pong {
        #[serde(rename = "clientTimeMs")]
        client_time_ms: f64,
    },
    #[serde(rename = "error")]
    Error {},
}

#[derive(Deserialize)]
struct Snapshot {
    tick: u64,
    state: SnapshotState,
}

#[derive(Deserialize)]
struct SnapshotState {
    phase: String,
    #[serde(rename = "currentPlayer")]
    current_player: u8,
}

fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    messages_received: AtomicU64,
    snapshots_received: AtomicU64,
    matches_found: AtomicU64,
    matches_ended: AtomicU64,
    shots_sent: AtomicU64,
    errors: AtomicU64,
    rtt_sum_ms: AtomicU64,
    rtt_count: AtomicU64,
}

struct Seated {
    match_id: String,
    seat: u8,
    last_shot_tick: Option<u64>,
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    ping_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let join = json!({ "type": "join_queue", "displayName": format!("bot-{}", client_id) });
    if ws.send(Message::Text(join.to_string().into())).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let ping_interval = if ping_rate > 0.0 {
        Duration::from_secs_f64(1.0 / ping_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut ping_timer = tokio::time::interval(ping_interval);
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut rng = StdRng::seed_from_u64(client_id as u64);
    let mut seated: Option<Seated> = None;
    let mut seq: u64 = 0;
    let test_end = Instant::now() + duration;

    loop {
        if Instant::now() >= test_end {
            break;
        }

        let outgoing = tokio::select! {
            _ = ping_timer.tick() => {
                Some(json!({ "type": "ping", "clientTimeMs": now_ms() }))
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        match serde_json::from_str::<ServerMsg>(&text) {
                            Ok(ServerMsg::MatchFound { match_id, seat }) => {
                                metrics.matches_found.fetch_add(1, Ordering::Relaxed);
                                seated = Some(Seated { match_id, seat, last_shot_tick: None });
                                None
                            }
                            Ok(ServerMsg::Snapshot { snapshot }) => {
                                metrics.snapshots_received.fetch_add(1, Ordering::Relaxed);
                                let mine = seated.as_mut().filter(|s| {
                                    s.seat == snapshot.state.current_player
                                        && matches!(snapshot.state.phase.as_str(), "aim" | "ball_in_hand")
                                        && s.last_shot_tick != Some(snapshot.tick)
                                });
                                mine.map(|s| {
                                    s.last_shot_tick = Some(snapshot.tick);
                                    seq += 1;
                                    metrics.shots_sent.fetch_add(1, Ordering::Relaxed);
                                    json!({
                                        "type": "shoot",
                                        "matchId": s.match_id,
                                        "seq": seq,
                                        "clientShotId": format!("{}-{}", client_id, seq),
                                        "aimAngleRad": rng.gen_range(-PI..PI),
                                        "power": rng.gen_range(0.2..1.0),
                                    })
                                })
                            }
                            Ok(ServerMsg::MatchEnded {}) => {
                                metrics.matches_ended.fetch_add(1, Ordering::Relaxed);
                                seated = None;
                                Some(json!({ "type": "join_queue" }))
                            }
                            Ok(ServerMsg::Pong { client_time_ms }) => {
                                let rtt = (now_ms() - client_time_ms).max(0.0);
                                metrics.rtt_sum_ms.fetch_add(rtt as u64, Ordering::Relaxed);
                                metrics.rtt_count.fetch_add(1, Ordering::Relaxed);
                                None
                            }
                            Ok(ServerMsg::Error {}) | Err(_) => {
                                metrics.errors.fetch_add(1, Ordering::Relaxed);
                                None
                            }
                            Ok(ServerMsg::Hello {}) | Ok(ServerMsg::QueueStatus {}) => None,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(Ok(_)) => None,
                }
            }
        };

        if let Some(out) = outgoing {
            if ws.send(Message::Text(out.to_string().into())).await.is_err() {
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut duration_secs: u64 = 30;
    let mut ping_rate: f64 = 1.0;
    let mut url = "ws://127.0.0.1:3001/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--ping-rate" => {
                i += 1;
                ping_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(1.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }
    num_clients += num_clients % 2;

    println!("=== 8-Ball Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Ping rate: {}/s per client", ping_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            run_client(client_id, url, ping_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }
            let m = &metrics_clone;
            println!(
                "[{:3}s] connected={}, msgs={}, snapshots={}, matches={}, shots={}, errors={}",
                elapsed,
                m.connected.load(Ordering::Relaxed),
                m.messages_received.load(Ordering::Relaxed),
                m.snapshots_received.load(Ordering::Relaxed),
                m.matches_found.load(Ordering::Relaxed),
                m.shots_sent.load(Ordering::Relaxed),
                m.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }
    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let msgs = metrics.messages_received.load(Ordering::Relaxed);
    let snapshots = metrics.snapshots_received.load(Ordering::Relaxed);
    let rtt_sum = metrics.rtt_sum_ms.load(Ordering::Relaxed);
    let rtt_count = metrics.rtt_count.load(Ordering::Relaxed);

    println!("Total messages received: {}", msgs);
    println!("Total snapshots: {}", snapshots);
    println!(
        "Matches found (per seat): {}",
        metrics.matches_found.load(Ordering::Relaxed)
    );
    println!(
        "Matches ended (per seat): {}",
        metrics.matches_ended.load(Ordering::Relaxed)
    );
    println!("Shots sent: {}", metrics.shots_sent.load(Ordering::Relaxed));
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));
    if rtt_count > 0 {
        println!("Average ping RTT: {}ms", rtt_sum / rtt_count);
    }
    println!(
        "Messages/sec (total): {:.0}",
        msgs as f64 / duration_secs.max(1) as f64
    );
}
