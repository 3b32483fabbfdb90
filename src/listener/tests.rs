//! Listener tests over real loopback sockets.

use super::*;
use crate::packet::encode;
use crate::storage::MemoryStore;
use crate::test_utils::{SlowStore, driving, full_sample};
use crate::types::TelemetrySample;
use futures::StreamExt;
use std::future::Future;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(3);

fn config(interval: Duration) -> ServerConfig {
    ServerConfig::new("127.0.0.1:0", interval)
}

/// Start `server` and wait until its socket is bound.
async fn start(server: &Arc<Server>) -> (SocketAddr, JoinHandle<Result<()>>) {
    let listener = server.clone();
    let handle = tokio::spawn(async move { listener.listen_and_process().await });
    let addr = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(addr) = server.addr() {
                break addr;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("server did not bind in time");
    (addr, handle)
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("bind client socket")
}

async fn send(socket: &UdpSocket, to: SocketAddr, sample: &TelemetrySample) {
    socket.send_to(&encode(sample), to).await.expect("send datagram");
}

/// Poll `check` until it holds or [`WAIT`] elapses.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn next_event<S>(events: &mut S) -> Option<RaceEvent>
where
    S: Stream<Item = RaceEvent> + Unpin,
{
    tokio::time::timeout(WAIT, events.next()).await.ok().flatten()
}

#[tokio::test]
async fn stopped_server_has_no_address() {
    let _ = tracing_subscriber::fmt::try_init();
    let server = Server::new(config(Duration::from_secs(5)), Arc::new(MemoryStore::new()));

    assert!(!server.running());
    assert!(server.addr().is_none());
    assert!(server.listeners().is_empty());
    server.shutdown(Duration::from_secs(1)).await.expect("shutdown of stopped server");
}

#[tokio::test]
async fn empty_address_uses_default() {
    let server = Server::new(config(Duration::from_secs(5)), Arc::new(MemoryStore::new()));
    assert_eq!(server.config().listen_addr, "127.0.0.1:0");

    let config = ServerConfig { listen_addr: String::new(), ..ServerConfig::default() };
    let server = Server::new(config, Arc::new(MemoryStore::new()));
    assert_eq!(server.config().listen_addr, DEFAULT_LISTEN_ADDR);
}

#[tokio::test]
async fn second_listen_is_rejected() {
    let _ = tracing_subscriber::fmt::try_init();
    let server = Arc::new(Server::new(config(Duration::from_secs(5)), Arc::new(MemoryStore::new())));
    let (_, handle) = start(&server).await;

    let err = server.listen_and_process().await.unwrap_err();
    assert!(matches!(err, TelemetryError::AlreadyRunning));
    assert!(server.running());

    server.shutdown(Duration::from_secs(1)).await.unwrap();
    let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(TelemetryError::ServerClosed)));
    assert!(!server.running());
    assert!(server.addr().is_none());
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let occupied = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = occupied.local_addr().unwrap();
    let server = Server::new(ServerConfig::new(addr.to_string(), Duration::from_secs(5)), Arc::new(MemoryStore::new()));

    let server = Arc::new(server);

    let err = server.listen_and_process().await.unwrap_err();

    assert!(matches!(err, TelemetryError::Bind { .. }));
    assert!(!server.running());
    assert!(server.addr().is_none());

    // A failed bind releases the start guard, so the port can be retried.
    drop(occupied);
    let (bound, handle) = start(&server).await;
    assert_eq!(bound, addr);

    server.shutdown(Duration::from_secs(1)).await.unwrap();
    let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(TelemetryError::ServerClosed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_listens_bind_once() {
    let server = Arc::new(Server::new(config(Duration::from_secs(5)), Arc::new(MemoryStore::new())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let listener = server.clone();
            tokio::spawn(async move { listener.listen_and_process().await })
        })
        .collect();

    // Every caller but one is turned away without touching the socket.
    assert!(eventually(|| async { handles.iter().filter(|h| h.is_finished()).count() == 7 }).await);
    let (finished, mut running): (Vec<_>, Vec<_>) = handles.into_iter().partition(|h| h.is_finished());
    for handle in finished {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TelemetryError::AlreadyRunning), "unexpected error: {err}");
    }
    assert!(server.running());
    assert!(server.addr().is_some());

    server.shutdown(Duration::from_secs(1)).await.unwrap();
    let winner = running.pop().unwrap();
    let result = tokio::time::timeout(WAIT, winner).await.unwrap().unwrap();
    assert!(matches!(result, Err(TelemetryError::ServerClosed)));
}

#[tokio::test]
async fn garbage_creates_no_session() {
    let store = Arc::new(MemoryStore::new());
    let server = Arc::new(Server::new(config(Duration::from_secs(5)), store.clone()));
    let (addr, _handle) = start(&server).await;
    let socket = client().await;

    socket.send_to(b"definitely not telemetry", addr).await.unwrap();
    socket.send_to(&[0u8; 100], addr).await.unwrap();
    // A well-formed datagram afterwards proves the earlier ones were consumed.
    let marker = client().await;
    send(&marker, addr, &driving(1.0, 1.0)).await;

    assert!(eventually(|| async { store.race_count().await == 1 }).await);
    assert_eq!(server.listeners(), vec![marker.local_addr().unwrap().to_string()]);

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn zero_timestamp_is_discarded() {
    let store = Arc::new(MemoryStore::new());
    let server = Arc::new(Server::new(config(Duration::from_secs(5)), store.clone()));
    let (addr, _handle) = start(&server).await;
    let socket = client().await;

    send(&socket, addr, &TelemetrySample { timestamp_ms: 0, ..full_sample(1) }).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(server.listeners().is_empty());
    assert_eq!(store.race_count().await, 0);

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn each_endpoint_gets_its_own_race() {
    let _ = tracing_subscriber::fmt::try_init();
    let store = Arc::new(MemoryStore::new());
    let server = Arc::new(Server::new(config(Duration::from_secs(5)), store.clone()));
    let (addr, handle) = start(&server).await;
    let (first, second) = (client().await, client().await);

    send(&first, addr, &full_sample(1)).await;
    send(&second, addr, &full_sample(1)).await;

    assert!(eventually(|| async { store.race_count().await == 2 }).await);
    assert_eq!(server.listeners().len(), 2);
    let races = store.select_races().await.unwrap();
    assert!(races.iter().all(|race| race.car_performance_index == 100 && race.in_progress));
    assert_ne!(races[0].session_id, races[1].session_id);

    server.shutdown(Duration::from_secs(2)).await.unwrap();

    assert!(server.listeners().is_empty());
    let races = store.select_races().await.unwrap();
    assert!(races.iter().all(|race| !race.in_progress && race.finished_at.is_some()));
    // Shutdown flushed the buffered samples.
    assert_eq!(store.sample_count().await, 2);
    assert!(tokio::time::timeout(WAIT, handle).await.is_ok());
}

#[tokio::test]
async fn checkpoint_then_idle_close() {
    let store = Arc::new(MemoryStore::new());
    let server = Arc::new(Server::new(config(Duration::from_millis(400)), store.clone()));
    let (addr, _handle) = start(&server).await;
    let socket = client().await;

    send(&socket, addr, &driving(1.0, 1.0)).await;
    assert!(eventually(|| async { store.race_count().await == 1 }).await);
    assert_eq!(store.sample_count().await, 0);

    // First tick flushes the sample, the second one finds the session idle.
    assert!(eventually(|| async { store.sample_count().await == 1 }).await);
    assert!(eventually(|| async { server.listeners().is_empty() }).await);
    // The session unregisters before it finishes the race.
    assert!(
        eventually(|| async {
            store.select_races().await.is_ok_and(|races| races.iter().all(|race| !race.in_progress))
        })
        .await
    );
    assert!(server.running());

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn race_events_are_streamed() {
    let server = Arc::new(Server::new(config(Duration::from_secs(5)), Arc::new(MemoryStore::new())));
    let mut events = Box::pin(server.race_events());
    let (addr, _handle) = start(&server).await;
    let socket = client().await;

    send(&socket, addr, &driving(1.0, 10.0)).await;
    send(&socket, addr, &driving(1.0, 0.5)).await;

    let started = next_event(&mut events).await.expect("started event");
    assert!(matches!(started, RaceEvent::Started(_)));
    let finished = next_event(&mut events).await.expect("finished event");
    assert!(matches!(&finished, RaceEvent::Finished(race) if race.id == started.race().id));
    let restarted = next_event(&mut events).await.expect("second started event");
    assert!(matches!(&restarted, RaceEvent::Started(race) if race.id != started.race().id));

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn slow_sessions_time_out_shutdown() {
    let store = Arc::new(SlowStore::new(Duration::from_secs(2)));
    let server = Arc::new(Server::new(config(Duration::from_secs(5)), store));
    let (addr, _handle) = start(&server).await;
    let socket = client().await;

    send(&socket, addr, &driving(1.0, 1.0)).await;
    assert!(eventually(|| async { server.listeners().len() == 1 }).await);

    let err = server.shutdown(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, TelemetryError::ShutdownTimeout { pending: 1, .. }));
    assert!(!server.running());
}

#[tokio::test]
async fn server_can_restart_after_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let server = Arc::new(Server::new(config(Duration::from_secs(5)), store.clone()));

    let (_, first) = start(&server).await;
    server.shutdown(Duration::from_secs(1)).await.unwrap();
    tokio::time::timeout(WAIT, first).await.unwrap().unwrap().unwrap_err();

    let (addr, _second) = start(&server).await;
    let socket = client().await;
    send(&socket, addr, &driving(1.0, 1.0)).await;

    assert!(eventually(|| async { store.race_count().await == 1 }).await);
    server.shutdown(Duration::from_secs(1)).await.unwrap();
}
