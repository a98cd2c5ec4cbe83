//! HTTP adapters against an in-process directory/collector server
//!
//! The fake server records every collector request and answers with a
//! status the test can flip, so the whole failure -> queue -> drain path runs
//! over real HTTP.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use beacon_agent::delayed_slot_store::{DelayedSlotStore, DrainOutcome, SlotBatch};
use beacon_agent::delivery_client::{CollectorClient, SlotSink};
use beacon_agent::liveness_prober::NetworkProber;
use beacon_agent::registry_cache::{DirectorySource, HttpDirectoryClient, RegistryCache};
use beacon_agent::scheduler::{SampleOutcome, Scheduler};
use beacon_agent::state::ScheduleConfig;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct FakeBackend {
    collector_status: AtomicU16,
    received: Mutex<Vec<Value>>,
    directory_queries: Mutex<Vec<String>>,
}

impl FakeBackend {
    fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    fn set_status(&self, status: u16) {
        self.collector_status.store(status, Ordering::SeqCst);
    }
}

async fn process_data(
    State(backend): State<Arc<FakeBackend>>,
    Json(body): Json<Value>,
) -> StatusCode {
    backend.received.lock().unwrap().push(body);
    StatusCode::from_u16(backend.collector_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn cameras(
    State(backend): State<Arc<FakeBackend>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let site = params.get("site").cloned().unwrap_or_default();
    backend.directory_queries.lock().unwrap().push(site);
    Json(json!({
        "data": {
            "deviceData": [
                {"_id": "cam-a", "device_ip": "198.51.100.4", "device_local_IP": "", "device_channel": 1},
                {"_id": "cam-b", "device_ip": "198.51.100.5", "device_local_IP": "192.168.1.5", "device_channel": "2"}
            ]
        }
    }))
}

async fn spawn_backend(status: u16) -> (SocketAddr, Arc<FakeBackend>) {
    let backend = Arc::new(FakeBackend::default());
    backend.set_status(status);

    let app = Router::new()
        .route("/process_data", post(process_data))
        .route("/cameras", get(cameras))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, backend)
}

fn collector(addr: SocketAddr) -> CollectorClient {
    CollectorClient::new(
        &format!("http://{}/", addr),
        "wh-7",
        "proj-1",
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_collector_accepts_batch() {
    let (addr, backend) = spawn_backend(200).await;
    let client = collector(addr);

    let delivered = client
        .deliver(&SlotBatch::from([("wh-7", vec![1_700_000_000])]), true)
        .await;

    assert!(delivered);
    assert_eq!(
        backend.received(),
        vec![json!({
            "TIME_SLOTS": {"wh-7": [1_700_000_000]},
            "LIVE": true,
            "WAREHOUSE_ID": "wh-7",
            "PROJECT_ID": "proj-1"
        })]
    );
}

#[tokio::test]
async fn test_collector_non_200_is_failure() {
    let (addr, backend) = spawn_backend(503).await;
    let client = collector(addr);
    let batch = SlotBatch::from([("cam1", vec![1])]);

    assert!(!client.deliver(&batch, false).await);

    backend.set_status(201);
    assert!(!client.deliver(&batch, false).await);
    assert_eq!(backend.received().len(), 2);
}

#[tokio::test]
async fn test_collector_unreachable_is_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = collector(addr);
    assert!(!client.deliver(&SlotBatch::from([("cam1", vec![1])]), true).await);
}

#[tokio::test]
async fn test_directory_refresh_persists_snapshot() {
    let (addr, backend) = spawn_backend(200).await;
    let temp = TempDir::new().unwrap();
    let directory =
        HttpDirectoryClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();

    let records = directory.fetch_devices("wh-7").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(*backend.directory_queries.lock().unwrap(), vec!["wh-7".to_string()]);

    let cache = RegistryCache::open(
        "wh-7",
        Arc::new(directory),
        temp.path().join("device_details.json"),
        Some("admin:Secret@1".to_string()),
        Duration::from_secs(86_400),
    )
    .await;
    let snapshot = cache.refresh().await.unwrap();

    assert_eq!(
        snapshot.entities["cam-a"],
        "rtsp://admin:Secret@1@198.51.100.4:554/Streaming/Channels/102"
    );
    assert_eq!(
        snapshot.entities["cam-b"],
        "rtsp://admin:Secret@1@192.168.1.5:554/Streaming/Channels/202"
    );

    let persisted: Value =
        serde_json::from_slice(&std::fs::read(temp.path().join("device_details.json")).unwrap())
            .unwrap();
    assert_eq!(persisted["timestamp"], json!(snapshot.fetched_at.timestamp()));
    assert_eq!(persisted["deviceData"]["cam-a"], json!(snapshot.entities["cam-a"]));
}

#[tokio::test]
async fn test_outage_queues_then_drain_recovers() {
    let (addr, backend) = spawn_backend(500).await;
    let temp = TempDir::new().unwrap();

    let directory =
        HttpDirectoryClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
    let registry = Arc::new(
        RegistryCache::open(
            "wh-7",
            Arc::new(directory),
            temp.path().join("device_details.json"),
            None,
            Duration::from_secs(86_400),
        )
        .await,
    );
    let store = Arc::new(DelayedSlotStore::new(temp.path().join("delayed.json")));
    let client = Arc::new(collector(addr));

    let started_at = Utc::now() - ChronoDuration::hours(1);
    let scheduler = Scheduler::new(
        "wh-7",
        ScheduleConfig::default(),
        registry,
        Arc::new(NetworkProber::new()),
        store.clone(),
        client.clone(),
        Duration::from_millis(200),
    )
    .with_started_at(started_at);

    let first = started_at + ChronoDuration::minutes(15);
    let second = started_at + ChronoDuration::minutes(30);
    assert_eq!(scheduler.sample_tick_at(first).await, SampleOutcome::Queued { slots: 1 });
    assert_eq!(scheduler.sample_tick_at(second).await, SampleOutcome::Queued { slots: 1 });
    assert_eq!(
        store.load().await,
        SlotBatch::from([("wh-7", vec![first.timestamp(), second.timestamp()])])
    );

    // Still down: drain keeps everything
    assert_eq!(
        store.drain_and_deliver(client.as_ref()).await.unwrap(),
        DrainOutcome::Retained { entities: 1, slots: 2 }
    );

    backend.set_status(200);
    assert_eq!(
        store.drain_and_deliver(client.as_ref()).await.unwrap(),
        DrainOutcome::Delivered { entities: 1, slots: 2 }
    );
    assert!(store.load().await.is_empty());

    let last = backend.received().pop().unwrap();
    assert_eq!(last["LIVE"], json!(false));
    assert_eq!(
        last["TIME_SLOTS"]["wh-7"],
        json!([first.timestamp(), second.timestamp()])
    );
}
