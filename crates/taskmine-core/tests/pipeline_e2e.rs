//! End-to-end capture pipeline: agent → delivery channel → relay → store.

use std::sync::Arc;
use std::time::Duration;

use taskmine_core::agent::CaptureAgent;
use taskmine_core::channel;
use taskmine_core::config::{CaptureConfig, Config, HeartbeatConfig, StorageConfig};
use taskmine_core::digest::sha256_hex;
use taskmine_core::dom::{MemoryDocument, MemoryPage, PageSnapshot};
use taskmine_core::normalize::Pointer;
use taskmine_core::record::{EventData, EventKind, EventRecord, HeartbeatData};
use taskmine_core::relay::{self, RelayStats};
use taskmine_core::store::{ChangeNotice, SharedStore};
use tempfile::TempDir;

struct Pipeline {
    _dir: TempDir,
    store: Arc<SharedStore>,
    agent: CaptureAgent<MemoryPage>,
    relay: tokio::task::JoinHandle<RelayStats>,
}

fn config(dir: &TempDir) -> Config {
    Config {
        heartbeat: HeartbeatConfig {
            enabled: false,
            ..HeartbeatConfig::default()
        },
        storage: StorageConfig {
            db_path: dir.path().join("events.db"),
            ..StorageConfig::default()
        },
        ..Config::default()
    }
}

fn pipeline(config: &Config, dir: TempDir) -> Pipeline {
    let store = Arc::new(SharedStore::new(config.storage.clone()));
    let (tx, rx) = channel::channel(config.delivery.channel_capacity);
    let relay = tokio::spawn(relay::run(rx, Arc::clone(&store)));
    let page = Arc::new(MemoryPage::new(PageSnapshot::new(
        "https://crm.example.com/leads",
        "Leads",
    )));
    let agent = CaptureAgent::new(page, config, tx);
    Pipeline {
        _dir: dir,
        store,
        agent,
        relay,
    }
}

fn seed_record() -> EventRecord {
    EventRecord::new(
        &PageSnapshot::new("https://crm.example.com/", "Home"),
        1,
        EventData::Heartbeat(HeartbeatData::default()),
    )
}

#[tokio::test]
async fn click_on_button_is_persisted_with_fresh_id() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let Pipeline {
        _dir,
        store,
        agent,
        relay,
    } = pipeline(&cfg, dir);

    let prior = store.append(seed_record()).await.unwrap();

    let doc = MemoryDocument::new();
    let button = doc.body().append_element("button");
    button.set_attribute("id", "go").set_text("Go");
    agent.on_click(Some(&button), Pointer { x: 10.0, y: 20.0, button: 0 });
    drop(agent);

    let stats = relay.await.unwrap();
    assert_eq!(stats.appended, 1);
    assert_eq!(stats.failed, 0);

    let handle = store.handle().await.unwrap();
    let latest = handle.recent(1).await.unwrap().pop().unwrap();
    assert!(latest.id > prior);
    assert_eq!(latest.record.event, EventKind::Click);
    let EventData::Click(data) = latest.record.data else {
        panic!("expected click payload");
    };
    assert_eq!(data.element.selector.as_deref(), Some("#go"));
    assert_eq!(data.x, 10.0);
    assert_eq!(data.y, 20.0);
}

#[tokio::test]
async fn rapid_inputs_persist_one_record_with_final_length() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let Pipeline {
        _dir,
        store,
        agent,
        relay,
    } = pipeline(&cfg, dir);

    let doc = MemoryDocument::new();
    let field = doc.body().append_element("input");
    field.set_attribute("name", "company");
    field.set_value("Acme");
    agent.on_input(Some(&field));
    tokio::time::sleep(Duration::from_millis(20)).await;
    field.set_value("Acme Corp");
    agent.on_input(Some(&field));
    drop(agent);

    let stats = relay.await.unwrap();
    assert_eq!(stats.appended, 1);

    let handle = store.handle().await.unwrap();
    let events = handle.recent(10).await.unwrap();
    assert_eq!(events.len(), 1);
    let EventData::Input(data) = &events[0].record.data else {
        panic!("expected input payload");
    };
    assert_eq!(data.input.length, "Acme Corp".len());
    assert_eq!(data.field_name, "company");
    assert!(data.input.hash.is_none());
}

#[tokio::test]
async fn opt_in_capture_persists_digest_not_value() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir);
    cfg.capture = CaptureConfig {
        capture_input_value: true,
        ..CaptureConfig::default()
    };
    let Pipeline {
        _dir,
        store,
        agent,
        relay,
    } = pipeline(&cfg, dir);

    let doc = MemoryDocument::new();
    let field = doc.body().append_element("input");
    field.set_attribute("type", "password").set_value("hunter2");
    agent.on_change(Some(&field));
    drop(agent);
    relay.await.unwrap();

    let handle = store.handle().await.unwrap();
    let stored = handle.recent(1).await.unwrap().pop().unwrap();
    let EventData::Input(data) = &stored.record.data else {
        panic!("expected input payload");
    };
    assert_eq!(data.input.hash.as_deref(), Some(sha256_hex("hunter2").as_str()));
    assert_eq!(data.field_type, "password");
    let json = serde_json::to_string(&stored).unwrap();
    assert!(!json.contains("hunter2"));
}

#[tokio::test]
async fn subscribers_get_one_notice_per_append() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let Pipeline {
        _dir,
        store,
        agent,
        relay,
    } = pipeline(&cfg, dir);
    let mut notices = store.subscribe();

    agent.on_page_load();
    agent.on_history_change();
    drop(agent);
    let stats = relay.await.unwrap();
    assert_eq!(stats.appended, 2);

    assert_eq!(notices.recv().await.unwrap(), ChangeNotice::REFRESH);
    assert_eq!(notices.recv().await.unwrap(), ChangeNotice::REFRESH);
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn ids_follow_arrival_not_timestamps() {
    let dir = TempDir::new().unwrap();
    let store = SharedStore::new(config(&dir).storage);
    let page = PageSnapshot::new("https://crm.example.com/", "Home");
    let late = EventRecord::new(&page, 2_000, EventData::Heartbeat(HeartbeatData::default()));
    let early = EventRecord::new(&page, 1_000, EventData::Heartbeat(HeartbeatData::default()));

    let first = store.append(late).await.unwrap();
    let second = store.append(early).await.unwrap();
    assert!(second > first);

    let handle = store.handle().await.unwrap();
    let events = handle.since(0, 10).await.unwrap();
    let timestamps: Vec<i64> = events.iter().map(|e| e.record.timestamp).collect();
    assert_eq!(timestamps, vec![2_000, 1_000]);
}
