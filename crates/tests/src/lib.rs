//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 -> Dispatcher -> HTTP 收集端 e2e 测试
//! - 跨实例持久化恢复测试

#[cfg(test)]
mod contract_tests {
    use contracts::{decode_batch, encode_batch, storage_key_for, Event, STORAGE_KEY_SUFFIX};

    #[test]
    fn test_storage_key_layout() {
        assert_eq!(STORAGE_KEY_SUFFIX, "dispatcher_");
        assert_eq!(storage_key_for(None), "dispatcher_");
        assert_eq!(storage_key_for(Some("shop_user42")), "shop_user42_dispatcher_");
    }

    #[test]
    fn test_persisted_batch_is_json_array() {
        let raw = encode_batch(&[Event::named("view").with("n", 1)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!([{ "eventName": "view", "n": 1 }]));
        assert_eq!(decode_batch(&raw).unwrap().len(), 1);
    }
}

#[cfg(test)]
mod support {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    /// Local HTTP collector: one request per connection, bodies forwarded as JSON
    pub struct Collector {
        pub url: String,
        bodies: mpsc::UnboundedReceiver<Value>,
    }

    impl Collector {
        pub async fn start(status_line: &'static str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/postevent", listener.local_addr().unwrap());
            let (tx, bodies) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(body) = handle(stream, status_line).await {
                            let _ = tx.send(body);
                        }
                    });
                }
            });

            Self { url, bodies }
        }

        /// Next posted batch (panics after 5s)
        pub async fn next_batch(&mut self) -> Vec<Value> {
            let body = tokio::time::timeout(Duration::from_secs(5), self.bodies.recv())
                .await
                .expect("collector timed out")
                .expect("collector closed");
            match body {
                Value::Array(events) => events,
                other => panic!("batch is not an array: {other}"),
            }
        }

        /// True if nothing else was posted
        pub fn is_drained(&mut self) -> bool {
            self.bodies.try_recv().is_err()
        }
    }

    async fn handle(mut stream: TcpStream, status_line: &str) -> Option<Value> {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        let body = loop {
            let n = stream.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            raw.extend_from_slice(&buf[..n]);
            if let Some(body) = complete_body(&raw) {
                break body;
            }
        };

        let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        stream.write_all(response.as_bytes()).await.ok()?;
        serde_json::from_str(&body).ok()
    }

    fn complete_body(raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        let (head, body) = text.split_once("\r\n\r\n")?;
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        (body.len() >= length).then(|| body.to_string())
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        DispatcherSettings, Event, DISPATCHER_ID_FIELD, TIMESTAMP_FIELD, WINDOW_CLOSED_EVENT,
    };
    use dispatcher::{
        create_dispatcher, open_store, Dispatcher, ManualLifecycle, NoopLifecycle, SendOptions,
    };
    use observability::SessionAggregator;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::support::Collector;

    fn settings_for(endpoint: &str, dir: &TempDir, threshold: usize) -> DispatcherSettings {
        let toml = format!(
            r#"
batch_threshold = {threshold}
storage_key_prefix = "shop_user42"

[transport]
endpoint = "{endpoint}"

[storage]
kind = "file"
path = "{}"
"#,
            dir.path().display()
        );
        ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap()
    }

    fn start(settings: &DispatcherSettings) -> Dispatcher {
        let store = open_store(&settings.storage).unwrap();
        create_dispatcher(settings, store, Arc::new(NoopLifecycle::new())).unwrap()
    }

    fn persisted(dir: &TempDir) -> Option<serde_json::Value> {
        let raw = std::fs::read_to_string(dir.path().join("shop_user42_dispatcher_.json")).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Config file -> Dispatcher -> HTTP collector
    #[tokio::test]
    async fn test_threshold_batches_reach_collector() {
        let mut collector = Collector::start("HTTP/1.1 200 OK").await;
        let dir = TempDir::new().unwrap();
        let settings = settings_for(&collector.url, &dir, 2);
        let dispatcher = start(&settings);

        for n in 1..=3 {
            dispatcher.send_event(Event::named("page_view").with("n", n));
        }

        let batch = collector.next_batch().await;
        assert_eq!(batch.len(), 2);
        for (event, n) in batch.iter().zip(1..) {
            assert_eq!(event["n"], json!(n));
            assert_eq!(event[DISPATCHER_ID_FIELD], json!(dispatcher.get_instance_id()));
            assert!(event[TIMESTAMP_FIELD].is_i64());
        }

        // Only the third event is still pending, on disk too
        let pending = persisted(&dir).unwrap();
        assert_eq!(pending.as_array().unwrap().len(), 1);
        assert_eq!(pending[0]["n"], json!(3));

        assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);
        assert!(collector.is_drained());
    }

    #[tokio::test]
    async fn test_pending_batch_survives_restart() {
        let mut collector = Collector::start("HTTP/1.1 200 OK").await;
        let dir = TempDir::new().unwrap();
        let settings = settings_for(&collector.url, &dir, 10);

        let first = start(&settings);
        first.send_event(Event::named("add_to_cart").with("sku", "A-1"));
        first.send_event(Event::named("add_to_cart").with("sku", "B-2"));
        let first_id = first.get_instance_id().to_string();
        drop(first);

        let second = start(&settings);
        assert_ne!(second.get_instance_id(), first_id);
        assert_eq!(second.pending_events().len(), 2);
        assert_eq!(second.metrics().recovered_events, 2);
        // Recovered batch was taken off disk
        assert!(persisted(&dir).is_none());

        second.send_event_with(Event::named("checkout"), SendOptions::forceful());

        let batch = collector.next_batch().await;
        let skus: Vec<_> = batch.iter().map(|e| e["sku"].clone()).collect();
        assert_eq!(skus, vec![json!("A-1"), json!("B-2"), json!(null)]);
        assert_eq!(batch[0][DISPATCHER_ID_FIELD], json!(first_id));
        assert_eq!(batch[2][DISPATCHER_ID_FIELD], json!(second.get_instance_id()));

        // Forceful flush leaves the queue and its persisted copy in place
        assert_eq!(persisted(&dir).unwrap().as_array().unwrap().len(), 3);
        assert!(second.wait_idle(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_window_closed_persisted_for_next_run() {
        let collector = Collector::start("HTTP/1.1 200 OK").await;
        let dir = TempDir::new().unwrap();
        let settings = settings_for(&collector.url, &dir, 10);
        let lifecycle = Arc::new(ManualLifecycle::new());

        let store = open_store(&settings.storage).unwrap();
        let dispatcher = create_dispatcher(&settings, store, lifecycle.clone()).unwrap();
        dispatcher.send_event(Event::named("page_view"));
        lifecycle.trigger();
        drop(dispatcher);

        let next = start(&settings);
        let names: Vec<_> = next
            .pending_events()
            .iter()
            .map(|e| e.event_name().map(str::to_string))
            .collect();
        assert_eq!(
            names,
            vec![
                Some("page_view".to_string()),
                Some(WINDOW_CLOSED_EVENT.to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_batch_is_dropped() {
        let mut collector = Collector::start("HTTP/1.1 503 Service Unavailable").await;
        let dir = TempDir::new().unwrap();
        let settings = settings_for(&collector.url, &dir, 1);
        let dispatcher = start(&settings);

        dispatcher.send_event(Event::new().with("n", 1));
        dispatcher.send_event(Event::new().with("n", 2));

        let batch = collector.next_batch().await;
        assert_eq!(batch.len(), 1);
        assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);

        let snapshot = dispatcher.metrics();
        assert_eq!(snapshot.transport_failures, 1);
        assert_eq!(snapshot.queue_len, 1);
        assert_eq!(dispatcher.get_event_list()[0].get("n"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_unreachable_collector_does_not_block_sends() {
        // Port from a listener that is already gone
        let endpoint = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}/postevent", listener.local_addr().unwrap())
        };
        let dir = TempDir::new().unwrap();
        let dispatcher = start(&settings_for(&endpoint, &dir, 0));

        for n in 0..5 {
            dispatcher.send_event(Event::new().with("n", n));
        }
        assert_eq!(dispatcher.get_event_list().len(), 1);
        assert!(dispatcher.wait_idle(Duration::from_secs(10)).await);
        assert_eq!(dispatcher.metrics().transport_failures, 5);
    }

    #[tokio::test]
    async fn test_session_summary_from_dispatcher() {
        let mut collector = Collector::start("HTTP/1.1 200 OK").await;
        let dir = TempDir::new().unwrap();
        let dispatcher = start(&settings_for(&collector.url, &dir, 2));
        let mut session = SessionAggregator::new();

        for n in 0..3 {
            let event = Event::named("tick").with("n", n);
            session.record_line();
            session.record_sent(event.event_name(), 16);
            dispatcher.send_event(event);
        }
        collector.next_batch().await;
        assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);

        let summary = session.summary(dispatcher.metrics(), Duration::from_secs(1));
        assert_eq!(summary.events_sent, 3);
        assert_eq!(summary.dispatcher.batches_flushed, 1);
        assert!((summary.mean_batch_size() - 2.0).abs() < 1e-10);
        assert!(summary.to_string().contains("Pending events: 1"));
    }
}
