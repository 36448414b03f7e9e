//! Scripted backend and helpers shared by the engine suites.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bundlesync_core::BackendError;
use bundlesync_core::BundleBackend;
use bundlesync_core::BundleId;
use bundlesync_core::BundleSnapshot;
use bundlesync_core::EngineHandle;
use bundlesync_core::SyncEngine;
use bundlesync_core::SyncConfig;
use bundlesync_core::SyncObserver;
use bundlesync_core::protocol::ContentsInfo;
use bundlesync_core::protocol::JsonApiDocument;
use serde_json::Value;
use serde_json::json;
use tokio::sync::watch;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Status(u16),
    Network,
}

impl<T: Clone> Reply<T> {
    fn resolve(&self) -> Result<T, BackendError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Status(status) => Err(BackendError::Status {
                status: *status,
                message: format!("scripted {status}"),
            }),
            Reply::Network => Err(BackendError::network(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "scripted connection refused",
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Metadata,
    ContentsInfo,
    Summary,
}

#[derive(Default)]
struct BundleScript {
    /// Answers are consumed front to back; the last one repeats.
    metadata: VecDeque<Reply<Value>>,
    metadata_delay: Duration,
    /// `None` answers with an envelope that has no `data`.
    contents: Option<Reply<Value>>,
    contents_delay: Duration,
    summaries: HashMap<String, Reply<String>>,
}

#[derive(Default)]
struct FakeState {
    bundles: HashMap<String, BundleScript>,
    calls: Vec<(Call, String, String)>,
    in_flight: HashMap<Call, usize>,
    max_in_flight: HashMap<Call, usize>,
}

/// In-memory [`BundleBackend`] driven by per-bundle scripts.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_metadata(&self, id: &str, replies: Vec<Reply<Value>>) {
        self.with_script(id, |script| script.metadata = replies.into());
    }

    pub fn set_metadata_delay(&self, id: &str, delay: Duration) {
        self.with_script(id, |script| script.metadata_delay = delay);
    }

    pub fn set_contents(&self, id: &str, reply: Reply<Value>) {
        self.with_script(id, |script| script.contents = Some(reply));
    }

    pub fn set_contents_delay(&self, id: &str, delay: Duration) {
        self.with_script(id, |script| script.contents_delay = delay);
    }

    pub fn set_summary(&self, id: &str, path: &str, reply: Reply<String>) {
        self.with_script(id, |script| {
            script.summaries.insert(path.to_string(), reply);
        });
    }

    pub fn calls(&self, call: Call, id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(c, bundle, _)| *c == call && bundle == id)
            .count()
    }

    pub fn summary_paths(&self, id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(c, bundle, _)| *c == Call::Summary && bundle == id)
            .map(|(_, _, path)| path.clone())
            .collect()
    }

    pub fn max_in_flight(&self, call: Call) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_in_flight
            .get(&call)
            .copied()
            .unwrap_or_default()
    }

    fn with_script(&self, id: &str, f: impl FnOnce(&mut BundleScript)) {
        let mut state = self.state.lock().unwrap();
        f(state.bundles.entry(id.to_string()).or_default());
    }

    fn enter(&self, call: Call, id: &BundleId, path: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push((call, id.as_str().to_string(), path.to_string()));
        let current = {
            let counter = state.in_flight.entry(call).or_default();
            *counter += 1;
            *counter
        };
        let max = state.max_in_flight.entry(call).or_default();
        *max = (*max).max(current);
    }

    fn exit(&self, call: Call) {
        let mut state = self.state.lock().unwrap();
        if let Some(counter) = state.in_flight.get_mut(&call) {
            *counter -= 1;
        }
    }
}

#[async_trait]
impl BundleBackend for FakeBackend {
    async fn fetch_bundle(&self, bundle_id: &BundleId) -> Result<JsonApiDocument, BackendError> {
        self.enter(Call::Metadata, bundle_id, "");
        let (delay, reply) = {
            let mut state = self.state.lock().unwrap();
            match state.bundles.get_mut(bundle_id.as_str()) {
                Some(script) => {
                    let reply = if script.metadata.len() > 1 {
                        script.metadata.pop_front()
                    } else {
                        script.metadata.front().cloned()
                    };
                    (script.metadata_delay, reply)
                }
                None => (Duration::ZERO, None),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.exit(Call::Metadata);

        let body = reply.unwrap_or(Reply::Status(404)).resolve()?;
        serde_json::from_value(body).map_err(|err| BackendError::Decode(err.to_string()))
    }

    async fn fetch_contents_info(
        &self,
        bundle_id: &BundleId,
    ) -> Result<Option<ContentsInfo>, BackendError> {
        self.enter(Call::ContentsInfo, bundle_id, "");
        let (delay, reply) = self
            .state
            .lock()
            .unwrap()
            .bundles
            .get(bundle_id.as_str())
            .map(|script| (script.contents_delay, script.contents.clone()))
            .unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.exit(Call::ContentsInfo);

        match reply {
            None => Ok(None),
            Some(reply) => {
                let body = reply.resolve()?;
                serde_json::from_value(body)
                    .map(Some)
                    .map_err(|err| BackendError::Decode(err.to_string()))
            }
        }
    }

    async fn fetch_summary(&self, bundle_id: &BundleId, path: &str) -> Result<String, BackendError> {
        self.enter(Call::Summary, bundle_id, path);
        let reply = self
            .state
            .lock()
            .unwrap()
            .bundles
            .get(bundle_id.as_str())
            .and_then(|script| script.summaries.get(path).cloned());
        self.exit(Call::Summary);
        reply.unwrap_or(Reply::Status(404)).resolve()
    }
}

/// Observer that keeps every snapshot and counts keepalives.
#[derive(Default)]
pub struct RecordingObserver {
    snapshots: Mutex<Vec<BundleSnapshot>>,
    keepalives: Mutex<usize>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshots(&self) -> Vec<BundleSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn keepalives(&self) -> usize {
        *self.keepalives.lock().unwrap()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_snapshot(&self, snapshot: &BundleSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn on_keepalive(&self) {
        *self.keepalives.lock().unwrap() += 1;
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig::default()
}

pub fn poll_interval() -> Duration {
    test_config().poll_interval()
}

/// Wait (in virtual time) for a snapshot matching `pred`.
pub async fn wait_for(
    rx: &mut watch::Receiver<Arc<BundleSnapshot>>,
    pred: impl Fn(&BundleSnapshot) -> bool,
) -> Arc<BundleSnapshot> {
    let waited = tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&current) {
                    return Arc::clone(&current);
                }
            }
            rx.changed().await.expect("engine stopped");
        }
    })
    .await;
    waited.expect("timed out waiting for snapshot")
}

/// Let the driver run for `duration` of virtual time.
pub async fn run_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}

pub fn bundle_doc(id: &str, state: &str) -> Value {
    json!({
        "data": {
            "type": "bundles",
            "id": id,
            "attributes": {
                "uuid": id,
                "bundle_type": "run",
                "state": state,
                "metadata": { "name": format!("{id}-name") }
            },
            "relationships": {
                "owner": { "data": { "type": "users", "id": "u1" } }
            }
        },
        "included": [
            { "type": "users", "id": "u1", "attributes": { "user_name": "alice" } }
        ],
        "meta": {
            "editable_metadata_keys": ["name"],
            "metadata_type": { "name": "str" }
        }
    })
}

pub fn private_doc(id: &str) -> Value {
    json!({
        "data": {
            "type": "bundles",
            "id": id,
            "attributes": { "uuid": id, "bundle_type": "private" }
        }
    })
}

pub fn file_info() -> Value {
    json!({ "type": "file", "name": "", "size": 12 })
}

pub fn directory_info(entries: &[&str]) -> Value {
    let contents: Vec<Value> = entries
        .iter()
        .map(|name| json!({ "name": name, "type": "file" }))
        .collect();
    json!({ "type": "directory", "name": "", "contents": contents })
}

/// Spawn an engine over `backend` with default config and a recording observer.
pub fn spawn_engine(backend: &Arc<FakeBackend>) -> (EngineHandle, Arc<RecordingObserver>) {
    spawn_engine_with(backend, test_config())
}

pub fn spawn_engine_with(
    backend: &Arc<FakeBackend>,
    config: SyncConfig,
) -> (EngineHandle, Arc<RecordingObserver>) {
    let observer = RecordingObserver::new();
    let handle = SyncEngine::new(backend.clone(), config)
        .with_observer(observer.clone())
        .spawn();
    (handle, observer)
}
