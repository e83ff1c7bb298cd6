use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only writer for the session's `events.jsonl`.
///
/// - default fields are `type`, `session_id`, `seq`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
/// - a disabled writer builds the same event values but writes nothing
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: Option<PathBuf>,
    session_id: String,
    seq: AtomicU64,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::build(Some(path.into()), session_id.into())
    }

    pub fn disabled(session_id: impl Into<String>) -> Self {
        Self::build(None, session_id.into())
    }

    fn build(path: Option<PathBuf>, session_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path,
                session_id,
                seq: AtomicU64::new(0),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("seq".to_string(), Value::Number(seq.into()));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(path) = self.inner.path.as_ref() else {
            return Ok(Value::Object(event));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
