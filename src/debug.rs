use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Append-only JSONL trace of layout decisions. One file is shared by every
/// render of a renderer; each line carries the document label it belongs to.
#[derive(Clone)]
pub(crate) struct LayoutTrace {
    inner: Arc<Mutex<TraceState>>,
}

struct TraceState {
    writer: BufWriter<File>,
    /// Event counts per document label, so concurrent renders summarize
    /// only their own events.
    counters: BTreeMap<String, BTreeMap<String, u64>>,
}

impl LayoutTrace {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(TraceState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    /// Writes `event` as one line and bumps the counter named by its `type`
    /// for the document named by its `doc`.
    pub fn event(&self, event: Value) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        if let Some(kind) = event.get("type").and_then(Value::as_str) {
            let doc = event.get("doc").and_then(Value::as_str).unwrap_or_default();
            let entry = state
                .counters
                .entry(doc.to_string())
                .or_default()
                .entry(kind.to_string())
                .or_insert(0);
            *entry = entry.saturating_add(1);
        }
        let _ = writeln!(state.writer, "{event}");
    }

    /// Emits and clears the counters collected for `doc`.
    pub fn summary(&self, doc: &str) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        let counts = state.counters.remove(doc).unwrap_or_default();
        let line = json!({
            "type": "layout.summary",
            "doc": doc,
            "counts": counts,
        });
        let _ = writeln!(state.writer, "{line}");
        let _ = state.writer.flush();
    }
}
