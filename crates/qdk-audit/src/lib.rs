//! Append-only activity log. Writes JSON Lines (one event per line) with
//! recursively sorted keys, so identical events always serialize to identical
//! bytes and the file diffs cleanly.
//!
//! The writer implements [`qdk_reset::ActivityLogger`], which is how the
//! scheduler and cleanup record their transitions. Operator-facing daemon
//! routes log through the same sink with the caller's address as origin.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use qdk_reset::activity::{normalize_origin, ActivityError, ActivityLogger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// One recorded activity entry, exactly as serialized to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Deterministic id: UUIDv5 over `(seq, actor_id, action, details)`.
    /// No RNG, so replaying the same log produces the same ids.
    pub event_id: Uuid,
    /// Position in this log file, starting at 0.
    pub seq: u64,
    /// 0 is the engine itself; positive ids are operator sessions.
    pub actor_id: i64,
    pub action: String,
    pub origin_ip: IpAddr,
    pub details: Value,
    pub ts_utc: DateTime<Utc>,
}

struct LogInner {
    path: PathBuf,
    /// Increments on every append. Restored from the existing file on open so
    /// a daemon restart continues the sequence instead of restarting it.
    seq: u64,
}

/// Append-only JSONL activity writer.
///
/// Interior mutability keeps [`ActivityLogger::log`] callable from `&self`
/// across tokio tasks; the mutex serializes both the seq bump and the file
/// append, so lines never interleave.
pub struct ActivityLog {
    inner: Mutex<LogInner>,
}

impl ActivityLog {
    /// Open (or create) the log at `path`, creating parent dirs, and resume
    /// the sequence counter from the lines already present.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        let seq = existing_line_count(&path)?;
        Ok(Self {
            inner: Mutex::new(LogInner { path, seq }),
        })
    }

    /// Append one event and return it as written.
    pub fn append(
        &self,
        actor_id: i64,
        action: &str,
        origin: &str,
        details: Value,
    ) -> Result<ActivityEvent> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let seq = inner.seq;
        let event = ActivityEvent {
            event_id: derive_event_id(seq, actor_id, action, &details),
            seq,
            actor_id,
            action: action.to_string(),
            origin_ip: normalize_origin(origin),
            details,
            ts_utc: Utc::now(),
        };

        let line = canonical_json_line(&event)?;
        append_line(&inner.path, &line)?;
        inner.seq += 1;

        Ok(event)
    }

    /// Number of events appended so far (next event's `seq`).
    pub fn seq(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .seq
    }
}

impl ActivityLogger for ActivityLog {
    fn log(
        &self,
        actor_id: i64,
        action: &str,
        origin: &str,
        details: Value,
    ) -> Result<(), ActivityError> {
        self.append(actor_id, action, origin, details)
            .map(|_| ())
            .map_err(|e| ActivityError::new(e.to_string()))
    }
}

/// Read every event back from a log file. Blank lines are skipped.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<ActivityEvent>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read activity log {:?}", path.as_ref()))?;
    let mut events = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let ev: ActivityEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse activity event at line {}", i + 1))?;
        events.push(ev);
    }
    Ok(events)
}

/// Deterministic event id. UUIDv5 keeps ids stable across replays while the
/// seq component keeps them unique within one log.
fn derive_event_id(seq: u64, actor_id: i64, action: &str, details: &Value) -> Uuid {
    let material = format!("{seq}:{actor_id}:{action}:{details}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes())
}

fn existing_line_count(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("read activity log {:?}", path))?;
    Ok(content.lines().filter(|l| !l.trim().is_empty()).count() as u64)
}

/// Write a single line to file (with trailing newline).
fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open activity log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write activity line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
/// One event == one JSON line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize activity event failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
