//! In-memory [`ResetStore`] with the same observable semantics as Postgres.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use qdk_reset::store::{ResetStore, StoreError};
use qdk_schemas::{
    Customer, CustomerHistoryRecord, DailyHistorySnapshot, NewResetLogEntry, PurgeCounts,
    QueueStatus, RolloverCounts,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Builder for one seeded customer row.
#[derive(Debug, Clone)]
pub struct CustomerSeed {
    name: String,
    status: QueueStatus,
    senior_citizen: bool,
    pregnant: bool,
    pwd: bool,
    manual_position: Option<i32>,
    carried_forward: bool,
    created_at: Option<DateTime<Utc>>,
    served_at: Option<DateTime<Utc>>,
}

impl CustomerSeed {
    /// A plain waiting customer with no priority flags.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: QueueStatus::Waiting,
            senior_citizen: false,
            pregnant: false,
            pwd: false,
            manual_position: None,
            carried_forward: false,
            created_at: None,
            served_at: None,
        }
    }

    pub fn status(mut self, status: QueueStatus) -> Self {
        self.status = status;
        self
    }

    pub fn senior(mut self) -> Self {
        self.senior_citizen = true;
        self
    }

    pub fn pregnant(mut self) -> Self {
        self.pregnant = true;
        self
    }

    pub fn pwd(mut self) -> Self {
        self.pwd = true;
        self
    }

    pub fn manual_position(mut self, pos: i32) -> Self {
        self.manual_position = Some(pos);
        self
    }

    pub fn carried_forward(mut self) -> Self {
        self.carried_forward = true;
        self
    }

    pub fn created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = Some(ts);
        self
    }

    pub fn served_at(mut self, ts: DateTime<Utc>) -> Self {
        self.served_at = Some(ts);
        self
    }
}

// ---------------------------------------------------------------------------
// Rollover gate
// ---------------------------------------------------------------------------

/// One-shot gate that parks the next rollover inside the store.
///
/// The store signals `wait_entered` once the rollover has started, then
/// blocks until the test calls [`RolloverGate::open`]. Both sides use stored
/// notify permits, so the order of waiter and signal does not matter.
pub struct RolloverGate {
    entered: Notify,
    release: Notify,
}

impl RolloverGate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    /// Wait until the gated rollover is in flight.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let the gated rollover finish.
    pub fn open(&self) {
        self.release.notify_one();
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct Inner {
    customers: Vec<Customer>,
    snapshots: Vec<DailyHistorySnapshot>,
    archive: Vec<CustomerHistoryRecord>,
    ledger: Vec<NewResetLogEntry>,
    next_id: i64,
    next_token: i32,
    peak: i32,
}

/// In-memory store double.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    gate: Mutex<Option<Arc<RolloverGate>>>,
    fail_rollovers: AtomicU32,
    rollover_calls: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                customers: Vec::new(),
                snapshots: Vec::new(),
                archive: Vec::new(),
                ledger: Vec::new(),
                next_id: 1,
                next_token: 1,
                peak: 0,
            }),
            gate: Mutex::new(None),
            fail_rollovers: AtomicU32::new(0),
            rollover_calls: AtomicU32::new(0),
        })
    }

    /// Insert a customer, claiming the next token and bumping the peak
    /// counter like the registration path does. Returns the row id.
    pub fn seed(&self, seed: CustomerSeed) -> i64 {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        let token = inner.next_token;
        inner.next_token += 1;

        inner.customers.push(Customer {
            id,
            name: seed.name,
            token_number: token,
            status: seed.status,
            senior_citizen: seed.senior_citizen,
            pregnant: seed.pregnant,
            pwd: seed.pwd,
            manual_position: seed.manual_position,
            carried_forward: seed.carried_forward,
            created_at: seed.created_at.unwrap_or_else(Utc::now),
            served_at: seed.served_at,
        });

        let live = inner
            .customers
            .iter()
            .filter(|c| !c.status.is_terminal())
            .count() as i32;
        inner.peak = inner.peak.max(live);
        id
    }

    /// Move a customer to a new status, stamping `served_at` on the first
    /// transition into serving. Unknown ids are ignored.
    pub fn set_status(&self, id: i64, status: QueueStatus) {
        let mut inner = lock(&self.inner);
        if let Some(c) = inner.customers.iter_mut().find(|c| c.id == id) {
            if status == QueueStatus::Serving && c.served_at.is_none() {
                c.served_at = Some(Utc::now());
            }
            c.status = status;
        }
    }

    /// Make the next `n` rollover attempts fail with an injected outage.
    pub fn fail_next_rollovers(&self, n: u32) {
        self.fail_rollovers.store(n, Ordering::SeqCst);
    }

    /// Make every rollover attempt fail.
    pub fn fail_all_rollovers(&self) {
        self.fail_rollovers.store(u32::MAX, Ordering::SeqCst);
    }

    /// Park the next rollover until the returned gate is opened.
    pub fn hold_next_rollover(&self) -> Arc<RolloverGate> {
        let gate = RolloverGate::new();
        *lock(&self.gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn rollover_calls(&self) -> u32 {
        self.rollover_calls.load(Ordering::SeqCst)
    }

    // -- Inspection ----------------------------------------------------------

    /// Every row in the live table, whatever its status.
    pub fn customers(&self) -> Vec<Customer> {
        lock(&self.inner).customers.clone()
    }

    pub fn snapshots(&self) -> Vec<DailyHistorySnapshot> {
        lock(&self.inner).snapshots.clone()
    }

    pub fn archived(&self) -> Vec<CustomerHistoryRecord> {
        lock(&self.inner).archive.clone()
    }

    pub fn ledger(&self) -> Vec<NewResetLogEntry> {
        lock(&self.inner).ledger.clone()
    }

    pub fn next_token(&self) -> i32 {
        lock(&self.inner).next_token
    }

    pub fn peak(&self) -> i32 {
        lock(&self.inner).peak
    }
}

#[async_trait]
impl ResetStore for MemoryStore {
    async fn reset_succeeded_on(&self, day: NaiveDate) -> Result<bool, StoreError> {
        Ok(lock(&self.inner)
            .ledger
            .iter()
            .any(|e| e.reset_date == day && e.success))
    }

    async fn record_reset(&self, entry: &NewResetLogEntry) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        if entry.success
            && inner
                .ledger
                .iter()
                .any(|e| e.reset_date == entry.reset_date && e.success)
        {
            return Err(StoreError::DuplicateSuccess);
        }
        inner.ledger.push(entry.clone());
        Ok(())
    }

    async fn rollover_day(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RolloverCounts, StoreError> {
        self.rollover_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_rollovers.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.fail_rollovers.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }

        // Park here if a gate is installed. The data mutex is not held yet,
        // so inspection and concurrent triggers stay responsive.
        let gate = lock(&self.gate).take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut inner = lock(&self.inner);

        // Same rule the unique snapshot-date constraint enforces in Postgres.
        if inner.snapshots.iter().any(|s| s.snapshot_date == day) {
            return Err(StoreError::Data(format!(
                "duplicate daily_history snapshot for {day}"
            )));
        }

        let rows = &inner.customers;
        let total = rows.len() as i64;
        let waiting = rows
            .iter()
            .filter(|c| c.status == QueueStatus::Waiting)
            .count() as i64;
        let serving = rows
            .iter()
            .filter(|c| matches!(c.status, QueueStatus::Serving | QueueStatus::Processing))
            .count() as i64;
        let completed = rows
            .iter()
            .filter(|c| c.status == QueueStatus::Completed)
            .count() as i64;
        let cancelled = rows
            .iter()
            .filter(|c| c.status == QueueStatus::Cancelled)
            .count() as i64;
        let priority = rows.iter().filter(|c| c.is_priority()).count() as i64;

        let waits: Vec<i64> = rows
            .iter()
            .filter_map(|c| c.served_at.map(|s| (s - c.created_at).num_seconds()))
            .collect();
        let avg_wait_secs = if waits.is_empty() {
            0
        } else {
            waits.iter().sum::<i64>() / waits.len() as i64
        };

        let peak = inner.peak.max((waiting + serving) as i32);
        inner.snapshots.push(DailyHistorySnapshot {
            snapshot_date: day,
            total_customers: total,
            waiting,
            serving,
            completed,
            cancelled,
            priority_customers: priority,
            avg_wait_secs,
            peak_queue_length: peak,
            created_at: now,
        });

        let customers = std::mem::take(&mut inner.customers);
        let mut kept = Vec::with_capacity(customers.len());
        let mut archived = 0i64;
        for mut c in customers {
            if c.status.is_terminal() {
                inner.archive.push(CustomerHistoryRecord {
                    original_customer_id: c.id,
                    archive_date: day,
                    token_number: c.token_number,
                    name: c.name,
                    status: c.status,
                    senior_citizen: c.senior_citizen,
                    pregnant: c.pregnant,
                    pwd: c.pwd,
                    created_at: c.created_at,
                    served_at: c.served_at,
                });
                archived += 1;
            } else {
                c.carried_forward = true;
                kept.push(c);
            }
        }
        let carried_forward = kept.len() as i64;
        inner.customers = kept;
        inner.next_token = 1;
        inner.peak = 0;

        Ok(RolloverCounts {
            archived,
            carried_forward,
            processed: archived + carried_forward,
        })
    }

    async fn purge_history_before(&self, cutoff: NaiveDate) -> Result<PurgeCounts, StoreError> {
        let mut inner = lock(&self.inner);

        let before = inner.snapshots.len();
        inner.snapshots.retain(|s| s.snapshot_date >= cutoff);
        let snapshots = (before - inner.snapshots.len()) as i64;

        let before = inner.archive.len();
        inner.archive.retain(|r| r.archive_date >= cutoff);
        let customer_records = (before - inner.archive.len()) as i64;

        let before = inner.ledger.len();
        inner.ledger.retain(|e| e.reset_date >= cutoff);
        let reset_log = (before - inner.ledger.len()) as i64;

        Ok(PurgeCounts {
            snapshots,
            customer_records,
            reset_log,
        })
    }

    async fn fetch_live_queue(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(lock(&self.inner)
            .customers
            .iter()
            .filter(|c| matches!(c.status, QueueStatus::Waiting | QueueStatus::Serving))
            .cloned()
            .collect())
    }
}
