//! Postgres persistence for the queue engine.
//!
//! Free functions cover connection, migration and the small write surface the
//! companion counter app uses (registration, status moves). [`PgQueueStore`]
//! implements the [`qdk_reset::ResetStore`] trait on top of the same pool;
//! the rollover runs as one transaction so a mid-flight failure leaves the
//! live queue untouched.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use qdk_reset::store::{ResetStore, StoreError};
use qdk_schemas::{Customer, NewResetLogEntry, PurgeCounts, QueueStatus, RolloverCounts};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

pub const ENV_DB_URL: &str = "QDK_DATABASE_URL";

/// Connect to Postgres using QDK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='customers'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_customers_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_customers_table: bool,
}

// ---------------------------------------------------------------------------
// Registration surface (used by the counter app and by scenario tests)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub senior_citizen: bool,
    pub pregnant: bool,
    pub pwd: bool,
}

/// Insert a customer, claiming the next token atomically and bumping the
/// day's peak-length counter. Returns the new row id.
pub async fn insert_customer(pool: &PgPool, new: &NewCustomer) -> Result<i64> {
    let mut tx = pool.begin().await.context("insert_customer begin failed")?;

    let (token,): (i32,) = sqlx::query_as::<_, (i32,)>(
        r#"
        update daily_counters
        set next_token = next_token + 1,
            updated_at = now()
        where id
        returning next_token - 1
        "#,
    )
    .fetch_one(&mut *tx)
    .await
    .context("token counter update failed")?;

    let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into customers (name, token_number, senior_citizen, pregnant, pwd)
        values ($1, $2, $3, $4, $5)
        returning id
        "#,
    )
    .bind(&new.name)
    .bind(token)
    .bind(new.senior_citizen)
    .bind(new.pregnant)
    .bind(new.pwd)
    .fetch_one(&mut *tx)
    .await
    .context("insert_customer failed")?;

    sqlx::query(
        r#"
        update daily_counters
        set peak_queue_length = greatest(
                peak_queue_length,
                (select count(*)::int from customers
                 where status in ('waiting','serving','processing'))
            )
        where id
        "#,
    )
    .execute(&mut *tx)
    .await
    .context("peak counter update failed")?;

    tx.commit().await.context("insert_customer commit failed")?;
    Ok(id)
}

/// Move a customer to a new status. `served_at` is stamped on the first
/// transition into `serving` and never overwritten.
pub async fn set_customer_status(pool: &PgPool, id: i64, status: QueueStatus) -> Result<()> {
    let res = sqlx::query(
        r#"
        update customers
        set status = $2,
            served_at = case
                when $2 = 'serving' and served_at is null then now()
                else served_at
            end
        where id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .execute(pool)
    .await
    .context("set_customer_status failed")?;

    if res.rows_affected() == 0 {
        return Err(anyhow!("customer {id} not found"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ResetStore implementation
// ---------------------------------------------------------------------------

/// Postgres-backed reset store.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ResetStore for PgQueueStore {
    async fn reset_succeeded_on(&self, day: NaiveDate) -> Result<bool, StoreError> {
        let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
            "select exists (select 1 from reset_log where reset_date = $1 and success)",
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(exists)
    }

    async fn record_reset(&self, entry: &NewResetLogEntry) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            insert into reset_log (
              reset_date, success, error_detail, duration_ms,
              archived, carried_forward, processed
            ) values (
              $1, $2, $3, $4, $5, $6, $7
            )
            "#,
        )
        .bind(entry.reset_date)
        .bind(entry.success)
        .bind(&entry.error_detail)
        .bind(entry.duration_ms)
        .bind(entry.archived)
        .bind(entry.carried_forward)
        .bind(entry.processed)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) => {
                // The partial unique index rejects a second success for the
                // same date; preserve that meaning for the scheduler.
                if is_unique_constraint_violation(&e, "uq_reset_log_success_per_day") {
                    return Err(StoreError::DuplicateSuccess);
                }
                Err(classify(e))
            }
        }
    }

    async fn rollover_day(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RolloverCounts, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // Aggregate the closing day before any row moves. `processing` rows
        // count into the serving bucket: service has started for them.
        let agg = sqlx::query(
            r#"
            select
              count(*)                                                   as total,
              count(*) filter (where status = 'waiting')                 as waiting,
              count(*) filter (where status in ('serving','processing')) as serving,
              count(*) filter (where status = 'completed')               as completed,
              count(*) filter (where status = 'cancelled')               as cancelled,
              count(*) filter (where senior_citizen or pregnant or pwd)  as priority,
              coalesce(
                avg(extract(epoch from (served_at - created_at)))
                  filter (where served_at is not null),
                0
              )::bigint                                                  as avg_wait_secs
            from customers
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let total: i64 = agg.try_get("total").map_err(classify)?;
        let waiting: i64 = agg.try_get("waiting").map_err(classify)?;
        let serving: i64 = agg.try_get("serving").map_err(classify)?;
        let completed: i64 = agg.try_get("completed").map_err(classify)?;
        let cancelled: i64 = agg.try_get("cancelled").map_err(classify)?;
        let priority: i64 = agg.try_get("priority").map_err(classify)?;
        let avg_wait_secs: i64 = agg.try_get("avg_wait_secs").map_err(classify)?;

        // The insert path bumps the peak counter as rows arrive; take the
        // larger of that and the closing live length in case rows were
        // seeded around the counter.
        let (counter_peak,): (i32,) =
            sqlx::query_as::<_, (i32,)>("select peak_queue_length from daily_counters where id")
                .fetch_one(&mut *tx)
                .await
                .map_err(classify)?;
        let peak = counter_peak.max((waiting + serving) as i32);

        sqlx::query(
            r#"
            insert into daily_history (
              snapshot_date, total_customers, waiting, serving, completed,
              cancelled, priority_customers, avg_wait_secs, peak_queue_length,
              created_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            )
            "#,
        )
        .bind(day)
        .bind(total)
        .bind(waiting)
        .bind(serving)
        .bind(completed)
        .bind(cancelled)
        .bind(priority)
        .bind(avg_wait_secs)
        .bind(peak)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        // Move terminal rows into history in one statement so a row can
        // never be deleted without its archive copy landing.
        let archived = sqlx::query(
            r#"
            with moved as (
                delete from customers
                where status in ('completed','cancelled')
                returning id, token_number, name, status,
                          senior_citizen, pregnant, pwd, created_at, served_at
            )
            insert into customer_history (
              original_customer_id, archive_date, token_number, name, status,
              senior_citizen, pregnant, pwd, created_at, served_at
            )
            select id, $1, token_number, name, status,
                   senior_citizen, pregnant, pwd, created_at, served_at
            from moved
            "#,
        )
        .bind(day)
        .execute(&mut *tx)
        .await
        .map_err(classify)?
        .rows_affected() as i64;

        // Survivors keep id, token, flags, manual_position and created_at;
        // only the carried-forward marker changes.
        let carried_forward = sqlx::query(
            r#"
            update customers
            set carried_forward = true
            where status in ('waiting','serving','processing')
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(classify)?
        .rows_affected() as i64;

        sqlx::query(
            r#"
            update daily_counters
            set next_token = 1,
                peak_queue_length = 0,
                updated_at = $1
            where id
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        Ok(RolloverCounts {
            archived,
            carried_forward,
            processed: archived + carried_forward,
        })
    }

    async fn purge_history_before(&self, cutoff: NaiveDate) -> Result<PurgeCounts, StoreError> {
        // Each table is purged independently; if a later delete fails the
        // earlier ones stand and the next pass retries the rest.
        let snapshots = sqlx::query("delete from daily_history where snapshot_date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(classify)?
            .rows_affected() as i64;

        let customer_records = sqlx::query("delete from customer_history where archive_date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(classify)?
            .rows_affected() as i64;

        let reset_log = sqlx::query("delete from reset_log where reset_date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(classify)?
            .rows_affected() as i64;

        Ok(PurgeCounts {
            snapshots,
            customer_records,
            reset_log,
        })
    }

    async fn fetch_live_queue(&self) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query(
            r#"
            select
              id, name, token_number, status, senior_citizen, pregnant, pwd,
              manual_position, carried_forward, created_at, served_at
            from customers
            where status in ('waiting','serving')
            order by id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(row_to_customer).collect()
    }
}

fn row_to_customer(row: &PgRow) -> Result<Customer, StoreError> {
    let status_raw: String = row.try_get("status").map_err(classify)?;
    let status = status_raw
        .parse::<QueueStatus>()
        .map_err(StoreError::Data)?;

    Ok(Customer {
        id: row.try_get("id").map_err(classify)?,
        name: row.try_get("name").map_err(classify)?,
        token_number: row.try_get("token_number").map_err(classify)?,
        status,
        senior_citizen: row.try_get("senior_citizen").map_err(classify)?,
        pregnant: row.try_get("pregnant").map_err(classify)?,
        pwd: row.try_get("pwd").map_err(classify)?,
        manual_position: row.try_get("manual_position").map_err(classify)?,
        carried_forward: row.try_get("carried_forward").map_err(classify)?,
        created_at: row.try_get("created_at").map_err(classify)?,
        served_at: row.try_get("served_at").map_err(classify)?,
    })
}

/// Transport and pool problems are retryable outages; everything else is a
/// data-shape problem that retrying will not fix.
fn classify(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StoreError::Unavailable(e.to_string()),
        _ => StoreError::Data(e.to_string()),
    }
}

/// Detect a Postgres unique constraint violation by name.
fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some(constraint)
                // Postgres unique_violation is 23505. Not always present, but helps.
                || db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
