//! SQLite-backed token sequencer and record store.
//!
//! Token numbers come from a single-row `token_sequence` table. A submission
//! increments that row and inserts its record inside one write transaction,
//! so:
//!
//! - the write lock is held from the moment the counter is read until the
//!   record is committed, and two submitters can never observe the same value;
//! - a failed insert rolls the increment back and no token is consumed;
//! - the counter survives restarts and is shared by every process opening the
//!   same database file.
//!
//! Within one process submissions are additionally funnelled through an async
//! mutex so that concurrent callers queue on the runtime instead of spinning
//! in SQLite's busy handler. Reads (`peek_next_token`, `list`, `stats`) never
//! take that mutex.

use crate::{Error, NewServiceRequest, RequestFilter, Result, ServiceRequest, Stats, Status};
use chrono::{DateTime, Utc};
use core::{str::FromStr, time::Duration};
use sqlx::{
    FromRow, SqliteConnection,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
};
use std::{path::Path, sync::Arc};
use tokio::sync::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;
use uuid::Uuid;

/// Connection settings for [`SqliteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long a writer waits on another process holding the database lock
    /// before failing with [`Error::StoreUnavailable`].
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Durable record store that owns the token sequence.
///
/// Cheap to clone; clones share the connection pool and the writer lock.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl SqliteStore {
    /// Connects to a database URL such as `sqlite://service_tokens.db`,
    /// creating the file if needed, and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the URL is invalid, the database
    /// cannot be opened or migrations fail.
    pub async fn connect(url: &str, options: StoreOptions) -> Result<Self> {
        let connect = SqliteConnectOptions::from_str(url)?;
        Self::with_connect_options(connect, options).await
    }

    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// See [`SqliteStore::connect`].
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let connect = SqliteConnectOptions::new().filename(path);
        Self::with_connect_options(connect, options).await
    }

    async fn with_connect_options(
        connect: SqliteConnectOptions,
        options: StoreOptions,
    ) -> Result<Self> {
        let connect = connect
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Returns the token a submission committed right now would receive.
    ///
    /// Advisory only: another submission may commit first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store cannot be reached.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn peek_next_token(&self) -> Result<u64> {
        let next: i64 =
            sqlx::query_scalar("SELECT last_value + 1 FROM token_sequence WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        to_u64(next, "token_sequence.last_value")
    }

    /// Validates `request`, assigns the next token and persists the record.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if any field is missing or malformed. No token
    ///   is consumed.
    /// - [`Error::StoreUnavailable`] if the write fails. The transaction is
    ///   rolled back and no token is consumed.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn submit(&self, request: NewServiceRequest) -> Result<ServiceRequest> {
        let request = request.validate()?;

        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        // The increment is the first statement so the write lock is taken
        // before the counter value is read.
        let token: i64 = sqlx::query_scalar(
            "UPDATE token_sequence SET last_value = last_value + 1 WHERE id = 1 \
             RETURNING last_value",
        )
        .fetch_one(&mut *tx)
        .await?;

        let now = Utc::now();
        let row: RequestRow = sqlx::query_as(
            "INSERT INTO service_requests \
             (id, token_number, name, email, address, contact_number, work_description, \
              status, reminder_sent, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?) \
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(token)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.address)
        .bind(&request.contact_number)
        .bind(&request.work_description)
        .bind(Status::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(token, "assigned token");

        row.try_into()
    }

    /// Returns every record matching `filter`, in ascending token order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store cannot be reached.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<ServiceRequest>> {
        let rows: Vec<RequestRow> =
            sqlx::query_as("SELECT * FROM service_requests ORDER BY token_number")
                .fetch_all(&self.pool)
                .await?;
        let requests = rows
            .into_iter()
            .map(ServiceRequest::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(filter.apply(requests))
    }

    /// Looks up a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store cannot be reached.
    pub async fn get(&self, id: Uuid) -> Result<Option<ServiceRequest>> {
        sqlx::query_as::<_, RequestRow>("SELECT * FROM service_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(ServiceRequest::try_from)
            .transpose()
    }

    /// Looks up a record by its token number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store cannot be reached.
    pub async fn find_by_token(&self, token_number: u64) -> Result<Option<ServiceRequest>> {
        let Ok(token_number) = i64::try_from(token_number) else {
            return Ok(None);
        };
        sqlx::query_as::<_, RequestRow>("SELECT * FROM service_requests WHERE token_number = ?")
            .bind(token_number)
            .fetch_optional(&self.pool)
            .await?
            .map(ServiceRequest::try_from)
            .transpose()
    }

    /// Sets the status of record `id` and returns the updated record.
    ///
    /// Setting the current status is a no-op that leaves `updated_at`
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no record has this id.
    /// - [`Error::StoreUnavailable`] if the write fails.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn update_status(&self, id: Uuid, status: Status) -> Result<ServiceRequest> {
        let row: Option<RequestRow> = sqlx::query_as(
            "UPDATE service_requests \
             SET updated_at = CASE WHEN status = ? THEN updated_at ELSE ? END, status = ? \
             WHERE id = ? \
             RETURNING *",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(status.as_str())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound { id: id.to_string() })?
            .try_into()
    }

    /// Flags the reminder for record `id` as delivered.
    ///
    /// Returns `false` if the flag was already set (or the record does not
    /// exist), so concurrent schedulers never both claim the same reminder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the write fails.
    pub async fn mark_reminder_sent(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE service_requests SET reminder_sent = 1 WHERE id = ? AND reminder_sent = 0",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Aggregate counts, read from a single snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store cannot be reached.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn stats(&self) -> Result<Stats> {
        let mut tx = self.pool.begin().await?;
        let (total, pending, completed): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COALESCE(SUM(status = 'Pending'), 0), \
                    COALESCE(SUM(status = 'Completed'), 0) \
             FROM service_requests",
        )
        .fetch_one(&mut *tx)
        .await?;
        let completed_works = count_completed_works(&mut tx).await?;
        tx.commit().await?;

        Ok(Stats {
            total: to_u64(total, "total")?,
            pending: to_u64(pending, "pending")?,
            completed: to_u64(completed, "completed")?,
            completed_works,
        })
    }

    /// Number of completed works.
    ///
    /// Today this is the number of records in [`Status::Completed`]. It is
    /// kept separate from [`Stats::completed`] so that it can track a
    /// different notion later without changing callers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store cannot be reached.
    pub async fn completed_works(&self) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        count_completed_works(&mut conn).await
    }

    /// Closes every pooled connection. Subsequent calls fail with
    /// [`Error::StoreUnavailable`].
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn count_completed_works(conn: &mut SqliteConnection) -> Result<u64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM service_requests WHERE status = 'Completed'")
            .fetch_one(conn)
            .await?;
    to_u64(count, "completed_works")
}

fn to_u64(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::CorruptRecord {
        reason: format!("negative {column}: {value}"),
    })
}

#[derive(FromRow)]
struct RequestRow {
    id: String,
    token_number: i64,
    name: String,
    email: String,
    address: String,
    contact_number: String,
    work_description: String,
    status: String,
    reminder_sent: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for ServiceRequest {
    type Error = Error;

    fn try_from(row: RequestRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id).map_err(|e| Error::CorruptRecord {
            reason: format!("bad id {:?}: {e}", row.id),
        })?;
        let status = row.status.parse().map_err(|_| Error::CorruptRecord {
            reason: format!("bad status {:?} on {id}", row.status),
        })?;
        Ok(Self {
            id,
            token_number: to_u64(row.token_number, "token_number")?,
            name: row.name,
            email: row.email,
            address: row.address,
            contact_number: row.contact_number,
            work_description: row.work_description,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            reminder_sent: row.reminder_sent,
        })
    }
}
