//! PostgreSQL signal storage
//!
//! Runtime-checked queries over the `signals` and `logs` tables created by the
//! files in `migrations/`. Enumerated columns are stored as text and validated
//! into closed enums when rows are read back.

use crate::error::{Result, StorageError};
use crate::store::{ExitFilter, SignalStore, MAX_AVAILABLE_DATES};
use chrono::{DateTime, NaiveDate, Utc};
use common::{
    exit_pnl, Clock, ClearedCounts, DayWindow, LogEntry, NewLog, NewSignal, Signal, SignalStatus,
    SignalUpdate, Strategy, SystemClock, IST_OFFSET_SECS, MANUAL_EXIT_REASON,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const SIGNAL_COLUMNS: &str = "id, instrument, strategy, status, entry_price, current_price, \
     exit_price, pnl, exit_reason, created_at, updated_at, closed_time";

const EXIT_ALL_SQL: &str = r#"
    UPDATE signals
    SET status = 'closed', exit_reason = $1, exit_price = COALESCE(current_price, exit_price),
        closed_time = $2, updated_at = $2
    WHERE status = 'active'
"#;

const EXIT_PROFIT_SQL: &str = r#"
    UPDATE signals
    SET status = 'closed', exit_reason = $1, exit_price = COALESCE(current_price, exit_price),
        closed_time = $2, updated_at = $2
    WHERE status = 'active' AND COALESCE(pnl, 0) > 0
"#;

const EXIT_LOSS_SQL: &str = r#"
    UPDATE signals
    SET status = 'closed', exit_reason = $1, exit_price = COALESCE(current_price, exit_price),
        closed_time = $2, updated_at = $2
    WHERE status = 'active' AND COALESCE(pnl, 0) < 0
"#;

#[derive(Debug, FromRow)]
struct SignalRow {
    id: Uuid,
    instrument: String,
    strategy: String,
    status: String,
    entry_price: Decimal,
    current_price: Option<Decimal>,
    exit_price: Option<Decimal>,
    pnl: Option<Decimal>,
    exit_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_time: Option<DateTime<Utc>>,
}

impl TryFrom<SignalRow> for Signal {
    type Error = StorageError;

    fn try_from(row: SignalRow) -> Result<Self> {
        Ok(Signal {
            id: row.id,
            instrument: row.instrument.parse()?,
            strategy: row.strategy.parse()?,
            status: row.status.parse()?,
            entry_price: row.entry_price,
            current_price: row.current_price,
            exit_price: row.exit_price,
            pnl: row.pnl,
            exit_reason: row.exit_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            closed_time: row.closed_time,
        })
    }
}

fn into_signals(rows: Vec<SignalRow>) -> Result<Vec<Signal>> {
    rows.into_iter().map(Signal::try_from).collect()
}

#[derive(Debug, FromRow)]
struct LogRow {
    id: Uuid,
    message: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        LogEntry {
            id: row.id,
            message: row.message,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

/// Signal store backed by a shared Postgres pool
#[derive(Clone)]
pub struct PgSignalStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgSignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        info!("✅ Connected to PostgreSQL");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn signals_in_window(&self, window: DayWindow, strategy: Option<Strategy>) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals \
             WHERE created_at >= $1 AND created_at < $2 AND ($3::text IS NULL OR strategy = $3) \
             ORDER BY created_at DESC"
        ))
        .bind(window.start)
        .bind(window.end)
        .bind(strategy.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        into_signals(rows)
    }
}

#[async_trait::async_trait]
impl SignalStore for PgSignalStore {
    async fn get_signals(&self, strategy: Option<Strategy>) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals \
             WHERE ($1::text IS NULL OR strategy = $1) \
             ORDER BY created_at DESC"
        ))
        .bind(strategy.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        into_signals(rows)
    }

    async fn get_today_signals(&self, strategy: Option<Strategy>) -> Result<Vec<Signal>> {
        let window = DayWindow::containing(self.clock.now());
        self.signals_in_window(window, strategy).await
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>> {
        let row = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Signal::try_from).transpose()
    }

    async fn get_active_signals(&self) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals WHERE status = $1 ORDER BY created_at DESC"
        ))
        .bind(SignalStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await?;

        into_signals(rows)
    }

    async fn create_signal(&self, new_signal: NewSignal) -> Result<Signal> {
        let now = self.clock.now();
        let row = sqlx::query_as::<_, SignalRow>(&format!(
            "INSERT INTO signals (id, instrument, strategy, status, entry_price, current_price, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             RETURNING {SIGNAL_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new_signal.instrument.as_str())
        .bind(new_signal.strategy.as_str())
        .bind(new_signal.status.as_str())
        .bind(new_signal.entry_price)
        .bind(new_signal.current_price)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let signal = Signal::try_from(row)?;
        debug!("Created signal {} ({} {})", signal.id, signal.instrument, signal.strategy);
        Ok(signal)
    }

    async fn update_signal(&self, id: Uuid, update: SignalUpdate) -> Result<Option<Signal>> {
        let row = sqlx::query_as::<_, SignalRow>(&format!(
            "UPDATE signals SET \
                 status = COALESCE($2, status), \
                 current_price = COALESCE($3, current_price), \
                 exit_price = COALESCE($4, exit_price), \
                 pnl = COALESCE($5, pnl), \
                 exit_reason = COALESCE($6, exit_reason), \
                 closed_time = COALESCE($7, closed_time), \
                 updated_at = $8 \
             WHERE id = $1 \
             RETURNING {SIGNAL_COLUMNS}"
        ))
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.current_price)
        .bind(update.exit_price)
        .bind(update.pnl)
        .bind(update.exit_reason)
        .bind(update.closed_time)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Signal::try_from).transpose()
    }

    async fn update_active_price(&self, id: Uuid, current_price: Decimal, pnl: Decimal) -> Result<Option<Signal>> {
        let row = sqlx::query_as::<_, SignalRow>(&format!(
            "UPDATE signals SET current_price = $2, pnl = $3, updated_at = $4 \
             WHERE id = $1 AND status = $5 \
             RETURNING {SIGNAL_COLUMNS}"
        ))
        .bind(id)
        .bind(current_price)
        .bind(pnl)
        .bind(self.clock.now())
        .bind(SignalStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Signal::try_from).transpose()
    }

    async fn get_signals_by_date(&self, date: NaiveDate) -> Result<Vec<Signal>> {
        self.signals_in_window(DayWindow::for_date(date), None).await
    }

    async fn clear_expired_signals(&self, date: NaiveDate) -> Result<u64> {
        let window = DayWindow::for_date(date);
        let statuses: Vec<String> = SignalStatus::EXPIRED.iter().map(|s| s.as_str().to_string()).collect();

        let result = sqlx::query(
            "DELETE FROM signals WHERE created_at >= $1 AND created_at < $2 AND status = ANY($3)",
        )
        .bind(window.start)
        .bind(window.end)
        .bind(statuses)
        .execute(&self.pool)
        .await?;

        info!("Cleared {} expired signals for {}", result.rows_affected(), date);
        Ok(result.rows_affected())
    }

    async fn get_available_signal_dates(&self) -> Result<Vec<NaiveDate>> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT DISTINCT ((created_at AT TIME ZONE 'UTC') + make_interval(secs => $1))::date AS day \
             FROM signals ORDER BY day DESC LIMIT $2",
        )
        .bind(f64::from(IST_OFFSET_SECS))
        .bind(MAX_AVAILABLE_DATES as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates)
    }

    async fn clear_today_data(&self) -> Result<ClearedCounts> {
        let window = DayWindow::containing(self.clock.now());
        let mut tx = self.pool.begin().await?;

        let signals = sqlx::query("DELETE FROM signals WHERE created_at >= $1 AND created_at < $2")
            .bind(window.start)
            .bind(window.end)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let logs = sqlx::query("DELETE FROM logs WHERE created_at >= $1 AND created_at < $2")
            .bind(window.start)
            .bind(window.end)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        info!("Cleared today's data ({}): {} signals, {} logs", window.date, signals, logs);
        Ok(ClearedCounts { signals, logs })
    }

    async fn exit_signal(&self, id: Uuid, exit_price: Decimal) -> Result<Option<Signal>> {
        let Some(signal) = self.get_signal(id).await? else {
            return Ok(None);
        };

        let priced = exit_pnl(signal.instrument, signal.entry_price, exit_price);
        let now = self.clock.now();

        let row = sqlx::query_as::<_, SignalRow>(&format!(
            "UPDATE signals SET \
                 status = $2, exit_price = $3, pnl = $4, exit_reason = $5, \
                 closed_time = $6, updated_at = $6 \
             WHERE id = $1 \
             RETURNING {SIGNAL_COLUMNS}"
        ))
        .bind(id)
        .bind(SignalStatus::Closed.as_str())
        .bind(exit_price)
        .bind(priced.pnl)
        .bind(MANUAL_EXIT_REASON)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Signal::try_from).transpose()
    }

    async fn exit_active(&self, filter: ExitFilter) -> Result<u64> {
        // Single conditional statement; the filter is evaluated by the database
        let sql = match filter {
            ExitFilter::All => EXIT_ALL_SQL,
            ExitFilter::Profit => EXIT_PROFIT_SQL,
            ExitFilter::Loss => EXIT_LOSS_SQL,
        };

        let result = sqlx::query(sql)
            .bind(MANUAL_EXIT_REASON)
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?;

        info!("Exited {} {} signals", result.rows_affected(), filter.label());
        Ok(result.rows_affected())
    }

    async fn create_log(&self, new_log: NewLog) -> Result<LogEntry> {
        let row = sqlx::query_as::<_, LogRow>(
            "INSERT INTO logs (id, message, metadata, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING id, message, metadata, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&new_log.message)
        .bind(&new_log.metadata)
        .bind(self.clock.now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, message, metadata, created_at FROM logs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LogEntry::from).collect())
    }

    async fn get_today_logs(&self) -> Result<Vec<LogEntry>> {
        let window = DayWindow::containing(self.clock.now());
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, message, metadata, created_at FROM logs \
             WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at DESC",
        )
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LogEntry::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::Instrument;
    use rust_decimal_macros::dec;

    fn row(instrument: &str, status: &str) -> SignalRow {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 4, 0, 0).unwrap();
        SignalRow {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            strategy: "momentum".to_string(),
            status: status.to_string(),
            entry_price: dec!(24000),
            current_price: Some(dec!(24010)),
            exit_price: None,
            pnl: Some(dec!(500)),
            exit_reason: None,
            created_at: now,
            updated_at: now,
            closed_time: None,
        }
    }

    #[test]
    fn test_row_conversion() {
        let signal = Signal::try_from(row("NIFTY", "active")).unwrap();
        assert_eq!(signal.instrument, Instrument::Nifty);
        assert_eq!(signal.strategy, Strategy::Momentum);
        assert_eq!(signal.status, SignalStatus::Active);
        assert_eq!(signal.pnl, Some(dec!(500)));
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        let err = Signal::try_from(row("NIFTY", "cancelled")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));

        let err = Signal::try_from(row("GOLD", "active")).unwrap_err();
        assert!(err.to_string().contains("instrument"));
    }

    #[test]
    fn test_bulk_exit_statements_are_conditional() {
        assert!(EXIT_ALL_SQL.contains("WHERE status = 'active'"));
        assert!(EXIT_PROFIT_SQL.contains("COALESCE(pnl, 0) > 0"));
        assert!(EXIT_LOSS_SQL.contains("COALESCE(pnl, 0) < 0"));
    }
}
