// Signal Storage Interface
// CRUD, IST day windows and exit processing over signals and logs

use crate::error::Result;
use chrono::NaiveDate;
use common::{ClearedCounts, LogEntry, NewLog, NewSignal, Signal, SignalUpdate, Strategy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Most distinct days reported by `get_available_signal_dates`
pub const MAX_AVAILABLE_DATES: usize = 30;

/// Which active signals a bulk exit closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitFilter {
    All,
    /// `pnl > 0`
    Profit,
    /// `pnl < 0`
    Loss,
}

impl ExitFilter {
    /// Absent pnl reads as zero, so it matches neither `Profit` nor `Loss`
    pub fn matches(&self, signal: &Signal) -> bool {
        if !signal.is_active() {
            return false;
        }
        match self {
            ExitFilter::All => true,
            ExitFilter::Profit => signal.pnl_or_zero() > Decimal::ZERO,
            ExitFilter::Loss => signal.pnl_or_zero() < Decimal::ZERO,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExitFilter::All => "all",
            ExitFilter::Profit => "profit",
            ExitFilter::Loss => "loss",
        }
    }
}

/// Trait for signal storage backends
#[async_trait::async_trait]
pub trait SignalStore: Send + Sync {
    /// All signals, newest first, optionally for one strategy
    async fn get_signals(&self, strategy: Option<Strategy>) -> Result<Vec<Signal>>;

    /// Signals created during the current IST day, newest first
    async fn get_today_signals(&self, strategy: Option<Strategy>) -> Result<Vec<Signal>>;

    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>>;

    /// Signals whose status is exactly `active`
    async fn get_active_signals(&self) -> Result<Vec<Signal>>;

    /// Insert a signal, stamping `created_at` and `updated_at` with now
    async fn create_signal(&self, new_signal: NewSignal) -> Result<Signal>;

    /// Merge the populated fields of `update`; `updated_at` is always refreshed
    async fn update_signal(&self, id: Uuid, update: SignalUpdate) -> Result<Option<Signal>>;

    /// Set live `current_price` and `pnl` only while the signal is still active.
    /// `Ok(None)` when it is missing or already terminal.
    async fn update_active_price(&self, id: Uuid, current_price: Decimal, pnl: Decimal) -> Result<Option<Signal>>;

    /// Signals created during the IST day `date`, newest first
    async fn get_signals_by_date(&self, date: NaiveDate) -> Result<Vec<Signal>>;

    /// Delete `sl_hit` and `expired` signals created during the IST day `date`
    async fn clear_expired_signals(&self, date: NaiveDate) -> Result<u64>;

    /// Up to 30 distinct IST dates having at least one signal, newest first
    async fn get_available_signal_dates(&self) -> Result<Vec<NaiveDate>>;

    /// Delete every signal and log created during the current IST day
    async fn clear_today_data(&self) -> Result<ClearedCounts>;

    /// Close one signal at `exit_price` with a "Manual exit" reason
    async fn exit_signal(&self, id: Uuid, exit_price: Decimal) -> Result<Option<Signal>>;

    /// Close every active signal matching `filter`; returns how many changed
    async fn exit_active(&self, filter: ExitFilter) -> Result<u64>;

    async fn exit_all_signals(&self) -> Result<u64> {
        self.exit_active(ExitFilter::All).await
    }

    async fn exit_all_profit_signals(&self) -> Result<u64> {
        self.exit_active(ExitFilter::Profit).await
    }

    async fn exit_all_loss_signals(&self) -> Result<u64> {
        self.exit_active(ExitFilter::Loss).await
    }

    async fn create_log(&self, new_log: NewLog) -> Result<LogEntry>;

    /// Most recent logs first
    async fn get_logs(&self, limit: usize) -> Result<Vec<LogEntry>>;

    async fn get_today_logs(&self) -> Result<Vec<LogEntry>>;
}
