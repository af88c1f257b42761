// In-memory signal storage (for tests and local development)

use crate::error::Result;
use crate::store::{ExitFilter, SignalStore, MAX_AVAILABLE_DATES};
use chrono::NaiveDate;
use common::{
    exit_pnl, ist_date, Clock, ClearedCounts, DayWindow, LogEntry, NewLog, NewSignal, Signal,
    SignalStatus, SignalUpdate, Strategy, SystemClock, MANUAL_EXIT_REASON,
};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub struct InMemorySignalStore {
    signals: RwLock<HashMap<Uuid, Signal>>,
    logs: RwLock<Vec<LogEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            signals: RwLock::new(HashMap::new()),
            logs: RwLock::new(Vec::new()),
            clock,
        }
    }

    async fn collect<F>(&self, keep: F) -> Vec<Signal>
    where
        F: Fn(&Signal) -> bool,
    {
        let signals = self.signals.read().await;
        let mut selected: Vec<Signal> = signals.values().filter(|s| keep(s)).cloned().collect();
        newest_first(&mut selected);
        selected
    }
}

impl Default for InMemorySignalStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(signals: &mut [Signal]) {
    signals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait::async_trait]
impl SignalStore for InMemorySignalStore {
    async fn get_signals(&self, strategy: Option<Strategy>) -> Result<Vec<Signal>> {
        Ok(self
            .collect(|s| strategy.map_or(true, |k| s.strategy == k))
            .await)
    }

    async fn get_today_signals(&self, strategy: Option<Strategy>) -> Result<Vec<Signal>> {
        let window = DayWindow::containing(self.clock.now());
        Ok(self
            .collect(|s| window.contains(s.created_at) && strategy.map_or(true, |k| s.strategy == k))
            .await)
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>> {
        let signals = self.signals.read().await;
        Ok(signals.get(&id).cloned())
    }

    async fn get_active_signals(&self) -> Result<Vec<Signal>> {
        Ok(self.collect(|s| s.is_active()).await)
    }

    async fn create_signal(&self, new_signal: NewSignal) -> Result<Signal> {
        let now = self.clock.now();
        let signal = Signal {
            id: Uuid::new_v4(),
            instrument: new_signal.instrument,
            strategy: new_signal.strategy,
            status: new_signal.status,
            entry_price: new_signal.entry_price,
            current_price: new_signal.current_price,
            exit_price: None,
            pnl: None,
            exit_reason: None,
            created_at: now,
            updated_at: now,
            closed_time: None,
        };

        let mut signals = self.signals.write().await;
        signals.insert(signal.id, signal.clone());
        Ok(signal)
    }

    async fn update_signal(&self, id: Uuid, update: SignalUpdate) -> Result<Option<Signal>> {
        let now = self.clock.now();
        let mut signals = self.signals.write().await;
        Ok(signals.get_mut(&id).map(|signal| {
            signal.apply(&update, now);
            signal.clone()
        }))
    }

    async fn update_active_price(&self, id: Uuid, current_price: Decimal, pnl: Decimal) -> Result<Option<Signal>> {
        let now = self.clock.now();
        // Status check and write under one lock so an exit cannot slip in between
        let mut signals = self.signals.write().await;
        let Some(signal) = signals.get_mut(&id).filter(|s| s.is_active()) else {
            return Ok(None);
        };
        signal.apply(
            &SignalUpdate {
                current_price: Some(current_price),
                pnl: Some(pnl),
                ..Default::default()
            },
            now,
        );
        Ok(Some(signal.clone()))
    }

    async fn get_signals_by_date(&self, date: NaiveDate) -> Result<Vec<Signal>> {
        let window = DayWindow::for_date(date);
        Ok(self.collect(|s| window.contains(s.created_at)).await)
    }

    async fn clear_expired_signals(&self, date: NaiveDate) -> Result<u64> {
        let window = DayWindow::for_date(date);
        let mut signals = self.signals.write().await;
        let before = signals.len();
        signals.retain(|_, s| {
            !(window.contains(s.created_at) && SignalStatus::EXPIRED.contains(&s.status))
        });
        Ok((before - signals.len()) as u64)
    }

    async fn get_available_signal_dates(&self) -> Result<Vec<NaiveDate>> {
        let signals = self.signals.read().await;
        let dates: BTreeSet<NaiveDate> = signals.values().map(|s| ist_date(s.created_at)).collect();
        Ok(dates.into_iter().rev().take(MAX_AVAILABLE_DATES).collect())
    }

    async fn clear_today_data(&self) -> Result<ClearedCounts> {
        let window = DayWindow::containing(self.clock.now());

        let mut signals = self.signals.write().await;
        let mut logs = self.logs.write().await;

        let signals_before = signals.len();
        signals.retain(|_, s| !window.contains(s.created_at));
        let logs_before = logs.len();
        logs.retain(|l| !window.contains(l.created_at));

        Ok(ClearedCounts {
            signals: (signals_before - signals.len()) as u64,
            logs: (logs_before - logs.len()) as u64,
        })
    }

    async fn exit_signal(&self, id: Uuid, exit_price: Decimal) -> Result<Option<Signal>> {
        let now = self.clock.now();
        let mut signals = self.signals.write().await;
        let Some(signal) = signals.get_mut(&id) else {
            return Ok(None);
        };

        let priced = exit_pnl(signal.instrument, signal.entry_price, exit_price);
        debug!("Exit {} at {}: {} points, pnl {}", id, exit_price, priced.points, priced.pnl);

        signal.apply(
            &SignalUpdate {
                status: Some(SignalStatus::Closed),
                exit_price: Some(exit_price),
                pnl: Some(priced.pnl),
                exit_reason: Some(MANUAL_EXIT_REASON.to_string()),
                closed_time: Some(now),
                ..Default::default()
            },
            now,
        );
        Ok(Some(signal.clone()))
    }

    async fn exit_active(&self, filter: ExitFilter) -> Result<u64> {
        let now = self.clock.now();
        // Filter and update under one write lock
        let mut signals = self.signals.write().await;
        let mut closed = 0u64;
        for signal in signals.values_mut().filter(|s| filter.matches(s)) {
            let update = SignalUpdate {
                status: Some(SignalStatus::Closed),
                exit_price: signal.current_price,
                exit_reason: Some(MANUAL_EXIT_REASON.to_string()),
                closed_time: Some(now),
                ..Default::default()
            };
            signal.apply(&update, now);
            closed += 1;
        }
        Ok(closed)
    }

    async fn create_log(&self, new_log: NewLog) -> Result<LogEntry> {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            message: new_log.message,
            metadata: new_log.metadata,
            created_at: self.clock.now(),
        };
        self.logs.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn get_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let logs = self.logs.read().await;
        let mut recent: Vec<LogEntry> = logs.clone();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }

    async fn get_today_logs(&self) -> Result<Vec<LogEntry>> {
        let window = DayWindow::containing(self.clock.now());
        let logs = self.logs.read().await;
        let mut today: Vec<LogEntry> = logs
            .iter()
            .filter(|l| window.contains(l.created_at))
            .cloned()
            .collect();
        today.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(today)
    }
}
