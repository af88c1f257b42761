// Signal service
// Storage operations that also notify push subscribers and keep an audit trail

use crate::error::Result;
use crate::store::{ExitFilter, SignalStore};
use chrono::NaiveDate;
use common::{
    exit_pnl, ClearedCounts, EventPublisher, NewLog, NewSignal, PriceUpdate, PushEvent, Signal,
    SignalChanged,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct SignalService {
    store: Arc<dyn SignalStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl SignalService {
    pub fn new(store: Arc<dyn SignalStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    pub async fn create_signal(&self, new_signal: NewSignal) -> Result<Signal> {
        let signal = self.store.create_signal(new_signal).await?;
        info!("New {} signal {} on {} @ {}", signal.strategy, signal.id, signal.instrument, signal.entry_price);
        self.notify_changed(Some(signal.id), "created");
        Ok(signal)
    }

    /// Record a live price for an active signal and push the unrealized P&L
    pub async fn apply_price_tick(&self, id: Uuid, price: Decimal) -> Result<Option<Signal>> {
        let Some(signal) = self.store.get_signal(id).await? else {
            debug!("Price tick for unknown signal {}", id);
            return Ok(None);
        };
        if !signal.is_active() {
            debug!("Ignoring price tick for {} signal {}", signal.status, id);
            return Ok(None);
        }

        // Instrument and entry never change, so pricing from this read is safe;
        // the write itself is conditional on the signal still being active
        let priced = exit_pnl(signal.instrument, signal.entry_price, price);
        let updated = self.store.update_active_price(id, price, priced.pnl).await?;
        match &updated {
            Some(_) => self.publisher.publish(PushEvent::PriceUpdate(PriceUpdate {
                id,
                current_price: price,
                pnl: priced.pnl,
            })),
            None => debug!("Signal {} closed before price tick landed", id),
        }
        Ok(updated)
    }

    pub async fn exit_signal(&self, id: Uuid, exit_price: Decimal) -> Result<Option<Signal>> {
        let exited = self.store.exit_signal(id, exit_price).await?;

        match &exited {
            Some(signal) => {
                info!("Exited signal {} @ {} (P&L {:?})", id, exit_price, signal.pnl);
                self.audit(
                    "Signal exited",
                    json!({
                        "signalId": id,
                        "instrument": signal.instrument,
                        "exitPrice": exit_price,
                        "pnl": signal.pnl,
                    }),
                )
                .await;
                self.notify_changed(Some(id), "exited");
            }
            None => debug!("Exit requested for unknown signal {}", id),
        }

        Ok(exited)
    }

    pub async fn exit_all(&self, filter: ExitFilter) -> Result<u64> {
        let closed = self.store.exit_active(filter).await?;
        if closed > 0 {
            self.audit(
                "Bulk exit",
                json!({ "filter": filter.label(), "count": closed }),
            )
            .await;
            self.notify_changed(None, "bulk_exit");
        }
        Ok(closed)
    }

    pub async fn exit_all_signals(&self) -> Result<u64> {
        self.exit_all(ExitFilter::All).await
    }

    pub async fn exit_all_profit_signals(&self) -> Result<u64> {
        self.exit_all(ExitFilter::Profit).await
    }

    pub async fn exit_all_loss_signals(&self) -> Result<u64> {
        self.exit_all(ExitFilter::Loss).await
    }

    pub async fn clear_expired_signals(&self, date: NaiveDate) -> Result<u64> {
        let removed = self.store.clear_expired_signals(date).await?;
        if removed > 0 {
            self.audit(
                "Expired signals cleared",
                json!({ "date": date, "count": removed }),
            )
            .await;
            self.notify_changed(None, "expired_cleared");
        }
        Ok(removed)
    }

    pub async fn clear_today_data(&self) -> Result<ClearedCounts> {
        let cleared = self.store.clear_today_data().await?;
        warn!("Cleared today's data: {} signals, {} logs", cleared.signals, cleared.logs);
        if cleared.signals > 0 {
            self.notify_changed(None, "cleared");
        }
        Ok(cleared)
    }

    // Audit failures never undo the mutation that already happened
    async fn audit(&self, message: &str, metadata: serde_json::Value) {
        if let Err(e) = self.store.create_log(NewLog::new(message, metadata)).await {
            warn!("Failed to write audit log '{}': {}", message, e);
        }
    }

    fn notify_changed(&self, id: Option<Uuid>, reason: &str) {
        self.publisher.publish(PushEvent::SignalUpdate(SignalChanged {
            id,
            reason: Some(reason.to_string()),
        }));
    }
}
