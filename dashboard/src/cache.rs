//! Query cache shared by pollers, the push bridge and the renderer.
//!
//! Two independent sources write into it:
//! - poll results, which replace a whole entry
//! - `price_update` pushes, which patch `current_price`/`pnl` of one signal
//!
//! Each write takes a ticket from one monotonic sequence. A poll response only
//! overwrites a price field when its request started after the last push patch
//! for that signal, so a slow poll never rolls back a fresher push.

use chrono::{DateTime, Utc};
use common::{Instrument, PriceUpdate, Signal};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Signals,
    MarketAnalysis(Instrument),
    MarketRegime(Instrument),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Signals => write!(f, "signals"),
            QueryKey::MarketAnalysis(instrument) => write!(f, "market-analysis/{}", instrument),
            QueryKey::MarketRegime(instrument) => write!(f, "market-regime/{}", instrument),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Signals(Vec<Signal>),
    /// Analysis and regime payloads are produced elsewhere and kept opaque
    Json(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Loading,
    Ready,
    Failed,
}

/// Snapshot of one cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub status: QueryStatus,
    /// Last good value; survives a failed refetch
    pub value: Option<QueryValue>,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl QueryState {
    fn loading() -> Self {
        Self {
            status: QueryStatus::Loading,
            value: None,
            error: None,
            updated_at: None,
        }
    }

    pub fn signals(&self) -> Option<&[Signal]> {
        match &self.value {
            Some(QueryValue::Signals(signals)) => Some(signals),
            _ => None,
        }
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.value {
            Some(QueryValue::Json(value)) => Some(value),
            _ => None,
        }
    }
}

/// Issued when a fetch starts, redeemed when it completes
#[derive(Debug, Clone, Copy)]
pub struct FetchTicket {
    pub key: QueryKey,
    started: u64,
}

#[derive(Debug, Clone, Copy)]
struct PricePatch {
    current_price: Decimal,
    pnl: Decimal,
    seq: u64,
}

type InvalidationHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct QueryCache {
    seq: AtomicU64,
    entries: DashMap<QueryKey, QueryState>,
    // Latest push per signal id, kept until a poll started after it lands
    patches: Mutex<HashMap<Uuid, PricePatch>>,
    hooks: Mutex<HashMap<QueryKey, Vec<InvalidationHook>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current state; keys never fetched read as `Loading`
    pub fn state(&self, key: QueryKey) -> QueryState {
        self.entries
            .get(&key)
            .map(|entry| entry.clone())
            .unwrap_or_else(QueryState::loading)
    }

    pub fn begin_fetch(&self, key: QueryKey) -> FetchTicket {
        self.entries.entry(key).or_insert_with(QueryState::loading);
        FetchTicket {
            key,
            started: self.next_seq(),
        }
    }

    /// Replace the entry with a poll result, keeping newer push patches
    pub fn complete_fetch(&self, ticket: FetchTicket, value: QueryValue) {
        // Held until the entry is replaced; pushes take the same lock first
        let mut patches = self.patches.lock().unwrap_or_else(|e| e.into_inner());

        let value = match value {
            QueryValue::Signals(mut signals) => {
                for signal in signals.iter_mut() {
                    if let Some(patch) = patches.get(&signal.id) {
                        if patch.seq > ticket.started {
                            debug!("Keeping pushed price for {} over stale poll", signal.id);
                            signal.current_price = Some(patch.current_price);
                            signal.pnl = Some(patch.pnl);
                        }
                    }
                }
                // The response already reflects every patch older than the request
                patches.retain(|_, patch| patch.seq > ticket.started);
                QueryValue::Signals(signals)
            }
            other => other,
        };

        self.entries.insert(
            ticket.key,
            QueryState {
                status: QueryStatus::Ready,
                value: Some(value),
                error: None,
                updated_at: Some(Utc::now()),
            },
        );
    }

    /// Mark the entry failed without discarding its last good value
    pub fn fail_fetch(&self, ticket: FetchTicket, error: impl Into<String>) {
        let error = error.into();
        let mut entry = self.entries.entry(ticket.key).or_insert_with(QueryState::loading);
        entry.status = QueryStatus::Failed;
        entry.error = Some(error);
    }

    /// Patch a cached signal in place; true if one was present
    pub fn apply_price_update(&self, update: &PriceUpdate) -> bool {
        let mut patches = self.patches.lock().unwrap_or_else(|e| e.into_inner());
        patches.insert(
            update.id,
            PricePatch {
                current_price: update.current_price,
                pnl: update.pnl,
                seq: self.next_seq(),
            },
        );

        let Some(mut entry) = self.entries.get_mut(&QueryKey::Signals) else {
            return false;
        };
        let Some(QueryValue::Signals(signals)) = entry.value.as_mut() else {
            return false;
        };
        match signals.iter_mut().find(|s| s.id == update.id) {
            Some(signal) => {
                signal.current_price = Some(update.current_price);
                signal.pnl = Some(update.pnl);
                true
            }
            None => false,
        }
    }

    /// Call `hook` whenever `key` is invalidated
    pub fn on_invalidate<F>(&self, key: QueryKey, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.lock().unwrap_or_else(|e| e.into_inner());
        hooks.entry(key).or_default().push(Arc::new(hook));
    }

    /// Ask every poller of `key` to refetch now
    pub fn invalidate(&self, key: QueryKey) -> usize {
        let hooks: Vec<InvalidationHook> = {
            let hooks = self.hooks.lock().unwrap_or_else(|e| e.into_inner());
            hooks.get(&key).cloned().unwrap_or_default()
        };
        debug!("Invalidating {} ({} hook(s))", key, hooks.len());
        for hook in &hooks {
            hook();
        }
        hooks.len()
    }
}
