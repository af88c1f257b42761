use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Raised when a stored or received string does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Tradeable underlying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Instrument {
    Nifty,
    BankNifty,
    FinNifty,
    MidcpNifty,
    Sensex,
}

impl Instrument {
    pub const ALL: [Instrument; 5] = [
        Instrument::Nifty,
        Instrument::BankNifty,
        Instrument::FinNifty,
        Instrument::MidcpNifty,
        Instrument::Sensex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::Nifty => "NIFTY",
            Instrument::BankNifty => "BANKNIFTY",
            Instrument::FinNifty => "FINNIFTY",
            Instrument::MidcpNifty => "MIDCPNIFTY",
            Instrument::Sensex => "SENSEX",
        }
    }

    /// Multiplier converting price points into money
    pub fn lot_size(&self) -> u32 {
        match self {
            Instrument::Nifty => 50,
            Instrument::BankNifty => 15,
            _ => 1,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Instrument {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Instrument::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "instrument",
                value: s.to_string(),
            })
    }
}

/// Strategy that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Momentum,
    Breakout,
    MeanReversion,
    Scalping,
    TrendFollowing,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Momentum,
        Strategy::Breakout,
        Strategy::MeanReversion,
        Strategy::Scalping,
        Strategy::TrendFollowing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Momentum => "momentum",
            Strategy::Breakout => "breakout",
            Strategy::MeanReversion => "mean_reversion",
            Strategy::Scalping => "scalping",
            Strategy::TrendFollowing => "trend_following",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "strategy",
                value: s.to_string(),
            })
    }
}

/// Signal lifecycle status. Everything except `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Active,
    Closed,
    SlHit,
    Expired,
}

impl SignalStatus {
    pub const ALL: [SignalStatus; 4] = [
        SignalStatus::Active,
        SignalStatus::Closed,
        SignalStatus::SlHit,
        SignalStatus::Expired,
    ];

    /// Statuses removed by the per-date expiry cleanup
    pub const EXPIRED: [SignalStatus; 2] = [SignalStatus::SlHit, SignalStatus::Expired];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "active",
            SignalStatus::Closed => "closed",
            SignalStatus::SlHit => "sl_hit",
            SignalStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalStatus::Active)
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "signal status",
                value: s.to_string(),
            })
    }
}

/// A recorded trading signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: Uuid,
    pub instrument: Instrument,
    pub strategy: Strategy,
    pub status: SignalStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub current_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub exit_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub pnl: Option<Decimal>,
    #[serde(default)]
    pub exit_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_time: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn is_active(&self) -> bool {
        self.status == SignalStatus::Active
    }

    /// Monetary P&L with an absent value read as zero
    pub fn pnl_or_zero(&self) -> Decimal {
        self.pnl.unwrap_or(Decimal::ZERO)
    }

    /// Merge the populated fields of `update` and stamp `updated_at`
    pub fn apply(&mut self, update: &SignalUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(price) = update.current_price {
            self.current_price = Some(price);
        }
        if let Some(price) = update.exit_price {
            self.exit_price = Some(price);
        }
        if let Some(pnl) = update.pnl {
            self.pnl = Some(pnl);
        }
        if let Some(reason) = &update.exit_reason {
            self.exit_reason = Some(reason.clone());
        }
        if let Some(closed) = update.closed_time {
            self.closed_time = Some(closed);
        }
        self.updated_at = now;
    }
}

/// Fields supplied when a signal is first recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSignal {
    pub instrument: Instrument,
    pub strategy: Strategy,
    #[serde(default = "default_status")]
    pub status: SignalStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub current_price: Option<Decimal>,
}

fn default_status() -> SignalStatus {
    SignalStatus::Active
}

impl NewSignal {
    pub fn new(instrument: Instrument, strategy: Strategy, entry_price: Decimal) -> Self {
        Self {
            instrument,
            strategy,
            status: SignalStatus::Active,
            entry_price,
            current_price: Some(entry_price),
        }
    }
}

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalUpdate {
    #[serde(default)]
    pub status: Option<SignalStatus>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub current_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub exit_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub pnl: Option<Decimal>,
    #[serde(default)]
    pub exit_reason: Option<String>,
    #[serde(default)]
    pub closed_time: Option<DateTime<Utc>>,
}

/// Append-only audit log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLog {
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewLog {
    pub fn new(message: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            metadata,
        }
    }
}

/// Rows removed by a "clear today" run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedCounts {
    pub signals: u64,
    pub logs: u64,
}
