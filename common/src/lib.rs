// Shared types for the signal desk
// Signal and log records, vocabularies, IST day windows, P&L arithmetic and push events

pub mod config;
pub mod pnl;
pub mod push;
pub mod time;
pub mod types;

pub use config::{load_config, AppConfig, DashboardConfig, DatabaseConfig, MigrationConfig, NotifierConfig};
pub use pnl::{exit_pnl, round_cents, ExitPnl, MANUAL_EXIT_REASON};
pub use push::{
    Envelope, EventPublisher, NoopPublisher, PriceUpdate, PushEvent, SignalChanged, PRICE_UPDATE,
    SIGNAL_UPDATE,
};
pub use time::{ist_date, ist_offset, Clock, DayWindow, FixedClock, SystemClock, IST_OFFSET_SECS};
pub use types::{
    ClearedCounts, Instrument, LogEntry, NewLog, NewSignal, Signal, SignalStatus, SignalUpdate,
    Strategy, UnknownVariant,
};
