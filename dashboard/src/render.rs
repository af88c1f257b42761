// Plain-text rendering of cached queries

use crate::cache::{QueryState, QueryStatus};
use common::{ist_offset, Signal};
use rust_decimal::Decimal;
use std::fmt::Write;

pub const PLACEHOLDER: &str = "...";
const COLLAPSED_WIDTH: usize = 96;

const HEADERS: [&str; 8] = [
    "Time (IST)",
    "Instrument",
    "Strategy",
    "Status",
    "Entry",
    "Current",
    "Exit",
    "P&L",
];

fn price(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

fn signal_row(signal: &Signal) -> [String; 8] {
    [
        signal
            .created_at
            .with_timezone(&ist_offset())
            .format("%d-%m %H:%M:%S")
            .to_string(),
        signal.instrument.to_string(),
        signal.strategy.as_str().to_string(),
        signal.status.as_str().to_string(),
        format!("{:.2}", signal.entry_price),
        price(signal.current_price),
        price(signal.exit_price),
        price(signal.pnl),
    ]
}

fn status_suffix(state: &QueryState) -> String {
    match (state.status, &state.error) {
        (QueryStatus::Failed, Some(error)) => format!(" [stale: {}]", error),
        (QueryStatus::Failed, None) => " [stale]".to_string(),
        _ => String::new(),
    }
}

/// Signals table; a row of placeholders until the first fetch lands
pub fn render_signals(state: &QueryState) -> String {
    let rows: Vec<[String; 8]> = match state.signals() {
        Some(signals) => signals.iter().map(signal_row).collect(),
        None => vec![HEADERS.map(|_| PLACEHOLDER.to_string())],
    };

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "Signals{}", status_suffix(state));
    let header: Vec<String> = HEADERS
        .iter()
        .zip(widths)
        .map(|(h, w)| format!("{:<w$}", h, w = w))
        .collect();
    let _ = writeln!(out, "{}", header.join(" | ").trim_end());
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));
    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{:<w$}", c, w = w))
            .collect();
        let _ = writeln!(out, "{}", cells.join(" | ").trim_end());
    }
    if state.signals().map_or(false, <[Signal]>::is_empty) {
        let _ = writeln!(out, "(no signals)");
    }
    out
}

/// Active count and the summed P&L across every cached signal
pub fn render_summary(state: &QueryState) -> String {
    match state.signals() {
        Some(signals) => {
            let active = signals.iter().filter(|s| s.is_active()).count();
            let total: Decimal = signals.iter().map(Signal::pnl_or_zero).sum();
            format!("Active: {} | Total P&L: {:.2}", active, total)
        }
        None => format!("Active: {} | Total P&L: {}", PLACEHOLDER, PLACEHOLDER),
    }
}

/// Analysis card: one line collapsed, pretty JSON expanded
pub fn render_card(title: &str, state: &QueryState, expanded: bool) -> String {
    let suffix = status_suffix(state);
    let Some(value) = state.json() else {
        return format!("▸ {}: {}{}", title, PLACEHOLDER, suffix);
    };

    if expanded {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        return format!("▾ {}{}\n{}", title, suffix, body);
    }

    let mut line = value.to_string();
    if line.chars().count() > COLLAPSED_WIDTH {
        line = line.chars().take(COLLAPSED_WIDTH).collect::<String>() + PLACEHOLDER;
    }
    format!("▸ {}: {}{}", title, line, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{QueryCache, QueryKey, QueryValue};
    use chrono::{TimeZone, Utc};
    use common::{Instrument, SignalStatus, Strategy};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn ready(value: QueryValue) -> QueryState {
        let cache = QueryCache::new();
        let ticket = cache.begin_fetch(QueryKey::Signals);
        cache.complete_fetch(ticket, value);
        cache.state(QueryKey::Signals)
    }

    fn nifty_signal() -> Signal {
        let created = Utc.with_ymd_and_hms(2024, 2, 9, 4, 0, 0).unwrap();
        Signal {
            id: Uuid::new_v4(),
            instrument: Instrument::Nifty,
            strategy: Strategy::MeanReversion,
            status: SignalStatus::Closed,
            entry_price: dec!(100),
            current_price: Some(dec!(105)),
            exit_price: Some(dec!(105)),
            pnl: Some(dec!(250)),
            exit_reason: Some("Manual exit".to_string()),
            created_at: created,
            updated_at: created,
            closed_time: Some(created),
        }
    }

    #[test]
    fn test_loading_table_shows_placeholders() {
        let cache = QueryCache::new();
        let table = render_signals(&cache.state(QueryKey::Signals));
        let last = table.lines().last().unwrap();
        assert_eq!(last.matches(PLACEHOLDER).count(), HEADERS.len());
    }

    #[test]
    fn test_signal_row_uses_ist_time() {
        let table = render_signals(&ready(QueryValue::Signals(vec![nifty_signal()])));
        // 04:00 UTC is 09:30 IST
        assert!(table.contains("09-02 09:30:00"));
        assert!(table.contains("mean_reversion"));
        assert!(table.contains("250.00"));
    }

    #[test]
    fn test_summary() {
        let mut open = nifty_signal();
        open.status = SignalStatus::Active;
        open.pnl = Some(dec!(-12.5));
        let state = ready(QueryValue::Signals(vec![nifty_signal(), open]));
        assert_eq!(render_summary(&state), "Active: 1 | Total P&L: 237.50");
    }

    #[test]
    fn test_card_collapsed_and_expanded() {
        let cache = QueryCache::new();
        let key = QueryKey::MarketRegime(Instrument::Nifty);
        assert_eq!(render_card("NIFTY regime", &cache.state(key), false), "▸ NIFTY regime: ...");

        let ticket = cache.begin_fetch(key);
        cache.complete_fetch(ticket, QueryValue::Json(json!({ "regime": "trending" })));
        let state = cache.state(key);

        assert_eq!(
            render_card("NIFTY regime", &state, false),
            r#"▸ NIFTY regime: {"regime":"trending"}"#
        );
        let expanded = render_card("NIFTY regime", &state, true);
        assert!(expanded.starts_with("▾ NIFTY regime\n{"));
        assert!(expanded.contains("  \"regime\": \"trending\""));
    }
}
