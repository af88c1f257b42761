// Inbound client commands
// Envelopes sent by clients over the push channel, routed into SignalService

use anyhow::{Context, Result};
use common::Envelope;
use rust_decimal::Decimal;
use serde::Deserialize;
use signal_storage::{ExitFilter, SignalService};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const PRICE_TICK: &str = "price_tick";
pub const EXIT_SIGNAL: &str = "exit_signal";
pub const EXIT_ALL: &str = "exit_all";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceTick {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitRequest {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub exit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExitAllRequest {
    /// Missing means every active signal
    #[serde(default)]
    pub filter: Option<ExitFilter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PriceTick(PriceTick),
    ExitSignal(ExitRequest),
    ExitAll(ExitAllRequest),
}

impl Command {
    /// `Ok(None)` for envelope types that are not commands
    pub fn parse(envelope: &Envelope) -> Result<Option<Self>> {
        let command = match envelope.event_type.as_str() {
            PRICE_TICK => Command::PriceTick(envelope.decode().context("Invalid price_tick payload")?),
            EXIT_SIGNAL => Command::ExitSignal(envelope.decode().context("Invalid exit_signal payload")?),
            EXIT_ALL => {
                if envelope.data.is_null() {
                    Command::ExitAll(ExitAllRequest { filter: None })
                } else {
                    Command::ExitAll(envelope.decode().context("Invalid exit_all payload")?)
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

pub async fn execute(service: &SignalService, command: Command) -> Result<()> {
    match command {
        Command::PriceTick(tick) => {
            if service.apply_price_tick(tick.id, tick.price).await?.is_none() {
                debug!("Price tick for {} not applied", tick.id);
            }
        }
        Command::ExitSignal(request) => {
            if service.exit_signal(request.id, request.exit_price).await?.is_none() {
                warn!("Exit requested for unknown signal {}", request.id);
            }
        }
        Command::ExitAll(request) => {
            let filter = request.filter.unwrap_or(ExitFilter::All);
            let closed = service.exit_all(filter).await?;
            info!("Bulk exit ({}) closed {} signal(s)", filter.label(), closed);
        }
    }
    Ok(())
}

/// Drain inbound envelopes until every sender is gone
pub async fn run_command_loop(service: Arc<SignalService>, mut inbound: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = inbound.recv().await {
        match Command::parse(&envelope) {
            Ok(Some(command)) => {
                if let Err(e) = execute(&service, command).await {
                    error!("Command {} failed: {:#}", envelope.event_type, e);
                }
            }
            Ok(None) => debug!("Ignoring non-command message {}", envelope.event_type),
            Err(e) => warn!("{:#}", e),
        }
    }
    info!("Command channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::NotifierHub;
    use common::{Instrument, NewSignal, SignalStatus, Strategy, PRICE_UPDATE, SIGNAL_UPDATE};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use signal_storage::{InMemorySignalStore, SignalStore};

    fn service() -> (Arc<SignalService>, Arc<InMemorySignalStore>, Arc<NotifierHub>) {
        let store = Arc::new(InMemorySignalStore::new());
        let hub = Arc::new(NotifierHub::new(16));
        let service = Arc::new(SignalService::new(store.clone(), hub.clone()));
        (service, store, hub)
    }

    #[test]
    fn test_parse_commands() {
        let id = Uuid::new_v4();

        let tick = Command::parse(&Envelope::new(PRICE_TICK, json!({ "id": id, "price": 105 })))
            .unwrap()
            .unwrap();
        assert_eq!(tick, Command::PriceTick(PriceTick { id, price: dec!(105) }));

        let exit = Command::parse(&Envelope::new(EXIT_SIGNAL, json!({ "id": id, "exitPrice": 98.5 })))
            .unwrap()
            .unwrap();
        assert_eq!(exit, Command::ExitSignal(ExitRequest { id, exit_price: dec!(98.5) }));

        let all = Command::parse(&Envelope::new(EXIT_ALL, json!({ "filter": "loss" })))
            .unwrap()
            .unwrap();
        assert_eq!(all, Command::ExitAll(ExitAllRequest { filter: Some(ExitFilter::Loss) }));
    }

    #[test]
    fn test_parse_rejects_bad_payload_and_skips_unknown() {
        assert!(Command::parse(&Envelope::new(PRICE_TICK, json!({ "price": 1 }))).is_err());
        assert!(Command::parse(&Envelope::new("hello", json!({}))).unwrap().is_none());
        assert_eq!(
            Command::parse(&Envelope::new(EXIT_ALL, serde_json::Value::Null)).unwrap(),
            Some(Command::ExitAll(ExitAllRequest { filter: None }))
        );
    }

    #[tokio::test]
    async fn test_price_tick_updates_and_pushes() {
        let (service, store, hub) = service();
        let signal = store
            .create_signal(NewSignal::new(Instrument::Nifty, Strategy::Momentum, dec!(100)))
            .await
            .unwrap();
        let mut events = hub.subscribe();

        execute(&service, Command::PriceTick(PriceTick { id: signal.id, price: dec!(105) }))
            .await
            .unwrap();

        let stored = store.get_signal(signal.id).await.unwrap().unwrap();
        assert_eq!(stored.current_price, Some(dec!(105)));
        assert_eq!(stored.pnl, Some(dec!(250)));

        let pushed = events.recv().await.unwrap();
        assert_eq!(pushed.event_type, PRICE_UPDATE);
        assert_eq!(pushed.data["pnl"], json!(250.0));
    }

    #[tokio::test]
    async fn test_command_loop_exits_signal() {
        let (service, store, hub) = service();
        let signal = store
            .create_signal(NewSignal::new(Instrument::BankNifty, Strategy::Breakout, dec!(200)))
            .await
            .unwrap();
        let mut events = hub.subscribe();

        let (tx, rx) = mpsc::channel(4);
        let worker = tokio::spawn(run_command_loop(service, rx));
        tx.send(Envelope::new("noise", json!({}))).await.unwrap();
        tx.send(Envelope::new(EXIT_SIGNAL, json!({ "id": signal.id, "exitPrice": 210 })))
            .await
            .unwrap();
        drop(tx);
        worker.await.unwrap();

        let stored = store.get_signal(signal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Closed);
        assert_eq!(stored.pnl, Some(dec!(150)));
        assert_eq!(events.recv().await.unwrap().event_type, SIGNAL_UPDATE);
    }

    #[tokio::test]
    async fn test_exit_all_profit_only() {
        let (service, store, _hub) = service();
        let winner = store
            .create_signal(NewSignal::new(Instrument::Nifty, Strategy::Scalping, dec!(100)))
            .await
            .unwrap();
        let loser = store
            .create_signal(NewSignal::new(Instrument::Nifty, Strategy::Scalping, dec!(100)))
            .await
            .unwrap();
        service.apply_price_tick(winner.id, dec!(104)).await.unwrap();
        service.apply_price_tick(loser.id, dec!(97)).await.unwrap();

        execute(&service, Command::ExitAll(ExitAllRequest { filter: Some(ExitFilter::Profit) }))
            .await
            .unwrap();

        assert_eq!(store.get_signal(winner.id).await.unwrap().unwrap().status, SignalStatus::Closed);
        assert_eq!(store.get_signal(loser.id).await.unwrap().unwrap().status, SignalStatus::Active);
    }
}
