// Push channel messages
// Every frame on the wire is `{ "type": ..., "data": {...} }`

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SIGNAL_UPDATE: &str = "signal_update";
pub const PRICE_UPDATE: &str = "price_update";

/// Untyped wire frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

/// Live price for one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl: Decimal,
}

/// Signal set changed; consumers refetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    SignalUpdate(SignalChanged),
    PriceUpdate(PriceUpdate),
}

impl PushEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PushEvent::SignalUpdate(_) => SIGNAL_UPDATE,
            PushEvent::PriceUpdate(_) => PRICE_UPDATE,
        }
    }

    pub fn to_envelope(&self) -> serde_json::Result<Envelope> {
        let data = match self {
            PushEvent::SignalUpdate(changed) => serde_json::to_value(changed)?,
            PushEvent::PriceUpdate(update) => serde_json::to_value(update)?,
        };
        Ok(Envelope::new(self.event_type(), data))
    }

    /// Typed view of a frame; `Ok(None)` for types this crate does not know
    pub fn from_envelope(envelope: &Envelope) -> serde_json::Result<Option<Self>> {
        match envelope.event_type.as_str() {
            SIGNAL_UPDATE => {
                // signal_update may arrive with no payload at all
                if envelope.data.is_null() {
                    return Ok(Some(PushEvent::SignalUpdate(SignalChanged::default())));
                }
                Ok(Some(PushEvent::SignalUpdate(envelope.decode()?)))
            }
            PRICE_UPDATE => Ok(Some(PushEvent::PriceUpdate(envelope.decode()?))),
            _ => Ok(None),
        }
    }
}

/// Sink for push events raised by the storage side
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: PushEvent);
}

/// Publisher that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: PushEvent) {}
}
