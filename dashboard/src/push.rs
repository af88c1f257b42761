// Push bridge
// Feeds notifier events into the query cache

use crate::cache::{QueryCache, QueryKey};
use common::{Envelope, PushEvent, PRICE_UPDATE, SIGNAL_UPDATE};
use realtime::{RealtimeClient, Subscription};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Apply one push envelope to the cache
pub fn apply_envelope(cache: &QueryCache, envelope: &Envelope) {
    match PushEvent::from_envelope(envelope) {
        Ok(Some(PushEvent::PriceUpdate(update))) => {
            if !cache.apply_price_update(&update) {
                debug!("Price update for uncached signal {}", update.id);
            }
        }
        Ok(Some(PushEvent::SignalUpdate(changed))) => {
            debug!("Signal set changed ({:?}), refetching", changed.reason);
            cache.invalidate(QueryKey::Signals);
        }
        Ok(None) => debug!("Ignoring push type {}", envelope.event_type),
        Err(e) => warn!("Malformed {} push: {}", envelope.event_type, e),
    }
}

/// Register cache handlers on `client`; keep the subscriptions to detach later
pub fn attach(client: &RealtimeClient, cache: Arc<QueryCache>) -> Vec<Subscription> {
    [PRICE_UPDATE, SIGNAL_UPDATE]
        .into_iter()
        .map(|event_type| {
            let cache = cache.clone();
            client.on(event_type, move |data| {
                apply_envelope(&cache, &Envelope::new(event_type, data.clone()));
            })
        })
        .collect()
}

/// Start the push connection if none is running; a running one reconnects itself
pub async fn ensure_connected(client: &RealtimeClient) -> bool {
    if client.is_running().await {
        return true;
    }
    match client.connect().await {
        Ok(()) => {
            info!("Push channel attached");
            true
        }
        Err(e) => {
            debug!("Push channel still unavailable: {:#}", e);
            false
        }
    }
}
