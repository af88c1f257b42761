// Per-query polling task
// Fetch with retry, then sleep until the interval elapses or the key is invalidated

use crate::cache::{QueryCache, QueryKey, QueryValue};
use crate::retry::RetryPolicy;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error};

/// Where poll results come from
#[async_trait::async_trait]
pub trait QuerySource: Send + Sync {
    async fn fetch(&self, key: QueryKey) -> Result<QueryValue>;
}

/// Floor for poll intervals so a zero setting cannot hammer the API
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Poller {
    key: QueryKey,
    interval: Duration,
    retry: RetryPolicy,
    cache: Arc<QueryCache>,
    source: Arc<dyn QuerySource>,
    wake: Arc<Notify>,
}

impl Poller {
    pub fn new(
        key: QueryKey,
        interval: Duration,
        retry: RetryPolicy,
        cache: Arc<QueryCache>,
        source: Arc<dyn QuerySource>,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let hook_wake = wake.clone();
        cache.on_invalidate(key, move || hook_wake.notify_one());

        Self {
            key,
            interval: interval.max(MIN_POLL_INTERVAL),
            retry,
            cache,
            source,
            wake,
        }
    }

    pub fn key(&self) -> QueryKey {
        self.key
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One fetch cycle; true when the cache entry ended up `Ready`
    pub async fn poll_once(&self) -> bool {
        let ticket = self.cache.begin_fetch(self.key);
        let label = self.key.to_string();
        let result = self.retry.run(&label, || self.source.fetch(self.key)).await;

        match result {
            Ok(value) => {
                self.cache.complete_fetch(ticket, value);
                debug!("Refreshed {}", self.key);
                true
            }
            Err(e) => {
                error!("Giving up on {} after {} attempts: {:#}", self.key, self.retry.attempts, e);
                self.cache.fail_fetch(ticket, format!("{:#}", e));
                false
            }
        }
    }

    pub async fn run(self) {
        loop {
            self.poll_once().await;
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = self.wake.notified() => debug!("{} invalidated, refetching", self.key),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
