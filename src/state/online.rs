//! Online-count publishing.

use super::hub::Hub;
use crate::cache::CacheSync;
use std::sync::Arc;
use tracing::debug;

/// Publishes the online count only when it changed since the last publish.
#[derive(Debug, Default)]
pub struct OnlineCountPublisher {
    last: Option<usize>,
}

impl OnlineCountPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a write was made.
    pub async fn publish_if_changed(&mut self, count: usize, cache: &CacheSync) -> bool {
        if self.last == Some(count) {
            return false;
        }
        cache.publish_online_count(count).await;
        self.last = Some(count);
        debug!(count, "Published online count");
        true
    }
}

/// Check the online count on every interval tick, starting immediately.
pub async fn run_online_count_publisher(hub: Arc<Hub>) {
    let mut interval = tokio::time::interval(hub.timeouts.online_count_interval());
    let mut publisher = OnlineCountPublisher::new();
    loop {
        interval.tick().await;
        publisher
            .publish_if_changed(hub.sessions.count(), &hub.cache)
            .await;
    }
}
