use crate::publisher::EventPublisher;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use vigil_judge::Judger;

/// Periodically scores composite strategies and evicts idle windows.
pub struct MultiScanScheduler {
    judger: Arc<Judger>,
    publisher: EventPublisher,
    tick_secs: u64,
    window_idle_secs: u64,
}

impl MultiScanScheduler {
    pub fn new(
        judger: Arc<Judger>,
        publisher: EventPublisher,
        tick_secs: u64,
        window_idle_secs: u64,
    ) -> Self {
        Self {
            judger,
            publisher,
            tick_secs: tick_secs.max(1),
            window_idle_secs,
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            tick_secs = self.tick_secs,
            window_idle_secs = self.window_idle_secs,
            "Multi strategy scan scheduler started"
        );

        let mut tick = interval(Duration::from_secs(self.tick_secs));
        loop {
            tick.tick().await;
            self.run_once();
        }
    }

    /// One scan cycle. Returns the number of events published.
    pub fn run_once(&self) -> usize {
        let events = self.judger.scan_multi();
        let count = events.len();
        if count > 0 {
            tracing::debug!(count, "Composite events produced");
        }
        self.publisher.publish(events);

        if self.window_idle_secs > 0 {
            // Clocked by metric timestamps so replayed history keeps its windows.
            let cutoff = self
                .judger
                .latest_timestamp()
                .saturating_sub(self.window_idle_secs as i64);
            self.judger.evict_idle(cutoff);
        }
        count
    }
}
