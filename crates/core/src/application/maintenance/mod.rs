// Ticket Reaper
// Periodic store sync and retention of terminal tickets

use crate::application::shutdown::ShutdownToken;
use crate::application::waitlist::WaitlistService;
use crate::error::Result;
use crate::port::TimeProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one reaper pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    /// Deferred store writes replayed
    pub replayed: usize,
    /// Terminal tickets dropped
    pub purged: usize,
}

/// Background reaper
///
/// Each tick replays deferred store writes and purges finished, expired and
/// deleted tickets whose last update is older than the retention window.
pub struct TicketReaper {
    service: Arc<WaitlistService>,
    time_provider: Arc<dyn TimeProvider>,
    retention: Duration,
    interval: Duration,
}

impl TicketReaper {
    /// Create a reaper using the service's retention and interval settings
    pub fn new(service: Arc<WaitlistService>, time_provider: Arc<dyn TimeProvider>) -> Self {
        let retention = service.config().terminal_retention;
        let interval = service.config().reap_interval;
        Self {
            service,
            time_provider,
            retention,
            interval,
        }
    }

    /// Run the reaper loop until shutdown
    ///
    /// Should be spawned in tokio::spawn
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Ticket reaper started"
        );

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Ticket reaper stopped");
                    return;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = %e, "Ticket reaper pass failed");
                    }
                }
            }
        }
    }

    /// Run one pass immediately
    pub async fn run_now(&self) -> Result<ReapStats> {
        let replayed = match self.service.sync_store().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Ticket store still unavailable, retrying next pass");
                0
            }
        };

        let cutoff = self.time_provider.now_millis() - self.retention.as_millis() as i64;
        let purged = self.service.purge_terminal(cutoff).await?;

        let stats = ReapStats { replayed, purged };
        if purged > 0 || replayed > 0 {
            info!(replayed = replayed, purged = purged, "Ticket reaper pass completed");
        } else {
            debug!("Ticket reaper pass found nothing to do");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::WaitlistConfig;
    use crate::application::shutdown::shutdown_channel;
    use crate::application::waitlist::CreateTicketRequest;
    use crate::domain::TicketStatus;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::ticket_store::mocks::InMemoryTicketStore;
    use crate::port::time_provider::mocks::TokioClock;

    const BASE: i64 = 1_000_000;

    fn setup(
        retention: Duration,
    ) -> (Arc<WaitlistService>, Arc<InMemoryTicketStore>, Arc<TokioClock>) {
        let store = Arc::new(InMemoryTicketStore::new());
        let clock = Arc::new(TokioClock::new(BASE));
        let service = WaitlistService::new(
            store.clone(),
            Arc::new(SequentialIdProvider::new()),
            clock.clone(),
            WaitlistConfig {
                terminal_retention: retention,
                reap_interval: Duration::from_secs(1),
                ..Default::default()
            },
        );
        (service, store, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now_respects_retention() {
        let (service, store, clock) = setup(Duration::from_secs(10));
        let reaper = TicketReaper::new(service.clone(), clock.clone());

        let ticket = service
            .create(CreateTicketRequest::new("node-1", "vm", "1", BASE + 60_000))
            .await
            .unwrap();
        service.release(&ticket.uuid).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(reaper.run_now().await.unwrap().purged, 0);
        assert_eq!(
            service.get(&ticket.uuid).await.unwrap().status,
            TicketStatus::Finished
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(reaper.run_now().await.unwrap().purged, 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_replays_deferred_writes_and_stops() {
        let (service, store, clock) = setup(Duration::from_secs(3_600));
        let ticket = service
            .create(CreateTicketRequest::new("node-1", "vm", "1", BASE + 500))
            .await
            .unwrap();

        store.set_unavailable(true);
        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(service.stats().await.deferred_writes, 1);
        store.set_unavailable(false);

        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(TicketReaper::new(service.clone(), clock).run(token));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(service.stats().await.deferred_writes, 0);
        assert_eq!(store.get(&ticket.uuid).unwrap().status, TicketStatus::Expired);

        tx.shutdown();
        handle.await.unwrap();
    }
}
