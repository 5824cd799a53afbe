//! Background sweep of dead sessions and elapsed rate-limit windows.

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::session::SessionService;

/// Run `SessionService::sweep` every `every` until the handle is aborted.
pub fn spawn_sweeper(service: SessionService, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing is stale at startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match service.sweep().await {
                Ok(report) => debug!(
                    sessions_removed = report.sessions_removed,
                    rate_limits_removed = report.rate_limits_removed,
                    "Sweep complete"
                ),
                Err(err) => error!("Sweep failed: {err:#}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{login_request, Harness};
    use anyhow::Result;

    #[tokio::test]
    async fn sweeper_drops_expired_sessions() -> Result<()> {
        let harness = Harness::new();
        let issued = harness.service.login("ip", login_request("0x0a")).await?;
        harness.clock.advance(chrono::Duration::days(2));

        let handle = spawn_sweeper(harness.service.clone(), Duration::from_millis(10));
        let mut swept = false;
        for _ in 0..100 {
            if harness.service.store().get(&issued.session_key).await.is_none() {
                swept = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(swept);
        assert!(harness.service.limiter().is_empty().await);
        Ok(())
    }
}
