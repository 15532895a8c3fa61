use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};

/// Why a worker woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The configured interval elapsed.
    Interval,
    /// The run-now signal was set.
    Triggered,
    /// The service is shutting down.
    Shutdown,
}

/// Shared shutdown signal. Cloned into every worker; flipped once by the
/// service root on termination.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Wait for the next wake-up: interval elapse, trigger, or shutdown.
///
/// `Notify` keeps at most one stored permit, so triggers raised while a pass
/// is running coalesce into a single follow-up wake and the signal is
/// consumed before the work starts.
pub async fn next_wake(
    sleep: Duration,
    trigger: &Notify,
    shutdown: &mut watch::Receiver<bool>,
) -> Wake {
    if *shutdown.borrow() {
        return Wake::Shutdown;
    }
    tokio::select! {
        _ = tokio::time::sleep(sleep) => Wake::Interval,
        _ = trigger.notified() => Wake::Triggered,
        _ = shutdown.changed() => Wake::Shutdown,
    }
}

/// Level-triggered run-now signal shared between HTTP handlers and a worker.
pub fn trigger() -> Arc<Notify> {
    Arc::new(Notify::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_before_interval() {
        let trigger = trigger();
        let (_tx, mut rx) = shutdown_channel();
        trigger.notify_one();
        let wake = next_wake(Duration::from_secs(3600), &trigger, &mut rx).await;
        assert_eq!(wake, Wake::Triggered);
    }

    #[tokio::test]
    async fn shutdown_wins() {
        let trigger = trigger();
        let (tx, mut rx) = shutdown_channel();
        tx.send(true).unwrap();
        let wake = next_wake(Duration::from_secs(3600), &trigger, &mut rx).await;
        assert_eq!(wake, Wake::Shutdown);
    }

    #[tokio::test]
    async fn triggers_coalesce() {
        let trigger = trigger();
        let (_tx, mut rx) = shutdown_channel();
        trigger.notify_one();
        trigger.notify_one();
        let first = next_wake(Duration::from_secs(3600), &trigger, &mut rx).await;
        assert_eq!(first, Wake::Triggered);
        // The second notify coalesced into the first permit.
        let second = next_wake(Duration::from_millis(10), &trigger, &mut rx).await;
        assert_eq!(second, Wake::Interval);
    }
}
