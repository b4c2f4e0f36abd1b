//! Background expiry of unpaid reservations.
//!
//! Every `interval` the sweep asks the coordinator to expire pending
//! reservations older than the TTL, releasing their seats. The task stops
//! when the shutdown signal flips to `true` or its sender is dropped.

use crate::metrics::RECLAIM_RUNS_TOTAL;
use std::time::Duration;
use ticketing_core::ReservationCoordinator;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawns the sweep loop on the current runtime.
pub fn spawn(
    coordinator: ReservationCoordinator,
    ttl: chrono::Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(ttl_seconds = ttl.num_seconds(), interval = ?interval, "Pending reclaimer started");

        loop {
            tokio::select! {
                _ = ticker.tick() => sweep(&coordinator, ttl).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
            }
        }
        tracing::info!("Pending reclaimer stopped");
    })
}

/// Runs one expiry pass, logging its outcome.
pub async fn sweep(coordinator: &ReservationCoordinator, ttl: chrono::Duration) {
    metrics::counter!(RECLAIM_RUNS_TOTAL).increment(1);
    match coordinator.reclaim_expired(ttl).await {
        Ok(report) if report.expired > 0 || report.failed > 0 => {
            tracing::info!(
                expired = report.expired,
                seats_released = report.seats_released,
                skipped = report.skipped,
                failed = report.failed,
                "Expired pending reservations"
            );
        },
        Ok(_) => tracing::debug!("No pending reservations to expire"),
        Err(err) => tracing::warn!(error = %err, "Pending reclaim sweep failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use std::sync::Arc;
    use ticketing_core::{AttendeeId, BookingStore, ReservationRequest};
    use ticketing_testing::{EventBuilder, InMemoryBookingStore, InMemoryPaymentGateway, ManualClock, epoch};

    #[tokio::test]
    async fn sweep_releases_stale_pending_seats() {
        let store = Arc::new(InMemoryBookingStore::new());
        let clock = ManualClock::new(epoch());
        let coordinator = ReservationCoordinator::new(
            store.clone(),
            Arc::new(InMemoryPaymentGateway::new()),
            Arc::new(clock.clone()),
        );
        let event = EventBuilder::new().capacity(4).price_cents(1500).build();
        store.insert_event(event.clone()).await.unwrap();

        coordinator
            .create(ReservationRequest {
                event_id: event.id,
                attendee_id: AttendeeId::new(),
                quantity: 3,
                payment_reference: None,
            })
            .await
            .unwrap();

        clock.advance(chrono::Duration::minutes(31));
        sweep(&coordinator, chrono::Duration::minutes(30)).await;

        let after = store.event(event.id).await.unwrap().unwrap();
        assert_eq!(after.reserved_count, 0);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let store = Arc::new(InMemoryBookingStore::new());
        let coordinator = ReservationCoordinator::new(
            store,
            Arc::new(InMemoryPaymentGateway::new()),
            Arc::new(ManualClock::new(epoch())),
        );
        let (tx, rx) = watch::channel(false);

        let handle = spawn(
            coordinator,
            chrono::Duration::minutes(30),
            Duration::from_millis(10),
            rx,
        );
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reclaimer should stop")
            .unwrap();
    }
}
