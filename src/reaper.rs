use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that cancels pending bookings whose payment hold lapsed.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let expired = engine.collect_expired_pending(now);
        for (booking_id, _room_id) in expired {
            match engine.cancel_booking(booking_id).await {
                Ok(_) => {
                    metrics::counter!(crate::observability::PENDING_EXPIRED_TOTAL).increment(1);
                    info!("reaped expired pending booking {booking_id}");
                }
                Err(e) => {
                    // May already have been cancelled or confirmed — fine
                    tracing::debug!("reaper skip {booking_id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn reaper_collects_expired_pending() {
        let path = test_wal_path("reaper_collect.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let rid = Ulid::new();
        engine
            .create_room(rid, None, 10_000, HashMap::new(), None)
            .await
            .unwrap();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let bid = Ulid::new();
        let stay = StaySpan::new(d(2025, 7, 1), d(2025, 7, 3));

        // Hold that lapsed a second ago
        engine
            .create_booking(bid, rid, stay, Channel::Website, Some(now - 1_000))
            .await
            .unwrap();

        let expired = engine.collect_expired_pending(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, bid);

        engine.cancel_booking(bid).await.unwrap();
        assert!(engine.collect_expired_pending(now).is_empty());
    }

    #[tokio::test]
    async fn confirmed_bookings_are_never_reaped() {
        let path = test_wal_path("reaper_confirmed.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let rid = Ulid::new();
        engine
            .create_room(rid, None, 10_000, HashMap::new(), None)
            .await
            .unwrap();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let bid = Ulid::new();
        let stay = StaySpan::new(d(2025, 7, 1), d(2025, 7, 3));
        engine
            .create_booking(bid, rid, stay, Channel::Website, Some(now + 60_000))
            .await
            .unwrap();
        engine.confirm_booking(bid).await.unwrap();

        // Even far in the future the confirmed booking stays put
        assert!(engine.collect_expired_pending(now + 3_600_000).is_empty());
    }
}
