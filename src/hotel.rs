use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::reaper;

/// Manages per-hotel engines. Each hotel gets its own Engine + WAL + reaper,
/// keyed by a property slug. Rooms, rules, and bookings never cross hotels.
pub struct HotelDirectory {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl HotelDirectory {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Get or lazily create an engine for the given hotel.
    pub fn get_or_create(&self, hotel: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(hotel) {
            return Ok(engine.value().clone());
        }
        if hotel.len() > MAX_HOTEL_SLUG_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "hotel slug too long",
            ));
        }
        if self.engines.len() >= MAX_HOTELS {
            return Err(std::io::Error::other("too many hotels"));
        }

        // Sanitize the slug to prevent path traversal
        let safe_name: String = hotel
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty hotel slug",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));

        // The entry guard keeps a racing call for the same slug from
        // building a second Engine over the same WAL file.
        let engine = match self.engines.entry(hotel.to_string()) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let notify = Arc::new(NotifyHub::new());
                let engine = Arc::new(Engine::new(wal_path, notify)?);

                // Spawn reaper + compactor for this hotel
                let reaper_engine = engine.clone();
                tokio::spawn(async move {
                    reaper::run_reaper(reaper_engine).await;
                });
                let compactor_engine = engine.clone();
                let threshold = self.compact_threshold;
                tokio::spawn(async move {
                    reaper::run_compactor(compactor_engine, threshold).await;
                });

                slot.insert(engine.clone());
                engine
            }
        };
        metrics::gauge!(crate::observability::HOTELS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
