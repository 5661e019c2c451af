mod availability;
mod conflict;
mod error;
mod mutations;
mod pricing;
mod queries;
mod reference;

pub use availability::{check_availability, free_windows, merge_overlapping, subtract_spans};
pub use conflict::{check_rule_conflict, validate_rule_range};
pub use error::EngineError;
pub use pricing::{Quote, resolve_pricing};
pub use reference::{format_reference, next_reference, parse_reference};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// One hotel's booking engine: every room behind its own `RwLock`, all
/// mutations WAL-first. The per-room write lock is the transactional
/// boundary — availability check, reference allocation, and booking
/// insert all happen under a single acquisition, so two concurrent
/// requests for overlapping windows cannot both observe "available".
pub struct Engine {
    pub state: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: entity (rule/booking) id → room id
    pub(super) entity_to_room: DashMap<Ulid, Ulid>,
    /// Highest allocated booking reference per year.
    pub(super) ref_seq: DashMap<i32, u32>,
}

/// Apply an event directly to a RoomState (no locking — caller holds the lock).
fn apply_to_room(rs: &mut RoomState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::RateRuleAdded { room_id, rule } => {
            rs.insert_rule(rule.clone());
            entity_map.insert(rule.id, *room_id);
        }
        Event::RateRuleUpdated { room_id, rule } => {
            rs.remove_rule(rule.id);
            rs.insert_rule(rule.clone());
            entity_map.insert(rule.id, *room_id);
        }
        Event::RateRuleRemoved { id, .. } => {
            rs.remove_rule(*id);
            entity_map.remove(id);
        }
        Event::BookingCreated {
            id,
            room_id,
            reference,
            span,
            channel,
            total_cost,
            hold_expires_at,
        } => {
            rs.insert_booking(Booking {
                id: *id,
                reference: reference.clone(),
                span: *span,
                status: BookingStatus::Pending,
                total_cost: *total_cost,
                channel: *channel,
                hold_expires_at: *hold_expires_at,
            });
            entity_map.insert(*id, *room_id);
        }
        Event::BookingConfirmed { id, .. } => {
            if let Some(booking) = rs.booking_mut(*id) {
                booking.status = BookingStatus::Confirmed;
                booking.hold_expires_at = None;
            }
        }
        Event::BookingCancelled { id, .. } => {
            rs.remove_booking(*id);
            entity_map.remove(id);
        }
        Event::DateBlocked { date, .. } => {
            rs.block(*date);
        }
        Event::DateUnblocked { date, .. } => {
            rs.unblock(*date);
        }
        Event::RoomUpdated {
            name,
            base_price,
            channel_prices,
            minimum_nights,
            ..
        } => {
            rs.name = name.clone();
            rs.base_price = *base_price;
            rs.channel_prices = channel_prices.clone();
            rs.minimum_nights = *minimum_nights;
        }
        // Handled at the engine level, not per-room
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } | Event::ReferenceSeq { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            entity_to_room: DashMap::new(),
            ref_seq: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy hotel
        // creation).
        for event in &events {
            match event {
                Event::RoomCreated {
                    id,
                    name,
                    base_price,
                    channel_prices,
                    minimum_nights,
                } => {
                    let rs = RoomState::new(
                        *id,
                        name.clone(),
                        *base_price,
                        channel_prices.clone(),
                        *minimum_nights,
                    );
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                Event::RoomDeleted { id } => {
                    engine.state.remove(id);
                }
                Event::ReferenceSeq { year, seq } => {
                    engine.raise_ref_seq(*year, *seq);
                }
                other => {
                    if let Event::BookingCreated { reference, .. } = other
                        && let Some((year, seq)) = parse_reference(reference) {
                            engine.raise_ref_seq(year, seq);
                        }
                    if let Some(room_id) = event_room_id(other)
                        && let Some(entry) = engine.state.get(&room_id) {
                            let rs_arc = entry.clone();
                            let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                            apply_to_room(&mut guard, other, &engine.entity_to_room);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_room_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_room.get(entity_id).map(|e| *e.value())
    }

    /// Allocate the next booking reference for a year. The DashMap entry
    /// lock makes the increment atomic; callers additionally hold the
    /// room's write lock so check + allocate + insert is one unit.
    pub(super) fn allocate_reference(&self, year: i32) -> String {
        let mut entry = self.ref_seq.entry(year).or_insert(0);
        *entry += 1;
        format_reference(year, *entry)
    }

    fn raise_ref_seq(&self, year: i32, seq: u32) {
        let mut entry = self.ref_seq.entry(year).or_insert(0);
        if seq > *entry {
            *entry = seq;
        }
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.entity_to_room);
        self.notify.send(room_id, event);
        Ok(())
    }

    /// Lookup entity → room, get room, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .get_room_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.write_owned().await;
        Ok((room_id, guard))
    }
}

/// Extract the room id from a room-scoped event.
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RateRuleAdded { room_id, .. }
        | Event::RateRuleUpdated { room_id, .. }
        | Event::RateRuleRemoved { room_id, .. }
        | Event::BookingCreated { room_id, .. }
        | Event::BookingConfirmed { room_id, .. }
        | Event::BookingCancelled { room_id, .. }
        | Event::DateBlocked { room_id, .. }
        | Event::DateUnblocked { room_id, .. } => Some(*room_id),
        Event::RoomUpdated { id, .. } => Some(*id),
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } | Event::ReferenceSeq { .. } => None,
    }
}
