use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::check_availability;
use super::conflict::{check_rule_conflict, now_ms, today, validate_rule_range, validate_stay};
use super::{Engine, EngineError, WalCommand};

fn validate_room_fields(name: &Option<String>, base_price: Money) -> Result<(), EngineError> {
    if let Some(n) = name
        && n.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
    if base_price < 0 {
        return Err(EngineError::InvalidRange("base price must not be negative"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_room(
        &self,
        id: Ulid,
        name: Option<String>,
        base_price: Money,
        channel_prices: HashMap<Channel, Money>,
        minimum_nights: Option<u32>,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_ROOMS_PER_HOTEL {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        validate_room_fields(&name, base_price)?;
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomCreated {
            id,
            name: name.clone(),
            base_price,
            channel_prices: channel_prices.clone(),
            minimum_nights,
        };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, name, base_price, channel_prices, minimum_nights);
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn update_room(
        &self,
        id: Ulid,
        name: Option<String>,
        base_price: Money,
        channel_prices: HashMap<Channel, Money>,
        minimum_nights: Option<u32>,
    ) -> Result<(), EngineError> {
        validate_room_fields(&name, base_price)?;
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        let event = Event::RoomUpdated {
            id,
            name,
            base_price,
            channel_prices,
            minimum_nights,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;

        // Drop the reverse index entries for everything the room held.
        let guard = rs.read().await;
        for rule in &guard.rules {
            self.entity_to_room.remove(&rule.id);
        }
        for booking in &guard.bookings {
            self.entity_to_room.remove(&booking.id);
        }
        drop(guard);

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        self.notify.send(id, &event);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_rate_rule(
        &self,
        id: Ulid,
        room_id: Ulid,
        range: DateRange,
        weekdays: WeekdaySet,
        premium: Money,
        min_stay_nights: Option<u32>,
        channel: Option<Channel>,
    ) -> Result<(), EngineError> {
        if weekdays.is_empty() {
            return Err(EngineError::InvalidRange("weekday set must not be empty"));
        }
        validate_rule_range(&range, today())?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if guard.rules.len() >= MAX_RULES_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many rate rules on room"));
        }

        let rule = RateRule {
            id,
            range,
            weekdays,
            premium,
            min_stay_nights,
            channel,
        };
        if let Err(e) = check_rule_conflict(&guard, &rule, None) {
            metrics::counter!(crate::observability::RULE_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::RateRuleAdded { room_id, rule };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    pub async fn update_rate_rule(
        &self,
        id: Ulid,
        range: DateRange,
        weekdays: WeekdaySet,
        premium: Money,
        min_stay_nights: Option<u32>,
        channel: Option<Channel>,
    ) -> Result<Ulid, EngineError> {
        if weekdays.is_empty() {
            return Err(EngineError::InvalidRange("weekday set must not be empty"));
        }
        validate_rule_range(&range, today())?;
        let (room_id, mut guard) = self.resolve_entity_write(&id).await?;

        let rule = RateRule {
            id,
            range,
            weekdays,
            premium,
            min_stay_nights,
            channel,
        };
        // The version being replaced is excluded from the check.
        if let Err(e) = check_rule_conflict(&guard, &rule, Some(id)) {
            metrics::counter!(crate::observability::RULE_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::RateRuleUpdated { room_id, rule };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        Ok(room_id)
    }

    pub async fn remove_rate_rule(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (room_id, mut guard) = self.resolve_entity_write(&id).await?;
        let event = Event::RateRuleRemoved { id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        Ok(room_id)
    }

    /// Block a single calendar date. Idempotent: blocking an already
    /// blocked date writes no event.
    pub async fn block_date(&self, room_id: Ulid, date: NaiveDate) -> Result<(), EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if guard.blocked.binary_search(&date).is_ok() {
            return Ok(());
        }
        if guard.blocked.len() + guard.bookings.len() >= MAX_ENTRIES_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many entries on room"));
        }

        let event = Event::DateBlocked { room_id, date };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Idempotent counterpart of `block_date`.
    pub async fn unblock_date(&self, room_id: Ulid, date: NaiveDate) -> Result<(), EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if guard.blocked.binary_search(&date).is_err() {
            return Ok(());
        }

        let event = Event::DateUnblocked { room_id, date };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Create a pending booking: availability check, price resolution, and
    /// reference allocation all under one write-lock acquisition, so the
    /// quoted cost is the charged cost and no interleaved request can
    /// double-book the window.
    pub async fn create_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        stay: StaySpan,
        channel: Channel,
        hold_expires_at: Option<Ms>,
    ) -> Result<BookingInfo, EngineError> {
        validate_stay(&stay)?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if guard.blocked.len() + guard.bookings.len() >= MAX_ENTRIES_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many entries on room"));
        }

        if let Err(e) = check_availability(&guard, &stay, now_ms()) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let quote = super::resolve_pricing(&guard, &stay, channel);
        let reference = self.allocate_reference(today().year());

        let event = Event::BookingCreated {
            id,
            room_id,
            reference: reference.clone(),
            span: stay,
            channel,
            total_cost: quote.total_cost,
            hold_expires_at,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);

        Ok(BookingInfo {
            id,
            room_id,
            reference,
            span: stay,
            status: BookingStatus::Pending,
            total_cost: quote.total_cost,
            channel,
        })
    }

    /// Payment captured: pending → confirmed. Confirming twice is a no-op.
    pub async fn confirm_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (room_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking_mut(id).ok_or(EngineError::NotFound(id))?;
        if booking.status == BookingStatus::Confirmed {
            return Ok(room_id);
        }
        // Once the hold lapses the booking stops blocking availability and
        // the window may already belong to someone else. Refusing here keeps
        // confirmed bookings overlap-free: a live hold blocks its window, so
        // no overlapping booking can have been created while it was live.
        if !booking.is_active(now_ms()) {
            return Err(EngineError::HoldLapsed(id));
        }

        let event = Event::BookingConfirmed { id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        Ok(room_id)
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (room_id, mut guard) = self.resolve_entity_write(&id).await?;
        let event = Event::BookingCancelled { id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        Ok(room_id)
    }

    /// Pending bookings whose payment window has lapsed, as
    /// `(booking_id, room_id)` pairs. Consumed by the reaper.
    pub fn collect_expired_pending(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut expired = Vec::new();
        for entry in self.state.iter() {
            let rs = entry.value().clone();
            if let Ok(guard) = rs.try_read() {
                for booking in &guard.bookings {
                    if booking.status == BookingStatus::Pending
                        && let Some(deadline) = booking.hold_expires_at
                        && deadline <= now
                    {
                        expired.push((booking.id, guard.id));
                    }
                }
            }
        }
        expired
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        // Counter snapshots first, so replay is monotonic even though
        // cancelled bookings (and their references) are gone.
        let mut years: Vec<(i32, u32)> = self.ref_seq.iter().map(|e| (*e.key(), *e.value())).collect();
        years.sort_unstable();
        for (year, seq) in years {
            events.push(Event::ReferenceSeq { year, seq });
        }

        let room_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in room_ids {
            let rs = match self.get_room(&id) {
                Some(rs) => rs,
                None => continue,
            };
            // Wait out any writer mid-mutation; skipping a contended room
            // would drop its events from the compacted log.
            let guard = rs.read().await;

            events.push(Event::RoomCreated {
                id: guard.id,
                name: guard.name.clone(),
                base_price: guard.base_price,
                channel_prices: guard.channel_prices.clone(),
                minimum_nights: guard.minimum_nights,
            });
            for rule in &guard.rules {
                events.push(Event::RateRuleAdded {
                    room_id: guard.id,
                    rule: rule.clone(),
                });
            }
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: booking.id,
                    room_id: guard.id,
                    reference: booking.reference.clone(),
                    span: booking.span,
                    channel: booking.channel,
                    total_cost: booking.total_cost,
                    hold_expires_at: booking.hold_expires_at,
                });
                if booking.status == BookingStatus::Confirmed {
                    events.push(Event::BookingConfirmed {
                        id: booking.id,
                        room_id: guard.id,
                    });
                }
            }
            for date in &guard.blocked {
                events.push(Event::DateBlocked {
                    room_id: guard.id,
                    date: *date,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
