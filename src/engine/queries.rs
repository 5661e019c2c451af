use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_DAYS;
use crate::model::*;

use super::availability;
use super::conflict::{now_ms, validate_stay};
use super::pricing::{Quote, resolve_pricing};
use super::{Engine, EngineError};

impl Engine {
    /// Price a prospective stay. Quoting never mutates and never fails on
    /// pricing grounds: a night no rule covers falls back to the channel
    /// base price.
    pub async fn quote(
        &self,
        room_id: Ulid,
        stay: StaySpan,
        channel: Channel,
    ) -> Result<Quote, EngineError> {
        validate_stay(&stay)?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(resolve_pricing(&guard, &stay, channel))
    }

    /// Would this stay be accepted right now? Advisory only — the
    /// authoritative check happens again under the write lock in
    /// `create_booking`.
    pub async fn check_availability(
        &self,
        room_id: Ulid,
        stay: StaySpan,
    ) -> Result<(), EngineError> {
        validate_stay(&stay)?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        availability::check_availability(&guard, &stay, now_ms())
    }

    /// Maximal free spans inside `query`, in chronological order. Windows
    /// shorter than the room's minimum stay (or the caller's `min_nights`,
    /// whichever is larger) are dropped.
    pub async fn free_windows(
        &self,
        room_id: Ulid,
        query: StaySpan,
        min_nights: Option<i64>,
    ) -> Result<Vec<StaySpan>, EngineError> {
        if query.start >= query.end {
            return Err(EngineError::InvalidRange(
                "query start must precede query end",
            ));
        }
        if query.nights() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;

        let floor = min_nights
            .unwrap_or(1)
            .max(guard.minimum_nights.unwrap_or(0) as i64);
        let mut windows = availability::free_windows(&guard, &query, now_ms());
        windows.retain(|w| w.nights() >= floor);
        Ok(windows)
    }

    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self
            .state
            .iter()
            .filter_map(|entry| {
                let guard = entry.value().try_read().ok()?;
                Some(RoomInfo {
                    id: guard.id,
                    name: guard.name.clone(),
                    base_price: guard.base_price,
                    channel_prices: guard.channel_prices.clone(),
                    minimum_nights: guard.minimum_nights,
                })
            })
            .collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub async fn get_rules(&self, room_id: Ulid) -> Result<Vec<RateRule>, EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.rules.clone())
    }

    pub async fn get_bookings(&self, room_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| BookingInfo {
                id: b.id,
                room_id: guard.id,
                reference: b.reference.clone(),
                span: b.span,
                status: b.status,
                total_cost: b.total_cost,
                channel: b.channel,
            })
            .collect())
    }

    pub async fn get_blocked_dates(&self, room_id: Ulid) -> Result<Vec<NaiveDate>, EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.blocked.clone())
    }
}
