use std::collections::HashMap;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Monetary amount in minor units (cents) — the only money type.
pub type Money = i64;

/// Unix milliseconds, used for hold expiry deadlines.
pub type Ms = i64;

/// Half-open date interval `[start, end)` at calendar-day granularity.
/// Used for stays, bookings, and availability queries; `end` is the
/// check-out date and is never occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaySpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StaySpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "StaySpan start must be before end");
        Self { start, end }
    }

    pub fn nights(&self) -> i64 {
        self.end.signed_duration_since(self.start).num_days()
    }

    pub fn overlaps(&self, other: &StaySpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }

    /// Iterate the occupied nights: one date per calendar day, check-out excluded.
    pub fn iter_nights(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

/// Inclusive date range `[start, end]`, used only by rate rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn intersects(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Coarse applicability filter against a stay window.
    pub fn touches_stay(&self, stay: &StaySpan) -> bool {
        self.start <= stay.end && self.end >= stay.start
    }
}

/// Bitmask over Sun..Sat. Seven set bits make a rule *general* for its
/// date range; fewer make it day-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const FULL: WeekdaySet = WeekdaySet(0b0111_1111);

    pub fn empty() -> Self {
        WeekdaySet(0)
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        let mut set = Self::empty();
        for d in days {
            set.insert(*d);
        }
        set
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_sunday()
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn intersects(&self, other: &WeekdaySet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_full(&self) -> bool {
        self.0 == Self::FULL.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> u32 {
        self.0.count_ones()
    }
}

/// Sales channel selecting which base price applies. Unknown labels fall
/// back to the direct website price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Website,
    Airbnb,
    BookingCom,
}

impl Channel {
    pub fn from_label(label: &str) -> Channel {
        match label.to_ascii_lowercase().as_str() {
            "airbnb" => Channel::Airbnb,
            "booking.com" | "booking_com" => Channel::BookingCom,
            _ => Channel::Website,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Channel::Website => "website",
            Channel::Airbnb => "airbnb",
            Channel::BookingCom => "booking_com",
        }
    }
}

/// A pricing adjustment scoped to a date range, a weekday set, and
/// optionally a channel. `premium` is signed: negative means a discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRule {
    pub id: Ulid,
    pub range: DateRange,
    pub weekdays: WeekdaySet,
    pub premium: Money,
    pub min_stay_nights: Option<u32>,
    pub channel: Option<Channel>,
}

impl RateRule {
    pub fn is_general(&self) -> bool {
        self.weekdays.is_full()
    }

    /// A rule with no channel applies to every channel.
    pub fn applies_to_channel(&self, channel: Channel) -> bool {
        self.channel.is_none() || self.channel == Some(channel)
    }

    /// Conflict-time channel predicate: exact match, or either side unset.
    pub fn channel_conflicts_with(&self, other: Option<Channel>) -> bool {
        match (self.channel, other) {
            (None, _) | (_, None) => true,
            (Some(a), Some(b)) => a == b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
}

/// A live reservation. Cancelled bookings are removed from room state
/// entirely (the WAL keeps their history), so live status is only
/// pending or confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Ulid,
    pub reference: String,
    pub span: StaySpan,
    pub status: BookingStatus,
    pub total_cost: Money,
    pub channel: Channel,
    /// Payment window for pending bookings. A lapsed pending booking no
    /// longer blocks the calendar and is cancelled by the reaper.
    pub hold_expires_at: Option<Ms>,
}

impl Booking {
    pub fn is_active(&self, now: Ms) -> bool {
        match self.status {
            BookingStatus::Confirmed => true,
            BookingStatus::Pending => self.hold_expires_at.is_none_or(|e| e > now),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: Option<String>,
    /// Nightly price on the direct website channel.
    pub base_price: Money,
    /// Per-channel overrides; absent channels fall back to `base_price`.
    pub channel_prices: HashMap<Channel, Money>,
    pub minimum_nights: Option<u32>,
    /// Rate rules, sorted by `range.start`.
    pub rules: Vec<RateRule>,
    /// Live bookings, sorted by `span.start`.
    pub bookings: Vec<Booking>,
    /// Blocked dates, sorted and unique.
    pub blocked: Vec<NaiveDate>,
}

impl RoomState {
    pub fn new(
        id: Ulid,
        name: Option<String>,
        base_price: Money,
        channel_prices: HashMap<Channel, Money>,
        minimum_nights: Option<u32>,
    ) -> Self {
        Self {
            id,
            name,
            base_price,
            channel_prices,
            minimum_nights,
            rules: Vec::new(),
            bookings: Vec::new(),
            blocked: Vec::new(),
        }
    }

    /// The nightly base for a channel: override if mapped, else `base_price`.
    pub fn channel_base(&self, channel: Channel) -> Money {
        self.channel_prices
            .get(&channel)
            .copied()
            .unwrap_or(self.base_price)
    }

    /// Insert rule maintaining sort order by range.start.
    pub fn insert_rule(&mut self, rule: RateRule) {
        let pos = self
            .rules
            .binary_search_by_key(&rule.range.start, |r| r.range.start)
            .unwrap_or_else(|e| e);
        self.rules.insert(pos, rule);
    }

    pub fn remove_rule(&mut self, id: Ulid) -> Option<RateRule> {
        let pos = self.rules.iter().position(|r| r.id == id)?;
        Some(self.rules.remove(pos))
    }

    /// Rules whose inclusive range touches the stay window.
    /// Binary search prunes rules starting after the window.
    pub fn rules_touching(&self, stay: &StaySpan) -> impl Iterator<Item = &RateRule> {
        let right_bound = self
            .rules
            .partition_point(|r| r.range.start <= stay.end);
        let start = stay.start;
        self.rules[..right_bound]
            .iter()
            .filter(move |r| r.range.end >= start)
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps the query window (half-open).
    pub fn bookings_touching(&self, query: &StaySpan) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        let start = query.start;
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > start)
    }

    /// Block a date. Returns false if it was already blocked.
    pub fn block(&mut self, date: NaiveDate) -> bool {
        match self.blocked.binary_search(&date) {
            Ok(_) => false,
            Err(pos) => {
                self.blocked.insert(pos, date);
                true
            }
        }
    }

    /// Unblock a date. Returns false if it was not blocked.
    pub fn unblock(&mut self, date: NaiveDate) -> bool {
        match self.blocked.binary_search(&date) {
            Ok(pos) => {
                self.blocked.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Blocked dates inside the stay window, in calendar order.
    pub fn blocked_in(&self, stay: &StaySpan) -> impl Iterator<Item = NaiveDate> {
        let from = self.blocked.partition_point(|d| *d < stay.start);
        let end = stay.end;
        self.blocked[from..]
            .iter()
            .copied()
            .take_while(move |d| *d < end)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: Option<String>,
        base_price: Money,
        channel_prices: HashMap<Channel, Money>,
        minimum_nights: Option<u32>,
    },
    RoomUpdated {
        id: Ulid,
        name: Option<String>,
        base_price: Money,
        channel_prices: HashMap<Channel, Money>,
        minimum_nights: Option<u32>,
    },
    RoomDeleted {
        id: Ulid,
    },
    RateRuleAdded {
        room_id: Ulid,
        rule: RateRule,
    },
    RateRuleUpdated {
        room_id: Ulid,
        rule: RateRule,
    },
    RateRuleRemoved {
        id: Ulid,
        room_id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        reference: String,
        span: StaySpan,
        channel: Channel,
        total_cost: Money,
        hold_expires_at: Option<Ms>,
    },
    BookingConfirmed {
        id: Ulid,
        room_id: Ulid,
    },
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
    DateBlocked {
        room_id: Ulid,
        date: NaiveDate,
    },
    DateUnblocked {
        room_id: Ulid,
        date: NaiveDate,
    },
    /// Reference-counter snapshot, written by compaction so replay keeps
    /// per-year sequences monotonic even after cancelled bookings are
    /// dropped from the log.
    ReferenceSeq {
        year: i32,
        seq: u32,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub base_price: Money,
    pub channel_prices: HashMap<Channel, Money>,
    pub minimum_nights: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub reference: String,
    pub span: StaySpan,
    pub status: BookingStatus,
    pub total_cost: Money,
    pub channel: Channel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn stay_span_basics() {
        let s = StaySpan::new(d(2025, 3, 10), d(2025, 3, 13));
        assert_eq!(s.nights(), 3);
        assert!(s.contains_day(d(2025, 3, 10)));
        assert!(s.contains_day(d(2025, 3, 12)));
        assert!(!s.contains_day(d(2025, 3, 13))); // check-out day is free
    }

    #[test]
    fn stay_span_overlap() {
        let a = StaySpan::new(d(2025, 1, 1), d(2025, 1, 5));
        let b = StaySpan::new(d(2025, 1, 4), d(2025, 1, 9));
        let c = StaySpan::new(d(2025, 1, 5), d(2025, 1, 9));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // back-to-back, not overlapping
    }

    #[test]
    fn stay_span_iter_nights() {
        let s = StaySpan::new(d(2024, 1, 4), d(2024, 1, 8));
        let nights: Vec<NaiveDate> = s.iter_nights().collect();
        assert_eq!(
            nights,
            vec![d(2024, 1, 4), d(2024, 1, 5), d(2024, 1, 6), d(2024, 1, 7)]
        );
    }

    #[test]
    fn date_range_inclusive() {
        let r = DateRange::new(d(2025, 1, 1), d(2025, 1, 31));
        assert!(r.contains(d(2025, 1, 1)));
        assert!(r.contains(d(2025, 1, 31))); // inclusive end
        assert!(!r.contains(d(2025, 2, 1)));
    }

    #[test]
    fn date_range_intersects() {
        let a = DateRange::new(d(2025, 1, 1), d(2025, 1, 31));
        let b = DateRange::new(d(2025, 1, 31), d(2025, 2, 15));
        let c = DateRange::new(d(2025, 2, 1), d(2025, 2, 15));
        assert!(a.intersects(&b)); // share exactly one day
        assert!(!a.intersects(&c));
    }

    #[test]
    fn weekday_set_ops() {
        let mut set = WeekdaySet::empty();
        assert!(set.is_empty());
        set.insert(Weekday::Fri);
        set.insert(Weekday::Sat);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Weekday::Fri));
        assert!(!set.contains(Weekday::Mon));
        assert!(!set.is_full());

        let weekend = WeekdaySet::from_days(&[Weekday::Sat, Weekday::Sun]);
        assert!(set.intersects(&weekend));
        let midweek = WeekdaySet::from_days(&[Weekday::Tue, Weekday::Wed]);
        assert!(!set.intersects(&midweek));

        assert!(WeekdaySet::FULL.is_full());
        assert_eq!(WeekdaySet::FULL.len(), 7);
    }

    #[test]
    fn channel_labels() {
        assert_eq!(Channel::from_label("airbnb"), Channel::Airbnb);
        assert_eq!(Channel::from_label("Booking.com"), Channel::BookingCom);
        assert_eq!(Channel::from_label("booking_com"), Channel::BookingCom);
        assert_eq!(Channel::from_label("website"), Channel::Website);
        assert_eq!(Channel::from_label("direct"), Channel::Website);
        assert_eq!(Channel::from_label("anything"), Channel::Website);
    }

    #[test]
    fn channel_base_fallback() {
        let mut prices = HashMap::new();
        prices.insert(Channel::Airbnb, 13000);
        let room = RoomState::new(Ulid::new(), None, 10000, prices, None);
        assert_eq!(room.channel_base(Channel::Airbnb), 13000);
        assert_eq!(room.channel_base(Channel::BookingCom), 10000);
        assert_eq!(room.channel_base(Channel::Website), 10000);
    }

    #[test]
    fn rule_ordering() {
        let mut room = RoomState::new(Ulid::new(), None, 10000, HashMap::new(), None);
        for (m1, m2) in [(3, 4), (1, 2), (2, 3)] {
            room.insert_rule(RateRule {
                id: Ulid::new(),
                range: DateRange::new(d(2025, m1, 1), d(2025, m2, 1)),
                weekdays: WeekdaySet::FULL,
                premium: 500,
                min_stay_nights: None,
                channel: None,
            });
        }
        assert_eq!(room.rules[0].range.start, d(2025, 1, 1));
        assert_eq!(room.rules[1].range.start, d(2025, 2, 1));
        assert_eq!(room.rules[2].range.start, d(2025, 3, 1));
    }

    #[test]
    fn rules_touching_prunes() {
        let mut room = RoomState::new(Ulid::new(), None, 10000, HashMap::new(), None);
        let in_range = Ulid::new();
        room.insert_rule(RateRule {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 1, 1), d(2024, 12, 31)),
            weekdays: WeekdaySet::FULL,
            premium: 100,
            min_stay_nights: None,
            channel: None,
        });
        room.insert_rule(RateRule {
            id: in_range,
            range: DateRange::new(d(2025, 6, 1), d(2025, 6, 30)),
            weekdays: WeekdaySet::FULL,
            premium: 200,
            min_stay_nights: None,
            channel: None,
        });
        room.insert_rule(RateRule {
            id: Ulid::new(),
            range: DateRange::new(d(2026, 1, 1), d(2026, 12, 31)),
            weekdays: WeekdaySet::FULL,
            premium: 300,
            min_stay_nights: None,
            channel: None,
        });

        let stay = StaySpan::new(d(2025, 6, 10), d(2025, 6, 12));
        let hits: Vec<_> = room.rules_touching(&stay).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, in_range);
    }

    #[test]
    fn bookings_touching_half_open() {
        let mut room = RoomState::new(Ulid::new(), None, 10000, HashMap::new(), None);
        room.insert_booking(Booking {
            id: Ulid::new(),
            reference: "BK-2025-0001".into(),
            span: StaySpan::new(d(2025, 3, 10), d(2025, 3, 15)),
            status: BookingStatus::Confirmed,
            total_cost: 50000,
            channel: Channel::Website,
            hold_expires_at: None,
        });

        // Check-in on the previous guest's check-out day is fine
        let adjacent = StaySpan::new(d(2025, 3, 15), d(2025, 3, 18));
        assert_eq!(room.bookings_touching(&adjacent).count(), 0);

        let overlapping = StaySpan::new(d(2025, 3, 12), d(2025, 3, 18));
        assert_eq!(room.bookings_touching(&overlapping).count(), 1);
    }

    #[test]
    fn blocked_dates_sorted_unique() {
        let mut room = RoomState::new(Ulid::new(), None, 10000, HashMap::new(), None);
        assert!(room.block(d(2025, 5, 3)));
        assert!(room.block(d(2025, 5, 1)));
        assert!(!room.block(d(2025, 5, 3))); // duplicate
        assert_eq!(room.blocked, vec![d(2025, 5, 1), d(2025, 5, 3)]);

        let stay = StaySpan::new(d(2025, 5, 2), d(2025, 5, 6));
        let hit: Vec<_> = room.blocked_in(&stay).collect();
        assert_eq!(hit, vec![d(2025, 5, 3)]);

        assert!(room.unblock(d(2025, 5, 3)));
        assert!(!room.unblock(d(2025, 5, 3)));
    }

    #[test]
    fn pending_booking_expiry() {
        let b = Booking {
            id: Ulid::new(),
            reference: "BK-2025-0001".into(),
            span: StaySpan::new(d(2025, 3, 10), d(2025, 3, 12)),
            status: BookingStatus::Pending,
            total_cost: 20000,
            channel: Channel::Website,
            hold_expires_at: Some(5000),
        };
        assert!(b.is_active(4999));
        assert!(!b.is_active(5000));

        let confirmed = Booking {
            status: BookingStatus::Confirmed,
            ..b
        };
        assert!(confirmed.is_active(999_999)); // expiry irrelevant once paid
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            id: Ulid::new(),
            room_id: Ulid::new(),
            reference: "BK-2025-0042".into(),
            span: StaySpan::new(d(2025, 3, 10), d(2025, 3, 15)),
            channel: Channel::Airbnb,
            total_cost: 65000,
            hold_expires_at: Some(1_700_000_000_000),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
