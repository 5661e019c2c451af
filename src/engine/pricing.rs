use chrono::Datelike;

use crate::model::*;

// ── Nightly Price Resolution ─────────────────────────────────────

/// Result of resolving a stay's price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub total_cost: Money,
    /// Cheapest night of the stay — the "from" price for display, not a
    /// billing figure.
    pub min_nightly_rate: Money,
    /// Per-night rates, one entry per occupied night in calendar order.
    pub nightly: Vec<Money>,
}

/// Resolve the cost of every night in `[stay.start, stay.end)`.
///
/// Per night, in order of precedence:
/// 1. day-specific rules covering the night whose weekday set contains it —
///    `base_price` plus the highest matching premium;
/// 2. otherwise a general rule (all seven weekdays) covering the night —
///    `base_price` plus its premium;
/// 3. otherwise the channel base price.
///
/// Rule premiums compose with the plain `base_price`, not the channel
/// override; only the no-rule fallback uses the channel price. This
/// asymmetry is inherited behavior and deliberately kept (see DESIGN.md).
///
/// Never fails: a room with no applicable rules still quotes at its base
/// price. Output is independent of rule enumeration order — ties are
/// resolved with `max`, never "first wins".
pub fn resolve_pricing(room: &RoomState, stay: &StaySpan, channel: Channel) -> Quote {
    let channel_base = room.channel_base(channel);

    if room.rules.is_empty() {
        // Fast path. The representative rate is the higher of the two
        // prices here, unlike the per-night minimum below — inherited
        // behavior, kept as-is.
        return Quote {
            total_cost: channel_base * stay.nights(),
            min_nightly_rate: channel_base.max(room.base_price),
            nightly: vec![channel_base; stay.nights().max(0) as usize],
        };
    }

    let candidates: Vec<&RateRule> = room
        .rules_touching(stay)
        .filter(|r| r.applies_to_channel(channel))
        .collect();

    let mut nightly = Vec::with_capacity(stay.nights().max(0) as usize);
    for night in stay.iter_nights() {
        let weekday = night.weekday();
        let mut general: Option<Money> = None;
        let mut day_specific: Option<Money> = None;

        for rule in candidates.iter().filter(|r| r.range.contains(night)) {
            if rule.is_general() {
                general = Some(general.map_or(rule.premium, |p| p.max(rule.premium)));
            } else if rule.weekdays.contains(weekday) {
                day_specific = Some(day_specific.map_or(rule.premium, |p| p.max(rule.premium)));
            }
        }

        let rate = match (day_specific, general) {
            (Some(premium), _) => room.base_price + premium,
            (None, Some(premium)) => room.base_price + premium,
            (None, None) => channel_base,
        };
        nightly.push(rate);
    }

    Quote {
        total_cost: nightly.iter().sum(),
        min_nightly_rate: nightly.iter().copied().min().unwrap_or(channel_base),
        nightly,
    }
}
