//! Booking reference numbers: `BK-{year}-{seq}`, seq zero-padded to four
//! digits and strictly increasing per year. Correct only when allocation
//! happens inside the same critical section as the availability check —
//! the engine allocates through a per-year counter while holding the
//! room's write lock.

const PREFIX: &str = "BK";

pub fn format_reference(year: i32, seq: u32) -> String {
    format!("{PREFIX}-{year}-{seq:04}")
}

/// Parse `BK-{year}-{seq}`. Returns None for anything else.
pub fn parse_reference(reference: &str) -> Option<(i32, u32)> {
    let rest = reference.strip_prefix(PREFIX)?.strip_prefix('-')?;
    let (year, seq) = rest.split_once('-')?;
    Some((year.parse().ok()?, seq.parse().ok()?))
}

/// One more than the highest existing sequence number for `year`;
/// `0001` when the year has none.
pub fn next_reference<'a>(year: i32, existing: impl IntoIterator<Item = &'a str>) -> String {
    let max_seq = existing
        .into_iter()
        .filter_map(parse_reference)
        .filter(|(y, _)| *y == year)
        .map(|(_, seq)| seq)
        .max()
        .unwrap_or(0);
    format_reference(year, max_seq + 1)
}
