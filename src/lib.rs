//! WAL-backed in-memory booking core for multi-property hotels.
//!
//! Each hotel is an independent [`engine::Engine`]: rooms behind per-room
//! locks, all mutations logged write-ahead and replayed on startup. The
//! engine resolves nightly prices under overlapping rate rules, detects
//! reservation and rule conflicts, and hands out gap-free booking
//! references.

pub mod engine;
pub mod hotel;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod wal;
