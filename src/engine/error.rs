use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The stay overlaps a live booking; carries that booking's identity
    /// so callers can surface a precise message.
    BookingConflict {
        id: Ulid,
        reference: String,
    },
    /// A blocked calendar date falls inside the stay (earliest reported).
    DateBlocked(NaiveDate),
    MinimumStay {
        required: u32,
        requested: i64,
    },
    /// The candidate rate rule collides with an existing rule.
    RuleConflict(Ulid),
    /// A pending booking's payment hold lapsed before confirmation; the
    /// window may have been rebooked, so the booking cannot be promoted.
    HoldLapsed(Ulid),
    InvalidRange(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::BookingConflict { id, reference } => {
                write!(f, "dates conflict with booking {reference} ({id})")
            }
            EngineError::DateBlocked(date) => write!(f, "date {date} is blocked"),
            EngineError::MinimumStay {
                required,
                requested,
            } => {
                write!(
                    f,
                    "stay of {requested} night(s) is below the {required}-night minimum"
                )
            }
            EngineError::RuleConflict(id) => {
                write!(f, "rate rule conflicts with existing rule: {id}")
            }
            EngineError::HoldLapsed(id) => {
                write!(f, "payment hold lapsed for booking {id}")
            }
            EngineError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
