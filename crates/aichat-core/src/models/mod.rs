pub mod message;
pub mod session;

use chrono::{DateTime, SubsecRound, Utc};

pub use message::{Author, Message};
pub use session::{
    DEFAULT_SESSION_TITLE, Session, SessionFilter, SessionSort, title_from_message,
};

/// Current time at the millisecond precision the store persists
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
