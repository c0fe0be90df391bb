//! Sliding-window rate limiting and the AI quota policy built on it.

mod backend;
mod clock;
mod counter;
mod key;
mod memory;
mod quota;
mod redis_store;
mod result;
mod rules;
mod window;

pub use backend::{AdmitOutcome, AdmitRequest, Occupancy, WindowStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{Admission, SlidingWindowCounter};
pub use key::{WindowKey, DEFAULT_OPERATION_TYPE, KEY_PREFIX};
pub use memory::MemoryWindowStore;
pub use quota::QuotaPolicy;
pub use redis_store::RedisWindowStore;
pub use result::{LimitResult, LimitType, QuotaUsage};
pub use rules::{QuotaRules, StoreFailurePolicy, WeeklyDenialPolicy};
pub use window::{WindowKind, KEY_EXPIRY_MARGIN};
