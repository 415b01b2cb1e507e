//! Shared types for the helpdesk persistence core.

pub mod clock;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock, storage_precision};
pub use types::EntityId;
