//! Built-in tasks of the framework.

mod add_entity;
pub mod merge;
mod truncate_calendars;

pub use add_entity::AddEntity;
pub use merge::{DatabaseToMerge, Merge};
pub use truncate_calendars::TruncateCalendars;
