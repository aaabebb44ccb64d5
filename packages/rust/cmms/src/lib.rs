//! CMMS integration: the live REST client, an in-memory stand-in, and the
//! scheduling rules both share.

pub mod client;
pub mod mock;
pub mod schedule;

pub use client::CmmsClient;
pub use mock::MockWorkOrderService;
pub use schedule::{activity_duration, due_date, format_timestamp, truncate_title};
