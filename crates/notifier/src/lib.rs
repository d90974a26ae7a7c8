//! Notification dispatch for contest events.
//!
//! Records clarification answers and benchmark-job results as per-contestant
//! notifications and fans them out to the contestants' browser push endpoints.

pub mod audience;
pub mod keys;
pub mod notifier;
pub mod push;
pub mod registry;
pub mod store;

pub use notifier::{DispatchReport, NotifyError, Notifier};
