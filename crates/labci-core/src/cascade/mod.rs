//! Downstream build cascade.
//!
//! - [`dispatcher::CascadeDispatcher`]: decides and issues dependent triggers
//! - [`dispatcher::already_queued`]: the de-duplication rule on build history

pub mod dispatcher;
pub mod error;

pub use dispatcher::{already_queued, CascadeDispatcher, CascadeOutcome, SkipReason};
pub use error::{CascadeError, CascadeResult};
