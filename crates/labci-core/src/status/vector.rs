//! Classification result of one build.

use serde::{Deserialize, Serialize};

/// Notification an external notifier should send for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    Fixed,
    OldError,
    NewError,
    OtherError,
    NewDownstreamError,
}

/// Five independent status bits describing a build relative to its history.
///
/// At most one of `is_fixed`, `is_old_error` and `is_new_error` is set.
/// `is_other_error` excludes the other three. `is_new_downstream_error`
/// implies `is_new_error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVector {
    pub is_fixed: bool,
    pub is_old_error: bool,
    pub is_new_error: bool,
    pub is_other_error: bool,
    pub is_new_downstream_error: bool,
}

impl StatusVector {
    /// Everything false; the result of a dry run.
    pub fn none() -> Self {
        Self::default()
    }

    /// Non-test failure: no results could be produced.
    pub fn other_error() -> Self {
        Self {
            is_other_error: true,
            ..Self::default()
        }
    }

    /// Notifications to send, in a stable order.
    pub fn notifications(&self) -> Vec<Notification> {
        [
            (self.is_fixed, Notification::Fixed),
            (self.is_old_error, Notification::OldError),
            (self.is_new_error, Notification::NewError),
            (self.is_other_error, Notification::OtherError),
            (self.is_new_downstream_error, Notification::NewDownstreamError),
        ]
        .into_iter()
        .filter_map(|(set, n)| set.then_some(n))
        .collect()
    }

    /// True when the bits satisfy the exclusivity rules.
    pub fn is_consistent(&self) -> bool {
        let exclusive = [self.is_fixed, self.is_old_error, self.is_new_error]
            .iter()
            .filter(|b| **b)
            .count();
        exclusive <= 1
            && !(self.is_other_error && exclusive > 0)
            && (!self.is_new_downstream_error || self.is_new_error)
    }
}
