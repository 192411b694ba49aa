//! Build status classification.
//!
//! - [`classifier::StatusClassifier`]: compares a build with the prior build
//! - [`vector::StatusVector`]: the five status bits handed to the notifier

pub mod classifier;
pub mod vector;

pub use classifier::{BuildOutcome, ClassificationError, ClassificationResult, StatusClassifier};
pub use vector::{Notification, StatusVector};
