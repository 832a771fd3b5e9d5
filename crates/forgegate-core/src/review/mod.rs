//! Specialist review aggregation.
//!
//! Turns the raw, free-form output of N independently-run reviewers into one
//! deduplicated, canonically-identified [`AggregatedReport`].
//!
//! # Module layout
//!
//! - [`raw`]: `RawFinding`, `RawSuggestion`, `ReviewerOutput` (wire shapes)
//! - [`category`]: static synonym table onto `Category`
//! - [`normalize`]: repair-or-drop normalization, `Normalized`, `NormalizationIssue`
//! - [`dispatch`]: `Reviewer` trait and parallel fan-out
//! - [`checks`]: automated structural checks
//! - [`aggregate`]: `ReviewAggregator`
//!
//! [`AggregatedReport`]: crate::domain::AggregatedReport

pub mod aggregate;
pub mod category;
pub mod checks;
pub mod dispatch;
pub mod normalize;
pub mod raw;

pub use aggregate::{AggregatorConfig, ReviewAggregator};
pub use category::canonical_category;
pub use dispatch::{dispatch_reviewers, ReviewResults, Reviewer};
pub use normalize::{NormalizationIssue, Normalized, Repair};
pub use raw::{RawFinding, RawSuggestion, ReviewerOutput};
