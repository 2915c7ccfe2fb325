//! Merge/review engine.
//!
//! A merge request proposes merging one branch into another. Reviewers
//! attach verdicts while it is open; merging creates a two-parent commit on
//! the target branch, closing simply retires the request.
//!
//! ```text
//!            set_review_verdict
//!              ┌───────┐
//!              ▼       │
//!  create ──▶ Open ────┘
//!              │
//!      ┌───────┴────────┐
//!      ▼                ▼
//!   Merged           Closed
//! ```

mod engine;
mod merge_request;
mod policy;

pub use engine::ReviewEngine;
pub use merge_request::{MergeRequest, MergeRequestStatus, Review, Verdict};
pub use policy::{MergePolicy, MergeReadiness};
