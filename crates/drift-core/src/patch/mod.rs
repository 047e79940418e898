//! Patch handling: unified diffs and the proposal validator suite.

pub mod diff;
pub mod plan;
pub mod validate;

pub use diff::{PatchError, UnifiedDiff, render_diff};
pub use plan::heuristic_plan;
pub use validate::{ValidationLimits, validate_proposal};
