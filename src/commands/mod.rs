//! File-level interval commands backing the toolkit adapter.

pub mod closest;
pub mod complement;
pub mod intersect;
pub mod merge;
pub mod subtract;

pub use closest::{ClosestCommand, ClosestHit, ClosestResult};
pub use complement::ComplementCommand;
pub use intersect::{IntersectCommand, IntersectHit};
pub use merge::MergeCommand;
pub use subtract::{SubtractCommand, SubtractMode};
