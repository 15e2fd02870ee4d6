//! Inlay Timeline Model
//!
//! Defines the core data contracts for an Inlay render job:
//! - **Tracks:** The probed base (A-roll) video and the overlay (B-roll) clips
//! - **Insertions:** Where and for how long each overlay is shown
//! - **Plan:** The validated set of the above, scheduled into canonical order
//! - **Document:** The `timeline_plan.json` artifact exchanged with the planner
//!
//! All times are seconds on the base track's timeline. Frame rates are exact
//! rationals and never pass through floating point until emitted.

pub mod document;
pub mod insertion;
pub mod plan;
pub mod rate;
pub mod track;

pub use document::*;
pub use insertion::*;
pub use plan::*;
pub use rate::*;
pub use track::*;
