//! Inlay Render Engine
//!
//! Takes a timeline plan document and the media it references, and produces
//! one video in which B-roll clips play over the A-roll at the planned
//! times while the A-roll audio runs uninterrupted.
//!
//! # Pipeline Architecture
//!
//! ```text
//! timeline_plan.json ──┐
//!                      ├── Acquire (download / resolve, concurrent)
//! a_roll, b_roll URLs ─┘         │
//!                                ├── Probe base (ffprobe)
//!                                │         │
//!                                │         ├── Schedule insertions
//!                                │         │         │
//!                                │         │         ├── Build graph (typed DAG)
//!                                │         │         │         │
//!                                │         │         │         ▼
//!                                │         │         │   filter_complex text
//!                                │         │         │         │
//!                                ▼         ▼         ▼         ▼
//!                              ffmpeg (staging file in job workspace)
//!                                              │
//!                                              ▼
//!                                          output.mp4
//! ```

pub mod acquire;
pub mod executor;
pub mod filtergraph;
pub mod graph;
pub mod job;
pub mod probe;
pub mod workspace;

pub use acquire::{AcquireRequest, Acquirer, MediaRef};
pub use executor::*;
pub use graph::*;
pub use job::*;
pub use probe::*;
pub use workspace::JobWorkspace;
