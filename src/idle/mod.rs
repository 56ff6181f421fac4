//! Per-tab user inactivity detection.

mod activity;
mod detector;

pub use activity::{ActivityKind, ActivityParseError};
pub use detector::{start_idle_detector, IdleHandle};
