//! Workout playback: the engine state machine, its clock, and the tokio
//! task that drives it.

use serde::{Deserialize, Serialize};

pub mod clock;
pub mod engine;
pub mod runner;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{PlaybackEngine, PlaybackSnapshot, PlaybackState, ReadingSource};
pub use runner::{spawn, SessionCommand, SessionHandle, SessionRunner};

/// Timer settings for a playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Playback tick period
    pub tick_interval_ms: u64,

    /// Average-power sampling period
    pub average_interval_ms: u64,

    /// Longest gap credited to a single average sample
    pub max_sample_gap_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            average_interval_ms: 1000,
            max_sample_gap_secs: 2.0,
        }
    }
}
