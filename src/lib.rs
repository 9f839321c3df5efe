// Library interface for intervalrs modules
// The binary and the integration tests both build on these

pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod models;
pub mod playback;
pub mod telemetry;
pub mod zones;

// Re-export commonly used types for convenience
pub use error::{IntervalError, Result, ScriptError};
pub use import::{ImportManager, WorkoutSource};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use models::{Interval, IntervalType, Metric, PowerTarget, Workout};
pub use playback::{PlaybackConfig, PlaybackEngine, PlaybackSnapshot, PlaybackState};
pub use telemetry::{BikeMetrics, ConnectionState, LiveMetrics};
pub use zones::{HeartRateZone, PowerZone, Zone};
