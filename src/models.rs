use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::zones::PowerZone;

/// Category of a workout segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntervalType {
    Warmup,
    SteadyState,
    IntervalOn,
    IntervalOff,
    Recovery,
    Cooldown,
    FreeRide,
}

impl IntervalType {
    /// Parse the camelCase tag used by workout records
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "warmup" => Some(IntervalType::Warmup),
            "steadyState" => Some(IntervalType::SteadyState),
            "intervalOn" => Some(IntervalType::IntervalOn),
            "intervalOff" => Some(IntervalType::IntervalOff),
            "recovery" => Some(IntervalType::Recovery),
            "cooldown" => Some(IntervalType::Cooldown),
            "freeRide" => Some(IntervalType::FreeRide),
            _ => None,
        }
    }
}

/// Target power range as fractions of FTP (0.75 = 75% FTP).
///
/// Sources may deliver the bounds reversed; use [`PowerTarget::normalized`]
/// before comparing against zones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerTarget {
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

impl PowerTarget {
    pub fn new(lower_bound: Option<f64>, upper_bound: Option<f64>) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// Same target on both ends
    pub fn flat(fraction: f64) -> Self {
        Self::new(Some(fraction), Some(fraction))
    }

    /// `(lo, hi)` with `lo <= hi`, or `None` unless both bounds are known
    pub fn normalized(&self) -> Option<(f64, f64)> {
        let (lower, upper) = (self.lower_bound?, self.upper_bound?);
        Some((lower.min(upper), lower.max(upper)))
    }

    /// Zones whose nominal range overlaps this target, in ascending order
    pub fn zones(&self) -> Vec<PowerZone> {
        let Some((lo, hi)) = self.normalized() else {
            return Vec::new();
        };

        PowerZone::ALL
            .iter()
            .copied()
            .filter(|zone| zone.overlaps(lo, hi))
            .collect()
    }

    /// Watt range for a given FTP, rounded to whole watts
    pub fn watts(&self, ftp: i32) -> Option<(i32, i32)> {
        if ftp <= 0 {
            return None;
        }
        let (lo, hi) = self.normalized()?;
        let ftp = f64::from(ftp);
        Some(((lo * ftp).round() as i32, (hi * ftp).round() as i32))
    }
}

/// One timed segment of a structured workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    #[serde(skip, default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Segment length in seconds
    #[serde(rename = "duration")]
    pub duration_secs: f64,

    pub name: String,

    /// Coaching text; multiple messages are newline-joined
    pub message: Option<String>,

    #[serde(rename = "type")]
    pub interval_type: IntervalType,

    pub power_target: Option<PowerTarget>,
}

impl Interval {
    pub fn new(duration_secs: f64, name: impl Into<String>, interval_type: IntervalType) -> Self {
        Self {
            id: Uuid::new_v4(),
            duration_secs,
            name: name.into(),
            message: None,
            interval_type,
            power_target: None,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_power_target(mut self, power_target: Option<PowerTarget>) -> Self {
        self.power_target = power_target;
        self
    }
}

/// Metrics a workout can ask the player to display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    AveragePower,
    TargetZone,
    Zone,
    Power,
    Cadence,
    Speed,
    HeartRate,
}

impl Metric {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "averagePower" => Some(Metric::AveragePower),
            "targetZone" => Some(Metric::TargetZone),
            "zone" => Some(Metric::Zone),
            "power" => Some(Metric::Power),
            "cadence" => Some(Metric::Cadence),
            "speed" => Some(Metric::Speed),
            "heartRate" => Some(Metric::HeartRate),
            _ => None,
        }
    }
}

const DEFAULT_PLAY_METRICS: [Metric; 5] = [
    Metric::TargetZone,
    Metric::Power,
    Metric::AveragePower,
    Metric::Cadence,
    Metric::HeartRate,
];

const DEFAULT_FINISHED_METRICS: [Metric; 2] = [Metric::AveragePower, Metric::HeartRate];

/// A loaded workout. Equality and hashing use `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub intervals: Vec<Interval>,

    /// Fixed length for interval-less workouts; `None` with no intervals
    /// means open-ended
    #[serde(rename = "duration")]
    pub duration_secs: Option<f64>,

    /// Metrics shown during playback (`None` = default set)
    pub metrics: Option<Vec<Metric>>,

    /// Metrics shown once finished (`None` = default set)
    pub finished_metrics: Option<Vec<Metric>>,
}

impl Workout {
    /// Identifier of the built-in unconstrained ride
    pub const JUST_RIDE_ID: &'static str = "just-ride";

    pub fn new(id: impl Into<String>, name: impl Into<String>, intervals: Vec<Interval>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            intervals,
            duration_secs: None,
            metrics: None,
            finished_metrics: None,
        }
    }

    pub fn has_intervals(&self) -> bool {
        !self.intervals.is_empty()
    }

    pub fn is_open_ended(&self) -> bool {
        !self.has_intervals() && self.duration_secs.is_none()
    }

    pub fn is_just_ride(&self) -> bool {
        self.id == Self::JUST_RIDE_ID
    }

    /// Sum of interval durations, else the fixed duration, else zero
    pub fn total_duration(&self) -> f64 {
        if self.has_intervals() {
            return self.intervals.iter().map(|i| i.duration_secs).sum();
        }
        self.duration_secs.unwrap_or(0.0)
    }

    pub fn display_metrics(&self) -> Vec<Metric> {
        match &self.metrics {
            Some(metrics) => metrics.clone(),
            None => DEFAULT_PLAY_METRICS
                .iter()
                .copied()
                .filter(|m| self.has_intervals() || *m != Metric::TargetZone)
                .collect(),
        }
    }

    pub fn finished_display_metrics(&self) -> Vec<Metric> {
        self.finished_metrics
            .clone()
            .unwrap_or_else(|| DEFAULT_FINISHED_METRICS.to_vec())
    }
}

impl PartialEq for Workout {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Workout {}

impl Hash for Workout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(secs: f64) -> Interval {
        Interval::new(secs, "Block", IntervalType::SteadyState)
    }

    #[test]
    fn test_total_duration() {
        let workout = Workout::new("w", "Test", vec![interval(300.0), interval(180.0)]);
        assert_eq!(workout.total_duration(), 480.0);
        assert!(workout.has_intervals());
        assert!(!workout.is_open_ended());

        let mut timed = Workout::new("t", "Timed", Vec::new());
        timed.duration_secs = Some(1800.0);
        assert_eq!(timed.total_duration(), 1800.0);
        assert!(!timed.is_open_ended());

        let open = Workout::new("o", "Open", Vec::new());
        assert_eq!(open.total_duration(), 0.0);
        assert!(open.is_open_ended());
    }

    #[test]
    fn test_identity_equality() {
        let a = Workout::new("same", "A", vec![interval(60.0)]);
        let b = Workout::new("same", "B", Vec::new());
        let c = Workout::new("other", "A", vec![interval(60.0)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_power_target_normalization() {
        let reversed = PowerTarget::new(Some(0.9), Some(0.7));
        let ordered = PowerTarget::new(Some(0.7), Some(0.9));
        assert_eq!(reversed.normalized(), Some((0.7, 0.9)));
        assert_eq!(reversed.zones(), ordered.zones());
        assert_eq!(
            ordered.zones(),
            vec![PowerZone::Endurance, PowerZone::Tempo]
        );
    }

    #[test]
    fn test_power_target_single_zone() {
        let target = PowerTarget::new(Some(0.6), Some(0.7));
        assert_eq!(target.zones(), vec![PowerZone::Endurance]);
        assert_eq!(target.watts(200), Some((120, 140)));
    }

    #[test]
    fn test_power_target_missing_bounds() {
        let target = PowerTarget::new(None, None);
        assert!(target.zones().is_empty());
        assert!(PowerTarget::new(Some(0.8), None).zones().is_empty());
    }

    #[test]
    fn test_default_metrics() {
        let workout = Workout::new("w", "Test", vec![interval(60.0)]);
        assert!(workout.display_metrics().contains(&Metric::TargetZone));
        assert_eq!(
            workout.finished_display_metrics(),
            vec![Metric::AveragePower, Metric::HeartRate]
        );

        let open = Workout::new("o", "Open", Vec::new());
        assert!(!open.display_metrics().contains(&Metric::TargetZone));
    }

    #[test]
    fn test_interval_type_tags() {
        assert_eq!(IntervalType::from_tag("intervalOn"), Some(IntervalType::IntervalOn));
        assert_eq!(IntervalType::from_tag("steady_state"), None);
        assert_eq!(Metric::from_name("heartRate"), Some(Metric::HeartRate));
    }
}
