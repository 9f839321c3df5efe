use crate::error::Result;
use crate::import::WorkoutSource;
use crate::models::Workout;

/// The built-in "Just Ride" session: no intervals, optionally time-boxed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JustRideSource {
    duration_secs: Option<f64>,
}

impl JustRideSource {
    /// Open-ended ride; ends only on an explicit finish
    pub fn open_ended() -> Self {
        Self::default()
    }

    /// Ride that finishes by itself after `duration_secs`
    pub fn timed(duration_secs: f64) -> Self {
        Self {
            duration_secs: Some(duration_secs).filter(|d| *d > 0.0),
        }
    }
}

impl WorkoutSource for JustRideSource {
    fn load_workout(&self) -> Result<Workout> {
        let mut workout = Workout::new(Workout::JUST_RIDE_ID, "Just Ride", Vec::new());
        workout.description = Some("Ride when ready. Stop when done.".to_string());
        workout.duration_secs = self.duration_secs;
        Ok(workout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_ended() {
        let workout = JustRideSource::open_ended().load_workout().unwrap();
        assert!(workout.is_just_ride());
        assert!(workout.is_open_ended());
        assert_eq!(workout.total_duration(), 0.0);
    }

    #[test]
    fn test_timed() {
        let workout = JustRideSource::timed(1800.0).load_workout().unwrap();
        assert!(!workout.is_open_ended());
        assert_eq!(workout.total_duration(), 1800.0);

        assert!(JustRideSource::timed(0.0).load_workout().unwrap().is_open_ended());
    }
}
