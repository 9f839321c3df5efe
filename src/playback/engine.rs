use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::import::WorkoutSource;
use crate::models::{Interval, IntervalType, Workout};

use super::clock::{duration_from_secs, seconds_between, Clock, SystemClock};
use super::PlaybackConfig;

/// Polled once per averaging tick; `None` means no reading available
pub type ReadingSource = Box<dyn FnMut() -> Option<i32> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Running,
    Paused,
    Finished,
}

/// Running average over time under load: zero and missing readings add
/// neither watt-seconds nor seconds.
#[derive(Debug, Clone)]
struct AverageTracker {
    watt_seconds: f64,
    valid_seconds: f64,
    last_sample_at: Option<DateTime<Utc>>,
    max_gap_secs: f64,
    average: Option<i32>,
}

impl AverageTracker {
    fn new(max_gap_secs: f64) -> Self {
        Self {
            watt_seconds: 0.0,
            valid_seconds: 0.0,
            last_sample_at: None,
            max_gap_secs,
            average: None,
        }
    }

    fn reset(&mut self) {
        self.watt_seconds = 0.0;
        self.valid_seconds = 0.0;
        self.last_sample_at = None;
        self.average = None;
    }

    fn begin(&mut self, now: DateTime<Utc>) {
        self.last_sample_at = Some(now);
    }

    fn stop(&mut self) {
        self.last_sample_at = None;
    }

    fn record(&mut self, now: DateTime<Utc>, reading: Option<i32>) {
        let Some(last) = self.last_sample_at else {
            self.last_sample_at = Some(now);
            return;
        };
        self.last_sample_at = Some(now);

        let dt = seconds_between(last, now);
        if dt <= 0.0 {
            return;
        }
        // A single missed tick can't weigh more than the cap
        let dt = dt.min(self.max_gap_secs);

        if let Some(watts) = reading.filter(|w| *w > 0) {
            self.watt_seconds += f64::from(watts) * dt;
            self.valid_seconds += dt;
            self.average = Some((self.watt_seconds / self.valid_seconds).round() as i32);
        }
    }
}

/// Read-only view of a session for observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub workout_id: Option<String>,
    pub workout_name: Option<String>,
    pub interval_index: usize,
    pub interval_count: usize,
    pub interval_name: Option<String>,
    pub interval_type: Option<IntervalType>,
    pub interval_message: Option<String>,
    pub open_ended: bool,
    pub elapsed_in_interval: f64,
    pub remaining_in_interval: Option<f64>,
    pub total_elapsed: f64,
    pub total_duration: f64,
    pub progress: f64,
    pub average_power: Option<i32>,
    pub error_message: Option<String>,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            workout_id: None,
            workout_name: None,
            interval_index: 0,
            interval_count: 0,
            interval_name: None,
            interval_type: None,
            interval_message: None,
            open_ended: false,
            elapsed_in_interval: 0.0,
            remaining_in_interval: None,
            total_elapsed: 0.0,
            total_duration: 0.0,
            progress: 0.0,
            average_power: None,
            error_message: None,
        }
    }
}

/// Workout playback state machine.
///
/// All mutation goes through `&mut self`; the owner is responsible for
/// serializing commands and timer callbacks onto one context (see
/// [`super::runner::SessionRunner`]).
pub struct PlaybackEngine<C: Clock = SystemClock> {
    clock: C,
    workout: Option<Workout>,
    state: PlaybackState,
    current_index: usize,
    /// Seconds into the current interval (or into the workout when it has
    /// no intervals), as of the last tick
    elapsed_secs: f64,
    /// Wall-clock start of the current running segment
    segment_started_at: Option<DateTime<Utc>>,
    /// Elapsed time banked before the current segment
    prior_elapsed_secs: f64,
    average: AverageTracker,
    reading_source: Option<ReadingSource>,
    error_message: Option<String>,
}

impl PlaybackEngine<SystemClock> {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self::with_clock(SystemClock, config)
    }
}

impl<C: Clock> PlaybackEngine<C> {
    pub fn with_clock(clock: C, config: &PlaybackConfig) -> Self {
        Self {
            clock,
            workout: None,
            state: PlaybackState::Idle,
            current_index: 0,
            elapsed_secs: 0.0,
            segment_started_at: None,
            prior_elapsed_secs: 0.0,
            average: AverageTracker::new(config.max_sample_gap_secs),
            reading_source: None,
            error_message: None,
        }
    }

    /// Load a workout from any source. On failure the current session is
    /// left as it was and the error is kept for display.
    pub fn load(&mut self, source: &dyn WorkoutSource) -> Result<()> {
        match source.load_workout() {
            Ok(workout) => {
                self.load_workout(workout);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load workout");
                self.error_message = Some(e.user_message());
                Err(e)
            }
        }
    }

    pub fn load_workout(&mut self, workout: Workout) {
        info!(
            id = %workout.id,
            name = %workout.name,
            intervals = workout.intervals.len(),
            total_secs = workout.total_duration(),
            "Workout loaded"
        );
        self.workout = Some(workout);
        self.error_message = None;
        self.reset();
    }

    pub fn set_average_source(&mut self, source: ReadingSource) {
        self.reading_source = Some(source);
    }

    pub fn start(&mut self) {
        if self.workout.is_none() {
            return;
        }
        let now = self.clock.now();

        match self.state {
            PlaybackState::Running | PlaybackState::Finished => {}
            PlaybackState::Paused => {
                self.segment_started_at = Some(now);
                self.state = PlaybackState::Running;
                self.average.begin(now);
                debug!(elapsed = self.prior_elapsed_secs, "Playback resumed");
            }
            PlaybackState::Idle => {
                self.current_index = 0;
                self.elapsed_secs = 0.0;
                self.prior_elapsed_secs = 0.0;
                self.segment_started_at = Some(now);
                self.state = PlaybackState::Running;
                self.average.reset();
                self.average.begin(now);
                debug!(index = self.current_index, "Playback started");
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        let now = self.clock.now();
        self.advance(now);
        if self.state != PlaybackState::Running {
            return;
        }

        self.prior_elapsed_secs = self.elapsed_secs;
        self.segment_started_at = None;
        self.state = PlaybackState::Paused;
        self.average.stop();
        debug!(elapsed = self.elapsed_secs, "Playback paused");
    }

    pub fn skip_interval(&mut self) {
        if self.state == PlaybackState::Finished {
            return;
        }
        let Some(count) = self.workout.as_ref().map(|w| w.intervals.len()) else {
            return;
        };
        if count == 0 {
            return;
        }

        if self.current_index + 1 < count {
            self.current_index += 1;
            self.elapsed_secs = 0.0;
            self.prior_elapsed_secs = 0.0;
            if self.state == PlaybackState::Running {
                self.segment_started_at = Some(self.clock.now());
            }
            debug!(index = self.current_index, "Skipped to next interval");
        } else {
            self.finish();
        }
    }

    pub fn restart(&mut self) {
        self.reset();
        debug!("Playback restarted");
    }

    /// Explicit stop, e.g. the end of an open-ended ride
    pub fn finish(&mut self) {
        if self.workout.is_none() {
            return;
        }
        if self.state == PlaybackState::Running {
            let now = self.clock.now();
            self.advance(now);
        }
        self.mark_finished();
    }

    /// Periodic advance
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        let now = self.clock.now();
        self.advance(now);
    }

    /// Catch up after the host was suspended. Equivalent to every tick that
    /// was missed while suspended.
    pub fn reconcile_after_suspension(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        let index = self.current_index;
        let now = self.clock.now();
        self.advance(now);
        debug!(
            from = index,
            to = self.current_index,
            state = ?self.state,
            "Reconciled playback after suspension"
        );
    }

    /// One averaging tick; ignored unless running
    pub fn sample_average(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        let Some(source) = self.reading_source.as_mut() else {
            return;
        };
        let reading = source();
        let now = self.clock.now();
        self.average.record(now, reading);
    }

    fn reset(&mut self) {
        self.current_index = 0;
        self.elapsed_secs = 0.0;
        self.prior_elapsed_secs = 0.0;
        self.segment_started_at = None;
        self.state = PlaybackState::Idle;
        self.average.reset();
    }

    fn mark_finished(&mut self) {
        self.prior_elapsed_secs = self.elapsed_secs;
        self.segment_started_at = None;
        self.state = PlaybackState::Finished;
        self.average.stop();
        info!(average_power = ?self.average.average, "Workout finished");
    }

    /// Length of the current segment; `None` for open-ended workouts
    fn current_limit(&self) -> Option<f64> {
        let workout = self.workout.as_ref()?;
        if workout.has_intervals() {
            workout.intervals.get(self.current_index).map(|i| i.duration_secs)
        } else {
            workout.duration_secs
        }
    }

    /// Recompute elapsed time from the wall clock and move past every
    /// boundary crossed since the segment started. Each new segment starts at
    /// the instant the previous interval ended, so overshoot carries over.
    fn advance(&mut self, now: DateTime<Utc>) {
        let Some(mut segment_start) = self.segment_started_at else {
            return;
        };
        self.elapsed_secs = self.prior_elapsed_secs + seconds_between(segment_start, now);

        loop {
            let Some(limit) = self.current_limit() else {
                return;
            };
            if self.elapsed_secs < limit {
                return;
            }

            let count = self.workout.as_ref().map_or(0, |w| w.intervals.len());
            if self.current_index + 1 < count {
                let boundary = segment_start + duration_from_secs(limit - self.prior_elapsed_secs);
                self.current_index += 1;
                self.prior_elapsed_secs = 0.0;
                self.segment_started_at = Some(boundary);
                segment_start = boundary;
                self.elapsed_secs = seconds_between(boundary, now);
                debug!(index = self.current_index, "Advanced to next interval");
            } else {
                self.elapsed_secs = limit;
                self.mark_finished();
                return;
            }
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    pub fn workout(&self) -> Option<&Workout> {
        self.workout.as_ref()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_interval(&self) -> Option<&Interval> {
        self.workout.as_ref()?.intervals.get(self.current_index)
    }

    pub fn elapsed_in_interval(&self) -> f64 {
        self.elapsed_secs
    }

    /// Time left in the current interval (or workout when interval-less);
    /// `None` for open-ended workouts, where elapsed time is shown instead
    pub fn remaining_in_interval(&self) -> Option<f64> {
        self.current_limit()
            .map(|limit| (limit - self.elapsed_secs).max(0.0))
    }

    pub fn total_elapsed(&self) -> f64 {
        let Some(workout) = self.workout.as_ref() else {
            return 0.0;
        };
        if !workout.has_intervals() {
            return self.elapsed_secs;
        }

        let completed: f64 = workout
            .intervals
            .iter()
            .take(self.current_index)
            .map(|i| i.duration_secs)
            .sum();
        let current = self
            .current_interval()
            .map_or(0.0, |i| self.elapsed_secs.min(i.duration_secs));
        completed + current
    }

    /// Fraction of the workout completed, in `[0, 1]`
    pub fn interval_progress(&self) -> f64 {
        let Some(workout) = self.workout.as_ref() else {
            return 0.0;
        };
        if self.state == PlaybackState::Finished {
            return 1.0;
        }

        let total = workout.total_duration();
        if total <= 0.0 {
            return 0.0;
        }
        (self.total_elapsed() / total).clamp(0.0, 1.0)
    }

    pub fn average_power(&self) -> Option<i32> {
        self.average.average
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let interval = self.current_interval();
        PlaybackSnapshot {
            state: self.state,
            workout_id: self.workout.as_ref().map(|w| w.id.clone()),
            workout_name: self.workout.as_ref().map(|w| w.name.clone()),
            interval_index: self.current_index,
            interval_count: self.workout.as_ref().map_or(0, |w| w.intervals.len()),
            interval_name: interval.map(|i| i.name.clone()),
            interval_type: interval.map(|i| i.interval_type),
            interval_message: interval.and_then(|i| i.message.clone()),
            open_ended: self.workout.as_ref().is_some_and(|w| w.is_open_ended()),
            elapsed_in_interval: self.elapsed_secs,
            remaining_in_interval: self.remaining_in_interval(),
            total_elapsed: self.total_elapsed(),
            total_duration: self.workout.as_ref().map_or(0.0, |w| w.total_duration()),
            progress: self.interval_progress(),
            average_power: self.average.average,
            error_message: self.error_message.clone(),
        }
    }
}
