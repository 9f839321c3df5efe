//! End-to-end tests for the tokio session runner
//!
//! Timers run on real time with millisecond periods; workout time comes from
//! a shared manual clock so the assertions don't depend on scheduling.

use intervalrs::import::{JsonSource, JustRideSource};
use intervalrs::playback::{self, ManualClock, PlaybackConfig, PlaybackEngine, PlaybackSnapshot, PlaybackState};
use std::time::Duration;
use tokio::sync::watch;

fn fast_config() -> PlaybackConfig {
    PlaybackConfig {
        tick_interval_ms: 2,
        average_interval_ms: 2,
        max_sample_gap_secs: 2.0,
    }
}

async fn wait_until(
    snapshots: &mut watch::Receiver<PlaybackSnapshot>,
    condition: impl FnMut(&PlaybackSnapshot) -> bool,
) -> PlaybackSnapshot {
    tokio::time::timeout(Duration::from_secs(2), snapshots.wait_for(condition))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session stopped")
        .clone()
}

const THREE_BLOCKS: &str = r#"{"id": "three", "name": "Three Blocks", "intervals": [
    {"name": "One", "duration": 60, "type": "warmup", "order_index": 1},
    {"name": "Two", "duration": 60, "type": "steadyState", "order_index": 2},
    {"name": "Three", "duration": 60, "type": "cooldown", "order_index": 3}
]}"#;

#[tokio::test]
async fn test_foreground_catches_up_after_suspension() {
    let clock = ManualClock::default();
    let config = fast_config();
    let engine = PlaybackEngine::with_clock(clock.clone(), &config);
    let (handle, mut snapshots, task) = playback::spawn(engine, &config);

    handle.load(JsonSource::new(THREE_BLOCKS)).await.unwrap();
    handle.start().await.unwrap();
    wait_until(&mut snapshots, |s| s.state == PlaybackState::Running).await;

    clock.advance_secs(130.0);
    handle.foreground().await.unwrap();
    let snapshot = wait_until(&mut snapshots, |s| s.interval_index == 2).await;
    assert_eq!(snapshot.interval_name.as_deref(), Some("Three"));
    assert_eq!(snapshot.remaining_in_interval, Some(50.0));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_skip_restart_and_reload() {
    let clock = ManualClock::default();
    let config = fast_config();
    let engine = PlaybackEngine::with_clock(clock.clone(), &config);
    let (handle, mut snapshots, _task) = playback::spawn(engine, &config);

    handle.load(JsonSource::new(THREE_BLOCKS)).await.unwrap();
    handle.start().await.unwrap();
    handle.skip().await.unwrap();
    handle.skip().await.unwrap();
    wait_until(&mut snapshots, |s| s.interval_index == 2).await;

    handle.skip().await.unwrap();
    let finished = wait_until(&mut snapshots, |s| s.state == PlaybackState::Finished).await;
    assert_eq!(finished.progress, 1.0);

    handle.restart().await.unwrap();
    let restarted = wait_until(&mut snapshots, |s| s.state == PlaybackState::Idle).await;
    assert_eq!(restarted.interval_index, 0);
    assert_eq!(restarted.total_elapsed, 0.0);

    handle.load(JustRideSource::open_ended()).await.unwrap();
    let reloaded = wait_until(&mut snapshots, |s| s.open_ended).await;
    assert_eq!(reloaded.workout_id.as_deref(), Some("just-ride"));
    assert_eq!(reloaded.interval_count, 0);
    assert_eq!(reloaded.remaining_in_interval, None);
}

#[tokio::test]
async fn test_dropping_every_handle_stops_the_runner() {
    let config = fast_config();
    let engine = PlaybackEngine::with_clock(ManualClock::default(), &config);
    let (handle, _snapshots, task) = playback::spawn(engine, &config);

    drop(handle);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("runner did not stop")
        .unwrap();
}
