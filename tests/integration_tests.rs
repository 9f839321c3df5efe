use intervalrs::{import, models, playback, telemetry, zones};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

/// Integration tests that exercise complete load-and-play workflows

#[cfg(test)]
mod integration_tests {
    use super::*;
    use import::{CatalogSource, ImportManager, WorkoutCatalog, WorkoutSource};
    use models::{IntervalType, Metric};
    use playback::{ManualClock, PlaybackConfig, PlaybackEngine, PlaybackState};
    use telemetry::{ConnectionState, LiveMetrics};
    use zones::{zone_span_label, PowerZone};

    const OVER_UNDERS: &str = r#"<workout_file>
        <author>Coach</author>
        <name>Over-Unders</name>
        <description>Threshold work around FTP</description>
        <sportType>bike</sportType>
        <workout>
            <Warmup Duration="300" PowerLow="0.45" PowerHigh="0.75">
                <textevent timeoffset="0" message="Easy spin to start"/>
            </Warmup>
            <IntervalsT Repeat="3" OnDuration="120" OffDuration="60" OnPower="1.05" OffPower="0.9"/>
            <Cooldown Duration="300" PowerLow="0.7" PowerHigh="0.4"/>
        </workout>
    </workout_file>"#;

    fn engine() -> (PlaybackEngine<ManualClock>, ManualClock) {
        let clock = ManualClock::default();
        let engine = PlaybackEngine::with_clock(clock.clone(), &PlaybackConfig::default());
        (engine, clock)
    }

    /// A ZWO file on disk through the import manager and into playback
    #[test]
    fn test_zwo_file_plays_to_completion() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("over-unders.zwo");
        fs::write(&path, OVER_UNDERS).unwrap();

        let manager = ImportManager::new();
        let source = manager.source_for_file(&path).unwrap();
        let (mut engine, clock) = engine();
        engine.load(source.as_ref()).unwrap();

        let workout = engine.workout().unwrap().clone();
        assert_eq!(workout.id, "over-unders");
        assert_eq!(workout.name, "Over-Unders");
        assert_eq!(workout.intervals.len(), 8);
        assert_eq!(workout.total_duration(), 300.0 + 3.0 * 180.0 + 300.0);
        assert_eq!(workout.intervals[1].interval_type, IntervalType::IntervalOn);
        assert_eq!(workout.intervals[2].interval_type, IntervalType::IntervalOff);
        assert_eq!(workout.display_metrics()[0], Metric::TargetZone);

        // A flat 105% target stays inside Z4
        let on_target = workout.intervals[1].power_target.unwrap();
        assert_eq!(zone_span_label(&on_target.zones()).as_deref(), Some("Z4"));

        engine.start();
        assert_eq!(
            engine.current_interval().and_then(|i| i.message.as_deref()),
            Some("Easy spin to start")
        );

        // Middle of the second "on" block
        clock.advance_secs(300.0 + 180.0 + 60.0);
        engine.tick();
        assert_eq!(engine.current_index(), 3);
        assert_eq!(engine.current_interval().unwrap().name, "Intervals On 2");
        assert_eq!(engine.remaining_in_interval(), Some(60.0));

        clock.advance_secs(1000.0);
        engine.reconcile_after_suspension();
        assert_eq!(engine.state(), PlaybackState::Finished);
        assert_eq!(engine.interval_progress(), 1.0);
    }

    #[test]
    fn test_import_directory_skips_bad_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a-good.zwo"), OVER_UNDERS).unwrap();
        fs::write(dir.path().join("b-broken.zwo"), "<workout_file><workout>").unwrap();
        fs::write(
            dir.path().join("c-record.json"),
            r#"{"id": "recovery", "name": "Recovery", "duration": 1800}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a workout").unwrap();

        let workouts = ImportManager::new().import_directory(dir.path()).unwrap();
        let names: Vec<&str> = workouts.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Over-Unders", "Recovery"]);
    }

    /// Catalog rows behave exactly like local files once loaded
    #[test]
    fn test_catalog_workout_playback() {
        let catalog = Arc::new(
            WorkoutCatalog::from_json(
                br#"[{"id": 7, "name": "Sweet Spot 2x10", "description": null, "duration": null,
                      "intervals": [
                        {"name": "Cooldown", "duration": 120, "type": "cooldown", "order_index": 4},
                        {"name": "SST 1", "duration": 600, "type": "intervalOn",
                         "power_lower": 0.88, "power_upper": 0.94, "order_index": 1},
                        {"name": "Rest", "duration": 180, "type": "intervalOff", "order_index": 2},
                        {"name": "SST 2", "duration": 600, "type": "intervalOn",
                         "power_lower": 0.88, "power_upper": 0.94, "order_index": 3}
                      ]}]"#,
            )
            .unwrap(),
        );

        let (mut engine, clock) = engine();
        engine.load(&CatalogSource::new(catalog.clone(), "7")).unwrap();
        engine.start();

        let names: Vec<String> = engine
            .workout()
            .unwrap()
            .intervals
            .iter()
            .map(|i| i.name.clone())
            .collect();
        assert_eq!(names, vec!["SST 1", "Rest", "SST 2", "Cooldown"]);

        clock.advance_secs(600.0 + 90.0);
        engine.tick();
        assert_eq!(engine.current_interval().unwrap().name, "Rest");

        // Unknown id keeps the running session
        let err = engine
            .load(&CatalogSource::new(catalog, "404"))
            .unwrap_err();
        assert_eq!(err.user_message(), "Workout 404 could not be found.");
        assert_eq!(engine.state(), PlaybackState::Running);
        assert_eq!(engine.error_message(), Some("Workout 404 could not be found."));
    }

    /// Decoded trainer frames feed the session average
    #[test]
    fn test_live_telemetry_drives_average_power() {
        let live = LiveMetrics::new();
        let (mut engine, clock) = engine();
        engine.load(&import::JustRideSource::open_ended()).unwrap();
        engine.set_average_source(live.power_source());
        engine.start();

        // Disconnected: readings are ignored
        live.ingest_frame(&[0x44, 0x00, 0xF6, 0x09, 0xB4, 0x00, 0xC8, 0x00]);
        clock.advance_secs(1.0);
        engine.sample_average();
        assert_eq!(engine.average_power(), None);

        live.set_connection_state(ConnectionState::Connected);
        for watts in [200u16, 0, 300] {
            let [lo, hi] = watts.to_le_bytes();
            live.ingest_frame(&[0x44, 0x00, 0xF6, 0x09, 0xB4, 0x00, lo, hi]);
            clock.advance_secs(1.0);
            engine.sample_average();
        }
        assert_eq!(engine.average_power(), Some(250));

        let ftp = 250;
        assert_eq!(
            PowerZone::zone_for(live.current_power(), ftp),
            Some(PowerZone::Vo2Max)
        );

        // A short frame leaves the last reading in place
        assert!(live.ingest_frame(&[0x44, 0x00]).is_none());
        assert_eq!(live.current_power(), Some(300));
    }

    #[test]
    fn test_just_ride_source_through_trait_object() {
        let sources: Vec<Box<dyn WorkoutSource>> = vec![
            Box::new(import::JustRideSource::open_ended()),
            Box::new(import::JustRideSource::timed(900.0)),
        ];

        for source in &sources {
            let (mut engine, clock) = engine();
            engine.load(source.as_ref()).unwrap();
            engine.start();
            clock.advance_secs(900.0);
            engine.tick();

            let workout = engine.workout().unwrap();
            assert!(workout.is_just_ride());
            assert!(!workout.display_metrics().contains(&Metric::TargetZone));
            if workout.is_open_ended() {
                assert_eq!(engine.state(), PlaybackState::Running);
            } else {
                assert_eq!(engine.state(), PlaybackState::Finished);
            }
        }
    }
}
