//! End-to-end tests for the tracking session through the public API

use speedcam_sentinel::capability::{AlertDispatcher, ManualWakeLock, SilentSound};
use speedcam_sentinel::catalog::Catalog;
use speedcam_sentinel::core::{SelectionPolicy, Thresholds};
use speedcam_sentinel::position::{ManualSource, PositionSample, ReplaySource};
use speedcam_sentinel::session::{SessionState, TrackingSession, Visibility, WakeLockStatus};
use speedcam_sentinel::stats::create_shared_stats_with_persistence;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{BufReader, Read, Write};
use std::sync::Arc;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(200);

/// Two cameras on the equator: one ~111 m east of the origin, one ~167 m
/// east. A third far north is never in range.
fn cameras() -> Arc<Catalog> {
    Arc::new(
        Catalog::from_json(
            r#"[
                {"id": 10, "name": "Main St", "latitude": 0.0, "longitude": 0.001, "speed_limit": 50},
                {"id": 11, "name": "Main St East", "latitude": 0.0, "longitude": 0.0015, "speedLimit": 50},
                {"id": 12, "name": "Ring Road", "latitude": 0.5, "longitude": 0.0, "speed_limit": 90}
            ]"#,
        )
        .unwrap(),
    )
}

#[test]
fn test_drive_past_camera_alerts_once() {
    let source = ManualSource::new();
    let feed = source.feed();
    let sound = SilentSound::new();
    let mut session = TrackingSession::new(cameras(), Box::new(source))
        .with_dispatcher(AlertDispatcher::new(Box::new(sound.clone())));
    session.start().unwrap();

    // Approach from the west, heading east
    let track = [-0.003, -0.002, -0.001, 0.0, 0.0005];
    let mut alerts = Vec::new();
    for lon in track {
        feed.push(PositionSample::new(0.0, lon, Some(90.0)));
        if let Some(event) = session.tick(TICK) {
            alerts.push(event);
        }
    }

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].point.id, 10);
    assert!(alerts[0].distance_meters < 204.0);
    assert_eq!(sound.play_count(), 1);
    assert_eq!(session.status().active_alert.map(|p| p.id), Some(10));
}

#[test]
fn test_driving_away_does_not_alert() {
    let source = ManualSource::new();
    let feed = source.feed();
    let mut session = TrackingSession::new(cameras(), Box::new(source));
    session.start().unwrap();

    // Camera is east, heading west
    feed.push(PositionSample::new(0.0, 0.0, Some(270.0)));
    assert!(session.tick(TICK).is_none());
    assert!(!session.alert_state().is_active());
}

#[test]
fn test_nearest_policy_picks_closest() {
    let source = ManualSource::new();
    let feed = source.feed();
    let thresholds = Thresholds {
        selection: SelectionPolicy::Nearest,
        ..Thresholds::default()
    };
    let mut session = TrackingSession::new(cameras(), Box::new(source)).with_thresholds(thresholds);
    session.start().unwrap();

    // Between the two cameras with no heading: both qualify, 10 is ~29 m
    // away and 11 is ~27 m away
    feed.push(PositionSample::new(0.0, 0.00126, None));
    let event = session.tick(TICK).unwrap();
    assert_eq!(event.point.id, 11);
}

#[test]
fn test_dismiss_then_retrigger() {
    let source = ManualSource::new();
    let feed = source.feed();
    let mut session = TrackingSession::new(cameras(), Box::new(source));
    session.start().unwrap();

    feed.push(PositionSample::new(0.0, 0.0, None));
    assert_eq!(session.tick(TICK).map(|e| e.point.id), Some(10));
    assert_eq!(session.dismiss().map(|p| p.id), Some(10));

    feed.push(PositionSample::new(0.0, 0.0, None));
    assert_eq!(session.tick(TICK).map(|e| e.point.id), Some(10));
}

#[test]
fn test_full_lifecycle_with_wake_lock() {
    let source = ManualSource::new();
    let feed = source.feed();
    let lock = ManualWakeLock::new();
    let mut session = TrackingSession::new(cameras(), Box::new(source))
        .with_wake_lock(Box::new(lock.clone()));

    session.start().unwrap();
    assert_eq!(session.status().wake_lock, WakeLockStatus::Held);

    // Backgrounded: the platform takes the lock away
    session.visibility_changed(Visibility::Hidden);
    lock.revoke_all();
    session.visibility_changed(Visibility::Visible);
    assert_eq!(lock.held_count(), 1);

    feed.push(PositionSample::new(0.0, 0.0, None));
    assert!(session.tick(TICK).is_some());

    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(lock.held_count(), 0);
    assert!(session.status().active_alert.is_none());
    assert!(!feed.is_subscribed());

    let stats = session.stats().snapshot();
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.wake_locks_acquired, 2);
    assert_eq!(stats.alerts_raised, 1);
}

#[test]
fn test_replay_file_through_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "# recorded track").unwrap();
    writeln!(file, r#"{{"latitude": 0.0, "longitude": -0.003, "heading": 90}}"#).unwrap();
    writeln!(file, "garbage").unwrap();
    writeln!(file, r#"{{"latitude": 0.0, "longitude": 0.0, "heading": 90}}"#).unwrap();
    drop(file);

    let stats = create_shared_stats_with_persistence(dir.path().join("stats.json"));
    let source = ReplaySource::file(&path, Duration::from_millis(10));
    let mut session = TrackingSession::new(cameras(), Box::new(source)).with_stats(stats.clone());
    session.start().unwrap();

    let mut alerts = Vec::new();
    for _ in 0..20 {
        if let Some(event) = session.tick(TICK) {
            alerts.push(event);
        }
        if !session.status().receiving {
            break;
        }
    }

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].point.name, "Main St");
    assert!(session.is_active());

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.samples_processed, 2);
    assert_eq!(snapshot.source_errors, 1);

    stats.save().unwrap();
    assert!(dir.path().join("stats.json").exists());
}

#[test]
fn test_missing_replay_file_fails_start() {
    let source = ReplaySource::file("/nonexistent/track.jsonl", Duration::ZERO);
    let mut session = TrackingSession::new(cameras(), Box::new(source));
    assert!(session.start().is_err());
    assert_eq!(session.state(), SessionState::Idle);
}

/// Blocking byte stream fed from a channel, standing in for piped stdin.
struct PipedInput {
    chunks: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for PipedInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.chunks.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

fn piped() -> (ReplaySource, Sender<Vec<u8>>) {
    let (writer, chunks) = unbounded();
    let input = PipedInput {
        chunks,
        pending: Vec::new(),
    };
    (ReplaySource::from_reader(BufReader::new(input)), writer)
}

#[test]
fn test_piped_input_survives_stop_and_restart() {
    let (source, writer) = piped();
    let mut session = TrackingSession::new(cameras(), Box::new(source));
    let sample = br#"{"latitude": 0.0, "longitude": 0.0, "heading": 90}
"#;

    session.start().unwrap();
    writer.send(sample.to_vec()).unwrap();
    assert_eq!(session.tick(TICK).map(|e| e.point.id), Some(10));

    session.stop();
    session.start().unwrap();

    // First line after the restart must reach the new session intact
    writer.send(sample.to_vec()).unwrap();
    assert_eq!(session.tick(TICK).map(|e| e.point.id), Some(10));
    assert_eq!(session.stats().snapshot().source_errors, 0);
}
