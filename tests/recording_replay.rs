mod support;

use std::path::PathBuf;
use std::time::Duration;
use support::{start_server, test_settings};
use swarm_server::domain::Keyframe;
use swarm_server::frameworks::server::RecordingSettings;
use swarm_server::interface_adapters::storage::{RecordingDirectory, load_timeline};
use swarm_server::use_cases::{RecordingConfig, ReplayPlayer};

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("swarm-recordings-{}", uuid::Uuid::new_v4()))
}

// Records a short live session and returns the recording path.
async fn record_session(dir: &PathBuf) -> PathBuf {
    let mut settings = test_settings();
    settings.recording = Some(RecordingSettings {
        dir: dir.clone(),
        config: RecordingConfig {
            keyframe_interval: Duration::from_millis(20),
            position_threshold: 0.0,
            ..RecordingConfig::default()
        },
    });

    let mut server = start_server(settings).await;
    let path = server.recording_path().cloned().expect("recording enabled");
    tokio::time::sleep(Duration::from_millis(400)).await;
    server.shutdown().await;
    path
}

#[tokio::test]
async fn test_live_session_is_recorded_and_listed() {
    let dir = scratch_dir();
    let path = record_session(&dir).await;

    let listing = RecordingDirectory::new(&dir)
        .list_recordings()
        .await
        .expect("list recordings");
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].path, path);
    assert!(listing[0].size > 0);

    let raw = std::fs::read_to_string(&path).expect("read recording");
    assert!(raw.lines().all(|line| line.contains("\"type\":\"keyframe\"")));
    assert!(raw.contains("\"rt\""));

    let timeline = load_timeline(&path).await.expect("load recording");
    assert!(timeline.len() >= 2, "got {} keyframes", timeline.len());
    let stamps: Vec<f64> = timeline.iter().map(Keyframe::timestamp).collect();
    assert_eq!(stamps[0], 0.0);
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_replaying_twice_gives_identical_positions() {
    let dir = scratch_dir();
    let path = record_session(&dir).await;

    let mut first = ReplayPlayer::new(load_timeline(&path).await.expect("load"));
    let mut second = ReplayPlayer::new(load_timeline(&path).await.expect("load"));
    assert!(!first.entities().is_empty());

    let schedule = [0.0, 0.016, 0.033, 0.05, 0.1, 0.007, 0.2, 5.0];
    for dt in schedule {
        first.advance(dt);
        second.advance(dt);
        assert_eq!(first.clock(), second.clock());
        assert_eq!(first.entities(), second.entities());
    }
    assert!(first.is_finished());
    assert_eq!(first.clock(), first.duration());

    first.seek(0.0);
    second.seek(0.0);
    assert_eq!(first.entities(), second.entities());

    let _ = std::fs::remove_dir_all(&dir);
}
