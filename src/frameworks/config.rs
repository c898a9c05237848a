use crate::domain::tuning::{PopulationTuning, WorldBounds};
use crate::interface_adapters::utils::rng::session_seed;
use crate::use_cases::{RecordingConfig, SimSettings, SyncSettings, WorkerPool};
use std::path::PathBuf;
use std::str::FromStr;
use std::{env, time::Duration};

// Runtime/server constants (not simulation tuning).

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const FRAME_BROADCAST_CAPACITY: usize = 128;
// Upper bound on one socket write before the line is skipped.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(250);
// Grace period for in-flight worker batches when the world stops.
pub const WORLD_STOP_GRACE: Duration = Duration::from_secs(1);

pub fn server_port() -> u16 {
    parse_or(var("SIM_SERVER_PORT").as_deref(), 7777)
}

pub fn tick_interval() -> Duration {
    millis_or(var("SIM_TICK_MS").as_deref(), 16)
}

pub fn broadcast_interval() -> Duration {
    millis_or(var("SIM_BROADCAST_MS").as_deref(), 50)
}

pub fn screen_bounds() -> WorldBounds {
    // WorldBounds clamps degenerate extents itself.
    WorldBounds::new(
        parse_or(var("SIM_SCREEN_WIDTH").as_deref(), 1920.0),
        parse_or(var("SIM_SCREEN_HEIGHT").as_deref(), 1080.0),
    )
}

pub fn worker_count() -> usize {
    workers_or_default(var("SIM_WORKERS").as_deref())
}

pub fn ai_count() -> usize {
    parse_or(
        var("SIM_AI_COUNT").as_deref(),
        PopulationTuning::default().initial_ai,
    )
}

pub fn seed() -> u64 {
    var("SIM_SEED")
        .as_deref()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(session_seed)
}

pub fn recording_enabled() -> bool {
    flag(var("SIM_RECORD").as_deref())
}

pub fn recordings_dir() -> PathBuf {
    var("SIM_RECORDINGS_DIR")
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("recordings"))
}

pub fn record_interval() -> Duration {
    millis_or(var("SIM_RECORD_INTERVAL_MS").as_deref(), 500)
}

pub fn record_threshold() -> f32 {
    let threshold = parse_or(var("SIM_RECORD_THRESHOLD").as_deref(), 0.5_f32);
    if threshold.is_finite() && threshold >= 0.0 {
        threshold
    } else {
        tracing::warn!(threshold, "invalid SIM_RECORD_THRESHOLD; using 0");
        0.0
    }
}

pub fn interpolation_delay() -> Duration {
    millis_or(var("SIM_INTERP_DELAY_MS").as_deref(), 120)
}

pub fn join_timeout() -> Duration {
    millis_or(var("SIM_JOIN_TIMEOUT_MS").as_deref(), 3000)
}

pub fn sim_settings() -> SimSettings {
    SimSettings {
        bounds: screen_bounds(),
        tick_interval: tick_interval(),
        workers: worker_count(),
        seed: seed(),
        population: PopulationTuning {
            initial_ai: ai_count(),
            ..PopulationTuning::default()
        },
        ..SimSettings::default()
    }
}

pub fn sync_settings() -> SyncSettings {
    SyncSettings {
        interpolation_delay: interpolation_delay(),
        ..SyncSettings::default()
    }
}

pub fn recording_config() -> RecordingConfig {
    RecordingConfig {
        keyframe_interval: record_interval(),
        position_threshold: record_threshold(),
        ..RecordingConfig::default()
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn millis_or(raw: Option<&str>, default_ms: u64) -> Duration {
    // Zero would make tokio intervals panic; treat it as unset.
    let millis = parse_or(raw, default_ms);
    Duration::from_millis(if millis == 0 { default_ms } else { millis })
}

fn workers_or_default(raw: Option<&str>) -> usize {
    match raw.and_then(|v| v.trim().parse::<usize>().ok()) {
        Some(0) | None => WorkerPool::default_worker_count(),
        Some(n) => n,
    }
}

fn flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_value_is_missing_or_garbage_then_default_is_used() {
        assert_eq!(parse_or::<u16>(None, 7777), 7777);
        assert_eq!(parse_or::<u16>(Some("not-a-port"), 7777), 7777);
        assert_eq!(parse_or::<u16>(Some(" 9000 "), 7777), 9000);
    }

    #[test]
    fn when_millis_is_zero_then_default_is_used() {
        assert_eq!(millis_or(Some("0"), 50), Duration::from_millis(50));
        assert_eq!(millis_or(Some("20"), 50), Duration::from_millis(20));
    }

    #[test]
    fn when_workers_is_zero_then_hardware_default_is_used() {
        assert_eq!(
            workers_or_default(Some("0")),
            WorkerPool::default_worker_count()
        );
        assert_eq!(workers_or_default(Some("8")), 8);
    }

    #[test]
    fn when_flag_is_truthy_then_enabled() {
        assert!(flag(Some("1")));
        assert!(flag(Some("TRUE")));
        assert!(!flag(Some("0")));
        assert!(!flag(None));
    }
}
