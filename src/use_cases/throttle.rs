//! Log throttling shared by the world, recorder and connection loops.

use std::time::{Duration, Instant};

/// Minimum gap between two log lines of the same kind.
pub const LOG_THROTTLE: Duration = Duration::from_secs(2);

/// A timestamp that lets the first `should_log` call through.
pub fn log_ready() -> Instant {
    let now = Instant::now();
    now.checked_sub(LOG_THROTTLE).unwrap_or(now)
}

/// True at most once per [`LOG_THROTTLE`]; a true result resets `last`.
pub fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_logged_once_then_next_call_is_suppressed() {
        let mut last = Instant::now() - LOG_THROTTLE;
        assert!(should_log(&mut last));
        assert!(!should_log(&mut last));
    }

    #[test]
    fn when_throttle_elapsed_then_logging_resumes() {
        let mut last = Instant::now() - LOG_THROTTLE - Duration::from_millis(1);
        assert!(should_log(&mut last));
        last -= LOG_THROTTLE;
        assert!(should_log(&mut last));
    }
}
