use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Process-unique connection id. Ids only grow, so a reconnecting client never reuses one.
pub fn next_conn_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Seed for a session when none is configured.
///
/// Drawn once per process so every caller in the same run agrees on it.
pub fn session_seed() -> u64 {
    static SEED: OnceLock<u64> = OnceLock::new();
    *SEED.get_or_init(|| rand::random::<u64>() ^ now_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_ids_are_drawn_then_they_increase() {
        let a = next_conn_id();
        let b = next_conn_id();
        assert!(b > a);
    }

    #[test]
    fn when_seed_is_read_twice_then_it_is_stable() {
        assert_eq!(session_seed(), session_seed());
    }
}
