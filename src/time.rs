use std::time::{SystemTime, UNIX_EPOCH};

/// Tolerated forward clock skew for timestamps and document creation times.
pub const MAX_CLOCK_DRIFT_MS: u64 = 5 * 60 * 1000;

/// Age after which a signed prekey must be rotated and republished.
pub const SIGNED_PREKEY_ROTATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_past_2020() {
        // 2020-01-01 in ms; a sanity floor for the wall clock.
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn rotation_window_is_seven_days() {
        assert_eq!(SIGNED_PREKEY_ROTATION_MS, 604_800_000);
    }
}
