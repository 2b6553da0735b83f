//! Wall-clock helpers. Simulation code never reads the clock itself;
//! callers pass `now` in so handlers stay deterministic under test.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch
pub type Millis = u64;

/// Current wall-clock time in milliseconds
pub fn now_ms() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or_default()
}

/// Milliseconds to fractional seconds
#[inline]
pub fn ms_to_secs(ms: Millis) -> f32 {
    ms as f32 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }

    #[test]
    fn test_ms_to_secs() {
        assert!((ms_to_secs(1500) - 1.5).abs() < 1e-6);
        assert_eq!(ms_to_secs(0), 0.0);
    }
}
