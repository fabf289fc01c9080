//! Mapping from caller timeouts to the discrete GPIB timeout codes.
//!
//! The bus only supports a fixed ladder of timeout values (code 0 disables
//! the timeout, codes 1..=17 run from 10 µs to 1000 s in 1-3-10 steps). A
//! caller-supplied duration is mapped to the first rung that is at least as
//! long, so the bus never times out earlier than the caller asked for.
//! Durations beyond 1000 s saturate at the top code.
//!
//! Kept free of the native bindings so the mapping is usable and testable
//! without linux-gpib installed; the discriminants equal the library's
//! `TNONE`..`T1000s` constants.

use std::time::Duration;

/// Discrete bus timeout codes, as understood by `ibtmo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum GpibTimeout {
    TNone = 0,
    T10us = 1,
    T30us = 2,
    T100us = 3,
    T300us = 4,
    T1ms = 5,
    T3ms = 6,
    T10ms = 7,
    T30ms = 8,
    T100ms = 9,
    T300ms = 10,
    T1s = 11,
    T3s = 12,
    T10s = 13,
    T30s = 14,
    T100s = 15,
    T300s = 16,
    T1000s = 17,
}

impl GpibTimeout {
    /// The raw code passed to the bus library.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Threshold seconds and the code that covers them, ascending.
const TIMEOUT_TABLE: [(f64, GpibTimeout); 18] = [
    (0.0, GpibTimeout::TNone),
    (10e-6, GpibTimeout::T10us),
    (30e-6, GpibTimeout::T30us),
    (100e-6, GpibTimeout::T100us),
    (300e-6, GpibTimeout::T300us),
    (1e-3, GpibTimeout::T1ms),
    (3e-3, GpibTimeout::T3ms),
    (10e-3, GpibTimeout::T10ms),
    (30e-3, GpibTimeout::T30ms),
    (100e-3, GpibTimeout::T100ms),
    (300e-3, GpibTimeout::T300ms),
    (1.0, GpibTimeout::T1s),
    (3.0, GpibTimeout::T3s),
    (10.0, GpibTimeout::T10s),
    (30.0, GpibTimeout::T30s),
    (100.0, GpibTimeout::T100s),
    (300.0, GpibTimeout::T300s),
    (1000.0, GpibTimeout::T1000s),
];

/// Returns the smallest timeout code whose threshold is at least `timeout`.
///
/// A zero duration selects [`GpibTimeout::TNone`] (no bus timeout), and
/// anything above 1000 s selects [`GpibTimeout::T1000s`].
pub fn gpib_timeout(timeout: Duration) -> GpibTimeout {
    let secs = timeout.as_secs_f64();
    TIMEOUT_TABLE
        .iter()
        .find(|(threshold, _)| secs <= *threshold)
        .map(|(_, code)| *code)
        .unwrap_or(GpibTimeout::T1000s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables_the_timeout() {
        assert_eq!(gpib_timeout(Duration::ZERO), GpibTimeout::TNone);
    }

    #[test]
    fn test_exact_thresholds_map_to_their_own_code() {
        for (threshold, code) in TIMEOUT_TABLE {
            if threshold == 0.0 {
                continue;
            }
            assert_eq!(gpib_timeout(Duration::from_secs_f64(threshold)), code);
        }
    }

    #[test]
    fn test_rounding_is_always_upward() {
        assert_eq!(
            gpib_timeout(Duration::from_secs_f64(5e-6)),
            GpibTimeout::T10us
        );
        assert_eq!(
            gpib_timeout(Duration::from_secs_f64(11e-6)),
            GpibTimeout::T30us
        );
        assert_eq!(gpib_timeout(Duration::from_millis(2)), GpibTimeout::T3ms);
        assert_eq!(gpib_timeout(Duration::from_secs(4)), GpibTimeout::T10s);
        assert_eq!(gpib_timeout(Duration::from_secs(301)), GpibTimeout::T1000s);
    }

    #[test]
    fn test_above_table_saturates() {
        assert_eq!(gpib_timeout(Duration::from_secs(1001)), GpibTimeout::T1000s);
        assert_eq!(gpib_timeout(Duration::from_secs(86400)), GpibTimeout::T1000s);
    }

    #[test]
    fn test_codes_match_the_bus_constants() {
        assert_eq!(GpibTimeout::TNone.code(), 0);
        assert_eq!(GpibTimeout::T1ms.code(), 5);
        assert_eq!(GpibTimeout::T1000s.code(), 17);
    }

    #[test]
    fn test_table_is_strictly_ascending() {
        for pair in TIMEOUT_TABLE.windows(2) {
            assert!(pair[0].0 < pair[1].0);
            assert!(pair[0].1.code() + 1 == pair[1].1.code());
        }
    }
}
