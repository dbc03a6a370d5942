//! Poll interval selection

use crate::config::PollConfig;
use std::time::Duration;

/// Lower bound for any poll interval
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Changes smaller than this are not reapplied
pub const REAPPLY_THRESHOLD: Duration = Duration::from_millis(200);

const PROCESSING_GUARD_FACTOR: f64 = 1.5;

/// Fast interval while an alarm is active, scan interval otherwise
pub fn base_interval(config: &PollConfig, alarm_active: bool) -> Duration {
    if alarm_active {
        config.fast_poll_duration()
    } else {
        config.scan_duration()
    }
}

/// Effective interval: never shorter than the base, 1.5x the last cycle, or 1s
pub fn compute_interval(base: Duration, last_cycle: Duration) -> Duration {
    let guard = last_cycle.mul_f64(PROCESSING_GUARD_FACTOR);
    base.max(guard).max(MIN_INTERVAL)
}

/// Whether `next` differs enough from `current` to reschedule
pub fn should_reapply(current: Duration, next: Duration) -> bool {
    current.abs_diff(next) > REAPPLY_THRESHOLD
}
