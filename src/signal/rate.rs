//! Beat interval to BPM conversion
//!
//! Intervals outside the physiological range are treated as misdetections
//! and dropped before averaging. The estimate is sticky: whenever there is
//! not enough valid data the previous value is returned unchanged.

/// Shortest accepted beat interval in seconds (200 BPM)
pub const MIN_INTERVAL: f64 = 0.3;
/// Longest accepted beat interval in seconds (30 BPM)
pub const MAX_INTERVAL: f64 = 2.0;
/// Lowest publishable rate
pub const MIN_BPM: u32 = 30;
/// Highest publishable rate
pub const MAX_BPM: u32 = 200;

/// Estimate the heart rate from peak timestamps (oldest first)
///
/// Returns `previous` when fewer than two timestamps exist, when no interval
/// falls in `[MIN_INTERVAL, MAX_INTERVAL]`, or when the result lands outside
/// `[MIN_BPM, MAX_BPM]`.
pub fn estimate<I>(timestamps: I, previous: Option<u32>) -> Option<u32>
where
    I: IntoIterator<Item = f64>,
{
    let mut timestamps = timestamps.into_iter();
    let Some(mut last) = timestamps.next() else {
        return previous;
    };

    let mut sum = 0.0;
    let mut count = 0usize;
    for at in timestamps {
        let interval = at - last;
        last = at;
        if (MIN_INTERVAL..=MAX_INTERVAL).contains(&interval) {
            sum += interval;
            count += 1;
        }
    }

    if count == 0 {
        return previous;
    }

    let mean_interval = sum / count as f64;
    let bpm = (60.0 / mean_interval).floor();
    if !(MIN_BPM as f64..=MAX_BPM as f64).contains(&bpm) {
        return previous;
    }

    Some(bpm as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_peaks_800ms_apart() {
        assert_eq!(estimate([0.0, 0.8], None), Some(75));
    }

    #[test]
    fn test_needs_two_timestamps() {
        assert_eq!(estimate([], None), None);
        assert_eq!(estimate([1.0], None), None);
        assert_eq!(estimate([1.0], Some(64)), Some(64));
    }

    #[test]
    fn test_implausible_interval_keeps_previous() {
        assert_eq!(estimate([3.0, 3.1], Some(72)), Some(72));
        assert_eq!(estimate([3.0, 3.1], None), None);
        assert_eq!(estimate([3.0, 5.5], Some(72)), Some(72));
    }

    #[test]
    fn test_short_intervals_excluded_from_mean() {
        // 0.7 s beats with a spurious double detection in between
        let timestamps = [0.0, 0.7, 0.8, 1.5];
        // valid: 0.7, 0.7 (0.1 dropped) -> 85.7
        assert_eq!(estimate(timestamps, None), Some(85));
    }

    #[test]
    fn test_floors_mean_rate() {
        // mean interval 0.9 s -> 66.67 BPM
        assert_eq!(estimate([0.0, 0.8, 1.8], None), Some(66));
    }

    #[test]
    fn test_interval_bounds_are_inclusive() {
        assert_eq!(estimate([0.0, 2.0], None), Some(30));
        assert_eq!(estimate([0.0, 0.5], None), Some(120));
    }
}
