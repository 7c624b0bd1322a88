//! Query time windows.

use std::fmt;

/// Half-open span `[start, end)` in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Consecutive windows of `resolution` seconds covering `[start, end)`. The
/// last window is clipped to `end`.
pub fn partition_windows(start: i64, end: i64, resolution: u64) -> Vec<TimeWindow> {
    let step = resolution.max(1) as i64;
    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = (cursor + step).min(end);
        windows.push(TimeWindow::new(cursor, next));
        cursor = next;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_window_is_clipped() {
        let windows = partition_windows(0, 95, 30);
        assert_eq!(
            windows,
            vec![
                TimeWindow::new(0, 30),
                TimeWindow::new(30, 60),
                TimeWindow::new(60, 90),
                TimeWindow::new(90, 95),
            ]
        );
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let windows = partition_windows(100, 160, 30);
        assert_eq!(windows, vec![TimeWindow::new(100, 130), TimeWindow::new(130, 160)]);
    }

    #[test]
    fn test_windows_tile_the_span() {
        for resolution in 1..50 {
            let windows = partition_windows(1_700_000_003, 1_700_000_917, resolution);
            assert_eq!(windows.first().unwrap().start, 1_700_000_003);
            assert_eq!(windows.last().unwrap().end, 1_700_000_917);
            assert!(windows.windows(2).all(|pair| pair[0].end == pair[1].start));
            assert!(windows.iter().all(|w| !w.is_empty() && w.len() <= resolution as i64));
        }
    }

    #[test]
    fn test_empty_span() {
        assert!(partition_windows(10, 10, 30).is_empty());
    }
}
