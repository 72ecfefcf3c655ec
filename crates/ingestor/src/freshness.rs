//! Freshness policy for upstream time series.
//!
//! Upstream sources report the current period while it is still accumulating,
//! so the most recent point routinely undercounts. When enough history is
//! available we serve the second-most-recent point, the last complete period;
//! with fewer points we fall back to whatever is available.

/// Minimum number of points required before the in-progress head is skipped.
pub const MIN_COMPLETE_POINTS: usize = 2;

/// Picks the freshest complete point of a most-recent-first sequence.
///
/// Returns the second point when the sequence has at least `min_points`
/// entries, the first point when it has fewer, and None when it is empty.
pub fn second_most_recent<T>(points: &[T], min_points: usize) -> Option<&T> {
    match points.len() {
        0 => None,
        1 => points.first(),
        n if n >= min_points.max(2) => points.get(1),
        _ => points.first(),
    }
}

/// Drops the in-progress head of a most-recent-first series, so that the
/// series' first element is the point `second_most_recent` would pick.
pub fn trim_incomplete_head<T>(mut points: Vec<T>, min_points: usize) -> Vec<T> {
    if points.len() >= min_points.max(2) {
        points.remove(0);
    }
    points
}
