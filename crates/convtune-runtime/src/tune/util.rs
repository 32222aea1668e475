use core::time::Duration;

/// Index of the fastest successful run.
///
/// Runs that failed are `None`. Ties keep the lowest index.
pub fn fastest_index(durations: &[Option<Duration>]) -> Option<usize> {
    durations
        .iter()
        .enumerate()
        .filter_map(|(index, duration)| duration.map(|duration| (index, duration)))
        .min_by(|(index_a, a), (index_b, b)| a.cmp(b).then(index_a.cmp(index_b)))
        .map(|(index, _)| index)
}
