/// Bucket table used by histograms and quantile-style distributions.
///
/// The boundaries are log-spaced and historic: downstream consumers expect these exact
/// values, so the table must not be "improved" or made data-driven.

/// Number of buckets in a histogram ([`crate::store::AggregationStore`] histograms are
/// fixed-size arrays of this length).
pub const HISTOGRAM_SIZE: usize = 22;

/// Ascending boundary table. The final entry acts as a sentinel: any value exceeding the
/// last real boundary is clamped into it.
///
/// Kept in `f64` rather than `u64`: SPEC_FULL.md §4.3's quant bucketing divides a raw value by
/// a divisor (e.g. `/1024` for `allocated_bytes`) *before* bucketing, and that division must
/// happen at full precision — truncating to an integer first (as the original C does not)
/// would put values like 1536 bytes in the wrong bucket.
const BUCKET_BOUNDARIES: [f64; HISTOGRAM_SIZE] = [
    1.0,
    3.0,
    10.0,
    30.0,
    100.0,
    300.0,
    1_000.0,
    3_000.0,
    10_000.0,
    30_000.0,
    100_000.0,
    300_000.0,
    1_000_000.0,
    3_000_000.0,
    10_000_000.0,
    30_000_000.0,
    100_000_000.0,
    300_000_000.0,
    1_000_000_000.0,
    3_000_000_000.0,
    10_000_000_000.0,
    30_000_000_000.0,
];

/// Returns the first boundary greater than or equal to `value`, clamped to the last
/// boundary if `value` exceeds the table.
///
/// Panics if the table is empty (unreachable given the `const` table above).
pub fn find_bucket(value: f64) -> f64 {
    BUCKET_BOUNDARIES
        .iter()
        .find(|&&boundary| boundary >= value)
        .copied()
        .unwrap_or_else(|| *BUCKET_BOUNDARIES.last().expect("bucket table is non-empty"))
}

/// Returns the index of the bucket [`find_bucket`] would return.
pub fn find_bucket_index(value: f64) -> usize {
    BUCKET_BOUNDARIES
        .iter()
        .position(|&boundary| boundary >= value)
        .unwrap_or(HISTOGRAM_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_boundary_maps_to_itself() {
        assert_eq!(find_bucket(100.0), 100.0);
        assert_eq!(find_bucket_index(100.0), 4);
    }

    #[test]
    fn value_between_boundaries_rounds_up() {
        assert_eq!(find_bucket(2.0), 3.0);
        assert_eq!(find_bucket(250.0), 300.0);
    }

    #[test]
    fn fractional_value_rounds_up_to_next_boundary() {
        // 1536 allocated bytes / 1024 = 1.5, which must bucket as 3 (the first boundary >=
        // 1.5), not 1 (which truncating to u64 before bucketing would wrongly produce).
        assert_eq!(find_bucket(1.5), 3.0);
    }

    #[test]
    fn value_beyond_table_clamps_to_last() {
        let last = *BUCKET_BOUNDARIES.last().unwrap();
        assert_eq!(find_bucket(last + 1.0), last);
        assert_eq!(find_bucket_index(last + 1.0), HISTOGRAM_SIZE - 1);
    }

    #[test]
    fn find_bucket_and_find_bucket_index_agree() {
        for v in [1.0, 2.0, 9.0, 10.0, 11.0, 29_999.0, 30_000.0, 40_000_000_000.0] {
            assert_eq!(BUCKET_BOUNDARIES[find_bucket_index(v)], find_bucket(v));
        }
    }
}
