//! The host-observable semantics of the two-kernel scan pass (spec.md §4.2):
//! block-local scan followed by a reverse update. The work-group size and
//! bank-conflict stride only matter for the device's memory layout; the
//! result is the same prefix sum regardless, so the reference backend
//! computes it directly.

/// Exclusive scan in place. Replaces `a[i]` with `Σ_{j<i} a[j]` and returns
/// the total sum (the value that would occupy `a[len]`).
pub fn exclusive_scan(a: &mut [i32]) -> i32 {
    let mut running = 0i32;
    for x in a.iter_mut() {
        let current = *x;
        *x = running;
        running += current;
    }
    running
}

/// Stream compaction built atop scan: given a predicate array, returns the
/// densely packed indices where the predicate holds, in increasing order,
/// plus the count (== `indices.len()`).
pub fn compact(predicate: &[bool]) -> Vec<u32> {
    let mut flags: Vec<i32> = predicate.iter().map(|&p| p as i32).collect();
    let total = exclusive_scan(&mut flags);
    let mut out = vec![0u32; total as usize];
    for (i, &p) in predicate.iter().enumerate() {
        if p {
            out[flags[i] as usize] = i as u32;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_matches_prefix_sum_law() {
        let mut a = vec![1, 2, 3, 4];
        let total = exclusive_scan(&mut a);
        assert_eq!(a, vec![0, 1, 3, 6]);
        assert_eq!(total, 10);
    }

    #[test]
    fn scan_of_empty_is_empty_with_zero_total() {
        let mut a: Vec<i32> = vec![];
        assert_eq!(exclusive_scan(&mut a), 0);
    }

    #[test]
    fn scan_is_idempotent_after_adding_back_total() {
        let original = vec![5, 0, 2, 7, 1];
        let mut scanned = original.clone();
        let total = exclusive_scan(&mut scanned);

        // scan(a)[i] == sum_{j<i} a[j]; reconstructing the original via
        // adjacent differences recovers it, and appending total recovers
        // the (len+1)-element inclusive form.
        let mut reconstructed = vec![0i32; original.len()];
        for i in 0..original.len() {
            let next = if i + 1 < scanned.len() { scanned[i + 1] } else { total };
            reconstructed[i] = next - scanned[i];
        }
        assert_eq!(reconstructed, original);
    }

    #[test]
    fn compact_selects_true_positions_in_order() {
        let predicate = vec![false, true, true, false, true];
        let indices = compact(&predicate);
        assert_eq!(indices, vec![1, 2, 4]);
    }

    #[test]
    fn compact_count_matches_true_count() {
        let predicate = vec![true, false, true, true, false, true];
        let count = predicate.iter().filter(|&&p| p).count();
        assert_eq!(compact(&predicate).len(), count);
    }

    #[test]
    fn compact_of_all_false_is_empty() {
        assert!(compact(&[false, false, false]).is_empty());
    }
}
