// ============================================================================
// ORDER BY support
// ============================================================================
//
// ASC sorts NULLs last, DESC reverses the whole order (so NULLs come first).
// Sorting is stable: rows with equal keys keep their scan order.

use crate::core::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub descending: bool,
}

pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    a.compare(b).unwrap_or_else(|_| a.cmp(b))
}

pub fn compare_keys(a: &[Value], b: &[Value], keys: &[SortKey]) -> Ordering {
    for ((left, right), key) in a.iter().zip(b).zip(keys) {
        let ordering = compare_values(left, right);
        let ordering = if key.descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Sort `items` by the precomputed key vector attached to each one.
pub fn sort_by_keys<T>(items: &mut [(Vec<Value>, T)], keys: &[SortKey]) {
    items.sort_by(|(a, _), (b, _)| compare_keys(a, b, keys));
}
