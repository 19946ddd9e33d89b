/*!
Dirty-state detection.
*/

use crate::Snapshot;

/// Whether `current` differs from the last persisted snapshot.
///
/// True when the key sets differ or any shared key holds a different value.
/// Arrays compare element-wise. A file that was never saved (`last` is
/// `None`) is always changed, so the first due tick writes even an empty
/// snapshot. Keys missing because a read failed count as a difference.
pub fn changed(current: &Snapshot, last: Option<&Snapshot>) -> bool {
    match last {
        None => true,
        Some(last) => {
            current.len() != last.len()
                || current
                    .iter()
                    .any(|(key, value)| last.get(key) != Some(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    fn snap(entries: &[(&str, Value)]) -> Snapshot {
        entries.iter().cloned().collect()
    }

    #[test]
    fn test_never_saved_is_changed() {
        assert!(changed(&Snapshot::new(), None));
        assert!(changed(&snap(&[("x", Value::Int(1))]), None));
    }

    #[test]
    fn test_identical_snapshots_are_unchanged() {
        let a = snap(&[("x", Value::Int(5)), ("y", Value::from("on"))]);
        let b = snap(&[("y", Value::from("on")), ("x", Value::Int(5))]);
        assert!(!changed(&a, Some(&b)));
        assert!(!changed(&Snapshot::new(), Some(&Snapshot::new())));
    }

    #[test]
    fn test_value_change_detected() {
        let last = snap(&[("x", Value::Int(5)), ("y", Value::from("on"))]);
        let current = snap(&[("x", Value::Int(6)), ("y", Value::from("on"))]);
        assert!(changed(&current, Some(&last)));
    }

    #[test]
    fn test_nan_stays_unchanged() {
        let last = snap(&[
            ("reading", Value::Float(f64::NAN)),
            ("wave", Value::FloatArray(vec![1.0, f64::NAN])),
        ]);
        let current = last.clone();
        assert!(!changed(&current, Some(&last)));

        let recovered = snap(&[
            ("reading", Value::Float(0.5)),
            ("wave", Value::FloatArray(vec![1.0, f64::NAN])),
        ]);
        assert!(changed(&recovered, Some(&last)));
    }

    #[test]
    fn test_arrays_compare_element_wise() {
        let last = snap(&[("wave", Value::FloatArray(vec![1.0, 2.0, 3.0]))]);
        let same = snap(&[("wave", Value::FloatArray(vec![1.0, 2.0, 3.0]))]);
        let other = snap(&[("wave", Value::FloatArray(vec![1.0, 2.0, 3.5]))]);
        let longer = snap(&[("wave", Value::FloatArray(vec![1.0, 2.0, 3.0, 4.0]))]);
        assert!(!changed(&same, Some(&last)));
        assert!(changed(&other, Some(&last)));
        assert!(changed(&longer, Some(&last)));
    }

    #[test]
    fn test_missing_key_is_changed() {
        let last = snap(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        let partial = snap(&[("a", Value::Int(1))]);
        assert!(changed(&partial, Some(&last)));
        assert!(changed(&last, Some(&partial)));
    }

    #[test]
    fn test_same_size_different_keys_is_changed() {
        let last = snap(&[("a", Value::Int(1))]);
        let current = snap(&[("b", Value::Int(1))]);
        assert!(changed(&current, Some(&last)));
    }

    #[test]
    fn test_kind_change_is_changed() {
        let last = snap(&[("x", Value::Int(5))]);
        let current = snap(&[("x", Value::Float(5.0))]);
        assert!(changed(&current, Some(&last)));
    }
}
