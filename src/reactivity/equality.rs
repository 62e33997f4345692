//! Equality functions for write short-circuiting.
//!
//! A signal write that compares equal under the cell's equality function
//! notifies nobody. The default is `PartialEq`; these helpers cover the
//! cases where that is wrong or too strong.

use crate::core::types::EqualsFn;

/// Default strict equality via PartialEq.
pub fn equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// f64 equality that treats NaN as equal to NaN, so a signal stuck at NaN
/// does not notify forever.
pub fn safe_equals_f64(a: &f64, b: &f64) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

/// f32 variant of [`safe_equals_f64`].
pub fn safe_equals_f32(a: &f32, b: &f32) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

/// Always unequal: every set notifies, even with an identical value.
pub fn never_equals<T>(_a: &T, _b: &T) -> bool {
    false
}

/// Always equal: sets never notify.
pub fn always_equals<T>(_a: &T, _b: &T) -> bool {
    true
}

/// Default equality function pointer for a type.
pub fn default_equals_fn<T: PartialEq + 'static>() -> EqualsFn<T> {
    equals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_equal_to_nan() {
        assert!(safe_equals_f64(&f64::NAN, &f64::NAN));
        assert!(!safe_equals_f64(&f64::NAN, &1.0));
        assert!(!safe_equals_f64(&1.0, &f64::NAN));
        assert!(safe_equals_f64(&1.0, &1.0));
        assert!(safe_equals_f32(&f32::NAN, &f32::NAN));
    }

    #[test]
    fn forced_equality_variants() {
        assert!(!never_equals(&42, &42));
        assert!(always_equals(&1, &2));
    }
}
