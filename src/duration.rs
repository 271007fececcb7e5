use serde_json::Value;

/// Attribute under which every normalized duration is emitted.
pub const DURATION_KEY: &str = "duration";

/// Source attribute names and how many nanoseconds one unit is worth.
const UNITS: &[(&str, f64)] = &[
    ("duration", 1e9),
    ("duration_ms", 1e6),
    ("duration_micros", 1e3),
    ("duration_ns", 1.0),
];

/// Whether `name` is one of the recognized duration attributes.
pub fn is_duration_attribute(name: &str) -> bool {
    UNITS.iter().any(|(unit, _)| *unit == name)
}

/// Convert a duration attribute to integer nanoseconds.
///
/// Values are rounded half away from zero, except `duration_ns` which is
/// already in the target unit and is only truncated toward zero. Returns
/// `None` for unknown names and non-numeric values so the caller can keep the
/// attribute as it was.
pub fn normalize_duration(name: &str, value: &Value) -> Option<Value> {
    let factor = UNITS.iter().find(|(unit, _)| *unit == name)?.1;

    if let Some(int) = value.as_i64() {
        return Some(Value::from(int.saturating_mul(factor as i64)));
    }
    if let Some(uint) = value.as_u64() {
        return Some(Value::from(uint.saturating_mul(factor as u64)));
    }

    let float = value.as_f64()?;
    if !float.is_finite() {
        return None;
    }
    let nanos = if name == "duration_ns" {
        float.trunc()
    } else {
        (float * factor).round()
    };
    // `as` saturates at the i64 bounds.
    Some(Value::from(nanos as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_each_unit() {
        assert_eq!(normalize_duration("duration", &json!(1.1)), Some(json!(1_100_000_000)));
        assert_eq!(normalize_duration("duration_ms", &json!(1.1)), Some(json!(1_100_000)));
        assert_eq!(normalize_duration("duration_micros", &json!(1.1)), Some(json!(1_100)));
        assert_eq!(normalize_duration("duration_ns", &json!(1.1)), Some(json!(1)));
    }

    #[test]
    fn nanoseconds_truncate_instead_of_rounding() {
        assert_eq!(normalize_duration("duration_ns", &json!(1.9)), Some(json!(1)));
        assert_eq!(normalize_duration("duration_ns", &json!(-1.9)), Some(json!(-1)));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(normalize_duration("duration_micros", &json!(0.0005)), Some(json!(1)));
        assert_eq!(normalize_duration("duration_micros", &json!(-0.0005)), Some(json!(-1)));
    }

    #[test]
    fn integers_scale_exactly() {
        assert_eq!(normalize_duration("duration_ms", &json!(3)), Some(json!(3_000_000)));
        assert_eq!(normalize_duration("duration", &json!(2)), Some(json!(2_000_000_000u64)));
    }

    #[test]
    fn non_numeric_and_unknown_names_are_left_alone() {
        assert_eq!(normalize_duration("duration_ms", &json!("fast")), None);
        assert_eq!(normalize_duration("elapsed", &json!(1)), None);
        assert!(!is_duration_attribute("elapsed"));
        assert!(is_duration_attribute("duration_micros"));
    }
}
