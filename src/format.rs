use crate::spec::DimensionValue;

const DATE_FORMAT: &str = "%-m/%-d/%Y";

fn with_unit(text: String, unit: Option<&str>) -> String {
    match unit {
        Some(u) if !u.is_empty() => format!("{} {}", text, u),
        _ => text,
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n.fract() == 0.0 {
        // -0 prints as 0
        format!("{}", if n == 0.0 { 0.0 } else { n })
    } else {
        format!("{:.4}", n)
    }
}

/// Renders a dimension or calculation value for display.
///
/// Integral numbers print without decimals, other numbers with exactly four.
/// Booleans become `Yes`/`No` and dates `M/D/YYYY`; neither gets a unit.
/// A missing value is `N/A`.
pub fn format_dimension_value(value: Option<&DimensionValue>, unit: Option<&str>) -> String {
    match value {
        None => "N/A".to_string(),
        Some(DimensionValue::Number(n)) => with_unit(format_number(*n), unit),
        Some(DimensionValue::Boolean(true)) => "Yes".to_string(),
        Some(DimensionValue::Boolean(false)) => "No".to_string(),
        Some(DimensionValue::Date(d)) => d.format(DATE_FORMAT).to_string(),
        Some(DimensionValue::Text(s)) => with_unit(s.clone(), unit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fmt(value: impl Into<DimensionValue>, unit: Option<&str>) -> String {
        format_dimension_value(Some(&value.into()), unit)
    }

    #[test]
    fn numbers() {
        assert_eq!(fmt(5.0, Some("kg")), "5 kg");
        assert_eq!(fmt(5.1, Some("kg")), "5.1000 kg");
        assert_eq!(fmt(600.0, None), "600");
        assert_eq!(fmt(-3.0, None), "-3");
        assert_eq!(fmt(-0.0, None), "0");
        assert_eq!(fmt(2.0 / 3.0, Some("mm")), "0.6667 mm");
        assert_eq!(fmt(f64::INFINITY, None), "Infinity");
    }

    #[test]
    fn integral_numbers_have_no_decimal_point() {
        for n in [0.0, 1.0, 12.0, 1_000_000.0, -42.0] {
            assert!(!fmt(n, Some("g")).contains('.'), "{n}");
        }
    }

    #[test]
    fn fractional_numbers_have_four_decimals() {
        for n in [0.5, 1.25, 3.14159265, -7.1] {
            let out = fmt(n, None);
            let decimals = out.split('.').nth(1).unwrap();
            assert_eq!(decimals.len(), 4, "{out}");
        }
    }

    #[test]
    fn missing_value() {
        assert_eq!(format_dimension_value(None, None), "N/A");
        assert_eq!(format_dimension_value(None, Some("kg")), "N/A");
    }

    #[test]
    fn booleans_ignore_unit() {
        assert_eq!(fmt(true, None), "Yes");
        assert_eq!(fmt(false, Some("kg")), "No");
    }

    #[test]
    fn dates_ignore_unit() {
        let date = Utc.with_ymd_and_hms(2024, 1, 5, 10, 30, 0).unwrap();
        assert_eq!(fmt(date, Some("kg")), "1/5/2024");
    }

    #[test]
    fn text_gets_unit_unless_empty() {
        assert_eq!(fmt("A", Some("grade")), "A grade");
        assert_eq!(fmt("A", Some("")), "A");
        assert_eq!(fmt("A", None), "A");
    }
}
